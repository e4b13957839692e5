// ==========================================
// 手术室排班核心 - 旧系统记录形态
// ==========================================
// 每种已知形态对应一个带标签的变体 + 版本化转换函数
// FLAT_ASSIGNMENT_V1: 扁平记录，每条一个时段，按 trameId 分组
// TRAME_AFFECTATION_V2: 嵌套记录 (trame -> periods -> assignments -> posts)
// 缺失或无法识别的字段取默认值，并产生迁移警告
// ==========================================

use crate::config::MigrationDefaults;
use crate::domain::sector::RoomId;
use crate::domain::trame::{AffectationModele, PersonnelRequisModele, TrameModele};
use crate::domain::types::{parse_weekday, Period, RecurrenceType, StaffRole, WeekType};
use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

// ==========================================
// 原始形态
// ==========================================

/// 旧系统记录 (JSON 中以 "shape" 字段区分)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape")]
pub enum LegacyRecord {
    #[serde(rename = "FLAT_ASSIGNMENT_V1")]
    FlatAssignmentV1(FlatAssignmentV1),
    #[serde(rename = "TRAME_AFFECTATION_V2")]
    TrameAffectationV2(TrameAffectationV2),
}

impl LegacyRecord {
    pub fn shape(&self) -> &'static str {
        match self {
            LegacyRecord::FlatAssignmentV1(_) => SHAPE_FLAT_V1,
            LegacyRecord::TrameAffectationV2(_) => SHAPE_TRAME_V2,
        }
    }
}

pub const SHAPE_FLAT_V1: &str = "FLAT_ASSIGNMENT_V1";
pub const SHAPE_TRAME_V2: &str = "TRAME_AFFECTATION_V2";

/// 扁平形态: 模板字段冗余在每条时段记录上
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatAssignmentV1 {
    pub trame_id: String,
    #[serde(default)]
    pub trame_name: String,
    pub trame_description: Option<String>,
    pub is_active: Option<bool>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub site_id: Option<String>,
    pub assignment_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub type_code: Option<String>,
    pub room_id: Option<RoomId>,
    pub day_of_week: Option<String>,
    pub period: Option<String>,
    pub week_type: Option<String>,
    #[serde(default)]
    pub posts: Vec<LegacyPost>,
}

/// 嵌套形态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrameAffectationV2 {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub site_id: Option<String>,
    pub recurrence_type: Option<String>,
    pub jours_semaine_actifs: Option<Vec<u32>>,
    pub type_semaine: Option<String>,
    #[serde(default)]
    pub periods: Vec<LegacyPeriodV2>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPeriodV2 {
    pub name: Option<String>,
    #[serde(default)]
    pub assignments: Vec<LegacyAssignmentV2>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyAssignmentV2 {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub type_code: Option<String>,
    pub room_id: Option<RoomId>,
    pub day_of_week: Option<String>,
    pub period: Option<String>,
    pub week_type: Option<String>,
    #[serde(default)]
    pub posts: Vec<LegacyPost>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPost {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub role: Option<String>,
    pub max_count: Option<u32>,
}

// ==========================================
// 统一中间形态
// ==========================================

/// 一个旧模板 (转换前)
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyTemplate {
    pub shape: &'static str,
    pub original_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub site_id: Option<String>,
    pub recurrence_type: Option<String>,
    pub jours_semaine_actifs: Option<Vec<u32>>,
    pub week_type: Option<String>,
    pub assignments: Vec<LegacyAssignment>,
}

/// 一个旧时段 (转换前)
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyAssignment {
    pub original_id: String,
    pub name: String,
    pub type_code: Option<String>,
    pub room_id: Option<RoomId>,
    pub day_of_week: Option<String>,
    pub period: Option<String>,
    pub week_type: Option<String>,
    pub posts: Vec<LegacyPost>,
    pub raw: Value,
}

/// 将原始记录归并为模板列表 (保持首次出现的顺序)
///
/// V1 记录按 trameId 分组；同一模板内 assignmentId 重复的记录合并岗位
pub fn normalize(records: Vec<LegacyRecord>) -> Vec<LegacyTemplate> {
    let mut templates: Vec<LegacyTemplate> = Vec::new();
    for record in records {
        match record {
            LegacyRecord::FlatAssignmentV1(flat) => merge_flat_v1(&mut templates, flat),
            LegacyRecord::TrameAffectationV2(trame) => templates.push(convert_trame_v2(trame)),
        }
    }
    templates
}

fn merge_flat_v1(templates: &mut Vec<LegacyTemplate>, flat: FlatAssignmentV1) {
    let raw = serde_json::to_value(&flat).unwrap_or(Value::Null);
    let assignment = LegacyAssignment {
        original_id: flat.assignment_id,
        name: flat.name,
        type_code: flat.type_code,
        room_id: flat.room_id,
        day_of_week: flat.day_of_week,
        period: flat.period,
        week_type: flat.week_type,
        posts: flat.posts,
        raw,
    };

    let existing = templates
        .iter_mut()
        .find(|t| t.shape == SHAPE_FLAT_V1 && t.original_id == flat.trame_id);
    match existing {
        Some(template) => {
            match template
                .assignments
                .iter_mut()
                .find(|a| a.original_id == assignment.original_id)
            {
                Some(a) => a.posts.extend(assignment.posts),
                None => template.assignments.push(assignment),
            }
        }
        None => templates.push(LegacyTemplate {
            shape: SHAPE_FLAT_V1,
            original_id: flat.trame_id,
            name: flat.trame_name,
            description: flat.trame_description,
            is_active: flat.is_active,
            start_date: flat.start_date,
            end_date: flat.end_date,
            site_id: flat.site_id,
            recurrence_type: None,
            jours_semaine_actifs: None,
            week_type: None,
            assignments: vec![assignment],
        }),
    }
}

fn convert_trame_v2(trame: TrameAffectationV2) -> LegacyTemplate {
    let assignments = trame
        .periods
        .into_iter()
        .flat_map(|p| p.assignments)
        .map(|a| {
            let raw = serde_json::to_value(&a).unwrap_or(Value::Null);
            LegacyAssignment {
                original_id: a.id,
                name: a.name,
                type_code: a.type_code,
                room_id: a.room_id,
                day_of_week: a.day_of_week,
                period: a.period,
                week_type: a.week_type,
                posts: a.posts,
                raw,
            }
        })
        .collect();

    LegacyTemplate {
        shape: SHAPE_TRAME_V2,
        original_id: trame.id,
        name: trame.name,
        description: trame.description,
        is_active: trame.is_active,
        start_date: trame.start_date,
        end_date: trame.end_date,
        site_id: trame.site_id,
        recurrence_type: trame.recurrence_type,
        jours_semaine_actifs: trame.jours_semaine_actifs,
        week_type: trame.type_semaine,
        assignments,
    }
}

// ==========================================
// 转换为新模型
// ==========================================

impl LegacyTemplate {
    /// 模板头 (不含时段)；默认值写入 warnings
    pub fn to_trame_header(
        &self,
        defaults: &MigrationDefaults,
        now: NaiveDateTime,
        warnings: &mut Vec<String>,
    ) -> TrameModele {
        let prefix = format!("[模板 {}]", self.original_id);

        let date_debut_effet = self.start_date.unwrap_or_else(|| {
            warnings.push(format!("{} 缺少开始日期，使用迁移日期 {}", prefix, now.date()));
            now.date()
        });

        let recurrence_type = match self.recurrence_type.as_deref() {
            None => RecurrenceType::Weekly,
            Some(raw) => RecurrenceType::from_str(raw).unwrap_or_else(|| {
                warnings.push(format!("{} 重复类型 {} 无法识别，按每周处理", prefix, raw));
                RecurrenceType::Weekly
            }),
        };

        let jours_semaine_actifs = match &self.jours_semaine_actifs {
            None => defaults.weekdays.clone(),
            Some(days) => {
                let valid: BTreeSet<u32> = days.iter().copied().filter(|d| (1..=7).contains(d)).collect();
                if valid.len() != days.len() || valid.is_empty() {
                    warnings.push(format!("{} 工作日列表 {:?} 含非法值", prefix, days));
                }
                if valid.is_empty() {
                    defaults.weekdays.clone()
                } else {
                    valid
                }
            }
        };

        let week_type = match self.week_type.as_deref() {
            None => WeekType::All,
            Some(raw) => WeekType::from_str(raw).unwrap_or_else(|| {
                warnings.push(format!("{} 周类型 {} 无法识别，按每周处理", prefix, raw));
                WeekType::All
            }),
        };

        TrameModele {
            trame_modele_id: 0,
            name: self.name.trim().to_string(),
            description: self.description.clone(),
            site_id: self.site_id.clone(),
            is_active: self.is_active.unwrap_or(true),
            date_debut_effet,
            date_fin_effet: self.end_date,
            recurrence_type,
            jours_semaine_actifs,
            week_type,
            provenance: None,
            affectations: Vec::new(),
        }
    }
}

impl LegacyAssignment {
    /// 转换为模板时段；活动类型由调用方解析
    pub fn to_affectation(
        &self,
        activity_type_id: &str,
        defaults: &MigrationDefaults,
        warnings: &mut Vec<String>,
    ) -> AffectationModele {
        let prefix = format!("[时段 {}]", self.original_id);

        let jour_semaine = match self.day_of_week.as_deref().map(|d| (d, parse_weekday(d))) {
            Some((_, Some(day))) => day,
            Some((raw, None)) => {
                warnings.push(format!("{} 星期 {} 无法识别，按周一处理", prefix, raw));
                Weekday::Mon
            }
            None => {
                warnings.push(format!("{} 缺少星期，按周一处理", prefix));
                Weekday::Mon
            }
        };

        let periode = match self.period.as_deref().map(|p| (p, Period::from_str(p))) {
            Some((_, Some(period))) => period,
            Some((raw, None)) => {
                warnings.push(format!("{} 时段 {} 无法识别，按上午处理", prefix, raw));
                Period::Morning
            }
            None => {
                warnings.push(format!("{} 缺少时段，按上午处理", prefix));
                Period::Morning
            }
        };

        let week_type = match self.week_type.as_deref() {
            None => None,
            Some(raw) => match WeekType::from_str(raw) {
                Some(w) => Some(w),
                None => {
                    warnings.push(format!("{} 周类型 {} 无法识别，继承模板设置", prefix, raw));
                    None
                }
            },
        };

        let personnel_requis = self
            .posts
            .iter()
            .map(|post| post.to_personnel_requis(&prefix, warnings))
            .collect();

        AffectationModele {
            affectation_modele_id: 0,
            activity_type_id: activity_type_id.to_string(),
            room_id: self.room_id,
            jour_semaine,
            periode,
            week_type,
            priorite: defaults.priority,
            is_active: true,
            details_json: Some(self.raw.clone()),
            personnel_requis,
        }
    }
}

impl LegacyPost {
    fn to_personnel_requis(&self, prefix: &str, warnings: &mut Vec<String>) -> PersonnelRequisModele {
        let role_generique = match self.role.as_deref().map(|r| (r, StaffRole::from_str(r))) {
            Some((_, Some(role))) => role,
            Some((raw, None)) => {
                warnings.push(format!("{} 岗位角色 {} 无法识别，按 MAR 处理", prefix, raw));
                StaffRole::Mar
            }
            None => {
                warnings.push(format!("{} 岗位缺少角色，按 MAR 处理", prefix));
                StaffRole::Mar
            }
        };
        let nombre_requis = match self.max_count {
            Some(n) if n > 0 => n,
            _ => 1,
        };
        PersonnelRequisModele {
            personnel_requis_id: 0,
            role_generique,
            nombre_requis,
            notes: self.name.as_ref().map(|n| format!("迁移自岗位 {}", n)),
        }
    }
}
