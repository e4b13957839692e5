// ==========================================
// 手术室排班核心 - 周模板 (Trame Modèle) 领域模型
// ==========================================
// TrameModele -> AffectationModele -> PersonnelRequisModele
// ==========================================

use crate::domain::sector::RoomId;
use crate::domain::types::{Period, RecurrenceType, StaffRole, WeekType};
use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// ActivityType - 活动类型目录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityType {
    pub activity_type_id: String,
    pub code: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
}

impl ActivityType {
    /// 迁移时自动生成的活动类型
    pub fn is_synthetic(&self) -> bool {
        self.code.starts_with("MIGRATED_")
    }
}

// ==========================================
// MigrationProvenance - 迁移溯源
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProvenance {
    pub migrated_from: String,
    pub original_id: String,
    pub migration_date: NaiveDateTime,
}

// ==========================================
// TrameModele - 周模板
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrameModele {
    pub trame_modele_id: i64, // 新建时为 0，由仓储分配
    pub name: String,
    pub description: Option<String>,
    pub site_id: Option<String>,
    pub is_active: bool,
    pub date_debut_effet: NaiveDate,
    pub date_fin_effet: Option<NaiveDate>, // None 表示无截止
    pub recurrence_type: RecurrenceType,
    pub jours_semaine_actifs: BTreeSet<u32>, // ISO 序号 1..7
    pub week_type: WeekType,
    pub provenance: Option<MigrationProvenance>,
    pub affectations: Vec<AffectationModele>,
}

impl TrameModele {
    /// 日期是否在生效区间内 (含首尾)
    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        date >= self.date_debut_effet && self.date_fin_effet.map_or(true, |end| date <= end)
    }

    pub fn is_weekday_active(&self, weekday: Weekday) -> bool {
        self.jours_semaine_actifs
            .contains(&weekday.number_from_monday())
    }
}

// ==========================================
// AffectationModele - 模板时段条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectationModele {
    pub affectation_modele_id: i64,
    pub activity_type_id: String,
    pub room_id: Option<RoomId>, // 迁移数据可能没有手术室
    pub jour_semaine: Weekday,
    pub periode: Period,
    pub week_type: Option<WeekType>, // 覆盖模板的周类型，仅作用于本条目
    pub priorite: i32,
    pub is_active: bool,
    pub details_json: Option<serde_json::Value>,
    pub personnel_requis: Vec<PersonnelRequisModele>,
}

impl AffectationModele {
    /// 生效周类型: 自身覆盖优先，否则继承模板
    pub fn effective_week_type(&self, inherited: WeekType) -> WeekType {
        self.week_type.unwrap_or(inherited)
    }
}

// ==========================================
// PersonnelRequisModele - 人员需求
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonnelRequisModele {
    pub personnel_requis_id: i64,
    pub role_generique: StaffRole,
    pub nombre_requis: u32,
    pub notes: Option<String>,
}
