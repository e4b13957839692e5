// ==========================================
// 手术室排班核心 - 日排班聚合领域模型
// ==========================================
// 聚合根: DayPlanning (站点 + 日期唯一)
// 所有编辑经由 engine::day_planning，仓储只负责持久化
// ==========================================

use crate::domain::sector::RoomId;
use crate::domain::types::{
    AssignmentSource, ConflictRule, Period, PlanningStatus, Severity, StaffRole,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// DayPlanning - 日排班
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlanning {
    pub planning_id: String,
    pub site_id: String,
    pub plan_date: NaiveDate,
    pub status: PlanningStatus,
    pub room_assignments: Vec<RoomAssignment>, // 有序
    pub conflicts: Vec<Conflict>,
    pub revision: i32, // 乐观锁：版本修订号
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub validated_by: Option<String>,
    pub validated_at: Option<NaiveDateTime>,
}

impl DayPlanning {
    /// 创建新的草稿日排班
    pub fn new_draft(site_id: &str, plan_date: NaiveDate, now: NaiveDateTime) -> Self {
        Self {
            planning_id: uuid::Uuid::new_v4().to_string(),
            site_id: site_id.to_string(),
            plan_date,
            status: PlanningStatus::Draft,
            room_assignments: Vec::new(),
            conflicts: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
            validated_by: None,
            validated_at: None,
        }
    }

    pub fn find_assignment(&self, assignment_id: &str) -> Option<&RoomAssignment> {
        self.room_assignments
            .iter()
            .find(|ra| ra.assignment_id == assignment_id)
    }

    pub fn find_assignment_mut(&mut self, assignment_id: &str) -> Option<&mut RoomAssignment> {
        self.room_assignments
            .iter_mut()
            .find(|ra| ra.assignment_id == assignment_id)
    }

    /// 同一手术室、时段重叠的既有排班
    pub fn assignment_overlapping(&self, room_id: RoomId, period: Period) -> Option<&RoomAssignment> {
        self.room_assignments
            .iter()
            .find(|ra| ra.room_id == room_id && ra.period.overlaps(period))
    }

    /// 未解决的 ERROR 级冲突数
    pub fn unresolved_error_count(&self) -> usize {
        self.unresolved_count(Severity::Error)
    }

    pub fn unresolved_count(&self, severity: Severity) -> usize {
        self.conflicts
            .iter()
            .filter(|c| !c.is_resolved && c.severity == severity)
            .count()
    }
}

// ==========================================
// RoomAssignment - 手术室排班
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomAssignment {
    pub assignment_id: String,
    pub planning_id: String,
    pub room_id: RoomId,
    pub period: Period,
    pub surgeon_id: Option<String>,
    pub source: AssignmentSource,
    pub trame_modele_id: Option<i64>,     // 来源模板 (仅 TEMPLATE)
    pub affectation_modele_id: Option<i64>,
    pub activity_type_id: Option<String>,
    pub staff: Vec<StaffAssignment>,
    pub staffing_requirements: Vec<StaffingRequirement>,
}

impl RoomAssignment {
    /// 指定角色的已排人数
    pub fn staff_count(&self, role: StaffRole) -> u32 {
        self.staff.iter().filter(|s| s.role == role).count() as u32
    }

    /// 模板展开的幂等键 (trameModeleId, roomId, period)，日期由所属日排班决定
    pub fn template_key(&self) -> Option<(i64, RoomId, Period)> {
        self.trame_modele_id.map(|t| (t, self.room_id, self.period))
    }
}

// ==========================================
// StaffAssignment - 人员排班
// ==========================================
// 不变量: 同一手术室排班内每种角色至多一名主责人员
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffAssignment {
    pub staff_assignment_id: String,
    pub staff_id: String,
    pub role: StaffRole,
    pub is_primary: bool,
}

// ==========================================
// StaffingRequirement - 人员需求占位
// ==========================================
// 模板展开生成，具体人员由独立的指派步骤补充
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffingRequirement {
    pub role: StaffRole,
    pub headcount: u32,
    pub notes: Option<String>,
}

// ==========================================
// Conflict - 冲突记录
// ==========================================
// 每次检测整体替换；人工只允许修改 is_resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub conflict_id: String,
    pub rule: ConflictRule,
    pub related_room_assignment_id: Option<String>, // None 表示全局冲突
    pub subject: Option<String>,                    // 全局冲突的主体 (人员@时段)
    pub severity: Severity,
    pub message: String,
    pub is_resolved: bool,
    pub resolved_by: Option<String>,
}

impl Conflict {
    /// 自然键: 规则 + 关联排班 + 主体
    pub fn natural_key(&self) -> ConflictKey {
        ConflictKey {
            rule: self.rule,
            related_room_assignment_id: self.related_room_assignment_id.clone(),
            subject: self.subject.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConflictKey {
    pub rule: ConflictRule,
    pub related_room_assignment_id: Option<String>,
    pub subject: Option<String>,
}
