// ==========================================
// 手术室排班核心 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod planning;
pub mod sector;
pub mod trame;
pub mod types;

// 重导出核心类型
pub use planning::{
    Conflict, ConflictKey, DayPlanning, RoomAssignment, StaffAssignment, StaffingRequirement,
};
pub use sector::{
    ContiguityMap, OperatingRoom, OperatingSector, PlanningContext, RoomId, SectorId,
    SectorRules, Site,
};
pub use trame::{
    ActivityType, AffectationModele, MigrationProvenance, PersonnelRequisModele, TrameModele,
};
pub use types::{
    AssignmentSource, ConflictRule, Period, PlanningStatus, RecurrenceType, Severity, StaffRole,
    WeekType,
};
