// ==========================================
// 手术室排班核心 - 引擎层
// ==========================================
// 职责: 实现业务规则引擎,不拼 SQL
// 依赖顺序: contiguity -> conflict -> day_planning -> expansion
// ==========================================

pub mod conflict;
pub mod contiguity;
pub mod day_planning;
pub mod error;
pub mod events;
pub mod expansion;
pub mod lifecycle;

// 重导出核心引擎
pub use conflict::{ConflictDetector, ConflictFinding, ConflictRefresh};
pub use contiguity::{all_connected, is_contiguous, RoomGraph};
pub use day_planning::{
    AssignmentEdit, DayPlanningEngine, EditOutcome, NewRoomAssignment, StatusChange,
};
pub use error::{EngineError, EngineResult};
pub use events::{
    NoOpEventPublisher, OptionalEventPublisher, PlanningEvent, PlanningEventPublisher,
    PlanningEventType,
};
pub use expansion::{
    ChunkCounts, ChunkOutcome, ChunkReport, ExpansionEngine, ExpansionOptions, ExpansionReport,
    PlanningStore,
};
pub use lifecycle::{transition, PlanningAction};
