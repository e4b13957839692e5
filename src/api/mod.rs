// ==========================================
// 手术室排班核心 - API 层
// ==========================================
// 职责: 面向调用方 (界面/批处理) 的业务接口
// ==========================================

pub mod error;
pub mod expansion_api;
pub mod planning_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use expansion_api::{ExpansionApi, ExpansionRequest};
pub use planning_api::{DayPlanningApi, DayPlanningView, EditResponse};
