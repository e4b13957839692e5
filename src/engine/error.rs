// ==========================================
// 手术室排班核心 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 规则违反 (ConstraintViolation) 不在此列，以 Conflict 记录表达
// ==========================================

use crate::domain::types::PlanningStatus;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// 输入不合法，状态未改变
    #[error("数据验证失败: {0}")]
    Validation(String),

    /// 终态日排班不接受任何变更
    #[error("日排班已锁定: planning_id={planning_id}, status={status}")]
    PlanningLocked {
        planning_id: String,
        status: PlanningStatus,
    },

    /// 存在未解决的 ERROR 级冲突，不能进入 VALIDATED
    #[error("存在未解决的阻断冲突: planning_id={planning_id}, unresolved_errors={count}")]
    UnresolvedConflicts { planning_id: String, count: usize },

    #[error("无效的状态转换: from={from} action={action}")]
    InvalidStateTransition {
        from: PlanningStatus,
        action: String,
    },

    /// 展开任务被调用方取消
    #[error("任务已取消")]
    Cancelled,
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
