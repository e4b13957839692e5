// ==========================================
// 手术室排班核心 - API层错误类型
// ==========================================
// 职责: 将 Repository / Engine 错误统一为调用方可理解的错误分类
// 规则违反不在此列 (以 Conflict 记录表达，不抛错)
// ==========================================

use crate::domain::types::PlanningStatus;
use crate::engine::error::EngineError;
use crate::importer::error::MigrationError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("存在未解决的阻断冲突: planning_id={planning_id}, unresolved_errors={count}")]
    UnresolvedConflicts { planning_id: String, count: usize },

    #[error("日排班已锁定: planning_id={planning_id}, status={status}")]
    PlanningLocked {
        planning_id: String,
        status: PlanningStatus,
    },

    #[error("无效的状态转换: from={from} action={action}")]
    InvalidStateTransition { from: String, action: String },

    // ==========================================
    // 并发控制错误
    // ==========================================
    /// 调用方需重新读取后重试
    #[error("并发冲突: {0}")]
    ConcurrencyConflict(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("配置读取失败: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("任务已取消")]
    Cancelled,

    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 并发控制错误
            RepositoryError::OptimisticLockFailure {
                planning_id,
                expected,
                actual,
            } => ApiError::ConcurrencyConflict(format!(
                "日排班{}已被其他用户修改（期望revision={}，实际revision={}）",
                planning_id, expected, actual
            )),
            // 同站点同日期被并发创建
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::ConcurrencyConflict(format!("唯一约束违反: {}", msg))
            }

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::ValidationError(format!("外键约束违反: {}", msg))
            }

            // 数据质量错误
            RepositoryError::FieldValueError { field, message } => {
                ApiError::DatabaseError(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::SerializationError(e) => ApiError::DatabaseError(e.to_string()),

            // 通用错误
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => ApiError::ValidationError(msg),
            EngineError::PlanningLocked {
                planning_id,
                status,
            } => ApiError::PlanningLocked {
                planning_id,
                status,
            },
            EngineError::UnresolvedConflicts { planning_id, count } => {
                ApiError::UnresolvedConflicts { planning_id, count }
            }
            EngineError::InvalidStateTransition { from, action } => {
                ApiError::InvalidStateTransition {
                    from: from.to_string(),
                    action,
                }
            }
            EngineError::Cancelled => ApiError::Cancelled,
        }
    }
}

impl From<MigrationError> for ApiError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::Repository(e) => e.into(),
            other => ApiError::ValidationError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
