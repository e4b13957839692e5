// ==========================================
// 手术室排班核心 - 核心库
// ==========================================
// 范围: 日排班校验、冲突检测、状态流转、周模板展开、旧模板迁移
// 技术栈: Rust + SQLite
// 系统定位: 决策支持 (冲突只提示，审核由人完成)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 迁移层 - 旧模板数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AssignmentSource, ConflictRule, Period, PlanningStatus, RecurrenceType, Severity, StaffRole,
    WeekType,
};

// 领域实体
pub use domain::{
    Conflict, DayPlanning, OperatingRoom, OperatingSector, PlanningContext, RoomAssignment,
    SectorRules, TrameModele,
};

// 引擎
pub use engine::{
    all_connected, is_contiguous, ConflictDetector, DayPlanningEngine, ExpansionEngine, RoomGraph,
};

// API
pub use api::{DayPlanningApi, ExpansionApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "手术室排班核心";

// 默认数据库文件名
pub const DEFAULT_DB_FILE: &str = "bloc_planning.db";

/// 默认数据库路径: 用户数据目录下的 bloc-planning/，取不到时用当前目录
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("bloc-planning").join(DEFAULT_DB_FILE))
        .unwrap_or_else(|| std::path::PathBuf::from(DEFAULT_DB_FILE))
}
