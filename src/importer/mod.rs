// ==========================================
// 手术室排班核心 - 旧数据迁移层
// ==========================================
// 职责: 将旧系统的周模板记录一次性迁移为 TrameModele 模型
// 支持: JSON (带形态标签) / CSV (扁平行)
// ==========================================

pub mod error;
pub mod legacy_record;
pub mod legacy_source;
pub mod trame_migrator;

// 重导出核心类型
pub use error::MigrationError;
pub use legacy_record::{normalize, LegacyRecord, LegacyTemplate};
pub use legacy_source::{load_legacy_records, LegacyFormat, LegacyInput};
pub use trame_migrator::{MigrationOptions, MigrationResult, TrameMigrator};
