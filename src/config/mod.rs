// ==========================================
// 手术室排班核心 - 配置层
// ==========================================
// 职责: 系统配置管理 + 区域规则一次性解析
// 存储: config_kv 表 / operating_sector.rules_json
// ==========================================

pub mod config_manager;
pub mod sector_rules;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, MigrationDefaults};
pub use sector_rules::{parse_sector_rules, parse_sector_rules_value};
