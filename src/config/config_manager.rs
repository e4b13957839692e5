// ==========================================
// 手术室排班核心 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 非法值: 记录 warn 并回退默认值
// ==========================================

use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::warn;

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    // 模板展开
    pub const EXPANSION_MAX_HORIZON_DAYS: &str = "expansion.max_horizon_days";

    // 旧数据迁移默认值
    pub const MIGRATION_DEFAULT_PRIORITY: &str = "migration.default_priority";
    pub const MIGRATION_DEFAULT_WEEKDAYS: &str = "migration.default_weekdays"; // ISO 序号，逗号分隔
    pub const MIGRATION_SYNTHETIC_CATEGORY: &str = "migration.synthetic_activity_category";
}

pub mod config_defaults {
    pub const EXPANSION_MAX_HORIZON_DAYS: i64 = 400;
    pub const MIGRATION_DEFAULT_PRIORITY: i32 = 5;
    pub const MIGRATION_DEFAULT_WEEKDAYS: &str = "1,2,3,4,5";
    pub const MIGRATION_SYNTHETIC_CATEGORY: &str = "BLOC_OPERATOIRE";
}

// ==========================================
// MigrationDefaults - 迁移默认值快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDefaults {
    pub priority: i32,
    pub weekdays: BTreeSet<u32>,
    pub synthetic_category: String,
}

impl Default for MigrationDefaults {
    fn default() -> Self {
        Self {
            priority: config_defaults::MIGRATION_DEFAULT_PRIORITY,
            weekdays: (1..=5).collect(),
            synthetic_category: config_defaults::MIGRATION_SYNTHETIC_CATEGORY.to_string(),
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值 (存在则覆盖)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES ('global', ?1, ?2, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析数值配置；缺失或非法时返回默认值
    fn get_parsed_or_default<T: FromStr + Copy + std::fmt::Display>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, Box<dyn Error>> {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    warn!(key, value = %raw, default = %default, "配置值非法，使用默认值");
                    Ok(default)
                }
            },
        }
    }

    /// 单次展开请求允许的最大天数
    pub fn get_max_horizon_days(&self) -> Result<i64, Box<dyn Error>> {
        let days = self.get_parsed_or_default(
            config_keys::EXPANSION_MAX_HORIZON_DAYS,
            config_defaults::EXPANSION_MAX_HORIZON_DAYS,
        )?;
        if days <= 0 {
            warn!(days, "展开天数上限必须为正数，使用默认值");
            return Ok(config_defaults::EXPANSION_MAX_HORIZON_DAYS);
        }
        Ok(days)
    }

    /// 迁移默认值快照
    pub fn get_migration_defaults(&self) -> Result<MigrationDefaults, Box<dyn Error>> {
        let priority = self.get_parsed_or_default(
            config_keys::MIGRATION_DEFAULT_PRIORITY,
            config_defaults::MIGRATION_DEFAULT_PRIORITY,
        )?;

        let weekdays_raw = self
            .get_config_value(config_keys::MIGRATION_DEFAULT_WEEKDAYS)?
            .unwrap_or_else(|| config_defaults::MIGRATION_DEFAULT_WEEKDAYS.to_string());
        let weekdays = match parse_weekday_list(&weekdays_raw) {
            Some(days) => days,
            None => {
                warn!(value = %weekdays_raw, "默认星期配置非法，使用周一至周五");
                MigrationDefaults::default().weekdays
            }
        };

        let synthetic_category = self
            .get_config_value(config_keys::MIGRATION_SYNTHETIC_CATEGORY)?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| config_defaults::MIGRATION_SYNTHETIC_CATEGORY.to_string());

        Ok(MigrationDefaults {
            priority,
            weekdays,
            synthetic_category,
        })
    }
}

/// 解析 "1,2,3" 形式的 ISO 星期列表；空列表或越界视为非法
pub fn parse_weekday_list(raw: &str) -> Option<BTreeSet<u32>> {
    let mut days = BTreeSet::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let n: u32 = part.parse().ok()?;
        if !(1..=7).contains(&n) {
            return None;
        }
        days.insert(n);
    }
    (!days.is_empty()).then_some(days)
}
