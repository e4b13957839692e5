// ==========================================
// 手术室排班核心 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供幂等的建表入口 (CREATE TABLE IF NOT EXISTS)
// ==========================================

use anyhow::{bail, Context};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 以只读方式打开已存在的数据库；文件不存在时报错且不会创建
pub fn open_sqlite_connection_read_only(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 命令行工具的数据库入口
///
/// - read_only (dry-run): 文件与 schema 必须已存在，不建目录、不建表、不写入
/// - 否则: 按需创建目录与文件，并执行幂等建表
pub fn open_database(db_path: &Path, read_only: bool) -> anyhow::Result<Connection> {
    let display = db_path.display().to_string();
    if read_only {
        if !db_path.is_file() {
            bail!("数据库不存在: {}（dry-run 不会创建数据库）", display);
        }
        let conn = open_sqlite_connection_read_only(&db_path.to_string_lossy())
            .with_context(|| format!("无法以只读方式打开数据库: {}", display))?;
        if read_schema_version(&conn)?.is_none() {
            bail!("数据库尚未初始化: {}（dry-run 不会建表）", display);
        }
        return Ok(conn);
    }

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("无法创建数据库目录: {}", parent.display()))?;
    }
    let conn = open_sqlite_connection(&db_path.to_string_lossy())
        .with_context(|| format!("无法打开数据库: {}", display))?;
    init_schema(&conn).context("数据库 schema 初始化失败")?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化数据库 schema（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    if let Some(v) = read_schema_version(conn)? {
        if v > CURRENT_SCHEMA_VERSION {
            tracing::warn!(
                found = v,
                expected = CURRENT_SCHEMA_VERSION,
                "数据库 schema 版本高于当前程序"
            );
        }
    }
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ===== 配置 =====
CREATE TABLE IF NOT EXISTS config_scope (
    scope_id TEXT PRIMARY KEY,
    scope_type TEXT NOT NULL,
    scope_key TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(scope_type, scope_key)
);
INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
VALUES ('global', 'GLOBAL', 'global');

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

-- ===== 设施目录 (外部子系统投影) =====
CREATE TABLE IF NOT EXISTS site (
    site_id TEXT PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS operating_sector (
    sector_id INTEGER PRIMARY KEY,
    site_id TEXT NOT NULL REFERENCES site(site_id),
    name TEXT NOT NULL,
    color TEXT,
    rules_json TEXT
);

CREATE TABLE IF NOT EXISTS operating_room (
    room_id INTEGER PRIMARY KEY,
    site_id TEXT NOT NULL REFERENCES site(site_id),
    name TEXT NOT NULL,
    sector_id INTEGER REFERENCES operating_sector(sector_id),
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS activity_type (
    activity_type_id TEXT PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    description TEXT
);

-- ===== 日排班聚合 =====
CREATE TABLE IF NOT EXISTS day_planning (
    planning_id TEXT PRIMARY KEY,
    site_id TEXT NOT NULL REFERENCES site(site_id),
    plan_date TEXT NOT NULL,
    status TEXT NOT NULL,
    revision INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    validated_by TEXT,
    validated_at TEXT,
    UNIQUE(site_id, plan_date)
);

CREATE TABLE IF NOT EXISTS room_assignment (
    assignment_id TEXT PRIMARY KEY,
    planning_id TEXT NOT NULL REFERENCES day_planning(planning_id) ON DELETE CASCADE,
    seq_no INTEGER NOT NULL,
    room_id INTEGER NOT NULL REFERENCES operating_room(room_id),
    period TEXT NOT NULL,
    surgeon_id TEXT,
    source TEXT NOT NULL,
    trame_modele_id INTEGER,
    affectation_modele_id INTEGER,
    activity_type_id TEXT
);
CREATE INDEX IF NOT EXISTS idx_room_assignment_planning ON room_assignment(planning_id);

CREATE TABLE IF NOT EXISTS staff_assignment (
    staff_assignment_id TEXT PRIMARY KEY,
    assignment_id TEXT NOT NULL REFERENCES room_assignment(assignment_id) ON DELETE CASCADE,
    seq_no INTEGER NOT NULL,
    staff_id TEXT NOT NULL,
    role TEXT NOT NULL,
    is_primary INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS staffing_requirement (
    assignment_id TEXT NOT NULL REFERENCES room_assignment(assignment_id) ON DELETE CASCADE,
    seq_no INTEGER NOT NULL,
    role TEXT NOT NULL,
    headcount INTEGER NOT NULL,
    notes TEXT,
    PRIMARY KEY (assignment_id, seq_no)
);

CREATE TABLE IF NOT EXISTS planning_conflict (
    conflict_id TEXT PRIMARY KEY,
    planning_id TEXT NOT NULL REFERENCES day_planning(planning_id) ON DELETE CASCADE,
    seq_no INTEGER NOT NULL,
    rule TEXT NOT NULL,
    related_room_assignment_id TEXT,
    subject TEXT,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    is_resolved INTEGER NOT NULL DEFAULT 0,
    resolved_by TEXT
);

-- ===== 周模板 =====
CREATE TABLE IF NOT EXISTS trame_modele (
    trame_modele_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    site_id TEXT REFERENCES site(site_id),
    is_active INTEGER NOT NULL DEFAULT 1,
    date_debut_effet TEXT NOT NULL,
    date_fin_effet TEXT,
    recurrence_type TEXT NOT NULL,
    jours_semaine_actifs TEXT NOT NULL,
    week_type TEXT NOT NULL,
    migrated_from TEXT,
    original_id TEXT,
    migration_date TEXT
);
CREATE INDEX IF NOT EXISTS idx_trame_modele_original ON trame_modele(migrated_from, original_id);

CREATE TABLE IF NOT EXISTS affectation_modele (
    affectation_modele_id INTEGER PRIMARY KEY AUTOINCREMENT,
    trame_modele_id INTEGER NOT NULL REFERENCES trame_modele(trame_modele_id) ON DELETE CASCADE,
    activity_type_id TEXT NOT NULL REFERENCES activity_type(activity_type_id),
    room_id INTEGER,
    jour_semaine INTEGER NOT NULL,
    periode TEXT NOT NULL,
    week_type TEXT,
    priorite INTEGER NOT NULL DEFAULT 5,
    is_active INTEGER NOT NULL DEFAULT 1,
    details_json TEXT
);

CREATE TABLE IF NOT EXISTS personnel_requis_modele (
    personnel_requis_id INTEGER PRIMARY KEY AUTOINCREMENT,
    affectation_modele_id INTEGER NOT NULL REFERENCES affectation_modele(affectation_modele_id) ON DELETE CASCADE,
    role_generique TEXT NOT NULL,
    nombre_requis INTEGER NOT NULL DEFAULT 1,
    notes TEXT
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_read_only_open_never_creates_or_writes() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nested").join("planning.db");
        assert!(open_database(&missing, true).is_err());
        assert!(!missing.exists());
        assert!(!missing.parent().unwrap().exists());

        let empty = tempfile::NamedTempFile::new().unwrap();
        assert!(open_database(empty.path(), true).is_err());
        assert_eq!(std::fs::metadata(empty.path()).unwrap().len(), 0);

        let conn = open_database(&missing, false).unwrap();
        drop(conn);
        assert!(missing.is_file());
        let before = std::fs::read(&missing).unwrap();

        let conn = open_database(&missing, true).unwrap();
        assert!(conn
            .execute("INSERT INTO site (site_id, name) VALUES ('S', 'S')", [])
            .is_err());
        drop(conn);
        assert_eq!(std::fs::read(&missing).unwrap(), before);
    }
}
