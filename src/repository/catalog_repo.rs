// ==========================================
// 手术室排班核心 - 目录数据仓储
// ==========================================
// 职责: 站点 / 手术区域 / 手术室 / 活动类型
// 区域规则 rules_json 在读取时一次性解析为 SectorRules
// ==========================================

use crate::config::parse_sector_rules;
use crate::db::open_sqlite_connection;
use crate::domain::sector::{OperatingRoom, OperatingSector, PlanningContext, RoomId, SectorId, Site};
use crate::domain::trame::ActivityType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct CatalogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CatalogRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 站点
    // ==========================================

    pub fn insert_site(&self, site: &Site) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO site (site_id, name) VALUES (?1, ?2)",
            params![&site.site_id, &site.name],
        )?;
        Ok(())
    }

    pub fn find_site(&self, site_id: &str) -> RepositoryResult<Option<Site>> {
        let conn = self.get_conn()?;
        let site = conn
            .query_row(
                "SELECT site_id, name FROM site WHERE site_id = ?1",
                params![site_id],
                |row| {
                    Ok(Site {
                        site_id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(site)
    }

    pub fn count_sites(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM site", [], |row| row.get(0))?)
    }

    // ==========================================
    // 手术区域 / 手术室
    // ==========================================

    /// 新增或覆盖区域 (规则以 JSON 存储)
    pub fn upsert_sector(&self, sector: &OperatingSector) -> RepositoryResult<()> {
        let rules_json = serde_json::to_string(&sector.rules)?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO operating_sector (sector_id, site_id, name, color, rules_json)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(sector_id) DO UPDATE SET
                site_id = excluded.site_id,
                name = excluded.name,
                color = excluded.color,
                rules_json = excluded.rules_json
            "#,
            params![
                sector.sector_id,
                &sector.site_id,
                &sector.name,
                &sector.color,
                rules_json
            ],
        )?;
        Ok(())
    }

    /// 直接写入原始规则 JSON (外部管理界面维护的数据可能不规范)
    pub fn update_sector_rules_json(
        &self,
        sector_id: SectorId,
        rules_json: Option<&str>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE operating_sector SET rules_json = ?1 WHERE sector_id = ?2",
            params![rules_json, sector_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "OperatingSector".to_string(),
                id: sector_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn list_sectors(&self, site_id: &str) -> RepositoryResult<Vec<OperatingSector>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT sector_id, site_id, name, color, rules_json
                 FROM operating_sector WHERE site_id = ?1 ORDER BY sector_id"#,
        )?;
        let sectors = stmt
            .query_map(params![site_id], |row| {
                let sector_id: SectorId = row.get(0)?;
                let rules_json: Option<String> = row.get(4)?;
                Ok(OperatingSector {
                    sector_id,
                    site_id: row.get(1)?,
                    name: row.get(2)?,
                    color: row.get(3)?,
                    rules: parse_sector_rules(rules_json.as_deref(), sector_id),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sectors)
    }

    pub fn insert_room(&self, room: &OperatingRoom) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO operating_room (room_id, site_id, name, sector_id, is_active)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                room.room_id,
                &room.site_id,
                &room.name,
                room.sector_id,
                room.is_active
            ],
        )?;
        Ok(())
    }

    pub fn set_room_active(&self, room_id: RoomId, is_active: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE operating_room SET is_active = ?1 WHERE room_id = ?2",
            params![is_active, room_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "OperatingRoom".to_string(),
                id: room_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn list_rooms(&self, site_id: &str) -> RepositoryResult<Vec<OperatingRoom>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT room_id, site_id, name, sector_id, is_active
                 FROM operating_room WHERE site_id = ?1 ORDER BY room_id"#,
        )?;
        let rooms = stmt
            .query_map(params![site_id], map_room)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rooms)
    }

    /// 全部手术室 (含其他站点，用于识别跨站点引用)
    pub fn list_all_rooms(&self) -> RepositoryResult<Vec<OperatingRoom>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT room_id, site_id, name, sector_id, is_active FROM operating_room ORDER BY room_id",
        )?;
        let rooms = stmt
            .query_map([], map_room)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rooms)
    }

    pub fn count_rooms(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM operating_room", [], |row| row.get(0))?)
    }

    /// 冲突检测与展开所需的目录快照
    ///
    /// 手术室包含所有站点，站点归属由调用方判断；区域仅加载本站点
    pub fn load_planning_context(&self, site_id: &str) -> RepositoryResult<PlanningContext> {
        let rooms = self.list_all_rooms()?;
        let sectors = self.list_sectors(site_id)?;
        Ok(PlanningContext::new(rooms, sectors))
    }

    // ==========================================
    // 活动类型
    // ==========================================

    pub fn insert_activity_type(&self, activity: &ActivityType) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        insert_activity_with(&conn, activity)
    }

    pub fn list_activity_types(&self) -> RepositoryResult<Vec<ActivityType>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY activity_type_id", SELECT_ACTIVITY))?;
        let items = stmt
            .query_map([], map_activity)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn count_activity_types(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM activity_type", [], |row| row.get(0))?)
    }

    pub fn find_activity_type_by_code(&self, code: &str) -> RepositoryResult<Option<ActivityType>> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                &format!("{} WHERE code = ?1", SELECT_ACTIVITY),
                params![code],
                map_activity,
            )
            .optional()?;
        Ok(found)
    }

    /// 名称包含 (不区分大小写) 或编码完全一致；多条命中时取 ID 最小者
    pub fn find_activity_type_by_name_or_code(
        &self,
        name: &str,
        code: Option<&str>,
    ) -> RepositoryResult<Option<ActivityType>> {
        let name = name.trim();
        let code = code.map(str::trim).filter(|c| !c.is_empty());
        if name.is_empty() && code.is_none() {
            return Ok(None);
        }
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                &format!(
                    "{} WHERE (?1 <> '' AND instr(lower(name), lower(?1)) > 0) OR code = ?2 \
                     ORDER BY activity_type_id LIMIT 1",
                    SELECT_ACTIVITY
                ),
                params![name, code],
                map_activity,
            )
            .optional()?;
        Ok(found)
    }
}

const SELECT_ACTIVITY: &str =
    "SELECT activity_type_id, code, name, category, description FROM activity_type";

/// 在调用方持有的连接 (或事务) 上写入活动类型
pub(crate) fn insert_activity_with(conn: &Connection, activity: &ActivityType) -> RepositoryResult<()> {
    conn.execute(
        r#"INSERT INTO activity_type (activity_type_id, code, name, category, description)
           VALUES (?1, ?2, ?3, ?4, ?5)"#,
        params![
            &activity.activity_type_id,
            &activity.code,
            &activity.name,
            &activity.category,
            &activity.description
        ],
    )?;
    Ok(())
}

fn map_activity(row: &rusqlite::Row) -> rusqlite::Result<ActivityType> {
    Ok(ActivityType {
        activity_type_id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        description: row.get(4)?,
    })
}

fn map_room(row: &rusqlite::Row) -> rusqlite::Result<OperatingRoom> {
    Ok(OperatingRoom {
        room_id: row.get(0)?,
        site_id: row.get(1)?,
        name: row.get(2)?,
        sector_id: row.get(3)?,
        is_active: row.get(4)?,
    })
}
