// ==========================================
// 手术室排班核心 - 周模板数据仓储
// ==========================================
// 职责: trame_modele / affectation_modele / personnel_requis_modele
// 写入: 模板及其子项在同一事务内插入，ID 由数据库分配
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::trame::{
    ActivityType, AffectationModele, MigrationProvenance, PersonnelRequisModele, TrameModele,
};
use crate::domain::types::{weekday_from_iso, Period, RecurrenceType, StaffRole, WeekType};
use crate::repository::catalog_repo::insert_activity_with;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{
    fmt_date, fmt_datetime, parse_date, parse_datetime, parse_enum, parse_json,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct TrameRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TrameRepository {
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
    // 写入
    // ==========================================

    /// 插入模板及全部子项，回填数据库分配的 ID
    pub fn insert(&self, trame: &mut TrameModele) -> RepositoryResult<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        insert_in_tx(&tx, trame)?;
        tx.commit()?;
        Ok(trame.trame_modele_id)
    }

    /// 写入一个迁移模板: 新建的合成活动类型、旧副本删除 (replace) 与模板插入同属一个事务
    ///
    /// 任一步失败整体回滚，不留下孤立的活动类型；返回被删除的旧模板数
    pub fn save_migrated(
        &self,
        trame: &mut TrameModele,
        new_activity_types: &[ActivityType],
        replace: bool,
    ) -> RepositoryResult<usize> {
        let Some(provenance) = trame.provenance.clone() else {
            return Err(RepositoryError::field("provenance", "missing"));
        };
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for activity in new_activity_types {
            insert_activity_with(&tx, activity)?;
        }
        let removed = if replace {
            tx.execute(
                "DELETE FROM trame_modele WHERE migrated_from = ?1 AND original_id = ?2",
                params![&provenance.migrated_from, &provenance.original_id],
            )?
        } else {
            0
        };
        insert_in_tx(&tx, trame)?;
        tx.commit()?;
        if removed > 0 {
            info!(
                original_id = %provenance.original_id,
                removed,
                trame_modele_id = trame.trame_modele_id,
                "已替换迁移模板"
            );
        }
        Ok(removed)
    }

    pub fn delete(&self, trame_modele_id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM trame_modele WHERE trame_modele_id = ?1",
            params![trame_modele_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "TrameModele".to_string(),
                id: trame_modele_id.to_string(),
            });
        }
        Ok(())
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn find_by_id(&self, trame_modele_id: i64) -> RepositoryResult<Option<TrameModele>> {
        let conn = self.get_conn()?;
        let trame = conn
            .query_row(
                &format!("{} WHERE trame_modele_id = ?1", SELECT_TRAME),
                params![trame_modele_id],
                map_trame,
            )
            .optional()?;
        match trame {
            Some(t) => Ok(Some(load_affectations(&conn, t)?)),
            None => Ok(None),
        }
    }

    /// 按迁移溯源键查找 (最早的一条)
    pub fn find_by_original_id(
        &self,
        migrated_from: &str,
        original_id: &str,
    ) -> RepositoryResult<Option<TrameModele>> {
        let conn = self.get_conn()?;
        let trame = conn
            .query_row(
                &format!(
                    "{} WHERE migrated_from = ?1 AND original_id = ?2 ORDER BY trame_modele_id LIMIT 1",
                    SELECT_TRAME
                ),
                params![migrated_from, original_id],
                map_trame,
            )
            .optional()?;
        match trame {
            Some(t) => Ok(Some(load_affectations(&conn, t)?)),
            None => Ok(None),
        }
    }

    pub fn list_ids(&self) -> RepositoryResult<Vec<i64>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT trame_modele_id FROM trame_modele ORDER BY trame_modele_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    // ==========================================
    // 统计 (迁移后校验)
    // ==========================================

    pub fn count_trames(&self) -> RepositoryResult<i64> {
        self.count("SELECT COUNT(*) FROM trame_modele")
    }

    pub fn count_affectations(&self) -> RepositoryResult<i64> {
        self.count("SELECT COUNT(*) FROM affectation_modele")
    }

    pub fn count_personnel_requis(&self) -> RepositoryResult<i64> {
        self.count("SELECT COUNT(*) FROM personnel_requis_modele")
    }

    /// 指向不存在模板的条目数 (外键关闭时写入的脏数据)
    pub fn count_orphan_affectations(&self) -> RepositoryResult<i64> {
        self.count(
            r#"SELECT COUNT(*) FROM affectation_modele a
                 LEFT JOIN trame_modele t ON t.trame_modele_id = a.trame_modele_id
                WHERE t.trame_modele_id IS NULL"#,
        )
    }

    fn count(&self, sql: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row(sql, [], |row| row.get(0))?)
    }
}

// ==========================================
// 事务内写入
// ==========================================

fn insert_in_tx(tx: &Transaction, trame: &mut TrameModele) -> RepositoryResult<()> {
    let weekdays = serde_json::to_string(&trame.jours_semaine_actifs)?;
    let (migrated_from, original_id, migration_date) = match &trame.provenance {
        Some(p) => (
            Some(p.migrated_from.clone()),
            Some(p.original_id.clone()),
            Some(fmt_datetime(p.migration_date)),
        ),
        None => (None, None, None),
    };

    tx.execute(
        r#"INSERT INTO trame_modele (
            name, description, site_id, is_active, date_debut_effet, date_fin_effet,
            recurrence_type, jours_semaine_actifs, week_type,
            migrated_from, original_id, migration_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
        params![
            &trame.name,
            &trame.description,
            &trame.site_id,
            trame.is_active,
            fmt_date(trame.date_debut_effet),
            trame.date_fin_effet.map(fmt_date),
            trame.recurrence_type.to_db_str(),
            weekdays,
            trame.week_type.to_db_str(),
            migrated_from,
            original_id,
            migration_date,
        ],
    )?;
    trame.trame_modele_id = tx.last_insert_rowid();

    for aff in trame.affectations.iter_mut() {
        let details = aff
            .details_json
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        tx.execute(
            r#"INSERT INTO affectation_modele (
                trame_modele_id, activity_type_id, room_id, jour_semaine, periode,
                week_type, priorite, is_active, details_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                trame.trame_modele_id,
                &aff.activity_type_id,
                aff.room_id,
                aff.jour_semaine.number_from_monday(),
                aff.periode.to_db_str(),
                aff.week_type.map(|w| w.to_db_str()),
                aff.priorite,
                aff.is_active,
                details,
            ],
        )?;
        aff.affectation_modele_id = tx.last_insert_rowid();

        for req in aff.personnel_requis.iter_mut() {
            tx.execute(
                r#"INSERT INTO personnel_requis_modele (
                    affectation_modele_id, role_generique, nombre_requis, notes
                ) VALUES (?1, ?2, ?3, ?4)"#,
                params![
                    aff.affectation_modele_id,
                    req.role_generique.to_db_str(),
                    req.nombre_requis,
                    &req.notes,
                ],
            )?;
            req.personnel_requis_id = tx.last_insert_rowid();
        }
    }
    Ok(())
}

// ==========================================
// 行映射
// ==========================================

const SELECT_TRAME: &str = r#"SELECT trame_modele_id, name, description, site_id, is_active,
       date_debut_effet, date_fin_effet, recurrence_type, jours_semaine_actifs, week_type,
       migrated_from, original_id, migration_date
  FROM trame_modele"#;

fn map_trame(row: &rusqlite::Row) -> rusqlite::Result<TrameModele> {
    let debut: String = row.get(5)?;
    let fin: Option<String> = row.get(6)?;
    let recurrence: String = row.get(7)?;
    let weekdays: String = row.get(8)?;
    let week_type: String = row.get(9)?;
    let migrated_from: Option<String> = row.get(10)?;
    let original_id: Option<String> = row.get(11)?;
    let migration_date: Option<String> = row.get(12)?;

    let provenance = match (migrated_from, original_id, migration_date) {
        (Some(migrated_from), Some(original_id), Some(date)) => Some(MigrationProvenance {
            migrated_from,
            original_id,
            migration_date: parse_datetime(12, &date)?,
        }),
        _ => None,
    };

    Ok(TrameModele {
        trame_modele_id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        site_id: row.get(3)?,
        is_active: row.get(4)?,
        date_debut_effet: parse_date(5, &debut)?,
        date_fin_effet: fin.map(|s| parse_date(6, &s)).transpose()?,
        recurrence_type: parse_enum(7, "recurrence_type", &recurrence, RecurrenceType::from_str)?,
        jours_semaine_actifs: parse_json::<BTreeSet<u32>>(8, &weekdays)?,
        week_type: parse_enum(9, "week_type", &week_type, WeekType::from_str)?,
        provenance,
        affectations: Vec::new(),
    })
}

fn load_affectations(conn: &Connection, mut trame: TrameModele) -> RepositoryResult<TrameModele> {
    let mut aff_stmt = conn.prepare_cached(
        r#"SELECT affectation_modele_id, activity_type_id, room_id, jour_semaine, periode,
                  week_type, priorite, is_active, details_json
             FROM affectation_modele WHERE trame_modele_id = ?1
            ORDER BY affectation_modele_id"#,
    )?;
    let mut affectations = aff_stmt
        .query_map(params![trame.trame_modele_id], |row| {
            let jour: u32 = row.get(3)?;
            let periode: String = row.get(4)?;
            let week_type: Option<String> = row.get(5)?;
            let details: Option<String> = row.get(8)?;
            let jour_semaine = weekday_from_iso(jour).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    Type::Integer,
                    Box::new(RepositoryError::field("jour_semaine", &jour.to_string())),
                )
            })?;
            Ok(AffectationModele {
                affectation_modele_id: row.get(0)?,
                activity_type_id: row.get(1)?,
                room_id: row.get(2)?,
                jour_semaine,
                periode: parse_enum(4, "periode", &periode, Period::from_str)?,
                week_type: week_type
                    .map(|w| parse_enum(5, "week_type", &w, WeekType::from_str))
                    .transpose()?,
                priorite: row.get(6)?,
                is_active: row.get(7)?,
                details_json: details.map(|d| parse_json(8, &d)).transpose()?,
                personnel_requis: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut req_stmt = conn.prepare_cached(
        r#"SELECT personnel_requis_id, role_generique, nombre_requis, notes
             FROM personnel_requis_modele WHERE affectation_modele_id = ?1
            ORDER BY personnel_requis_id"#,
    )?;
    for aff in affectations.iter_mut() {
        aff.personnel_requis = req_stmt
            .query_map(params![aff.affectation_modele_id], |row| {
                let role: String = row.get(1)?;
                Ok(PersonnelRequisModele {
                    personnel_requis_id: row.get(0)?,
                    role_generique: parse_enum(1, "role_generique", &role, StaffRole::from_str)?,
                    nombre_requis: row.get(2)?,
                    notes: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
    }

    trame.affectations = affectations;
    Ok(trame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Weekday};
    use serde_json::json;

    fn create_test_repo() -> TrameRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"INSERT INTO site (site_id, name) VALUES ('SITE1', '总院');
               INSERT INTO activity_type (activity_type_id, code, name, category)
               VALUES ('AT1', 'BLOC', 'Bloc opératoire', 'BLOC_OPERATOIRE');"#,
        )
        .unwrap();
        TrameRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn create_test_trame(original_id: &str) -> TrameModele {
        TrameModele {
            trame_modele_id: 0,
            name: "骨科周模板".to_string(),
            description: None,
            site_id: Some("SITE1".to_string()),
            is_active: true,
            date_debut_effet: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            date_fin_effet: None,
            recurrence_type: RecurrenceType::Weekly,
            jours_semaine_actifs: BTreeSet::from([1, 2, 3, 4, 5]),
            week_type: WeekType::All,
            provenance: Some(MigrationProvenance {
                migrated_from: "FLAT_ASSIGNMENT_V1".to_string(),
                original_id: original_id.to_string(),
                migration_date: NaiveDate::from_ymd_opt(2026, 1, 2)
                    .unwrap()
                    .and_hms_opt(9, 30, 0)
                    .unwrap(),
            }),
            affectations: vec![AffectationModele {
                affectation_modele_id: 0,
                activity_type_id: "AT1".to_string(),
                room_id: Some(4),
                jour_semaine: Weekday::Wed,
                periode: Period::Morning,
                week_type: Some(WeekType::Even),
                priorite: 5,
                is_active: true,
                details_json: Some(json!({"originalId": original_id})),
                personnel_requis: vec![PersonnelRequisModele {
                    personnel_requis_id: 0,
                    role_generique: StaffRole::Mar,
                    nombre_requis: 1,
                    notes: None,
                }],
            }],
        }
    }

    #[test]
    fn test_insert_assigns_ids_and_reloads() {
        let repo = create_test_repo();
        let mut trame = create_test_trame("42");
        let id = repo.insert(&mut trame).unwrap();

        assert!(id > 0);
        assert!(trame.affectations[0].affectation_modele_id > 0);
        assert!(trame.affectations[0].personnel_requis[0].personnel_requis_id > 0);

        let loaded = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(loaded, trame);

        let by_original = repo
            .find_by_original_id("FLAT_ASSIGNMENT_V1", "42")
            .unwrap()
            .unwrap();
        assert_eq!(by_original.trame_modele_id, id);
    }

    #[test]
    fn test_save_migrated_replaces_previous_copy() {
        let repo = create_test_repo();
        let mut first = create_test_trame("42");
        repo.insert(&mut first).unwrap();

        let mut second = create_test_trame("42");
        second.name = "骨科周模板 v2".to_string();
        assert_eq!(repo.save_migrated(&mut second, &[], true).unwrap(), 1);

        assert!(repo.find_by_id(first.trame_modele_id).unwrap().is_none());
        assert_eq!(repo.count_trames().unwrap(), 1);
        assert_eq!(repo.count_affectations().unwrap(), 1);
        assert_eq!(repo.count_personnel_requis().unwrap(), 1);
        assert_eq!(repo.count_orphan_affectations().unwrap(), 0);
    }

    #[test]
    fn test_failed_migrated_save_rolls_back_activity_types() {
        let repo = create_test_repo();
        let synthetic = ActivityType {
            activity_type_id: "MIGRATED_VASCU".to_string(),
            code: "MIGRATED_VASCU".to_string(),
            name: "Vasculaire".to_string(),
            category: "BLOC_OPERATOIRE".to_string(),
            description: None,
        };

        // 站点不存在，模板插入触发外键失败
        let mut broken = create_test_trame("43");
        broken.site_id = Some("NO_SUCH_SITE".to_string());
        broken.affectations[0].activity_type_id = synthetic.activity_type_id.clone();
        assert!(repo
            .save_migrated(&mut broken, std::slice::from_ref(&synthetic), false)
            .is_err());

        let conn = repo.get_conn().unwrap();
        let leftover: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM activity_type WHERE activity_type_id = 'MIGRATED_VASCU'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(leftover, 0);
        drop(conn);
        assert_eq!(repo.count_trames().unwrap(), 0);

        let mut fixed = create_test_trame("43");
        fixed.affectations[0].activity_type_id = synthetic.activity_type_id.clone();
        assert_eq!(
            repo.save_migrated(&mut fixed, std::slice::from_ref(&synthetic), false)
                .unwrap(),
            0
        );
        assert_eq!(repo.count_trames().unwrap(), 1);
    }

    #[test]
    fn test_delete_cascades() {
        let repo = create_test_repo();
        let mut trame = create_test_trame("7");
        repo.insert(&mut trame).unwrap();
        repo.delete(trame.trame_modele_id).unwrap();

        assert_eq!(repo.count_affectations().unwrap(), 0);
        assert_eq!(repo.count_personnel_requis().unwrap(), 0);
        assert!(matches!(
            repo.delete(trame.trame_modele_id),
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(repo.list_ids().unwrap().is_empty());
    }
}
