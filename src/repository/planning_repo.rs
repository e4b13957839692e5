// ==========================================
// 手术室排班核心 - 日排班数据仓储
// ==========================================
// 并发控制: day_planning.revision 乐观锁
// 子表 (手术室排班/人员/需求/冲突) 随聚合整体替换
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::planning::{
    Conflict, DayPlanning, RoomAssignment, StaffAssignment, StaffingRequirement,
};
use crate::domain::types::{
    AssignmentSource, ConflictRule, Period, PlanningStatus, Severity, StaffRole,
};
use crate::engine::expansion::PlanningStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{fmt_date, fmt_datetime, parse_date, parse_datetime, parse_enum};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex};
use tracing::debug;

// ==========================================
// PlanningRepository - 日排班仓储
// ==========================================
pub struct PlanningRepository {
    conn: Arc<Mutex<Connection>>,
}

/// 保存结果: 新建或更新
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveKind {
    Inserted,
    Updated,
}

impl PlanningRepository {
    /// 创建新的日排班仓储实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn find_by_id(&self, planning_id: &str) -> RepositoryResult<Option<DayPlanning>> {
        let conn = self.get_conn()?;
        let header = conn
            .query_row(
                &format!("{} WHERE planning_id = ?1", SELECT_HEADER),
                params![planning_id],
                map_header,
            )
            .optional()?;
        match header {
            Some(planning) => Ok(Some(load_children(&conn, planning)?)),
            None => Ok(None),
        }
    }

    pub fn find_by_site_and_date(
        &self,
        site_id: &str,
        plan_date: NaiveDate,
    ) -> RepositoryResult<Option<DayPlanning>> {
        let conn = self.get_conn()?;
        let header = conn
            .query_row(
                &format!("{} WHERE site_id = ?1 AND plan_date = ?2", SELECT_HEADER),
                params![site_id, fmt_date(plan_date)],
                map_header,
            )
            .optional()?;
        match header {
            Some(planning) => Ok(Some(load_children(&conn, planning)?)),
            None => Ok(None),
        }
    }

    /// 站点在 [from, to] 内的日排班 (按日期升序)
    pub fn find_by_site_and_range(
        &self,
        site_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<DayPlanning>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE site_id = ?1 AND plan_date BETWEEN ?2 AND ?3 ORDER BY plan_date",
            SELECT_HEADER
        ))?;
        let headers = stmt
            .query_map(params![site_id, fmt_date(from), fmt_date(to)], map_header)?
            .collect::<Result<Vec<_>, _>>()?;

        headers
            .into_iter()
            .map(|p| load_children(&conn, p))
            .collect()
    }

    // ==========================================
    // 写入
    // ==========================================

    /// 保存日排班 (带乐观锁检查)
    ///
    /// # 并发控制
    /// - 新聚合 (库中不存在且 revision == 0) 直接插入
    /// - 已存在的聚合要求 revision 与库中一致，成功后 revision + 1
    /// - 写事务以 IMMEDIATE 开启，锁等待由 busy_timeout 控制
    ///
    /// # 错误
    /// - `RepositoryError::OptimisticLockFailure`: revision 不匹配
    /// - `RepositoryError::NotFound`: revision > 0 但记录已删除
    /// - `RepositoryError::UniqueConstraintViolation`: 同站点同日期已被并发创建
    pub fn save(&self, planning: &mut DayPlanning) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let kind = save_in_tx(&tx, planning)?;
        tx.commit()?;
        if kind == SaveKind::Updated {
            planning.revision += 1;
        }
        Ok(())
    }

    /// 在一个事务内保存多个日排班；任一失败整体回滚
    pub fn save_all(&self, plannings: &mut [DayPlanning]) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut kinds = Vec::with_capacity(plannings.len());
        for planning in plannings.iter() {
            kinds.push(save_in_tx(&tx, planning)?);
        }
        tx.commit()?;

        for (planning, kind) in plannings.iter_mut().zip(kinds) {
            if kind == SaveKind::Updated {
                planning.revision += 1;
            }
        }
        debug!(count = plannings.len(), "日排班批量保存完成");
        Ok(())
    }

    /// 删除日排班 (带乐观锁检查)，子表级联删除
    pub fn delete(&self, planning_id: &str, expected_revision: i32) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM day_planning WHERE planning_id = ?1 AND revision = ?2",
            params![planning_id, expected_revision],
        )?;
        if rows == 0 {
            return Err(lock_failure_or_not_found(&conn, planning_id, expected_revision));
        }
        Ok(())
    }
}

impl PlanningStore for PlanningRepository {
    fn load_plannings(
        &self,
        site_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<DayPlanning>> {
        self.find_by_site_and_range(site_id, from, to)
    }

    fn save_chunk(&self, plannings: &mut [DayPlanning]) -> RepositoryResult<()> {
        self.save_all(plannings)
    }
}

// ==========================================
// 事务内写入
// ==========================================

fn save_in_tx(tx: &Transaction, planning: &DayPlanning) -> RepositoryResult<SaveKind> {
    let current: Option<i32> = tx
        .query_row(
            "SELECT revision FROM day_planning WHERE planning_id = ?1",
            params![&planning.planning_id],
            |row| row.get(0),
        )
        .optional()?;

    let kind = match current {
        None if planning.revision == 0 => {
            tx.execute(
                r#"INSERT INTO day_planning (
                    planning_id, site_id, plan_date, status, revision,
                    created_at, updated_at, validated_by, validated_at
                ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?8)"#,
                params![
                    &planning.planning_id,
                    &planning.site_id,
                    fmt_date(planning.plan_date),
                    planning.status.to_db_str(),
                    fmt_datetime(planning.created_at),
                    fmt_datetime(planning.updated_at),
                    &planning.validated_by,
                    planning.validated_at.map(fmt_datetime),
                ],
            )?;
            SaveKind::Inserted
        }
        None => {
            return Err(RepositoryError::NotFound {
                entity: "DayPlanning".to_string(),
                id: planning.planning_id.clone(),
            })
        }
        Some(_) => {
            let rows = tx.execute(
                r#"UPDATE day_planning
                   SET status = ?1, updated_at = ?2, validated_by = ?3, validated_at = ?4,
                       revision = revision + 1
                   WHERE planning_id = ?5 AND revision = ?6"#,
                params![
                    planning.status.to_db_str(),
                    fmt_datetime(planning.updated_at),
                    &planning.validated_by,
                    planning.validated_at.map(fmt_datetime),
                    &planning.planning_id,
                    planning.revision,
                ],
            )?;
            if rows == 0 {
                return Err(lock_failure_or_not_found(
                    tx,
                    &planning.planning_id,
                    planning.revision,
                ));
            }
            tx.execute(
                "DELETE FROM room_assignment WHERE planning_id = ?1",
                params![&planning.planning_id],
            )?;
            tx.execute(
                "DELETE FROM planning_conflict WHERE planning_id = ?1",
                params![&planning.planning_id],
            )?;
            SaveKind::Updated
        }
    };

    write_children(tx, planning)?;
    Ok(kind)
}

fn write_children(tx: &Transaction, planning: &DayPlanning) -> RepositoryResult<()> {
    let mut ra_stmt = tx.prepare_cached(
        r#"INSERT INTO room_assignment (
            assignment_id, planning_id, seq_no, room_id, period, surgeon_id, source,
            trame_modele_id, affectation_modele_id, activity_type_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
    )?;
    let mut staff_stmt = tx.prepare_cached(
        r#"INSERT INTO staff_assignment (
            staff_assignment_id, assignment_id, seq_no, staff_id, role, is_primary
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
    )?;
    let mut req_stmt = tx.prepare_cached(
        r#"INSERT INTO staffing_requirement (assignment_id, seq_no, role, headcount, notes)
           VALUES (?1, ?2, ?3, ?4, ?5)"#,
    )?;

    for (seq, ra) in planning.room_assignments.iter().enumerate() {
        ra_stmt.execute(params![
            &ra.assignment_id,
            &planning.planning_id,
            seq as i64,
            ra.room_id,
            ra.period.to_db_str(),
            &ra.surgeon_id,
            ra.source.to_db_str(),
            ra.trame_modele_id,
            ra.affectation_modele_id,
            &ra.activity_type_id,
        ])?;
        for (staff_seq, staff) in ra.staff.iter().enumerate() {
            staff_stmt.execute(params![
                &staff.staff_assignment_id,
                &ra.assignment_id,
                staff_seq as i64,
                &staff.staff_id,
                staff.role.to_db_str(),
                staff.is_primary,
            ])?;
        }
        for (req_seq, req) in ra.staffing_requirements.iter().enumerate() {
            req_stmt.execute(params![
                &ra.assignment_id,
                req_seq as i64,
                req.role.to_db_str(),
                req.headcount,
                &req.notes,
            ])?;
        }
    }

    let mut conflict_stmt = tx.prepare_cached(
        r#"INSERT INTO planning_conflict (
            conflict_id, planning_id, seq_no, rule, related_room_assignment_id, subject,
            severity, message, is_resolved, resolved_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
    )?;
    for (seq, c) in planning.conflicts.iter().enumerate() {
        conflict_stmt.execute(params![
            &c.conflict_id,
            &planning.planning_id,
            seq as i64,
            c.rule.to_db_str(),
            &c.related_room_assignment_id,
            &c.subject,
            c.severity.to_db_str(),
            &c.message,
            c.is_resolved,
            &c.resolved_by,
        ])?;
    }
    Ok(())
}

/// 更新/删除影响 0 行时，判断是 revision 冲突还是记录不存在
fn lock_failure_or_not_found(conn: &Connection, planning_id: &str, expected: i32) -> RepositoryError {
    let actual: Result<i32, _> = conn.query_row(
        "SELECT revision FROM day_planning WHERE planning_id = ?1",
        params![planning_id],
        |row| row.get(0),
    );
    match actual {
        Ok(actual) => RepositoryError::OptimisticLockFailure {
            planning_id: planning_id.to_string(),
            expected,
            actual,
        },
        Err(_) => RepositoryError::NotFound {
            entity: "DayPlanning".to_string(),
            id: planning_id.to_string(),
        },
    }
}

// ==========================================
// 行映射
// ==========================================

const SELECT_HEADER: &str = r#"SELECT planning_id, site_id, plan_date, status, revision,
       created_at, updated_at, validated_by, validated_at
  FROM day_planning"#;

fn map_header(row: &rusqlite::Row) -> rusqlite::Result<DayPlanning> {
    let plan_date: String = row.get(2)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    let validated_at: Option<String> = row.get(8)?;
    Ok(DayPlanning {
        planning_id: row.get(0)?,
        site_id: row.get(1)?,
        plan_date: parse_date(2, &plan_date)?,
        status: parse_enum(3, "status", &status, PlanningStatus::from_str)?,
        room_assignments: Vec::new(),
        conflicts: Vec::new(),
        revision: row.get(4)?,
        created_at: parse_datetime(5, &created_at)?,
        updated_at: parse_datetime(6, &updated_at)?,
        validated_by: row.get(7)?,
        validated_at: validated_at.map(|s| parse_datetime(8, &s)).transpose()?,
    })
}

fn load_children(conn: &Connection, mut planning: DayPlanning) -> RepositoryResult<DayPlanning> {
    let mut ra_stmt = conn.prepare_cached(
        r#"SELECT assignment_id, room_id, period, surgeon_id, source,
                  trame_modele_id, affectation_modele_id, activity_type_id
             FROM room_assignment WHERE planning_id = ?1 ORDER BY seq_no"#,
    )?;
    let mut assignments = ra_stmt
        .query_map(params![&planning.planning_id], |row| {
            let period: String = row.get(2)?;
            let source: String = row.get(4)?;
            Ok(RoomAssignment {
                assignment_id: row.get(0)?,
                planning_id: planning.planning_id.clone(),
                room_id: row.get(1)?,
                period: parse_enum(2, "period", &period, Period::from_str)?,
                surgeon_id: row.get(3)?,
                source: AssignmentSource::from_str(&source),
                trame_modele_id: row.get(5)?,
                affectation_modele_id: row.get(6)?,
                activity_type_id: row.get(7)?,
                staff: Vec::new(),
                staffing_requirements: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut staff_stmt = conn.prepare_cached(
        r#"SELECT staff_assignment_id, staff_id, role, is_primary
             FROM staff_assignment WHERE assignment_id = ?1 ORDER BY seq_no"#,
    )?;
    let mut req_stmt = conn.prepare_cached(
        r#"SELECT role, headcount, notes
             FROM staffing_requirement WHERE assignment_id = ?1 ORDER BY seq_no"#,
    )?;
    for ra in assignments.iter_mut() {
        ra.staff = staff_stmt
            .query_map(params![&ra.assignment_id], |row| {
                let role: String = row.get(2)?;
                Ok(StaffAssignment {
                    staff_assignment_id: row.get(0)?,
                    staff_id: row.get(1)?,
                    role: parse_enum(2, "role", &role, StaffRole::from_str)?,
                    is_primary: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        ra.staffing_requirements = req_stmt
            .query_map(params![&ra.assignment_id], |row| {
                let role: String = row.get(0)?;
                Ok(StaffingRequirement {
                    role: parse_enum(0, "role", &role, StaffRole::from_str)?,
                    headcount: row.get(1)?,
                    notes: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
    }

    let mut conflict_stmt = conn.prepare_cached(
        r#"SELECT conflict_id, rule, related_room_assignment_id, subject, severity,
                  message, is_resolved, resolved_by
             FROM planning_conflict WHERE planning_id = ?1 ORDER BY seq_no"#,
    )?;
    planning.conflicts = conflict_stmt
        .query_map(params![&planning.planning_id], |row| {
            let rule: String = row.get(1)?;
            let severity: String = row.get(4)?;
            Ok(Conflict {
                conflict_id: row.get(0)?,
                rule: parse_enum(1, "rule", &rule, ConflictRule::from_str)?,
                related_room_assignment_id: row.get(2)?,
                subject: row.get(3)?,
                severity: parse_enum(4, "severity", &severity, Severity::from_str)?,
                message: row.get(5)?,
                is_resolved: row.get(6)?,
                resolved_by: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    planning.room_assignments = assignments;
    Ok(planning)
}
