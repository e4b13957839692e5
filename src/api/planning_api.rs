// ==========================================
// 手术室排班核心 - 日排班 API
// ==========================================
// 职责: 日排班读取/编辑/状态流转/冲突处理
// 流程: 读取聚合 -> 校验调用方 revision -> 引擎操作 -> 乐观锁保存 -> 发布事件
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::planning::{Conflict, DayPlanning, RoomAssignment};
use crate::domain::types::{PlanningStatus, Severity};
use crate::engine::day_planning::{AssignmentEdit, DayPlanningEngine, StatusChange};
use crate::engine::error::EngineResult;
use crate::engine::events::{OptionalEventPublisher, PlanningEventPublisher};
use crate::repository::catalog_repo::CatalogRepository;
use crate::repository::planning_repo::PlanningRepository;

const EVENT_SOURCE: &str = "day_planning_api";

// ==========================================
// DayPlanningView - 只读投影
// ==========================================
/// 供界面渲染与导出使用的日排班投影
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPlanningView {
    pub planning_id: String,
    pub site_id: String,
    pub plan_date: NaiveDate,
    pub status: PlanningStatus,
    pub revision: i32,
    pub room_assignments: Vec<RoomAssignment>,
    pub conflicts: Vec<Conflict>,
    pub unresolved_errors: usize,
    pub unresolved_warnings: usize,
    pub unresolved_infos: usize,
    pub updated_at: NaiveDateTime,
    pub validated_by: Option<String>,
    pub validated_at: Option<NaiveDateTime>,
}

impl From<&DayPlanning> for DayPlanningView {
    fn from(planning: &DayPlanning) -> Self {
        Self {
            planning_id: planning.planning_id.clone(),
            site_id: planning.site_id.clone(),
            plan_date: planning.plan_date,
            status: planning.status,
            revision: planning.revision,
            room_assignments: planning.room_assignments.clone(),
            conflicts: planning.conflicts.clone(),
            unresolved_errors: planning.unresolved_count(Severity::Error),
            unresolved_warnings: planning.unresolved_count(Severity::Warning),
            unresolved_infos: planning.unresolved_count(Severity::Info),
            updated_at: planning.updated_at,
            validated_by: planning.validated_by.clone(),
            validated_at: planning.validated_at,
        }
    }
}

/// 编辑提交的返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResponse {
    pub planning: DayPlanningView,
    pub created_assignment_ids: Vec<String>,
    pub new_conflicts: usize,
    pub cleared_conflicts: usize,
}

// ==========================================
// DayPlanningApi - 日排班 API
// ==========================================
pub struct DayPlanningApi {
    planning_repo: Arc<PlanningRepository>,
    catalog_repo: Arc<CatalogRepository>,
    engine: DayPlanningEngine,
    event_publisher: OptionalEventPublisher,
}

impl DayPlanningApi {
    /// 创建新的 DayPlanningApi 实例
    ///
    /// # 参数
    /// - planning_repo: 日排班仓储
    /// - catalog_repo: 站点/区域/手术室目录
    /// - event_publisher: 可选的领域事件发布者
    pub fn new(
        planning_repo: Arc<PlanningRepository>,
        catalog_repo: Arc<CatalogRepository>,
        event_publisher: Option<Arc<dyn PlanningEventPublisher>>,
    ) -> Self {
        Self {
            planning_repo,
            catalog_repo,
            engine: DayPlanningEngine::new(),
            event_publisher: OptionalEventPublisher::from_option(event_publisher),
        }
    }

    // ==========================================
    // 查询接口
    // ==========================================

    pub fn get_planning(&self, planning_id: &str) -> ApiResult<DayPlanningView> {
        let planning = self.load(planning_id)?;
        Ok(DayPlanningView::from(&planning))
    }

    pub fn find_planning(
        &self,
        site_id: &str,
        plan_date: NaiveDate,
    ) -> ApiResult<Option<DayPlanningView>> {
        Ok(self
            .planning_repo
            .find_by_site_and_date(site_id, plan_date)?
            .as_ref()
            .map(DayPlanningView::from))
    }

    /// 随首个手术室排班新建站点某日的 DRAFT
    ///
    /// edits 至少包含一个 AddRoomAssignment；不产生空排班
    ///
    /// # 错误
    /// - ValidationError: 站点为空 / 未包含手术室排班 / 编辑引用了不存在的手术室
    /// - NotFound: 站点不存在
    /// - ConcurrencyConflict: 该 (站点, 日期) 已有排班 (含并发新建)，应读取后走 edit_planning
    pub fn create_planning(
        &self,
        site_id: &str,
        plan_date: NaiveDate,
        edits: Vec<AssignmentEdit>,
    ) -> ApiResult<EditResponse> {
        if site_id.trim().is_empty() {
            return Err(ApiError::ValidationError("站点ID不能为空".to_string()));
        }
        if !edits
            .iter()
            .any(|e| matches!(e, AssignmentEdit::AddRoomAssignment(_)))
        {
            return Err(ApiError::ValidationError(
                "新建日排班必须包含至少一个手术室排班".to_string(),
            ));
        }
        if let Some(existing) = self.planning_repo.find_by_site_and_date(site_id, plan_date)? {
            return Err(ApiError::ConcurrencyConflict(format!(
                "站点{} {} 的日排班已存在（id={}，revision={}）",
                site_id, plan_date, existing.planning_id, existing.revision
            )));
        }
        if self.catalog_repo.find_site(site_id)?.is_none() {
            return Err(ApiError::NotFound(format!("站点(id={})不存在", site_id)));
        }

        let now = current_time();
        let mut planning = DayPlanning::new_draft(site_id, plan_date, now);
        let ctx = self.catalog_repo.load_planning_context(site_id)?;
        let outcome = self.engine.apply_edits(&mut planning, &ctx, edits, now)?;
        self.planning_repo.save(&mut planning)?;

        self.event_publisher.publish_planning_changes(
            &planning,
            outcome.status_change,
            &outcome.conflicts.new_conflicts,
            EVENT_SOURCE,
        );
        info!(
            planning_id = %planning.planning_id,
            site_id,
            %plan_date,
            assignments = planning.room_assignments.len(),
            "新建日排班"
        );
        Ok(EditResponse {
            planning: DayPlanningView::from(&planning),
            created_assignment_ids: outcome.created_assignment_ids,
            new_conflicts: outcome.conflicts.new_conflicts.len(),
            cleared_conflicts: outcome.conflicts.cleared,
        })
    }

    // ==========================================
    // 编辑接口
    // ==========================================

    /// 批量编辑，全部成功才保存
    ///
    /// # 错误
    /// - ConcurrencyConflict: expected_revision 过期
    /// - PlanningLocked: 已锁定/已归档
    /// - ValidationError: 编辑引用了不存在的手术室/排班等
    pub fn edit_planning(
        &self,
        planning_id: &str,
        expected_revision: i32,
        edits: Vec<AssignmentEdit>,
    ) -> ApiResult<EditResponse> {
        if edits.is_empty() {
            return Err(ApiError::ValidationError("编辑列表不能为空".to_string()));
        }
        let mut planning = self.load_for_update(planning_id, expected_revision)?;
        let ctx = self.catalog_repo.load_planning_context(&planning.site_id)?;

        let outcome = self
            .engine
            .apply_edits(&mut planning, &ctx, edits, current_time())?;
        self.planning_repo.save(&mut planning)?;

        self.event_publisher.publish_planning_changes(
            &planning,
            outcome.status_change,
            &outcome.conflicts.new_conflicts,
            EVENT_SOURCE,
        );
        debug!(
            planning_id,
            revision = planning.revision,
            created = outcome.created_assignment_ids.len(),
            "日排班编辑已保存"
        );

        Ok(EditResponse {
            planning: DayPlanningView::from(&planning),
            created_assignment_ids: outcome.created_assignment_ids,
            new_conflicts: outcome.conflicts.new_conflicts.len(),
            cleared_conflicts: outcome.conflicts.cleared,
        })
    }

    // ==========================================
    // 状态流转
    // ==========================================

    pub fn submit_for_review(
        &self,
        planning_id: &str,
        expected_revision: i32,
    ) -> ApiResult<DayPlanningView> {
        self.change_status(planning_id, expected_revision, |engine, p, now| {
            engine.submit_for_review(p, now)
        })
    }

    /// 存在未解决 ERROR 冲突时返回 UnresolvedConflicts，状态不变
    pub fn approve(
        &self,
        planning_id: &str,
        expected_revision: i32,
        validated_by: &str,
    ) -> ApiResult<DayPlanningView> {
        if validated_by.trim().is_empty() {
            return Err(ApiError::ValidationError("审核人不能为空".to_string()));
        }
        self.change_status(planning_id, expected_revision, |engine, p, now| {
            engine.approve(p, validated_by, now)
        })
    }

    pub fn reject(&self, planning_id: &str, expected_revision: i32) -> ApiResult<DayPlanningView> {
        self.change_status(planning_id, expected_revision, |engine, p, now| {
            engine.reject(p, now)
        })
    }

    pub fn lock(&self, planning_id: &str, expected_revision: i32) -> ApiResult<DayPlanningView> {
        self.change_status(planning_id, expected_revision, |engine, p, now| {
            engine.lock(p, now)
        })
    }

    pub fn archive(&self, planning_id: &str, expected_revision: i32) -> ApiResult<DayPlanningView> {
        self.change_status(planning_id, expected_revision, |engine, p, now| {
            engine.archive(p, now)
        })
    }

    // ==========================================
    // 冲突处理
    // ==========================================

    /// 标记冲突已解决 (或撤销)，不改变状态
    pub fn set_conflict_resolved(
        &self,
        planning_id: &str,
        expected_revision: i32,
        conflict_id: &str,
        resolved: bool,
        resolved_by: &str,
    ) -> ApiResult<DayPlanningView> {
        if resolved && resolved_by.trim().is_empty() {
            return Err(ApiError::ValidationError("处理人不能为空".to_string()));
        }
        let mut planning = self.load_for_update(planning_id, expected_revision)?;
        self.engine.set_conflict_resolved(
            &mut planning,
            conflict_id,
            resolved,
            resolved_by,
            current_time(),
        )?;
        self.planning_repo.save(&mut planning)?;
        info!(planning_id, conflict_id, resolved, resolved_by, "冲突处理状态已更新");
        Ok(DayPlanningView::from(&planning))
    }

    /// 按当前目录重新检测冲突 (如区域规则变更后)
    pub fn revalidate(
        &self,
        planning_id: &str,
        expected_revision: i32,
    ) -> ApiResult<DayPlanningView> {
        let mut planning = self.load_for_update(planning_id, expected_revision)?;
        let ctx = self.catalog_repo.load_planning_context(&planning.site_id)?;
        let refresh = self.engine.revalidate(&mut planning, &ctx, current_time())?;
        self.planning_repo.save(&mut planning)?;

        self.event_publisher.publish_planning_changes(
            &planning,
            None,
            &refresh.new_conflicts,
            EVENT_SOURCE,
        );
        info!(
            planning_id,
            new_conflicts = refresh.new_conflicts.len(),
            cleared = refresh.cleared,
            "冲突重新检测完成"
        );
        Ok(DayPlanningView::from(&planning))
    }

    // ==========================================
    // 删除
    // ==========================================

    /// 仅未验证过的 DRAFT 可删除
    pub fn delete_planning(&self, planning_id: &str, expected_revision: i32) -> ApiResult<()> {
        let planning = self.load_for_update(planning_id, expected_revision)?;
        self.engine.ensure_deletable(&planning)?;
        self.planning_repo.delete(planning_id, expected_revision)?;
        info!(planning_id, "日排班已删除");
        Ok(())
    }

    // ==========================================
    // 内部方法
    // ==========================================

    fn load(&self, planning_id: &str) -> ApiResult<DayPlanning> {
        self.planning_repo
            .find_by_id(planning_id)?
            .ok_or_else(|| ApiError::NotFound(format!("日排班(id={})不存在", planning_id)))
    }

    /// 读取聚合并核对调用方持有的 revision
    fn load_for_update(&self, planning_id: &str, expected_revision: i32) -> ApiResult<DayPlanning> {
        let planning = self.load(planning_id)?;
        if planning.revision != expected_revision {
            return Err(ApiError::ConcurrencyConflict(format!(
                "日排班{}已被其他用户修改（期望revision={}，实际revision={}）",
                planning_id, expected_revision, planning.revision
            )));
        }
        Ok(planning)
    }

    fn change_status<F>(
        &self,
        planning_id: &str,
        expected_revision: i32,
        op: F,
    ) -> ApiResult<DayPlanningView>
    where
        F: FnOnce(&DayPlanningEngine, &mut DayPlanning, NaiveDateTime) -> EngineResult<StatusChange>,
    {
        let mut planning = self.load_for_update(planning_id, expected_revision)?;
        let change = op(&self.engine, &mut planning, current_time())?;
        self.planning_repo.save(&mut planning)?;
        self.event_publisher
            .publish_planning_changes(&planning, Some(change), &[], EVENT_SOURCE);
        Ok(DayPlanningView::from(&planning))
    }
}

fn current_time() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};
    use crate::domain::types::{ConflictRule, Period, StaffRole};
    use crate::engine::day_planning::NewRoomAssignment;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn create_test_api() -> DayPlanningApi {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"INSERT INTO site (site_id, name) VALUES ('SITE1', '总院');
               INSERT INTO operating_sector (sector_id, site_id, name, rules_json)
               VALUES (10, 'SITE1', '骨科', '{"mandatoryRoles":["MAR"]}');
               INSERT INTO operating_room (room_id, site_id, name, sector_id, is_active)
               VALUES (1, 'SITE1', 'OR1', 10, 1);"#,
        )
        .unwrap();
        let conn = Arc::new(Mutex::new(conn));
        DayPlanningApi::new(
            Arc::new(PlanningRepository::from_connection(conn.clone())),
            Arc::new(CatalogRepository::from_connection(conn)),
            None,
        )
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn add_room(room_id: i64, period: Period) -> AssignmentEdit {
        AssignmentEdit::AddRoomAssignment(NewRoomAssignment::manual(room_id, period))
    }

    #[test]
    fn test_planning_created_with_first_assignment() {
        let api = create_test_api();
        assert!(matches!(
            api.create_planning("SITE1", date(), vec![]),
            Err(ApiError::ValidationError(_))
        ));
        let staff_only = vec![AssignmentEdit::SetSurgeon {
            assignment_id: "RA1".to_string(),
            surgeon_id: None,
        }];
        assert!(matches!(
            api.create_planning("SITE1", date(), staff_only),
            Err(ApiError::ValidationError(_))
        ));
        assert!(api.find_planning("SITE1", date()).unwrap().is_none());

        let created = api
            .create_planning("SITE1", date(), vec![add_room(1, Period::Morning)])
            .unwrap();
        assert_eq!(created.planning.status, PlanningStatus::Draft);
        assert_eq!(created.planning.room_assignments.len(), 1);
        assert_eq!(created.created_assignment_ids.len(), 1);

        assert!(matches!(
            api.create_planning("SITE1", date(), vec![add_room(1, Period::Afternoon)]),
            Err(ApiError::ConcurrencyConflict(_))
        ));
        assert!(matches!(
            api.create_planning("NOPE", date(), vec![add_room(1, Period::Morning)]),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_unknown_room_creates_nothing() {
        let api = create_test_api();
        assert!(matches!(
            api.create_planning("SITE1", date(), vec![add_room(404, Period::Morning)]),
            Err(ApiError::ValidationError(_))
        ));
        assert!(api.find_planning("SITE1", date()).unwrap().is_none());
    }

    #[test]
    fn test_approve_blocked_until_error_conflict_resolved() {
        let api = create_test_api();
        let edited = api
            .create_planning("SITE1", date(), vec![add_room(1, Period::Morning)])
            .unwrap();
        let planning_id = edited.planning.planning_id.clone();
        assert_eq!(edited.planning.unresolved_errors, 1);
        let conflict_id = edited
            .planning
            .conflicts
            .iter()
            .find(|c| c.rule == ConflictRule::MinStaffing && c.severity == Severity::Error)
            .map(|c| c.conflict_id.clone())
            .unwrap();

        let submitted = api
            .submit_for_review(&planning_id, edited.planning.revision)
            .unwrap();
        let err = api
            .approve(&planning_id, submitted.revision, "CHEF")
            .unwrap_err();
        assert!(matches!(err, ApiError::UnresolvedConflicts { count: 1, .. }));
        let unchanged = api.get_planning(&planning_id).unwrap();
        assert_eq!(unchanged.status, PlanningStatus::ValidationRequested);

        let resolved = api
            .set_conflict_resolved(&planning_id, unchanged.revision, &conflict_id, true, "CHEF")
            .unwrap();
        let approved = api
            .approve(&planning_id, resolved.revision, "CHEF")
            .unwrap();
        assert_eq!(approved.status, PlanningStatus::Validated);
        assert_eq!(approved.validated_by.as_deref(), Some("CHEF"));
    }

    #[test]
    fn test_stale_revision_is_rejected() {
        let api = create_test_api();
        let created = api
            .create_planning("SITE1", date(), vec![add_room(1, Period::Morning)])
            .unwrap();
        let view = created.planning;
        let ra_id = created.created_assignment_ids[0].clone();
        let edit = || {
            vec![AssignmentEdit::SetSurgeon {
                assignment_id: ra_id.clone(),
                surgeon_id: Some("DR1".to_string()),
            }]
        };
        api.edit_planning(&view.planning_id, view.revision, edit())
            .unwrap();
        let err = api
            .edit_planning(&view.planning_id, view.revision, edit())
            .unwrap_err();
        assert!(matches!(err, ApiError::ConcurrencyConflict(_)));
    }

    #[test]
    fn test_archived_planning_rejects_edits_and_delete() {
        let api = create_test_api();
        let view = api
            .create_planning("SITE1", date(), vec![add_room(1, Period::Morning)])
            .unwrap()
            .planning;
        assert!(matches!(
            api.lock(&view.planning_id, view.revision),
            Err(ApiError::InvalidStateTransition { .. })
        ));
        let archived = api.archive(&view.planning_id, view.revision).unwrap();
        assert_eq!(archived.status, PlanningStatus::Archived);

        let err = api
            .edit_planning(
                &view.planning_id,
                archived.revision,
                vec![add_room(1, Period::Afternoon)],
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::PlanningLocked { .. }));
        assert!(matches!(
            api.delete_planning(&view.planning_id, archived.revision),
            Err(ApiError::PlanningLocked { .. })
        ));
    }

    #[test]
    fn test_delete_draft() {
        let api = create_test_api();
        let view = api
            .create_planning("SITE1", date(), vec![add_room(1, Period::Morning)])
            .unwrap()
            .planning;
        api.delete_planning(&view.planning_id, view.revision).unwrap();
        assert!(api.find_planning("SITE1", date()).unwrap().is_none());
    }

    #[test]
    fn test_assign_staff_clears_conflict() {
        let api = create_test_api();
        let edited = api
            .create_planning("SITE1", date(), vec![add_room(1, Period::Morning)])
            .unwrap();
        let ra_id = edited.created_assignment_ids[0].clone();
        let staffed = api
            .edit_planning(
                &edited.planning.planning_id,
                edited.planning.revision,
                vec![AssignmentEdit::AssignStaff {
                    assignment_id: ra_id,
                    staff_id: "MAR1".to_string(),
                    role: StaffRole::Mar,
                    is_primary: true,
                }],
            )
            .unwrap();
        assert_eq!(staffed.planning.unresolved_errors, 0);
        assert_eq!(staffed.cleared_conflicts, 1);
    }
}
