// ==========================================
// 手术室排班核心 - 日排班聚合操作
// ==========================================
// 职责: 排班编辑校验、状态迁移、同步冲突重算
// 红线: 编辑先作用于副本，冲突重算完成后整体提交；
//       任何失败都不改变原聚合
// ==========================================

use crate::domain::planning::{
    DayPlanning, RoomAssignment, StaffAssignment, StaffingRequirement,
};
use crate::domain::sector::{PlanningContext, RoomId};
use crate::domain::types::{AssignmentSource, Period, PlanningStatus, StaffRole};
use crate::engine::conflict::{ConflictDetector, ConflictRefresh};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::lifecycle::{requires_conflict_gate, transition, PlanningAction};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ==========================================
// 编辑指令
// ==========================================

/// 新建手术室排班的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRoomAssignment {
    pub room_id: RoomId,
    pub period: Period,
    pub surgeon_id: Option<String>,
    pub activity_type_id: Option<String>,
    pub source: AssignmentSource,
    pub trame_modele_id: Option<i64>,
    pub affectation_modele_id: Option<i64>,
    pub staffing_requirements: Vec<StaffingRequirement>,
}

impl NewRoomAssignment {
    /// 人工新建 (无模板来源)
    pub fn manual(room_id: RoomId, period: Period) -> Self {
        Self {
            room_id,
            period,
            surgeon_id: None,
            activity_type_id: None,
            source: AssignmentSource::Manual,
            trame_modele_id: None,
            affectation_modele_id: None,
            staffing_requirements: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentEdit {
    AddRoomAssignment(NewRoomAssignment),
    RemoveRoomAssignment {
        assignment_id: String,
    },
    SetSurgeon {
        assignment_id: String,
        surgeon_id: Option<String>,
    },
    AssignStaff {
        assignment_id: String,
        staff_id: String,
        role: StaffRole,
        is_primary: bool,
    },
    UnassignStaff {
        assignment_id: String,
        staff_assignment_id: String,
    },
}

/// 状态变化 (from == to 表示未变)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: PlanningStatus,
    pub to: PlanningStatus,
}

impl StatusChange {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// 一次编辑提交的结果
#[derive(Debug, Clone, Default)]
pub struct EditOutcome {
    pub created_assignment_ids: Vec<String>,
    pub status_change: Option<StatusChange>,
    pub conflicts: ConflictRefresh,
}

// ==========================================
// DayPlanningEngine - 日排班聚合引擎
// ==========================================
pub struct DayPlanningEngine {
    detector: ConflictDetector,
}

impl DayPlanningEngine {
    pub fn new() -> Self {
        Self {
            detector: ConflictDetector::new(),
        }
    }

    /// 应用单条编辑
    pub fn apply_edit(
        &self,
        planning: &mut DayPlanning,
        ctx: &PlanningContext,
        edit: AssignmentEdit,
        now: NaiveDateTime,
    ) -> EngineResult<EditOutcome> {
        self.apply_edits(planning, ctx, vec![edit], now)
    }

    /// 批量应用编辑: 全部成功才提交，冲突只重算一次
    pub fn apply_edits(
        &self,
        planning: &mut DayPlanning,
        ctx: &PlanningContext,
        edits: Vec<AssignmentEdit>,
        now: NaiveDateTime,
    ) -> EngineResult<EditOutcome> {
        let next_status = transition(&planning.planning_id, planning.status, PlanningAction::Edit)?;

        let mut draft = planning.clone();
        let mut created = Vec::new();
        for edit in edits {
            if let Some(id) = apply_one(&mut draft, ctx, edit)? {
                created.push(id);
            }
        }

        let refresh = self.detector.refresh(&mut draft, ctx);
        let change = StatusChange {
            from: planning.status,
            to: next_status,
        };
        draft.status = next_status;
        draft.updated_at = now;
        *planning = draft;

        debug!(
            planning_id = %planning.planning_id,
            created = created.len(),
            new_conflicts = refresh.new_conflicts.len(),
            cleared = refresh.cleared,
            status = %planning.status,
            "排班编辑已提交"
        );

        Ok(EditOutcome {
            created_assignment_ids: created,
            status_change: change.changed().then_some(change),
            conflicts: refresh,
        })
    }

    /// DRAFT / MODIFIED_AFTER_VALIDATION -> VALIDATION_REQUESTED
    pub fn submit_for_review(
        &self,
        planning: &mut DayPlanning,
        now: NaiveDateTime,
    ) -> EngineResult<StatusChange> {
        self.change_status(planning, PlanningAction::SubmitForReview, now)
    }

    /// -> VALIDATED，存在未解决 ERROR 冲突时失败且状态不变
    pub fn approve(
        &self,
        planning: &mut DayPlanning,
        validated_by: &str,
        now: NaiveDateTime,
    ) -> EngineResult<StatusChange> {
        let change = self.change_status(planning, PlanningAction::Approve, now)?;
        planning.validated_by = Some(validated_by.to_string());
        planning.validated_at = Some(now);
        Ok(change)
    }

    /// VALIDATION_REQUESTED -> DRAFT
    pub fn reject(&self, planning: &mut DayPlanning, now: NaiveDateTime) -> EngineResult<StatusChange> {
        self.change_status(planning, PlanningAction::Reject, now)
    }

    pub fn lock(&self, planning: &mut DayPlanning, now: NaiveDateTime) -> EngineResult<StatusChange> {
        self.change_status(planning, PlanningAction::Lock, now)
    }

    pub fn archive(&self, planning: &mut DayPlanning, now: NaiveDateTime) -> EngineResult<StatusChange> {
        self.change_status(planning, PlanningAction::Archive, now)
    }

    /// 按需重跑冲突检测 (如区域规则变更后)，不改变状态
    pub fn revalidate(
        &self,
        planning: &mut DayPlanning,
        ctx: &PlanningContext,
        now: NaiveDateTime,
    ) -> EngineResult<ConflictRefresh> {
        ensure_open(planning)?;
        let refresh = self.detector.refresh(planning, ctx);
        planning.updated_at = now;
        Ok(refresh)
    }

    /// 标记冲突已解决/未解决 (唯一允许的人工修改)
    pub fn set_conflict_resolved(
        &self,
        planning: &mut DayPlanning,
        conflict_id: &str,
        resolved: bool,
        resolved_by: &str,
        now: NaiveDateTime,
    ) -> EngineResult<()> {
        ensure_open(planning)?;
        let conflict = planning
            .conflicts
            .iter_mut()
            .find(|c| c.conflict_id == conflict_id)
            .ok_or_else(|| EngineError::Validation(format!("冲突不存在: {}", conflict_id)))?;
        conflict.is_resolved = resolved;
        conflict.resolved_by = resolved.then(|| resolved_by.to_string());
        planning.updated_at = now;
        Ok(())
    }

    /// 仅从未验证过的 DRAFT 可删除
    pub fn ensure_deletable(&self, planning: &DayPlanning) -> EngineResult<()> {
        ensure_open(planning)?;
        if planning.status != PlanningStatus::Draft || planning.validated_at.is_some() {
            return Err(EngineError::Validation(format!(
                "仅未验证的草稿可删除: planning_id={}, status={}",
                planning.planning_id, planning.status
            )));
        }
        Ok(())
    }

    fn change_status(
        &self,
        planning: &mut DayPlanning,
        action: PlanningAction,
        now: NaiveDateTime,
    ) -> EngineResult<StatusChange> {
        let to = transition(&planning.planning_id, planning.status, action)?;

        if requires_conflict_gate(action) {
            let count = planning.unresolved_error_count();
            if count > 0 {
                return Err(EngineError::UnresolvedConflicts {
                    planning_id: planning.planning_id.clone(),
                    count,
                });
            }
        }

        let change = StatusChange {
            from: planning.status,
            to,
        };
        planning.status = to;
        planning.updated_at = now;
        info!(
            planning_id = %planning.planning_id,
            from = %change.from,
            to = %change.to,
            action = %action,
            "日排班状态变更"
        );
        Ok(change)
    }
}

impl Default for DayPlanningEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_open(planning: &DayPlanning) -> EngineResult<()> {
    if planning.status.is_terminal() {
        return Err(EngineError::PlanningLocked {
            planning_id: planning.planning_id.clone(),
            status: planning.status,
        });
    }
    Ok(())
}

fn find_assignment<'a>(
    planning: &'a mut DayPlanning,
    assignment_id: &str,
) -> EngineResult<&'a mut RoomAssignment> {
    planning
        .find_assignment_mut(assignment_id)
        .ok_or_else(|| EngineError::Validation(format!("手术室排班不存在: {}", assignment_id)))
}

/// 校验并应用一条编辑，返回新建的排班 ID
fn apply_one(
    planning: &mut DayPlanning,
    ctx: &PlanningContext,
    edit: AssignmentEdit,
) -> EngineResult<Option<String>> {
    match edit {
        AssignmentEdit::AddRoomAssignment(new_ra) => {
            let room = ctx.room(new_ra.room_id).ok_or_else(|| {
                EngineError::Validation(format!("未知手术室: room_id={}", new_ra.room_id))
            })?;
            if room.site_id != planning.site_id {
                return Err(EngineError::Validation(format!(
                    "手术室 {} 属于站点 {}，与日排班站点 {} 不一致",
                    room.room_id, room.site_id, planning.site_id
                )));
            }
            if !room.is_active {
                return Err(EngineError::Validation(format!(
                    "手术室已停用: room_id={}",
                    room.room_id
                )));
            }
            if let Some(existing) = planning.assignment_overlapping(new_ra.room_id, new_ra.period) {
                return Err(EngineError::Validation(format!(
                    "手术室 {} 在时段 {} 已有排班 {}",
                    new_ra.room_id, new_ra.period, existing.assignment_id
                )));
            }

            let assignment_id = uuid::Uuid::new_v4().to_string();
            planning.room_assignments.push(RoomAssignment {
                assignment_id: assignment_id.clone(),
                planning_id: planning.planning_id.clone(),
                room_id: new_ra.room_id,
                period: new_ra.period,
                surgeon_id: new_ra.surgeon_id,
                source: new_ra.source,
                trame_modele_id: new_ra.trame_modele_id,
                affectation_modele_id: new_ra.affectation_modele_id,
                activity_type_id: new_ra.activity_type_id,
                staff: Vec::new(),
                staffing_requirements: new_ra.staffing_requirements,
            });
            Ok(Some(assignment_id))
        }

        AssignmentEdit::RemoveRoomAssignment { assignment_id } => {
            let before = planning.room_assignments.len();
            planning
                .room_assignments
                .retain(|ra| ra.assignment_id != assignment_id);
            if planning.room_assignments.len() == before {
                return Err(EngineError::Validation(format!(
                    "手术室排班不存在: {}",
                    assignment_id
                )));
            }
            Ok(None)
        }

        AssignmentEdit::SetSurgeon {
            assignment_id,
            surgeon_id,
        } => {
            let ra = find_assignment(planning, &assignment_id)?;
            ra.surgeon_id = surgeon_id.filter(|s| !s.trim().is_empty());
            Ok(None)
        }

        AssignmentEdit::AssignStaff {
            assignment_id,
            staff_id,
            role,
            is_primary,
        } => {
            if staff_id.trim().is_empty() {
                return Err(EngineError::Validation("人员 ID 不能为空".to_string()));
            }
            let ra = find_assignment(planning, &assignment_id)?;
            if ra.staff.iter().any(|s| s.staff_id == staff_id) {
                return Err(EngineError::Validation(format!(
                    "人员 {} 已在手术室排班 {} 中",
                    staff_id, assignment_id
                )));
            }
            if is_primary && ra.staff.iter().any(|s| s.role == role && s.is_primary) {
                return Err(EngineError::Validation(format!(
                    "手术室排班 {} 已有角色 {} 的主责人员",
                    assignment_id, role
                )));
            }
            ra.staff.push(StaffAssignment {
                staff_assignment_id: uuid::Uuid::new_v4().to_string(),
                staff_id,
                role,
                is_primary,
            });
            Ok(None)
        }

        AssignmentEdit::UnassignStaff {
            assignment_id,
            staff_assignment_id,
        } => {
            let ra = find_assignment(planning, &assignment_id)?;
            let before = ra.staff.len();
            ra.staff
                .retain(|s| s.staff_assignment_id != staff_assignment_id);
            if ra.staff.len() == before {
                return Err(EngineError::Validation(format!(
                    "人员排班不存在: {}",
                    staff_assignment_id
                )));
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sector::{OperatingRoom, OperatingSector, SectorRules};
    use crate::domain::types::{ConflictRule, Severity};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn create_test_context() -> PlanningContext {
        let mut min = BTreeMap::new();
        min.insert(StaffRole::Iade, 1);
        let rules = SectorRules {
            require_contiguous_rooms: true,
            min_per_role_type_per_room: min,
            max_rooms_per_supervisor: Some(2),
            contiguity_map: Some(BTreeMap::from([(1, vec![2]), (2, vec![3])])),
            ..Default::default()
        };
        let sector = OperatingSector {
            sector_id: 1,
            site_id: "SITE1".to_string(),
            name: "中央手术区".to_string(),
            color: None,
            rules,
        };
        let mut rooms: Vec<OperatingRoom> = (1..=4)
            .map(|id| OperatingRoom {
                room_id: id,
                site_id: "SITE1".to_string(),
                name: format!("OR{}", id),
                sector_id: Some(1),
                is_active: true,
            })
            .collect();
        rooms.push(OperatingRoom {
            room_id: 9,
            site_id: "SITE2".to_string(),
            name: "外院OR".to_string(),
            sector_id: None,
            is_active: true,
        });
        PlanningContext::new(rooms, vec![sector])
    }

    fn create_test_planning() -> DayPlanning {
        DayPlanning::new_draft("SITE1", NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), now())
    }

    fn add_room(
        engine: &DayPlanningEngine,
        planning: &mut DayPlanning,
        ctx: &PlanningContext,
        room_id: RoomId,
    ) -> String {
        let outcome = engine
            .apply_edit(
                planning,
                ctx,
                AssignmentEdit::AddRoomAssignment(NewRoomAssignment::manual(
                    room_id,
                    Period::Morning,
                )),
                now(),
            )
            .unwrap();
        outcome.created_assignment_ids[0].clone()
    }

    fn assign(
        engine: &DayPlanningEngine,
        planning: &mut DayPlanning,
        ctx: &PlanningContext,
        ra: &str,
        staff_id: &str,
        role: StaffRole,
    ) -> EngineResult<EditOutcome> {
        engine.apply_edit(
            planning,
            ctx,
            AssignmentEdit::AssignStaff {
                assignment_id: ra.to_string(),
                staff_id: staff_id.to_string(),
                role,
                is_primary: false,
            },
            now(),
        )
    }

    /// 构造一个可通过审核的日排班 (无 ERROR 冲突)
    fn clean_planning(engine: &DayPlanningEngine, ctx: &PlanningContext) -> DayPlanning {
        let mut planning = create_test_planning();
        let ra = add_room(engine, &mut planning, ctx, 1);
        assign(engine, &mut planning, ctx, &ra, "N1", StaffRole::Iade).unwrap();
        planning
    }

    #[test]
    fn test_add_assignment_runs_detector() {
        let engine = DayPlanningEngine::new();
        let ctx = create_test_context();
        let mut planning = create_test_planning();

        let ra = add_room(&engine, &mut planning, &ctx, 1);

        assert_eq!(planning.room_assignments.len(), 1);
        assert_eq!(planning.conflicts.len(), 1);
        assert_eq!(planning.conflicts[0].rule, ConflictRule::MinStaffing);
        assert_eq!(planning.conflicts[0].severity, Severity::Warning);
        assert_eq!(
            planning.conflicts[0].related_room_assignment_id.as_deref(),
            Some(ra.as_str())
        );

        assign(&engine, &mut planning, &ctx, &ra, "N1", StaffRole::Iade).unwrap();
        assert!(planning.conflicts.is_empty());
    }

    #[test]
    fn test_validation_errors_leave_planning_untouched() {
        let engine = DayPlanningEngine::new();
        let ctx = create_test_context();
        let mut planning = create_test_planning();
        let ra = add_room(&engine, &mut planning, &ctx, 1);
        let snapshot = planning.clone();

        let unknown = engine.apply_edit(
            &mut planning,
            &ctx,
            AssignmentEdit::AddRoomAssignment(NewRoomAssignment::manual(42, Period::Morning)),
            now(),
        );
        assert!(matches!(unknown, Err(EngineError::Validation(_))));

        let other_site = engine.apply_edit(
            &mut planning,
            &ctx,
            AssignmentEdit::AddRoomAssignment(NewRoomAssignment::manual(9, Period::Morning)),
            now(),
        );
        assert!(matches!(other_site, Err(EngineError::Validation(_))));

        let overlap = engine.apply_edit(
            &mut planning,
            &ctx,
            AssignmentEdit::AddRoomAssignment(NewRoomAssignment::manual(1, Period::FullDay)),
            now(),
        );
        assert!(matches!(overlap, Err(EngineError::Validation(_))));

        // 批量中后一条失败，前一条也不生效
        let batch = engine.apply_edits(
            &mut planning,
            &ctx,
            vec![
                AssignmentEdit::AssignStaff {
                    assignment_id: ra.clone(),
                    staff_id: "N1".to_string(),
                    role: StaffRole::Iade,
                    is_primary: true,
                },
                AssignmentEdit::AssignStaff {
                    assignment_id: ra.clone(),
                    staff_id: "N2".to_string(),
                    role: StaffRole::Iade,
                    is_primary: true,
                },
            ],
            now(),
        );
        assert!(matches!(batch, Err(EngineError::Validation(_))));

        assert_eq!(planning, snapshot);
    }

    #[test]
    fn test_approve_blocked_by_unresolved_error() {
        let engine = DayPlanningEngine::new();
        let ctx = create_test_context();
        let mut planning = create_test_planning();
        let ra1 = add_room(&engine, &mut planning, &ctx, 1);
        let ra4 = add_room(&engine, &mut planning, &ctx, 4);
        for (ra, nurse) in [(&ra1, "N1"), (&ra4, "N4")] {
            assign(&engine, &mut planning, &ctx, ra, nurse, StaffRole::Iade).unwrap();
            assign(&engine, &mut planning, &ctx, ra, "M1", StaffRole::Mar).unwrap();
        }
        // 1 与 4 不相邻 -> ERROR
        assert_eq!(planning.unresolved_error_count(), 1);

        engine.submit_for_review(&mut planning, now()).unwrap();
        let err = engine.approve(&mut planning, "chef", now()).unwrap_err();
        assert!(matches!(err, EngineError::UnresolvedConflicts { count: 1, .. }));
        assert_eq!(planning.status, PlanningStatus::ValidationRequested);
        assert!(planning.validated_by.is_none());

        // 人工标记解决后可通过
        let conflict_id = planning.conflicts[0].conflict_id.clone();
        engine
            .set_conflict_resolved(&mut planning, &conflict_id, true, "chef", now())
            .unwrap();
        let change = engine.approve(&mut planning, "chef", now()).unwrap();
        assert_eq!(change.to, PlanningStatus::Validated);
        assert_eq!(planning.validated_by.as_deref(), Some("chef"));
    }

    #[test]
    fn test_edit_after_validation_marks_modified() {
        let engine = DayPlanningEngine::new();
        let ctx = create_test_context();
        let mut planning = clean_planning(&engine, &ctx);
        engine.submit_for_review(&mut planning, now()).unwrap();
        engine.approve(&mut planning, "chef", now()).unwrap();

        let outcome = engine
            .apply_edit(
                &mut planning,
                &ctx,
                AssignmentEdit::AddRoomAssignment(NewRoomAssignment::manual(
                    2,
                    Period::Afternoon,
                )),
                now(),
            )
            .unwrap();

        assert_eq!(planning.status, PlanningStatus::ModifiedAfterValidation);
        assert_eq!(
            outcome.status_change,
            Some(StatusChange {
                from: PlanningStatus::Validated,
                to: PlanningStatus::ModifiedAfterValidation
            })
        );

        // 再次编辑保持 MODIFIED_AFTER_VALIDATION
        let ra = outcome.created_assignment_ids[0].clone();
        let outcome = assign(&engine, &mut planning, &ctx, &ra, "N2", StaffRole::Iade).unwrap();
        assert_eq!(planning.status, PlanningStatus::ModifiedAfterValidation);
        assert!(outcome.status_change.is_none());
    }

    #[test]
    fn test_reject_returns_to_draft() {
        let engine = DayPlanningEngine::new();
        let ctx = create_test_context();
        let mut planning = clean_planning(&engine, &ctx);
        engine.submit_for_review(&mut planning, now()).unwrap();
        engine.reject(&mut planning, now()).unwrap();
        assert_eq!(planning.status, PlanningStatus::Draft);
    }

    #[test]
    fn test_locked_planning_rejects_edits() {
        let engine = DayPlanningEngine::new();
        let ctx = create_test_context();
        let mut planning = clean_planning(&engine, &ctx);
        engine.submit_for_review(&mut planning, now()).unwrap();
        engine.approve(&mut planning, "chef", now()).unwrap();
        engine.lock(&mut planning, now()).unwrap();

        let ra = planning.room_assignments[0].assignment_id.clone();
        let err = assign(&engine, &mut planning, &ctx, &ra, "N9", StaffRole::Iade).unwrap_err();
        assert!(matches!(err, EngineError::PlanningLocked { .. }));
        assert!(matches!(
            engine.archive(&mut planning, now()),
            Err(EngineError::PlanningLocked { .. })
        ));
        assert!(matches!(
            engine.revalidate(&mut planning, &ctx, now()),
            Err(EngineError::PlanningLocked { .. })
        ));
        assert_eq!(planning.status, PlanningStatus::Locked);
    }

    #[test]
    fn test_revalidate_picks_up_rule_change() {
        let engine = DayPlanningEngine::new();
        let mut ctx = create_test_context();
        let mut planning = clean_planning(&engine, &ctx);
        assert!(planning.conflicts.is_empty());

        ctx.sectors
            .get_mut(&1)
            .unwrap()
            .rules
            .min_per_role_type_per_room
            .insert(StaffRole::Mar, 1);
        let refresh = engine.revalidate(&mut planning, &ctx, now()).unwrap();

        assert_eq!(refresh.new_conflicts.len(), 1);
        assert_eq!(planning.status, PlanningStatus::Draft);
    }

    #[test]
    fn test_only_unvalidated_draft_is_deletable() {
        let engine = DayPlanningEngine::new();
        let ctx = create_test_context();
        let mut planning = clean_planning(&engine, &ctx);
        assert!(engine.ensure_deletable(&planning).is_ok());

        engine.submit_for_review(&mut planning, now()).unwrap();
        assert!(engine.ensure_deletable(&planning).is_err());
        engine.approve(&mut planning, "chef", now()).unwrap();
        assert!(engine.ensure_deletable(&planning).is_err());
    }

    #[test]
    fn test_remove_and_unassign() {
        let engine = DayPlanningEngine::new();
        let ctx = create_test_context();
        let mut planning = clean_planning(&engine, &ctx);
        let ra = planning.room_assignments[0].assignment_id.clone();
        let sa = planning.room_assignments[0].staff[0].staff_assignment_id.clone();

        engine
            .apply_edit(
                &mut planning,
                &ctx,
                AssignmentEdit::UnassignStaff {
                    assignment_id: ra.clone(),
                    staff_assignment_id: sa,
                },
                now(),
            )
            .unwrap();
        assert_eq!(planning.conflicts.len(), 1);

        engine
            .apply_edit(
                &mut planning,
                &ctx,
                AssignmentEdit::RemoveRoomAssignment { assignment_id: ra },
                now(),
            )
            .unwrap();
        assert!(planning.room_assignments.is_empty());
        assert!(planning.conflicts.is_empty());
    }
}
