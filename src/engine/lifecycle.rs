// ==========================================
// 手术室排班核心 - 日排班状态机
// ==========================================
// 唯一的状态迁移表；调用方只通过 PlanningAction 驱动状态
// 终态: LOCKED / ARCHIVED
// ==========================================

use crate::domain::types::PlanningStatus;
use crate::engine::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 状态动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanningAction {
    SubmitForReview, // 提交审核 / 重新提交
    Approve,         // 审核通过 (受 ERROR 冲突门控)
    Reject,          // 驳回
    Edit,            // 排班编辑 (自动迁移)
    Lock,            // 管理锁定
    Archive,         // 归档
}

impl fmt::Display for PlanningAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanningAction::SubmitForReview => "SUBMIT_FOR_REVIEW",
            PlanningAction::Approve => "APPROVE",
            PlanningAction::Reject => "REJECT",
            PlanningAction::Edit => "EDIT",
            PlanningAction::Lock => "LOCK",
            PlanningAction::Archive => "ARCHIVE",
        };
        write!(f, "{}", s)
    }
}

/// 迁移表: (当前状态, 动作) -> 目标状态
///
/// 编辑在 DRAFT / VALIDATION_REQUESTED / MODIFIED_AFTER_VALIDATION 中保持原状态，
/// 在 VALIDATED 中迁移到 MODIFIED_AFTER_VALIDATION
pub fn next_status(from: PlanningStatus, action: PlanningAction) -> Option<PlanningStatus> {
    use PlanningAction as A;
    use PlanningStatus as S;

    match (from, action) {
        (S::Draft, A::SubmitForReview) => Some(S::ValidationRequested),
        (S::ValidationRequested, A::Approve) => Some(S::Validated),
        (S::ValidationRequested, A::Reject) => Some(S::Draft),
        (S::ModifiedAfterValidation, A::SubmitForReview) => Some(S::ValidationRequested),
        (S::ModifiedAfterValidation, A::Approve) => Some(S::Validated),
        (S::Validated | S::ModifiedAfterValidation, A::Lock) => Some(S::Locked),

        (S::Draft, A::Edit) => Some(S::Draft),
        (S::ValidationRequested, A::Edit) => Some(S::ValidationRequested),
        (S::Validated, A::Edit) => Some(S::ModifiedAfterValidation),
        (S::ModifiedAfterValidation, A::Edit) => Some(S::ModifiedAfterValidation),

        (s, A::Archive) if !s.is_terminal() => Some(S::Archived),
        _ => None,
    }
}

/// 校验并计算迁移目标
///
/// 终态 -> PlanningLocked；表中无此迁移 -> InvalidStateTransition
pub fn transition(
    planning_id: &str,
    from: PlanningStatus,
    action: PlanningAction,
) -> EngineResult<PlanningStatus> {
    if from.is_terminal() {
        return Err(EngineError::PlanningLocked {
            planning_id: planning_id.to_string(),
            status: from,
        });
    }
    next_status(from, action).ok_or_else(|| EngineError::InvalidStateTransition {
        from,
        action: action.to_string(),
    })
}

/// 动作是否受 ERROR 冲突门控
pub fn requires_conflict_gate(action: PlanningAction) -> bool {
    action == PlanningAction::Approve
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlanningAction as A;
    use PlanningStatus as S;

    #[test]
    fn test_review_cycle() {
        assert_eq!(next_status(S::Draft, A::SubmitForReview), Some(S::ValidationRequested));
        assert_eq!(next_status(S::ValidationRequested, A::Reject), Some(S::Draft));
        assert_eq!(next_status(S::ValidationRequested, A::Approve), Some(S::Validated));
        assert_eq!(next_status(S::Draft, A::Approve), None);
    }

    #[test]
    fn test_edit_after_validation_never_returns_to_draft() {
        assert_eq!(next_status(S::Validated, A::Edit), Some(S::ModifiedAfterValidation));
        assert_eq!(
            next_status(S::ModifiedAfterValidation, A::Edit),
            Some(S::ModifiedAfterValidation)
        );
        assert_eq!(
            next_status(S::ModifiedAfterValidation, A::SubmitForReview),
            Some(S::ValidationRequested)
        );
        assert_eq!(next_status(S::ModifiedAfterValidation, A::Approve), Some(S::Validated));
    }

    #[test]
    fn test_lock_only_after_validation() {
        assert_eq!(next_status(S::Validated, A::Lock), Some(S::Locked));
        assert_eq!(next_status(S::ModifiedAfterValidation, A::Lock), Some(S::Locked));
        assert_eq!(next_status(S::Draft, A::Lock), None);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for action in [A::SubmitForReview, A::Approve, A::Edit, A::Lock, A::Archive] {
            assert!(matches!(
                transition("P1", S::Locked, action),
                Err(EngineError::PlanningLocked { .. })
            ));
            assert!(matches!(
                transition("P1", S::Archived, action),
                Err(EngineError::PlanningLocked { .. })
            ));
        }
    }

    #[test]
    fn test_archive_from_any_open_state() {
        for from in [
            S::Draft,
            S::ValidationRequested,
            S::Validated,
            S::ModifiedAfterValidation,
        ] {
            assert_eq!(transition("P1", from, A::Archive), Ok(S::Archived));
        }
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = transition("P1", S::Draft, A::Reject).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidStateTransition {
                from: S::Draft,
                action: "REJECT".to_string()
            }
        );
    }
}
