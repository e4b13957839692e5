use super::*;
use crate::domain::planning::{DayPlanning, RoomAssignment, StaffAssignment};
use crate::domain::sector::{
    ContiguityMap, OperatingRoom, OperatingSector, PlanningContext, RoomId, SectorRules,
};
use crate::domain::types::{AssignmentSource, ConflictRule, Period, Severity, StaffRole};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

// ==========================================
// 测试辅助函数
// ==========================================

fn create_test_context(rules: SectorRules, room_ids: &[RoomId]) -> PlanningContext {
    let rooms = room_ids
        .iter()
        .map(|&id| OperatingRoom {
            room_id: id,
            site_id: "SITE1".to_string(),
            name: format!("Salle {}", id),
            sector_id: Some(1),
            is_active: true,
        })
        .collect();
    let sector = OperatingSector {
        sector_id: 1,
        site_id: "SITE1".to_string(),
        name: "Hyperaseptique".to_string(),
        color: None,
        rules,
    };
    PlanningContext::new(rooms, vec![sector])
}

fn create_test_planning() -> DayPlanning {
    let now = NaiveDate::from_ymd_opt(2026, 3, 2)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap();
    let mut planning = DayPlanning::new_draft("SITE1", now.date(), now);
    planning.planning_id = "P1".to_string();
    planning
}

fn room_assignment(id: &str, room_id: RoomId, period: Period) -> RoomAssignment {
    RoomAssignment {
        assignment_id: id.to_string(),
        planning_id: "P1".to_string(),
        room_id,
        period,
        surgeon_id: None,
        source: AssignmentSource::Manual,
        trame_modele_id: None,
        affectation_modele_id: None,
        activity_type_id: None,
        staff: Vec::new(),
        staffing_requirements: Vec::new(),
    }
}

fn staff(id: &str, staff_id: &str, role: StaffRole) -> StaffAssignment {
    StaffAssignment {
        staff_assignment_id: id.to_string(),
        staff_id: staff_id.to_string(),
        role,
        is_primary: false,
    }
}

// ==========================================
// 最低配员
// ==========================================

#[test]
fn test_single_warning_for_understaffed_room() {
    let rules = SectorRules {
        min_per_role_type_per_room: BTreeMap::from([(StaffRole::Iade, 1)]),
        ..Default::default()
    };
    let ctx = create_test_context(rules, &[1, 2]);
    let mut planning = create_test_planning();

    let mut ra1 = room_assignment("RA1", 1, Period::Morning);
    ra1.staff.push(staff("S1", "iade-1", StaffRole::Iade));
    let ra2 = room_assignment("RA2", 2, Period::Morning);
    planning.room_assignments = vec![ra1, ra2];

    let detector = ConflictDetector::new();
    detector.refresh(&mut planning, &ctx);

    assert_eq!(planning.conflicts.len(), 1);
    let conflict = &planning.conflicts[0];
    assert_eq!(conflict.rule, ConflictRule::MinStaffing);
    assert_eq!(conflict.severity, Severity::Warning);
    assert_eq!(conflict.related_room_assignment_id.as_deref(), Some("RA2"));
}

#[test]
fn test_missing_mandatory_role_is_error() {
    let rules = SectorRules {
        min_per_role_type_per_room: BTreeMap::from([(StaffRole::Iade, 2)]),
        mandatory_roles: BTreeSet::from([StaffRole::Mar, StaffRole::Iade]),
        ..Default::default()
    };
    let ctx = create_test_context(rules, &[1]);
    let mut planning = create_test_planning();
    let mut ra = room_assignment("RA1", 1, Period::Morning);
    ra.staff.push(staff("S1", "iade-1", StaffRole::Iade));
    planning.room_assignments = vec![ra];

    let findings = ConflictDetector::new().evaluate(&planning, &ctx);

    // MAR 完全缺失 -> ERROR；IADE 1/2 -> WARNING
    assert_eq!(findings.len(), 2);
    let mar = findings
        .iter()
        .find(|f| f.subject.as_deref() == Some("MAR"))
        .unwrap();
    assert_eq!(mar.severity, Severity::Error);
    let iade = findings
        .iter()
        .find(|f| f.subject.as_deref() == Some("IADE"))
        .unwrap();
    assert_eq!(iade.severity, Severity::Warning);
}

// ==========================================
// 相邻性
// ==========================================

#[test]
fn test_non_contiguous_supervision_flags_outlier_room() {
    let rules = SectorRules {
        require_contiguous_rooms: true,
        contiguity_map: Some(ContiguityMap::from([
            (1, vec![2, 3]),
            (2, vec![1, 4]),
            (3, vec![1]),
            (4, vec![2]),
        ])),
        ..Default::default()
    };
    let ctx = create_test_context(rules, &[1, 2, 3, 4]);
    let mut planning = create_test_planning();

    // 同一 MAR 监管直接相邻的 1、2
    let mut ra1 = room_assignment("RA1", 1, Period::Morning);
    ra1.staff.push(staff("S1", "mar-1", StaffRole::Mar));
    let mut ra2 = room_assignment("RA2", 2, Period::Morning);
    ra2.staff.push(staff("S2", "mar-1", StaffRole::Mar));
    planning.room_assignments = vec![ra1, ra2];
    assert!(ConflictDetector::new().evaluate(&planning, &ctx).is_empty());

    // 3 与 4: 诱导子图不连通
    let mut ra3 = room_assignment("RA3", 3, Period::Afternoon);
    ra3.staff.push(staff("S3", "mar-2", StaffRole::Mar));
    let mut ra4 = room_assignment("RA4", 4, Period::Afternoon);
    ra4.staff.push(staff("S4", "mar-2", StaffRole::Mar));
    planning.room_assignments.push(ra3);
    planning.room_assignments.push(ra4);

    let findings = ConflictDetector::new().evaluate(&planning, &ctx);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].rule, ConflictRule::RoomContiguity);
    assert_eq!(findings[0].severity, Severity::Error);
    // 并列时以最小 roomId 所在分量为基准，房间 4 为违规排班
    assert_eq!(findings[0].related_room_assignment_id.as_deref(), Some("RA4"));
}

#[test]
fn test_missing_map_respects_enforce_flag() {
    let mut planning = create_test_planning();
    let mut ra1 = room_assignment("RA1", 1, Period::Morning);
    ra1.staff.push(staff("S1", "mar-1", StaffRole::Mar));
    let mut ra2 = room_assignment("RA2", 2, Period::Morning);
    ra2.staff.push(staff("S2", "mar-1", StaffRole::Mar));
    planning.room_assignments = vec![ra1, ra2];

    let lenient = SectorRules {
        require_contiguous_rooms: true,
        ..Default::default()
    };
    let ctx = create_test_context(lenient, &[1, 2]);
    assert!(ConflictDetector::new().evaluate(&planning, &ctx).is_empty());

    let strict = SectorRules {
        require_contiguous_rooms: true,
        enforce_contiguity: true,
        ..Default::default()
    };
    let ctx = create_test_context(strict, &[1, 2]);
    let findings = ConflictDetector::new().evaluate(&planning, &ctx);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].related_room_assignment_id.as_deref(), Some("RA2"));
}

// ==========================================
// 监管上限 / 重复排班
// ==========================================

#[test]
fn test_supervisor_limit_is_global_error() {
    let rules = SectorRules {
        max_rooms_per_supervisor: Some(2),
        ..Default::default()
    };
    let ctx = create_test_context(rules, &[1, 2, 3]);
    let mut planning = create_test_planning();
    for (i, room) in [1, 2, 3].iter().enumerate() {
        let mut ra = room_assignment(&format!("RA{}", room), *room, Period::Morning);
        ra.staff.push(staff(&format!("S{}", i), "mar-1", StaffRole::Mar));
        planning.room_assignments.push(ra);
    }

    let findings = ConflictDetector::new().evaluate(&planning, &ctx);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].rule, ConflictRule::SupervisorRoomLimit);
    assert!(findings[0].related_room_assignment_id.is_none());
    assert_eq!(findings[0].subject.as_deref(), Some("mar-1@MORNING"));
}

#[test]
fn test_full_day_counts_in_both_slots() {
    let rules = SectorRules {
        max_rooms_per_supervisor: Some(1),
        ..Default::default()
    };
    let ctx = create_test_context(rules, &[1, 2]);
    let mut planning = create_test_planning();
    let mut ra1 = room_assignment("RA1", 1, Period::FullDay);
    ra1.staff.push(staff("S1", "mar-1", StaffRole::Mar));
    let mut ra2 = room_assignment("RA2", 2, Period::Afternoon);
    ra2.staff.push(staff("S2", "mar-1", StaffRole::Mar));
    planning.room_assignments = vec![ra1, ra2];

    let findings = ConflictDetector::new().evaluate(&planning, &ctx);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].subject.as_deref(), Some("mar-1@AFTERNOON"));
}

#[test]
fn test_double_booking_of_nurse_and_surgeon() {
    let ctx = create_test_context(SectorRules::default(), &[1, 2]);
    let mut planning = create_test_planning();
    let mut ra1 = room_assignment("RA1", 1, Period::FullDay);
    ra1.staff.push(staff("S1", "iade-1", StaffRole::Iade));
    ra1.surgeon_id = Some("chir-1".to_string());
    let mut ra2 = room_assignment("RA2", 2, Period::Morning);
    ra2.staff.push(staff("S2", "iade-1", StaffRole::Iade));
    ra2.surgeon_id = Some("chir-1".to_string());
    planning.room_assignments = vec![ra1, ra2];

    let findings = ConflictDetector::new().evaluate(&planning, &ctx);
    let subjects: Vec<_> = findings
        .iter()
        .filter(|f| f.rule == ConflictRule::DoubleBooking)
        .map(|f| f.subject.clone().unwrap())
        .collect();
    assert_eq!(subjects, vec!["staff:iade-1", "surgeon:chir-1"]);
}

#[test]
fn test_supervision_across_rooms_is_not_double_booking() {
    let ctx = create_test_context(SectorRules::default(), &[1, 2]);
    let mut planning = create_test_planning();
    let mut ra1 = room_assignment("RA1", 1, Period::Morning);
    ra1.staff.push(staff("S1", "mar-1", StaffRole::Mar));
    let mut ra2 = room_assignment("RA2", 2, Period::Morning);
    ra2.staff.push(staff("S2", "mar-1", StaffRole::Mar));
    planning.room_assignments = vec![ra1, ra2];

    assert!(ConflictDetector::new().evaluate(&planning, &ctx).is_empty());
}

// ==========================================
// 幂等与解决状态保留
// ==========================================

#[test]
fn test_refresh_is_idempotent_and_keeps_resolution() {
    let rules = SectorRules {
        min_per_role_type_per_room: BTreeMap::from([(StaffRole::Iade, 1)]),
        max_rooms_per_supervisor: Some(1),
        ..Default::default()
    };
    let ctx = create_test_context(rules, &[1, 2]);
    let mut planning = create_test_planning();
    let mut ra1 = room_assignment("RA1", 1, Period::Morning);
    ra1.staff.push(staff("S1", "mar-1", StaffRole::Mar));
    let mut ra2 = room_assignment("RA2", 2, Period::Morning);
    ra2.staff.push(staff("S2", "mar-1", StaffRole::Mar));
    planning.room_assignments = vec![ra1, ra2];

    let detector = ConflictDetector::new();
    let first = detector.refresh(&mut planning, &ctx);
    assert_eq!(first.new_conflicts.len(), 3);
    planning.conflicts[0].is_resolved = true;
    planning.conflicts[0].resolved_by = Some("cadre".to_string());
    let snapshot = planning.conflicts.clone();

    let second = detector.refresh(&mut planning, &ctx);
    assert!(second.new_conflicts.is_empty());
    assert_eq!(second.cleared, 0);
    assert_eq!(planning.conflicts, snapshot);

    // 补齐 IADE 后对应冲突消失，其余保持原 ID
    planning.room_assignments[0]
        .staff
        .push(staff("S3", "iade-1", StaffRole::Iade));
    let third = detector.refresh(&mut planning, &ctx);
    assert_eq!(third.cleared, 1);
    assert_eq!(planning.conflicts.len(), 2);
    for conflict in &planning.conflicts {
        assert!(snapshot.iter().any(|c| c.conflict_id == conflict.conflict_id));
    }
}

#[test]
fn test_escalated_conflict_loses_resolution() {
    let rules = SectorRules {
        min_per_role_type_per_room: BTreeMap::from([(StaffRole::Mar, 2)]),
        mandatory_roles: BTreeSet::from([StaffRole::Mar]),
        ..Default::default()
    };
    let ctx = create_test_context(rules, &[1]);
    let mut planning = create_test_planning();
    let mut ra = room_assignment("RA1", 1, Period::Morning);
    ra.staff.push(staff("S1", "mar-1", StaffRole::Mar));
    planning.room_assignments = vec![ra];

    let detector = ConflictDetector::new();
    detector.refresh(&mut planning, &ctx);
    assert_eq!(planning.conflicts.len(), 1);
    assert_eq!(planning.conflicts[0].severity, Severity::Warning);
    planning.conflicts[0].is_resolved = true;
    planning.conflicts[0].resolved_by = Some("cadre".to_string());
    let acknowledged_id = planning.conflicts[0].conflict_id.clone();

    // 最后一名 MAR 离开: 同一自然键升级为 ERROR，不继承已解决
    planning.room_assignments[0].staff.clear();
    let refresh = detector.refresh(&mut planning, &ctx);
    assert_eq!(refresh.new_conflicts.len(), 1);
    assert_eq!(refresh.cleared, 1);
    let conflict = &planning.conflicts[0];
    assert_eq!(conflict.severity, Severity::Error);
    assert!(!conflict.is_resolved);
    assert!(conflict.resolved_by.is_none());
    assert_ne!(conflict.conflict_id, acknowledged_id);
    assert_eq!(planning.unresolved_error_count(), 1);

    // 降级 (ERROR -> WARNING) 保留原 ID 与处理状态
    planning.conflicts[0].is_resolved = true;
    let escalated_id = planning.conflicts[0].conflict_id.clone();
    planning.room_assignments[0]
        .staff
        .push(staff("S2", "mar-2", StaffRole::Mar));
    let refresh = detector.refresh(&mut planning, &ctx);
    assert!(refresh.new_conflicts.is_empty());
    assert_eq!(planning.conflicts[0].severity, Severity::Warning);
    assert!(planning.conflicts[0].is_resolved);
    assert_eq!(planning.conflicts[0].conflict_id, escalated_id);
}
