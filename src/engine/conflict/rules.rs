use crate::domain::planning::DayPlanning;
use crate::domain::sector::{PlanningContext, RoomId, SectorId};
use crate::domain::types::{ConflictRule, Period, Severity, StaffRole};
use crate::engine::contiguity::RoomGraph;
use std::collections::{BTreeMap, BTreeSet};

/// 单条规则命中结果 (尚未分配冲突 ID)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictFinding {
    pub rule: ConflictRule,
    pub related_room_assignment_id: Option<String>,
    pub subject: Option<String>,
    pub severity: Severity,
    pub message: String,
}

/// 监管分组: (人员, 时间槽) -> [(手术室, 排班ID)]
fn supervised_rooms(planning: &DayPlanning) -> BTreeMap<(String, Period), Vec<(RoomId, String)>> {
    let mut groups: BTreeMap<(String, Period), Vec<(RoomId, String)>> = BTreeMap::new();
    for ra in &planning.room_assignments {
        for staff in ra.staff.iter().filter(|s| s.role.is_supervising()) {
            for &slot in ra.period.slots() {
                let entry = groups.entry((staff.staff_id.clone(), slot)).or_default();
                if !entry.iter().any(|(_, id)| id == &ra.assignment_id) {
                    entry.push((ra.room_id, ra.assignment_id.clone()));
                }
            }
        }
    }
    groups
}

// ==========================================
// 规则1: 手术室相邻性
// ==========================================
// 同一监管人员同一时段在某区域内的手术室必须连通；
// 最大连通分量之外的排班为违规排班
pub fn check_contiguity(planning: &DayPlanning, ctx: &PlanningContext) -> Vec<ConflictFinding> {
    let mut findings: BTreeMap<String, ConflictFinding> = BTreeMap::new();

    for ((staff_id, slot), rooms) in supervised_rooms(planning) {
        // 按区域拆分
        let mut by_sector: BTreeMap<SectorId, Vec<(RoomId, String)>> = BTreeMap::new();
        for (room_id, assignment_id) in rooms {
            if let Some(sector) = ctx.sector_of(room_id) {
                by_sector
                    .entry(sector.sector_id)
                    .or_default()
                    .push((room_id, assignment_id));
            }
        }

        for (sector_id, entries) in by_sector {
            let Some(sector) = ctx.sectors.get(&sector_id) else {
                continue;
            };
            let rules = &sector.rules;
            if !rules.require_contiguous_rooms {
                continue;
            }
            let graph = match (&rules.contiguity_map, rules.enforce_contiguity) {
                (Some(map), _) => RoomGraph::from_map(map),
                (None, true) => RoomGraph::default(),
                (None, false) => continue, // 未配置相邻图且不强制: 不受约束
            };

            let room_ids: Vec<RoomId> = entries.iter().map(|(r, _)| *r).collect();
            let components = graph.induced_components(&room_ids);
            if components.len() <= 1 {
                continue;
            }

            // 最大分量 (并列取最小 roomId 所在分量) 视为基准
            let main = components
                .iter()
                .fold(&components[0], |best, c| if c.len() > best.len() { c } else { best });

            for (room_id, assignment_id) in &entries {
                if main.contains(room_id) {
                    continue;
                }
                findings
                    .entry(assignment_id.clone())
                    .or_insert_with(|| ConflictFinding {
                        rule: ConflictRule::RoomContiguity,
                        related_room_assignment_id: Some(assignment_id.clone()),
                        subject: None,
                        severity: Severity::Error,
                        message: format!(
                            "监管人员 {} 在 {} 时段监管的手术室 {} 与区域 {} 内其他监管手术室 {:?} 不相邻",
                            staff_id, slot, room_id, sector.name, main
                        ),
                    });
            }
        }
    }

    findings.into_values().collect()
}

// ==========================================
// 规则2: 每间手术室最低配员
// ==========================================
// 人数不足 -> WARNING；强制角色完全缺失 -> ERROR
pub fn check_min_staffing(planning: &DayPlanning, ctx: &PlanningContext) -> Vec<ConflictFinding> {
    let mut findings = Vec::new();

    for ra in &planning.room_assignments {
        let Some(sector) = ctx.sector_of(ra.room_id) else {
            continue;
        };
        let rules = &sector.rules;

        // 强制角色隐含最低 1 人
        let mut minimums: BTreeMap<StaffRole, u32> = rules.min_per_role_type_per_room.clone();
        for role in &rules.mandatory_roles {
            let min = minimums.entry(*role).or_insert(1);
            *min = (*min).max(1);
        }

        for (role, min) in minimums {
            if min == 0 {
                continue;
            }
            let count = ra.staff_count(role);
            if count >= min {
                continue;
            }
            let severity = if count == 0 && rules.mandatory_roles.contains(&role) {
                Severity::Error
            } else {
                Severity::Warning
            };
            findings.push(ConflictFinding {
                rule: ConflictRule::MinStaffing,
                related_room_assignment_id: Some(ra.assignment_id.clone()),
                subject: Some(role.to_db_str().to_string()),
                severity,
                message: format!(
                    "手术室 {} ({}) 角色 {} 人数不足: 已排 {}，至少 {}",
                    ra.room_id, ra.period, role, count, min
                ),
            });
        }
    }

    findings
}

// ==========================================
// 规则3: 监管手术室数上限
// ==========================================
// 同一时段监管的手术室数不得超过相关区域中最严格的上限
pub fn check_supervisor_limit(
    planning: &DayPlanning,
    ctx: &PlanningContext,
) -> Vec<ConflictFinding> {
    let mut findings = Vec::new();

    for ((staff_id, slot), rooms) in supervised_rooms(planning) {
        let limit = rooms
            .iter()
            .filter_map(|(room_id, _)| ctx.sector_of(*room_id))
            .filter_map(|s| s.rules.max_rooms_per_supervisor)
            .min();
        let Some(limit) = limit else {
            continue;
        };

        let count = rooms.len() as u32;
        if count > limit {
            let room_ids: BTreeSet<RoomId> = rooms.iter().map(|(r, _)| *r).collect();
            findings.push(ConflictFinding {
                rule: ConflictRule::SupervisorRoomLimit,
                related_room_assignment_id: None,
                subject: Some(format!("{}@{}", staff_id, slot)),
                severity: Severity::Error,
                message: format!(
                    "监管人员 {} 在 {} 时段监管 {} 间手术室 {:?}，超过上限 {}",
                    staff_id, slot, count, room_ids, limit
                ),
            });
        }
    }

    findings
}

// ==========================================
// 规则4: 重复排班
// ==========================================
// 同一人员 (含主刀医生) 在时段重叠的两个排班中出现；
// 双方均为监管角色时属于监管，不计入本规则
pub fn check_double_booking(planning: &DayPlanning, _ctx: &PlanningContext) -> Vec<ConflictFinding> {
    // 参与者 -> [(排班序号, 时段, 是否监管)]
    let mut participants: BTreeMap<String, Vec<(usize, Period, bool)>> = BTreeMap::new();
    for (idx, ra) in planning.room_assignments.iter().enumerate() {
        for staff in &ra.staff {
            participants
                .entry(format!("staff:{}", staff.staff_id))
                .or_default()
                .push((idx, ra.period, staff.role.is_supervising()));
        }
        if let Some(surgeon_id) = &ra.surgeon_id {
            participants
                .entry(format!("surgeon:{}", surgeon_id))
                .or_default()
                .push((idx, ra.period, false));
        }
    }

    let mut findings = Vec::new();
    for (participant, entries) in participants {
        let mut rooms: BTreeSet<RoomId> = BTreeSet::new();
        for (i, a) in entries.iter().enumerate() {
            for b in entries.iter().skip(i + 1) {
                if a.0 == b.0 || !a.1.overlaps(b.1) || (a.2 && b.2) {
                    continue;
                }
                rooms.insert(planning.room_assignments[a.0].room_id);
                rooms.insert(planning.room_assignments[b.0].room_id);
            }
        }
        if rooms.is_empty() {
            continue;
        }
        findings.push(ConflictFinding {
            rule: ConflictRule::DoubleBooking,
            related_room_assignment_id: None,
            subject: Some(participant.clone()),
            severity: Severity::Error,
            message: format!("{} 在时段重叠的手术室 {:?} 中被重复排班", participant, rooms),
        });
    }

    findings
}
