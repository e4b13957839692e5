use super::rules::{
    check_contiguity, check_double_booking, check_min_staffing, check_supervisor_limit,
    ConflictFinding,
};
use crate::domain::planning::{Conflict, ConflictKey, DayPlanning};
use crate::domain::sector::PlanningContext;
use std::collections::HashMap;
use tracing::debug;

type RuleFn = fn(&DayPlanning, &PlanningContext) -> Vec<ConflictFinding>;

// ==========================================
// ConflictDetector - 冲突检测器
// ==========================================
pub struct ConflictDetector {
    rules: Vec<(&'static str, RuleFn)>,
}

/// 一次检测的结果
#[derive(Debug, Clone, Default)]
pub struct ConflictRefresh {
    /// 本次新出现的冲突 (自然键此前不存在)
    pub new_conflicts: Vec<Conflict>,
    /// 本次消失的冲突数
    pub cleared: usize,
}

impl ConflictDetector {
    pub fn new() -> Self {
        Self {
            rules: vec![
                ("contiguity", check_contiguity as RuleFn),
                ("min_staffing", check_min_staffing as RuleFn),
                ("supervisor_limit", check_supervisor_limit as RuleFn),
                ("double_booking", check_double_booking as RuleFn),
            ],
        }
    }

    /// 运行全部规则，按自然键排序
    pub fn evaluate(&self, planning: &DayPlanning, ctx: &PlanningContext) -> Vec<ConflictFinding> {
        let mut findings = Vec::new();
        for (name, rule) in &self.rules {
            let hits = rule(planning, ctx);
            debug!(
                planning_id = %planning.planning_id,
                rule = *name,
                hits = hits.len(),
                "规则检测完成"
            );
            findings.extend(hits);
        }
        findings.sort_by(|a, b| {
            (a.rule, &a.related_room_assignment_id, &a.subject)
                .cmp(&(b.rule, &b.related_room_assignment_id, &b.subject))
        });
        findings.dedup_by(|a, b| {
            a.rule == b.rule
                && a.related_room_assignment_id == b.related_room_assignment_id
                && a.subject == b.subject
        });
        findings
    }

    /// 检测并整体替换日排班的冲突列表
    pub fn refresh(&self, planning: &mut DayPlanning, ctx: &PlanningContext) -> ConflictRefresh {
        let findings = self.evaluate(planning, ctx);
        let previous = std::mem::take(&mut planning.conflicts);
        let (conflicts, refresh) = reconcile(&previous, findings);
        planning.conflicts = conflicts;
        refresh
    }
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// 以自然键合并新旧冲突: 命中的沿用原 ID 与解决状态，其余新建
///
/// 严重度升级 (如 WARNING -> ERROR) 视为新的未解决冲突，旧冲突计入 cleared
pub fn reconcile(
    previous: &[Conflict],
    findings: Vec<ConflictFinding>,
) -> (Vec<Conflict>, ConflictRefresh) {
    let mut by_key: HashMap<ConflictKey, &Conflict> =
        previous.iter().map(|c| (c.natural_key(), c)).collect();

    let mut conflicts = Vec::with_capacity(findings.len());
    let mut new_conflicts = Vec::new();
    let mut escalated = 0;

    for finding in findings {
        let key = ConflictKey {
            rule: finding.rule,
            related_room_assignment_id: finding.related_room_assignment_id.clone(),
            subject: finding.subject.clone(),
        };
        let previous = by_key.remove(&key);
        if previous.is_some_and(|old| finding.severity > old.severity) {
            escalated += 1;
        }
        let conflict = match previous.filter(|old| finding.severity <= old.severity) {
            Some(old) => Conflict {
                conflict_id: old.conflict_id.clone(),
                rule: finding.rule,
                related_room_assignment_id: finding.related_room_assignment_id,
                subject: finding.subject,
                severity: finding.severity,
                message: finding.message,
                is_resolved: old.is_resolved,
                resolved_by: old.resolved_by.clone(),
            },
            None => {
                let conflict = Conflict {
                    conflict_id: uuid::Uuid::new_v4().to_string(),
                    rule: finding.rule,
                    related_room_assignment_id: finding.related_room_assignment_id,
                    subject: finding.subject,
                    severity: finding.severity,
                    message: finding.message,
                    is_resolved: false,
                    resolved_by: None,
                };
                new_conflicts.push(conflict.clone());
                conflict
            }
        };
        conflicts.push(conflict);
    }

    let cleared = by_key.len() + escalated;
    (
        conflicts,
        ConflictRefresh {
            new_conflicts,
            cleared,
        },
    )
}
