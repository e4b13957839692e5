use super::calendar::{iso_week_chunks, iso_week_number, WeekChunk};
use crate::domain::planning::{DayPlanning, StaffingRequirement};
use crate::domain::sector::{PlanningContext, RoomId};
use crate::domain::trame::{AffectationModele, TrameModele};
use crate::domain::types::{AssignmentSource, Period};
use crate::engine::day_planning::{AssignmentEdit, DayPlanningEngine, EditOutcome, NewRoomAssignment};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{OptionalEventPublisher, PlanningEventPublisher};
use crate::repository::error::RepositoryResult;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const EVENT_SOURCE: &str = "template_expansion";

// ==========================================
// PlanningStore - 展开所需的日排班存取
// ==========================================
// 由仓储层实现；save_chunk 必须整体成功或整体回滚
pub trait PlanningStore {
    /// 站点在 [from, to] 内的全部日排班
    fn load_plannings(
        &self,
        site_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<DayPlanning>>;

    /// 在一个事务内保存 (新建或乐观锁更新)，成功后递增内存中的 revision
    fn save_chunk(&self, plannings: &mut [DayPlanning]) -> RepositoryResult<()>;
}

// ==========================================
// 展开参数与报告
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionOptions {
    /// 仅计算，不写入
    pub dry_run: bool,
    /// 包含停用的模板与条目
    pub include_inactive: bool,
    /// 单次请求允许的最大天数
    pub max_horizon_days: i64,
}

impl Default for ExpansionOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            include_inactive: false,
            max_horizon_days: 400,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkCounts {
    pub plannings_created: usize,
    pub assignments_created: usize,
    pub staffing_requirements_created: usize,
    /// 同一模板已展开过的键
    pub already_present: usize,
    /// 键已被其他排班 (人工或其他模板) 占用
    pub skipped_occupied: usize,
    /// 同一模板内被更高优先级条目覆盖
    pub superseded: usize,
}

impl ChunkCounts {
    fn add(&mut self, other: &ChunkCounts) {
        self.plannings_created += other.plannings_created;
        self.assignments_created += other.assignments_created;
        self.staffing_requirements_created += other.staffing_requirements_created;
        self.already_present += other.already_present;
        self.skipped_occupied += other.skipped_occupied;
        self.superseded += other.superseded;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkOutcome {
    Succeeded { counts: ChunkCounts },
    Failed { error: String },
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReport {
    pub week: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(flatten)]
    pub outcome: ChunkOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedDate {
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionReport {
    pub trame_modele_id: i64,
    pub site_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub dry_run: bool,
    pub chunks: Vec<ChunkReport>,
    pub totals: ChunkCounts,
    pub skipped_dates: Vec<SkippedDate>,
    pub warnings: Vec<String>,
}

impl ExpansionReport {
    /// 全部切片成功
    pub fn is_complete(&self) -> bool {
        self.chunks
            .iter()
            .all(|c| matches!(c.outcome, ChunkOutcome::Succeeded { .. }))
    }

    pub fn failed_chunks(&self) -> impl Iterator<Item = &ChunkReport> {
        self.chunks
            .iter()
            .filter(|c| matches!(c.outcome, ChunkOutcome::Failed { .. }))
    }

    pub fn was_cancelled(&self) -> bool {
        self.chunks
            .iter()
            .any(|c| c.outcome == ChunkOutcome::Cancelled)
    }
}

/// 一个切片的计算结果 (尚未写入)
struct ChunkWork {
    counts: ChunkCounts,
    touched: Vec<(DayPlanning, EditOutcome)>,
    skipped_dates: Vec<SkippedDate>,
}

// ==========================================
// ExpansionEngine - 模板展开引擎
// ==========================================
pub struct ExpansionEngine {
    day_planning: DayPlanningEngine,
    event_publisher: OptionalEventPublisher,
}

impl ExpansionEngine {
    pub fn new(event_publisher: Option<Arc<dyn PlanningEventPublisher>>) -> Self {
        Self {
            day_planning: DayPlanningEngine::new(),
            event_publisher: OptionalEventPublisher::from_option(event_publisher),
        }
    }

    /// 将模板展开到 [from, to]，按 ISO 周切片提交
    ///
    /// 切片之间检查取消标志；单个切片失败不影响其余切片
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, fields(trame = trame.trame_modele_id, site = %site_id, from = %from, to = %to, dry_run = options.dry_run))]
    pub fn expand(
        &self,
        store: &dyn PlanningStore,
        trame: &TrameModele,
        ctx: &PlanningContext,
        site_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        options: &ExpansionOptions,
        cancel: &AtomicBool,
    ) -> EngineResult<ExpansionReport> {
        validate_request(trame, site_id, from, to, options)?;

        let mut report = ExpansionReport {
            trame_modele_id: trame.trame_modele_id,
            site_id: site_id.to_string(),
            from,
            to,
            dry_run: options.dry_run,
            chunks: Vec::new(),
            totals: ChunkCounts::default(),
            skipped_dates: Vec::new(),
            warnings: Vec::new(),
        };

        let affectations = usable_affectations(trame, ctx, site_id, options, &mut report.warnings);

        for chunk in iso_week_chunks(from, to) {
            if cancel.load(Ordering::SeqCst) {
                report.chunks.push(chunk_report(&chunk, ChunkOutcome::Cancelled));
                continue;
            }

            let outcome = match self.expand_chunk(store, trame, &affectations, ctx, site_id, &chunk) {
                Ok(mut work) => match self.commit_chunk(store, &work, options.dry_run) {
                    Ok(()) => {
                        report.totals.add(&work.counts);
                        report.skipped_dates.append(&mut work.skipped_dates);
                        ChunkOutcome::Succeeded { counts: work.counts }
                    }
                    Err(error) => ChunkOutcome::Failed { error },
                },
                Err(error) => ChunkOutcome::Failed { error },
            };

            match &outcome {
                ChunkOutcome::Failed { error } => {
                    warn!(week = %chunk.label(), error = %error, "展开切片失败")
                }
                ChunkOutcome::Succeeded { counts } => info!(
                    week = %chunk.label(),
                    created = counts.assignments_created,
                    already_present = counts.already_present,
                    skipped_occupied = counts.skipped_occupied,
                    "展开切片完成"
                ),
                ChunkOutcome::Cancelled => {}
            }
            report.chunks.push(chunk_report(&chunk, outcome));
        }

        info!(
            chunks = report.chunks.len(),
            complete = report.is_complete(),
            assignments_created = report.totals.assignments_created,
            "模板展开结束"
        );
        Ok(report)
    }

    fn expand_chunk(
        &self,
        store: &dyn PlanningStore,
        trame: &TrameModele,
        affectations: &[&AffectationModele],
        ctx: &PlanningContext,
        site_id: &str,
        chunk: &WeekChunk,
    ) -> Result<ChunkWork, String> {
        let mut existing: BTreeMap<NaiveDate, DayPlanning> = store
            .load_plannings(site_id, chunk.start, chunk.end)
            .map_err(|e| e.to_string())?
            .into_iter()
            .map(|p| (p.plan_date, p))
            .collect();

        let now = current_time();
        let mut work = ChunkWork {
            counts: ChunkCounts::default(),
            touched: Vec::new(),
            skipped_dates: Vec::new(),
        };

        for date in chunk.dates() {
            if !trame.is_effective_on(date) || !trame.is_weekday_active(date.weekday()) {
                continue;
            }
            let iso_week = iso_week_number(date);
            let matching: Vec<&AffectationModele> = affectations
                .iter()
                .copied()
                .filter(|a| a.jour_semaine == date.weekday())
                .filter(|a| a.effective_week_type(trame.week_type).matches_iso_week(iso_week))
                .collect();
            if matching.is_empty() {
                continue;
            }

            let (mut planning, is_new) = match existing.remove(&date) {
                Some(p) => (p, false),
                None => (DayPlanning::new_draft(site_id, date, now), true),
            };
            if planning.status.is_terminal() {
                work.skipped_dates.push(SkippedDate {
                    date,
                    reason: format!("日排班状态为 {}，不接受展开", planning.status),
                });
                continue;
            }

            let edits = plan_edits(trame, &matching, &planning, &mut work.counts);
            if edits.is_empty() {
                continue;
            }
            let requirement_count: usize = edits
                .iter()
                .map(|e| match e {
                    AssignmentEdit::AddRoomAssignment(ra) => ra.staffing_requirements.len(),
                    _ => 0,
                })
                .sum();

            let outcome = self
                .day_planning
                .apply_edits(&mut planning, ctx, edits, now)
                .map_err(|e| format!("{}: {}", date, e))?;

            work.counts.assignments_created += outcome.created_assignment_ids.len();
            work.counts.staffing_requirements_created += requirement_count;
            if is_new {
                work.counts.plannings_created += 1;
            }
            work.touched.push((planning, outcome));
        }

        Ok(work)
    }

    /// 写入切片并发布事件；dry-run 只丢弃结果
    fn commit_chunk(
        &self,
        store: &dyn PlanningStore,
        work: &ChunkWork,
        dry_run: bool,
    ) -> Result<(), String> {
        if dry_run || work.touched.is_empty() {
            return Ok(());
        }
        let mut plannings: Vec<DayPlanning> = work.touched.iter().map(|(p, _)| p.clone()).collect();
        store.save_chunk(&mut plannings).map_err(|e| e.to_string())?;

        for (planning, outcome) in &work.touched {
            self.event_publisher.publish_planning_changes(
                planning,
                outcome.status_change,
                &outcome.conflicts.new_conflicts,
                EVENT_SOURCE,
            );
        }
        Ok(())
    }
}

fn validate_request(
    trame: &TrameModele,
    site_id: &str,
    from: NaiveDate,
    to: NaiveDate,
    options: &ExpansionOptions,
) -> EngineResult<()> {
    if from > to {
        return Err(EngineError::Validation(format!(
            "展开区间无效: from={} > to={}",
            from, to
        )));
    }
    let days = (to - from).num_days() + 1;
    if days > options.max_horizon_days {
        return Err(EngineError::Validation(format!(
            "展开区间 {} 天超过上限 {} 天",
            days, options.max_horizon_days
        )));
    }
    if !trame.is_active && !options.include_inactive {
        return Err(EngineError::Validation(format!(
            "模板未启用: trame_modele_id={}",
            trame.trame_modele_id
        )));
    }
    if let Some(trame_site) = &trame.site_id {
        if trame_site != site_id {
            return Err(EngineError::Validation(format!(
                "模板属于站点 {}，不能展开到站点 {}",
                trame_site, site_id
            )));
        }
    }
    Ok(())
}

/// 过滤可展开的条目，按优先级降序、ID 升序排列
fn usable_affectations<'a>(
    trame: &'a TrameModele,
    ctx: &PlanningContext,
    site_id: &str,
    options: &ExpansionOptions,
    warnings: &mut Vec<String>,
) -> Vec<&'a AffectationModele> {
    let mut usable = Vec::new();
    for affectation in &trame.affectations {
        if !affectation.is_active && !options.include_inactive {
            continue;
        }
        let Some(room_id) = affectation.room_id else {
            warnings.push(format!(
                "条目 {} 未指定手术室，已跳过",
                affectation.affectation_modele_id
            ));
            continue;
        };
        match ctx.room(room_id) {
            None => warnings.push(format!(
                "条目 {} 的手术室 {} 不存在，已跳过",
                affectation.affectation_modele_id, room_id
            )),
            Some(room) if room.site_id != site_id => warnings.push(format!(
                "条目 {} 的手术室 {} 属于站点 {}，已跳过",
                affectation.affectation_modele_id, room_id, room.site_id
            )),
            Some(room) if !room.is_active => warnings.push(format!(
                "条目 {} 的手术室 {} 已停用，已跳过",
                affectation.affectation_modele_id, room_id
            )),
            Some(_) => usable.push(affectation),
        }
    }
    usable.sort_by(|a, b| {
        b.priorite
            .cmp(&a.priorite)
            .then(a.affectation_modele_id.cmp(&b.affectation_modele_id))
    });
    usable
}

/// 按幂等键生成一天的新增指令
///
/// 同模板已展开的键为空操作；被其他排班占用的键从不覆盖
fn plan_edits(
    trame: &TrameModele,
    matching: &[&AffectationModele],
    planning: &DayPlanning,
    counts: &mut ChunkCounts,
) -> Vec<AssignmentEdit> {
    let mut claimed: Vec<(RoomId, Period)> = Vec::new();
    let mut edits = Vec::new();

    for affectation in matching {
        let Some(room_id) = affectation.room_id else {
            continue;
        };
        let period = affectation.periode;
        let key = (trame.trame_modele_id, room_id, period);

        if claimed
            .iter()
            .any(|(r, p)| *r == room_id && p.overlaps(period))
        {
            counts.superseded += 1;
            continue;
        }
        if planning
            .room_assignments
            .iter()
            .any(|ra| ra.template_key() == Some(key))
        {
            counts.already_present += 1;
            claimed.push((room_id, period));
            continue;
        }
        if planning.assignment_overlapping(room_id, period).is_some() {
            counts.skipped_occupied += 1;
            continue;
        }

        claimed.push((room_id, period));
        edits.push(AssignmentEdit::AddRoomAssignment(NewRoomAssignment {
            room_id,
            period,
            surgeon_id: None,
            activity_type_id: Some(affectation.activity_type_id.clone()),
            source: AssignmentSource::Template,
            trame_modele_id: Some(trame.trame_modele_id),
            affectation_modele_id: Some(affectation.affectation_modele_id),
            staffing_requirements: affectation
                .personnel_requis
                .iter()
                .map(|p| StaffingRequirement {
                    role: p.role_generique,
                    headcount: p.nombre_requis,
                    notes: p.notes.clone(),
                })
                .collect(),
        }));
    }

    edits
}

fn chunk_report(chunk: &WeekChunk, outcome: ChunkOutcome) -> ChunkReport {
    ChunkReport {
        week: chunk.label(),
        start: chunk.start,
        end: chunk.end,
        outcome,
    }
}

fn current_time() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
