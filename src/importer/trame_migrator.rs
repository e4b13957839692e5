// ==========================================
// 手术室排班核心 - 旧周模板迁移
// ==========================================
// 流程:
// 1. 前置检查 (活动类型 / 站点)，失败则整体中止，不触碰数据
// 2. 逐个模板转换: 解析活动类型 (找不到则准备 MIGRATED_* 类型)
// 3. 新活动类型 + 模板 + 时段 + 人员需求在单模板一个事务内写入
// 4. 迁移后校验 (行数统计 / 孤立时段)
// 单个模板失败 (含读取阶段拒收的记录) 记录到 errors，继续处理后续模板
// dry_run: 不写库，计数与警告与实际执行一致
// ==========================================

use crate::config::MigrationDefaults;
use crate::domain::trame::{ActivityType, MigrationProvenance};
use crate::engine::events::{OptionalEventPublisher, PlanningEvent, PlanningEventPublisher};
use crate::importer::error::MigrationError;
use crate::importer::legacy_record::{normalize, LegacyAssignment, LegacyTemplate};
use crate::importer::legacy_source::LegacyInput;
use crate::repository::{CatalogRepository, TrameRepository};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const EVENT_SOURCE: &str = "legacy_migration";

// ==========================================
// 选项与结果
// ==========================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationOptions {
    /// 不写库，只计算
    pub dry_run: bool,
    /// 覆盖已迁移过的同源模板
    pub force: bool,
}

/// 迁移结果 (CLI 以 JSON 输出)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    pub success: bool,
    pub trame_modeles_migrated: usize,
    pub affectations_migrated: usize,
    pub personnel_requis_migrated: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl MigrationResult {
    /// 未处理任何记录即中止
    pub fn aborted(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
            ..Default::default()
        }
    }
}

/// 单个模板的迁移结果
#[derive(Debug, Default)]
struct TemplateOutcome {
    created: bool,
    affectations: usize,
    personnel: usize,
}

// ==========================================
// TrameMigrator - 旧模板迁移器
// ==========================================
pub struct TrameMigrator {
    catalog: Arc<CatalogRepository>,
    trames: Arc<TrameRepository>,
    defaults: MigrationDefaults,
    event_publisher: OptionalEventPublisher,
}

impl TrameMigrator {
    pub fn new(
        catalog: Arc<CatalogRepository>,
        trames: Arc<TrameRepository>,
        defaults: MigrationDefaults,
        event_publisher: Option<Arc<dyn PlanningEventPublisher>>,
    ) -> Self {
        Self {
            catalog,
            trames,
            defaults,
            event_publisher: OptionalEventPublisher::from_option(event_publisher),
        }
    }

    /// 执行迁移
    ///
    /// 读取阶段拒收的记录计入 errors；含拒收记录的模板整体跳过，不做部分迁移
    #[instrument(skip(self, input), fields(dry_run = options.dry_run, force = options.force))]
    pub fn migrate(
        &self,
        input: impl Into<LegacyInput>,
        options: MigrationOptions,
        now: NaiveDateTime,
    ) -> MigrationResult {
        let mut input: LegacyInput = input.into();
        let mut result = MigrationResult::default();
        debug!(records = input.records.len(), rejected = input.rejected.len(), "迁移输入");

        // 1. 前置检查
        match self.preflight() {
            Ok(warnings) => result.warnings.extend(warnings),
            Err(MigrationError::Abort(errors)) => {
                warn!(errors = errors.len(), "迁移前置检查失败，中止");
                return MigrationResult::aborted(errors);
            }
            Err(e) => return MigrationResult::aborted(vec![e.to_string()]),
        }

        result.warnings.append(&mut input.warnings);

        let templates = normalize(std::mem::take(&mut input.records));
        if templates.is_empty() {
            result.warnings.push("没有需要迁移的旧模板".to_string());
            result.errors = input.rejected.iter().map(|e| e.to_string()).collect();
            result.success = result.errors.is_empty();
            return result;
        }
        info!(templates = templates.len(), "开始迁移旧模板");

        // 2. 逐个模板迁移
        let mut seen: HashSet<(&'static str, String)> = HashSet::new();
        let mut pending_activities: Vec<ActivityType> = Vec::new();
        for template in &templates {
            if input.has_rejected(&template.original_id) {
                result.warnings.push(format!(
                    "[模板 {}] 含无法解析的记录，已整体跳过",
                    template.original_id
                ));
                continue;
            }
            if !seen.insert((template.shape, template.original_id.clone())) {
                result.warnings.push(format!(
                    "[模板 {}] 输入中重复出现，已跳过",
                    template.original_id
                ));
                continue;
            }

            let mut warnings = Vec::new();
            match self.migrate_template(template, options, now, &mut pending_activities, &mut warnings) {
                Ok(outcome) => {
                    if outcome.created {
                        result.trame_modeles_migrated += 1;
                    }
                    result.affectations_migrated += outcome.affectations;
                    result.personnel_requis_migrated += outcome.personnel;
                }
                Err(e) => {
                    warn!(original_id = %template.original_id, error = %e, "模板迁移失败");
                    result.errors.push(match e {
                        MigrationError::Record { .. } => e.to_string(),
                        other => MigrationError::Record {
                            original_id: template.original_id.clone(),
                            message: other.to_string(),
                        }
                        .to_string(),
                    });
                }
            }
            result.warnings.extend(warnings);
        }

        result
            .errors
            .extend(input.rejected.iter().map(|e| e.to_string()));

        // 3. 迁移后校验
        if !options.dry_run && result.errors.is_empty() {
            result.warnings.extend(self.post_checks());
        }

        result.success = result.errors.is_empty();
        info!(
            trame_modeles = result.trame_modeles_migrated,
            affectations = result.affectations_migrated,
            personnel_requis = result.personnel_requis_migrated,
            warnings = result.warnings.len(),
            errors = result.errors.len(),
            "迁移完成"
        );
        result
    }

    /// 前置检查；返回非致命警告，致命问题以 Abort 返回
    pub fn preflight(&self) -> Result<Vec<String>, MigrationError> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.catalog.count_activity_types()? == 0 {
            errors.push("没有可用的活动类型，请先创建后再迁移".to_string());
        }
        if self.catalog.count_rooms()? == 0 {
            warnings.push("没有任何手术室，部分模板时段可能无法展开".to_string());
        }
        if self.catalog.count_sites()? == 0 {
            errors.push("没有可用的站点，请先创建后再迁移".to_string());
        }
        debug!(existing_trames = self.trames.count_trames()?, "前置检查完成");

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(MigrationError::Abort(errors))
        }
    }

    fn migrate_template(
        &self,
        template: &LegacyTemplate,
        options: MigrationOptions,
        now: NaiveDateTime,
        pending_activities: &mut Vec<ActivityType>,
        warnings: &mut Vec<String>,
    ) -> Result<TemplateOutcome, MigrationError> {
        let record_error = |message: &str| MigrationError::Record {
            original_id: template.original_id.clone(),
            message: message.to_string(),
        };
        if template.original_id.trim().is_empty() {
            return Err(record_error("缺少原始 ID"));
        }
        if template.name.trim().is_empty() {
            return Err(record_error("缺少模板名称"));
        }
        if template.assignments.iter().any(|a| a.original_id.trim().is_empty()) {
            return Err(record_error("存在缺少原始 ID 的时段"));
        }

        let existing = self
            .trames
            .find_by_original_id(template.shape, &template.original_id)?;
        if existing.is_some() && !options.force {
            warnings.push(format!(
                "[模板 {}] 已迁移过，跳过 (使用 --force 覆盖)",
                template.original_id
            ));
            return Ok(TemplateOutcome::default());
        }

        let mut trame = template.to_trame_header(&self.defaults, now, warnings);
        if let Some(site_id) = &trame.site_id {
            if self.catalog.find_site(site_id)?.is_none() {
                return Err(record_error(&format!("站点 {} 不存在", site_id)));
            }
        }
        trame.provenance = Some(MigrationProvenance {
            migrated_from: template.shape.to_string(),
            original_id: template.original_id.clone(),
            migration_date: now,
        });

        let mut created: Vec<(ActivityType, String)> = Vec::new();
        let known_rooms: HashSet<i64> = self
            .catalog
            .list_all_rooms()?
            .into_iter()
            .map(|r| r.room_id)
            .collect();
        for assignment in &template.assignments {
            let activity_type_id =
                self.resolve_activity(assignment, pending_activities, &mut created)?;
            let affectation = assignment.to_affectation(&activity_type_id, &self.defaults, warnings);
            if let Some(room_id) = affectation.room_id.filter(|id| !known_rooms.contains(id)) {
                warnings.push(format!(
                    "[时段 {}] 手术室 {} 不存在，展开时将被跳过",
                    assignment.original_id, room_id
                ));
            }
            trame.affectations.push(affectation);
        }

        let outcome = TemplateOutcome {
            created: true,
            affectations: trame.affectations.len(),
            personnel: trame
                .affectations
                .iter()
                .map(|a| a.personnel_requis.len())
                .sum(),
        };

        if options.dry_run {
            debug!(original_id = %template.original_id, affectations = outcome.affectations, "dry-run: 模板未写入");
            for (activity, note) in created {
                warnings.push(note);
                pending_activities.push(activity);
            }
            return Ok(outcome);
        }

        let (new_types, notes): (Vec<ActivityType>, Vec<String>) = created.into_iter().unzip();
        self.trames
            .save_migrated(&mut trame, &new_types, existing.is_some())?;
        warnings.extend(notes);
        debug!(
            original_id = %template.original_id,
            trame_modele_id = trame.trame_modele_id,
            affectations = outcome.affectations,
            "模板已迁移"
        );
        self.event_publisher.publish(PlanningEvent::assignment_migrated(
            trame.trame_modele_id,
            &template.original_id,
            outcome.affectations,
            EVENT_SOURCE,
        ));
        Ok(outcome)
    }

    /// 解析活动类型: 名称包含或编码一致；找不到则准备 MIGRATED_* 类型
    ///
    /// 新类型只放入 created，随模板同一事务写入；pending 为 dry-run 中
    /// 前序模板模拟创建的类型，查找时一并考虑
    fn resolve_activity(
        &self,
        assignment: &LegacyAssignment,
        pending: &[ActivityType],
        created: &mut Vec<(ActivityType, String)>,
    ) -> Result<String, MigrationError> {
        let code = assignment.type_code.as_deref();
        let stored = self
            .catalog
            .find_activity_type_by_name_or_code(&assignment.name, code)?;
        let simulated = pending
            .iter()
            .chain(created.iter().map(|(a, _)| a))
            .filter(|a| matches_activity(a, &assignment.name, code))
            .min_by(|a, b| a.activity_type_id.cmp(&b.activity_type_id));

        let found = match (stored, simulated) {
            (Some(s), Some(p)) if p.activity_type_id < s.activity_type_id => Some(p.clone()),
            (Some(s), _) => Some(s),
            (None, p) => p.cloned(),
        };
        if let Some(activity) = found {
            return Ok(activity.activity_type_id);
        }

        let synthetic_code = format!("MIGRATED_{}", assignment.original_id);
        let already_created = pending
            .iter()
            .chain(created.iter().map(|(a, _)| a))
            .any(|a| a.code == synthetic_code)
            || self.catalog.find_activity_type_by_code(&synthetic_code)?.is_some();
        if already_created {
            return Ok(synthetic_code);
        }

        let note = format!(
            "[时段 {}] 未找到活动类型 {}，已创建 {}",
            assignment.original_id, assignment.name, synthetic_code
        );
        let activity = ActivityType {
            activity_type_id: synthetic_code.clone(),
            code: synthetic_code.clone(),
            name: if assignment.name.trim().is_empty() {
                synthetic_code.clone()
            } else {
                assignment.name.trim().to_string()
            },
            category: self.defaults.synthetic_category.clone(),
            description: Some(format!("迁移自 {}", assignment.name)),
        };
        created.push((activity, note));
        Ok(synthetic_code)
    }

    /// 迁移后统计与完整性检查；检查本身失败只记为警告
    fn post_checks(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let stats = (|| -> Result<(i64, i64, i64, i64), MigrationError> {
            Ok((
                self.trames.count_trames()?,
                self.trames.count_affectations()?,
                self.trames.count_personnel_requis()?,
                self.trames.count_orphan_affectations()?,
            ))
        })();
        match stats {
            Ok((trames, affectations, personnel, orphans)) => {
                info!(trames, affectations, personnel, "迁移后统计");
                if orphans > 0 {
                    warnings.push(format!("检测到 {} 个孤立的模板时段", orphans));
                }
            }
            Err(e) => warnings.push(format!("迁移后校验失败: {}", e)),
        }
        warnings
    }
}

fn matches_activity(activity: &ActivityType, name: &str, code: Option<&str>) -> bool {
    let name = name.trim().to_lowercase();
    let code = code.map(str::trim).filter(|c| !c.is_empty());
    (!name.is_empty() && activity.name.to_lowercase().contains(&name))
        || code.is_some_and(|c| activity.code == c)
}
