// ==========================================
// 手术室排班核心 - 引擎层事件发布
// ==========================================
// 职责: 定义领域事件与发布 trait，实现依赖倒置
// 说明: Engine 层定义 trait，通知投递子系统实现适配器
// 事件: conflict_detected / status_changed / assignment_migrated
// ==========================================

use crate::domain::planning::{Conflict, DayPlanning};
use crate::engine::day_planning::StatusChange;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 领域事件类型
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningEventType {
    /// 冲突检测产生了新的冲突
    ConflictDetected,
    /// 日排班状态变更
    StatusChanged,
    /// 旧数据迁移生成了模板
    AssignmentMigrated,
}

impl PlanningEventType {
    pub fn as_str(&self) -> &str {
        match self {
            PlanningEventType::ConflictDetected => "conflict_detected",
            PlanningEventType::StatusChanged => "status_changed",
            PlanningEventType::AssignmentMigrated => "assignment_migrated",
        }
    }
}

/// 领域事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningEvent {
    pub event_type: PlanningEventType,
    /// 日排班 ID (迁移事件为 None)
    pub planning_id: Option<String>,
    pub site_id: Option<String>,
    pub plan_date: Option<NaiveDate>,
    /// 事件来源描述
    pub source: Option<String>,
    pub payload: JsonValue,
}

impl PlanningEvent {
    /// 新冲突事件
    pub fn conflict_detected(planning: &DayPlanning, conflicts: &[Conflict], source: &str) -> Self {
        Self {
            event_type: PlanningEventType::ConflictDetected,
            planning_id: Some(planning.planning_id.clone()),
            site_id: Some(planning.site_id.clone()),
            plan_date: Some(planning.plan_date),
            source: Some(source.to_string()),
            payload: json!({ "conflicts": conflicts }),
        }
    }

    pub fn status_changed(planning: &DayPlanning, change: StatusChange, source: &str) -> Self {
        Self {
            event_type: PlanningEventType::StatusChanged,
            planning_id: Some(planning.planning_id.clone()),
            site_id: Some(planning.site_id.clone()),
            plan_date: Some(planning.plan_date),
            source: Some(source.to_string()),
            payload: json!({ "from": change.from, "to": change.to }),
        }
    }

    /// 单个旧模板迁移完成
    pub fn assignment_migrated(
        trame_modele_id: i64,
        original_id: &str,
        affectations: usize,
        source: &str,
    ) -> Self {
        Self {
            event_type: PlanningEventType::AssignmentMigrated,
            planning_id: None,
            site_id: None,
            plan_date: None,
            source: Some(source.to_string()),
            payload: json!({
                "trameModeleId": trame_modele_id,
                "originalId": original_id,
                "affectations": affectations,
            }),
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 领域事件发布者 Trait
///
/// Engine 层定义，通知投递子系统实现
pub trait PlanningEventPublisher: Send + Sync {
    /// 发布领域事件
    ///
    /// # 返回
    /// - `Ok(delivery_id)`: 投递 ID（如果支持）或空字符串
    /// - `Err`: 发布失败
    fn publish(&self, event: PlanningEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl PlanningEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: PlanningEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - event_type={}, planning_id={:?}",
            event.event_type.as_str(),
            event.planning_id
        );
        Ok(String::new())
    }
}

/// 可选的事件发布者包装
///
/// 发布失败只记录日志，不影响已提交的业务操作
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn PlanningEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn PlanningEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn from_option(publisher: Option<Arc<dyn PlanningEventPublisher>>) -> Self {
        match publisher {
            Some(p) => Self::with_publisher(p),
            None => Self::none(),
        }
    }

    /// 发布事件（如果有发布者）
    pub fn publish(&self, event: PlanningEvent) {
        let Some(publisher) = &self.inner else {
            tracing::debug!(
                "OptionalEventPublisher: 未配置发布者，跳过事件 - event_type={}",
                event.event_type.as_str()
            );
            return;
        };
        let event_type = event.event_type;
        if let Err(e) = publisher.publish(event) {
            tracing::warn!(event_type = event_type.as_str(), error = %e, "领域事件发布失败");
        }
    }

    /// 发布一次日排班变更引起的事件
    pub fn publish_planning_changes(
        &self,
        planning: &DayPlanning,
        status_change: Option<StatusChange>,
        new_conflicts: &[Conflict],
        source: &str,
    ) {
        if let Some(change) = status_change.filter(|c| c.changed()) {
            self.publish(PlanningEvent::status_changed(planning, change, source));
        }
        if !new_conflicts.is_empty() {
            self.publish(PlanningEvent::conflict_detected(planning, new_conflicts, source));
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}
