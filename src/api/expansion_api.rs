// ==========================================
// 手术室排班核心 - 模板展开 API
// ==========================================
// 职责: 读取模板与目录，调用展开引擎，按 ISO 周写入日排班
// 取消: 调用方持有 cancel 标志，在切片之间生效
// ==========================================

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::config::config_manager::ConfigManager;
use crate::engine::events::PlanningEventPublisher;
use crate::engine::expansion::{ExpansionEngine, ExpansionOptions, ExpansionReport};
use crate::repository::catalog_repo::CatalogRepository;
use crate::repository::planning_repo::PlanningRepository;
use crate::repository::trame_repo::TrameRepository;

/// 展开请求
#[derive(Debug, Clone)]
pub struct ExpansionRequest {
    pub trame_modele_id: i64,
    pub site_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub dry_run: bool,
    pub include_inactive: bool,
}

pub struct ExpansionApi {
    planning_repo: Arc<PlanningRepository>,
    catalog_repo: Arc<CatalogRepository>,
    trame_repo: Arc<TrameRepository>,
    config_manager: Arc<ConfigManager>,
    engine: ExpansionEngine,
}

impl ExpansionApi {
    pub fn new(
        planning_repo: Arc<PlanningRepository>,
        catalog_repo: Arc<CatalogRepository>,
        trame_repo: Arc<TrameRepository>,
        config_manager: Arc<ConfigManager>,
        event_publisher: Option<Arc<dyn PlanningEventPublisher>>,
    ) -> Self {
        Self {
            planning_repo,
            catalog_repo,
            trame_repo,
            config_manager,
            engine: ExpansionEngine::new(event_publisher),
        }
    }

    /// 展开模板
    ///
    /// 返回的报告逐周列出成功/失败/取消；单周失败不算整体错误
    pub fn expand(&self, request: &ExpansionRequest, cancel: &AtomicBool) -> ApiResult<ExpansionReport> {
        let trame = self
            .trame_repo
            .find_by_id(request.trame_modele_id)?
            .ok_or_else(|| {
                ApiError::NotFound(format!("模板(id={})不存在", request.trame_modele_id))
            })?;
        if self.catalog_repo.find_site(&request.site_id)?.is_none() {
            return Err(ApiError::NotFound(format!(
                "站点(id={})不存在",
                request.site_id
            )));
        }

        let max_horizon_days = self
            .config_manager
            .get_max_horizon_days()
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;
        let options = ExpansionOptions {
            dry_run: request.dry_run,
            include_inactive: request.include_inactive,
            max_horizon_days,
        };

        let ctx = self.catalog_repo.load_planning_context(&request.site_id)?;
        let report = self.engine.expand(
            self.planning_repo.as_ref(),
            &trame,
            &ctx,
            &request.site_id,
            request.from,
            request.to,
            &options,
            cancel,
        )?;

        info!(
            trame_modele_id = request.trame_modele_id,
            site_id = %request.site_id,
            complete = report.is_complete(),
            failed_chunks = report.failed_chunks().count(),
            "模板展开请求完成"
        );
        Ok(report)
    }
}
