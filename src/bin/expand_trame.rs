// 周模板展开工具
//
// 用法:
//   cargo run --bin expand-trame -- --trame 3 --site SITE1 --from 2026-03-02 --to 2026-06-28 [--dry-run] [--log-json]
//
// 标准输出为展开报告 JSON；存在失败或取消的周时退出码非 0。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::Parser;
use tracing::error;

use bloc_planning::api::{ExpansionApi, ExpansionRequest};
use bloc_planning::config::ConfigManager;
use bloc_planning::db::open_database;
use bloc_planning::engine::ExpansionReport;
use bloc_planning::logging;
use bloc_planning::repository::{CatalogRepository, PlanningRepository, TrameRepository};

#[derive(Parser)]
#[command(name = "expand-trame")]
#[command(about = "将周模板展开为日排班")]
struct Cli {
    /// 模板 ID
    #[arg(long)]
    trame: i64,

    /// 站点 ID
    #[arg(long)]
    site: String,

    /// 起始日期 (YYYY-MM-DD，含)
    #[arg(long)]
    from: NaiveDate,

    /// 结束日期 (YYYY-MM-DD，含)
    #[arg(long)]
    to: NaiveDate,

    /// 只计算，不写库
    #[arg(long)]
    dry_run: bool,

    /// 包含停用的模板与条目
    #[arg(long)]
    include_inactive: bool,

    /// 输出调试日志
    #[arg(long, short)]
    verbose: bool,

    /// 日志以 JSON 行输出到 stderr
    #[arg(long)]
    log_json: bool,

    /// 数据库文件路径
    #[arg(long)]
    db: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.log_json {
        logging::init_json(cli.verbose);
    } else if cli.verbose {
        logging::init_verbose();
    } else {
        logging::init();
    }

    match run(&cli) {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => error!(error = %e, "展开报告序列化失败"),
            }
            if report.is_complete() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "展开失败");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExpansionReport> {
    // dry-run 只读打开已有数据库，不建目录、不建表
    let db_path = cli.db.clone().unwrap_or_else(bloc_planning::default_db_path);
    let conn = open_database(&db_path, cli.dry_run)?;
    let conn = Arc::new(Mutex::new(conn));

    let config = ConfigManager::from_connection(conn.clone()).map_err(|e| anyhow!(e.to_string()))?;
    let api = ExpansionApi::new(
        Arc::new(PlanningRepository::from_connection(conn.clone())),
        Arc::new(CatalogRepository::from_connection(conn.clone())),
        Arc::new(TrameRepository::from_connection(conn)),
        Arc::new(config),
        None,
    );

    let request = ExpansionRequest {
        trame_modele_id: cli.trame,
        site_id: cli.site.clone(),
        from: cli.from,
        to: cli.to,
        dry_run: cli.dry_run,
        include_inactive: cli.include_inactive,
    };
    let cancel = AtomicBool::new(false);
    Ok(api.expand(&request, &cancel)?)
}
