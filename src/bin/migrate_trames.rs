// 旧周模板迁移工具
//
// 用法:
//   cargo run --bin migrate-trames -- legacy.json [--dry-run] [--force] [--verbose] [--log-json] [--db path]
//
// 标准输出为迁移结果 JSON；errors 为空时退出码为 0。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::{error, info};

use bloc_planning::config::ConfigManager;
use bloc_planning::db::open_database;
use bloc_planning::importer::{
    load_legacy_records, LegacyFormat, MigrationOptions, MigrationResult, TrameMigrator,
};
use bloc_planning::logging;
use bloc_planning::repository::{CatalogRepository, TrameRepository};

#[derive(Parser)]
#[command(name = "migrate-trames")]
#[command(about = "将旧系统周模板迁移为 TrameModele")]
struct Cli {
    /// 旧数据文件 (.json / .csv)
    input: PathBuf,

    /// 输入格式，缺省按扩展名推断: json, csv
    #[arg(long)]
    format: Option<String>,

    /// 只计算，不写库
    #[arg(long)]
    dry_run: bool,

    /// 覆盖已迁移过的同源模板
    #[arg(long)]
    force: bool,

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

    let result = match run(&cli) {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "迁移中止");
            MigrationResult::aborted(vec![format!("{:#}", e)])
        }
    };

    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{}", json),
        Err(e) => error!(error = %e, "迁移结果序列化失败"),
    }

    if result.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(cli: &Cli) -> Result<MigrationResult> {
    let format = match cli.format.as_deref() {
        Some(raw) => Some(
            LegacyFormat::from_str(raw).ok_or_else(|| anyhow!("不支持的输入格式: {}", raw))?,
        ),
        None => None,
    };

    // dry-run 只读打开已有数据库，不建目录、不建表
    let db_path = cli.db.clone().unwrap_or_else(bloc_planning::default_db_path);
    let conn = open_database(&db_path, cli.dry_run)?;
    let db_path = db_path.display().to_string();
    let conn = Arc::new(Mutex::new(conn));

    let config = ConfigManager::from_connection(conn.clone()).map_err(|e| anyhow!(e.to_string()))?;
    let defaults = config
        .get_migration_defaults()
        .map_err(|e| anyhow!("迁移默认值读取失败: {}", e))?;

    let input = load_legacy_records(&cli.input, format)?;
    info!(
        input = %cli.input.display(),
        records = input.records.len(),
        rejected = input.rejected.len(),
        dry_run = cli.dry_run,
        force = cli.force,
        db = %db_path,
        "开始迁移"
    );

    let migrator = TrameMigrator::new(
        Arc::new(CatalogRepository::from_connection(conn.clone())),
        Arc::new(TrameRepository::from_connection(conn)),
        defaults,
        None,
    );
    let options = MigrationOptions {
        dry_run: cli.dry_run,
        force: cli.force,
    };
    Ok(migrator.migrate(input, options, chrono::Local::now().naive_local()))
}
