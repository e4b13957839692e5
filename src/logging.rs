// ==========================================
// 日志系统初始化
// ==========================================
// 使用 tracing 和 tracing-subscriber
// 支持环境变量配置日志级别
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// 初始化日志系统
///
/// # 环境变量
/// - RUST_LOG: 日志级别过滤器（默认: info）
///   例如: RUST_LOG=debug 或 RUST_LOG=bloc_planning=trace
///
/// # 示例
/// ```no_run
/// use bloc_planning::logging;
/// logging::init();
/// ```
pub fn init() {
    init_with_default("info", false);
}

/// 命令行 --verbose: 未设置 RUST_LOG 时使用 debug
pub fn init_verbose() {
    init_with_default("debug", false);
}

/// 命令行 --log-json: 每条日志输出为一行 JSON，便于批处理任务采集
pub fn init_json(verbose: bool) {
    init_with_default(if verbose { "debug" } else { "info" }, true);
}

/// 初始化测试环境的日志系统
///
/// 使用更详细的日志级别，便于调试
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

fn init_with_default(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // 日志输出到 stderr，stdout 留给结构化结果
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
