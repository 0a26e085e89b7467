// ==========================================
// 价格目录系统 - 日志初始化
// ==========================================
// RUST_LOG 控制过滤器；PRICE_CATALOG_LOG_FORMAT 选择输出格式
// perf / slow_sql 两个 target 由 crate::perf 写出
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info,perf=info,slow_sql=warn";
const TEST_FILTER: &str = "price_catalog=debug,perf=debug";

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 人读格式（默认）
    Pretty,
    /// 单行 JSON，便于采集
    Json,
}

impl LogFormat {
    /// 解析 PRICE_CATALOG_LOG_FORMAT；无法识别时退回 Pretty
    pub fn from_env() -> Self {
        match std::env::var("PRICE_CATALOG_LOG_FORMAT") {
            Ok(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

fn env_filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// 初始化进程级日志
///
/// ```no_run
/// price_catalog::logging::init();
/// ```
pub fn init() {
    let filter = env_filter_or(DEFAULT_FILTER);
    // 重复初始化时静默忽略
    let _ = match LogFormat::from_env() {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init(),
        LogFormat::Pretty => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_line_number(true)
            .try_init(),
    };
}

/// 测试用日志：输出到测试捕获器，可多次调用
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(env_filter_or(TEST_FILTER))
        .with_test_writer()
        .try_init();
}
