// ==========================================
// 价格目录系统 - 性能观测
// ==========================================
// SQL 计数 + 慢查询日志，按操作（可带供应商）汇总
// 开关:
// - Debug 默认开启，Release 默认关闭
// - PRICE_CATALOG_PERF_SQL=1 强制开启
// - PRICE_CATALOG_SLOW_SQL_MS=50 慢 SQL 阈值（毫秒）
// ==========================================

use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

const SQL_LOG_MAX_CHARS: usize = 420;

static SQL_TRACING: AtomicBool = AtomicBool::new(false);
static SLOW_SQL_MS: AtomicU64 = AtomicU64::new(0);

/// 线程内计数器；只在存在活动 PerfGuard 时累加
#[derive(Default)]
struct Counters {
    depth: Cell<u32>,
    statements: Cell<u64>,
    slow_statements: Cell<u64>,
}

impl Counters {
    fn active(&self) -> bool {
        self.depth.get() > 0
    }

    fn bump(cell: &Cell<u64>) {
        cell.set(cell.get().saturating_add(1));
    }

    fn snapshot(&self) -> (u64, u64) {
        (self.statements.get(), self.slow_statements.get())
    }
}

thread_local! {
    static COUNTERS: Counters = Counters::default();
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn shorten(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SQL_LOG_MAX_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(SQL_LOG_MAX_CHARS).collect();
    cut.push('…');
    cut
}

/// 在连接上安装 trace/profile 回调
pub fn install_sqlite_tracing(conn: &mut Connection) {
    let enabled = env_flag("PRICE_CATALOG_PERF_SQL").unwrap_or(cfg!(debug_assertions));
    SQL_TRACING.store(enabled, Ordering::Relaxed);

    if !enabled {
        conn.trace(None);
        conn.profile(None);
        return;
    }

    let default_ms = if cfg!(debug_assertions) { 50 } else { 200 };
    let slow_ms = std::env::var("PRICE_CATALOG_SLOW_SQL_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_ms);
    SLOW_SQL_MS.store(slow_ms, Ordering::Relaxed);

    conn.trace(Some(on_statement));
    conn.profile(Some(on_profile));
}

fn on_statement(_sql: &str) {
    if !SQL_TRACING.load(Ordering::Relaxed) {
        return;
    }
    COUNTERS.with(|c| {
        if c.active() {
            Counters::bump(&c.statements);
        }
    });
}

fn on_profile(sql: &str, duration: Duration) {
    if !SQL_TRACING.load(Ordering::Relaxed) {
        return;
    }
    let threshold = SLOW_SQL_MS.load(Ordering::Relaxed);
    let ms = duration.as_millis() as u64;
    if threshold == 0 || ms < threshold {
        return;
    }

    tracing::warn!(target: "slow_sql", duration_ms = ms, sql = %shorten(sql), "slow sql");
    COUNTERS.with(|c| {
        if c.active() {
            Counters::bump(&c.slow_statements);
        }
    });
}

/// 作用域性能统计：drop 时输出 elapsed_ms、sql_count、slow_sql_count
///
/// ```ignore
/// let _perf = price_catalog::perf::PerfGuard::for_vendor("reconcile.batch", vendor_id);
/// ```
pub struct PerfGuard {
    op: &'static str,
    vendor_id: Option<String>,
    started: Instant,
    baseline: (u64, u64),
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        let baseline = COUNTERS.with(|c| {
            c.depth.set(c.depth.get().saturating_add(1));
            c.snapshot()
        });
        Self {
            op,
            vendor_id: None,
            started: Instant::now(),
            baseline,
        }
    }

    pub fn for_vendor(op: &'static str, vendor_id: &str) -> Self {
        let mut guard = Self::new(op);
        guard.vendor_id = Some(vendor_id.to_string());
        guard
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let (statements, slow) = COUNTERS.with(|c| {
            c.depth.set(c.depth.get().saturating_sub(1));
            c.snapshot()
        });

        tracing::info!(
            target: "perf",
            op = self.op,
            vendor_id = self.vendor_id.as_deref().unwrap_or("-"),
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            sql_count = statements.saturating_sub(self.baseline.0),
            slow_sql_count = slow.saturating_sub(self.baseline.1),
            "done"
        );
    }
}
