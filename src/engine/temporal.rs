// ==========================================
// 价格目录系统 - 时效价格存储 (TemporalPriceStore)
// ==========================================
// 状态机（每条价格/折扣记录）:
//   current  : 当前生效值
//   future   : 至多一条待生效值
//   history  : 只追加、不可变
// 操作:
//   schedule  : effective_date <= today 直接写 current（旧值进 history），否则写 future
//   implement : 到期 future 推进为 current，幂等
//   rollback  : 恢复 current_date 之前最近的历史值，被回滚值改为 new_date 生效的 future
//   delay     : 供应商范围内 future 生效日期整体顺延
// 约束: 每个操作在单个事务内执行；*_tx 版本供对账在调用方事务内复用
// ==========================================

use crate::domain::pricing::{TemporalRow, TemporalValue};
use crate::domain::types::PriceFamily;
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::error::RepositoryError;
use crate::repository::temporal_repo::TemporalRepository;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// schedule 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleOutcome {
    /// 已写入 current（旧值进入 history）
    Applied,
    /// 已写入 future 槽位
    Scheduled,
    /// 值未变化，无写入
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImplementReport {
    pub promoted: usize,
    pub per_family: Vec<(PriceFamily, usize)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub rolled_back: usize,
    /// 没有更早历史、无法回滚的记录
    pub skipped: Vec<(PriceFamily, i64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayReport {
    pub delayed: usize,
    pub per_family: Vec<(PriceFamily, usize)>,
}

// ==========================================
// 事务内原语
// ==========================================

fn load_existing(conn: &Connection, family: PriceFamily, row_id: i64) -> EngineResult<TemporalRow> {
    TemporalRepository::load_row(conn, family, row_id)?.ok_or_else(|| {
        EngineError::Repository(RepositoryError::NotFound {
            entity: family.as_str().to_string(),
            id: row_id.to_string(),
        })
    })
}

/// 调度一次值变更
pub fn schedule_tx(
    conn: &Connection,
    family: PriceFamily,
    row_id: i64,
    value: TemporalValue,
    effective_date: NaiveDate,
    today: NaiveDate,
    recorded_at: DateTime<Utc>,
) -> EngineResult<ScheduleOutcome> {
    TemporalRepository::validate_value(family, &value)?;
    let row = load_existing(conn, family, row_id)?;

    if effective_date <= today {
        if row.value.same_as(&value) {
            return Ok(ScheduleOutcome::Unchanged);
        }
        TemporalRepository::append_history(conn, family, row_id, row.value, row.effective_date, recorded_at)?;
        TemporalRepository::set_current(conn, family, row_id, value, effective_date)?;
        return Ok(ScheduleOutcome::Applied);
    }

    if let Some(f) = row.future {
        if f.value.same_as(&value) && f.effective_date == effective_date {
            return Ok(ScheduleOutcome::Unchanged);
        }
    }
    TemporalRepository::upsert_future(conn, family, row_id, value, effective_date)?;
    Ok(ScheduleOutcome::Scheduled)
}

/// 推进到期 future
pub fn implement_tx(
    conn: &Connection,
    today: NaiveDate,
    vendor_id: Option<&str>,
    recorded_at: DateTime<Utc>,
) -> EngineResult<ImplementReport> {
    let mut report = ImplementReport::default();
    for family in PriceFamily::ALL {
        let due = TemporalRepository::due_futures(conn, family, today, vendor_id)?;
        for entry in &due {
            TemporalRepository::append_history(
                conn,
                family,
                entry.row_id,
                entry.current_value,
                entry.current_effective_date,
                recorded_at,
            )?;
            TemporalRepository::set_current(
                conn,
                family,
                entry.row_id,
                entry.future.value,
                entry.future.effective_date,
            )?;
            TemporalRepository::clear_future(conn, family, entry.row_id)?;
        }
        if !due.is_empty() {
            debug!(family = %family, promoted = due.len(), "future 推进");
        }
        report.promoted += due.len();
        report.per_family.push((family, due.len()));
    }
    Ok(report)
}

/// 回滚：先校验窗口，再逐族处理
pub fn rollback_tx(
    conn: &Connection,
    vendor_id: &str,
    current_date: NaiveDate,
    new_date: NaiveDate,
    today: NaiveDate,
) -> EngineResult<RollbackReport> {
    validate_rollback_window(current_date, new_date, today)?;

    let mut report = RollbackReport::default();
    for family in PriceFamily::ALL {
        for row_id in TemporalRepository::rows_with_current_date(conn, family, vendor_id, current_date)? {
            let row = load_existing(conn, family, row_id)?;
            let Some(previous) = TemporalRepository::closest_history_before(conn, family, row_id, current_date)?
            else {
                report.skipped.push((family, row_id));
                continue;
            };

            if let Some(f) = row.future {
                warn!(
                    family = %family,
                    row_id,
                    overwritten_date = %f.effective_date,
                    "回滚覆盖已有 future"
                );
            }
            TemporalRepository::set_current(conn, family, row_id, previous.value, previous.effective_date)?;
            TemporalRepository::upsert_future(conn, family, row_id, row.value, new_date)?;
            report.rolled_back += 1;
        }
    }
    Ok(report)
}

/// 顺延：先校验窗口，再逐族改写 future 日期
pub fn delay_tx(
    conn: &Connection,
    vendor_id: &str,
    current_date: NaiveDate,
    new_date: NaiveDate,
    today: NaiveDate,
) -> EngineResult<DelayReport> {
    validate_delay_window(current_date, new_date, today)?;

    let mut report = DelayReport::default();
    for family in PriceFamily::ALL {
        let n = TemporalRepository::delay_futures(conn, family, vendor_id, current_date, new_date)?;
        report.delayed += n;
        report.per_family.push((family, n));
    }
    Ok(report)
}

fn invalid_window(operation: &str, from: NaiveDate, to: NaiveDate, today: NaiveDate, reason: &str) -> EngineError {
    EngineError::InvalidScheduleWindow {
        operation: operation.to_string(),
        from,
        to,
        today,
        reason: reason.to_string(),
    }
}

/// new_date 必须晚于 current_date 且晚于 today
pub fn validate_rollback_window(current_date: NaiveDate, new_date: NaiveDate, today: NaiveDate) -> EngineResult<()> {
    if new_date <= current_date {
        return Err(invalid_window("rollback", current_date, new_date, today, "新日期必须晚于当前生效日期"));
    }
    if new_date <= today {
        return Err(invalid_window("rollback", current_date, new_date, today, "新日期必须在未来"));
    }
    Ok(())
}

/// 只能向后顺延，且目标日期在未来
pub fn validate_delay_window(current_date: NaiveDate, new_date: NaiveDate, today: NaiveDate) -> EngineResult<()> {
    if new_date <= current_date {
        return Err(invalid_window("delay", current_date, new_date, today, "只能向后顺延"));
    }
    if new_date <= today {
        return Err(invalid_window("delay", current_date, new_date, today, "新日期必须在未来"));
    }
    Ok(())
}

// ==========================================
// TemporalPriceStore - 对外服务
// ==========================================
pub struct TemporalPriceStore {
    conn: Arc<Mutex<Connection>>,
}

impl TemporalPriceStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 在单个事务内执行
    fn with_tx<T>(&self, f: impl FnOnce(&Connection) -> EngineResult<T>) -> EngineResult<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| EngineError::LockError(e.to_string()))?;
        let tx = guard.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    #[instrument(skip_all, fields(family = %family, row_id = row_id))]
    pub fn schedule(
        &self,
        family: PriceFamily,
        row_id: i64,
        value: TemporalValue,
        effective_date: NaiveDate,
        today: NaiveDate,
    ) -> EngineResult<ScheduleOutcome> {
        let outcome =
            self.with_tx(|tx| schedule_tx(tx, family, row_id, value, effective_date, today, Utc::now()))?;
        debug!(?outcome, effective_date = %effective_date, "schedule 完成");
        Ok(outcome)
    }

    /// 推进到期 future；vendor_id 为 None 时处理全部供应商
    #[instrument(skip_all, fields(today = %today))]
    pub fn implement(&self, today: NaiveDate, vendor_id: Option<&str>) -> EngineResult<ImplementReport> {
        let _perf = crate::perf::PerfGuard::new("temporal.implement");
        let report = self.with_tx(|tx| implement_tx(tx, today, vendor_id, Utc::now()))?;
        if report.promoted == 0 {
            info!(vendor_id = ?vendor_id, "implement: 无到期 future (no-op)");
        } else {
            info!(vendor_id = ?vendor_id, promoted = report.promoted, "implement 完成");
        }
        Ok(report)
    }

    #[instrument(skip_all, fields(vendor_id = %vendor_id))]
    pub fn rollback(
        &self,
        vendor_id: &str,
        current_date: NaiveDate,
        new_date: NaiveDate,
        today: NaiveDate,
    ) -> EngineResult<RollbackReport> {
        let _perf = crate::perf::PerfGuard::for_vendor("temporal.rollback", vendor_id);
        let report = self.with_tx(|tx| rollback_tx(tx, vendor_id, current_date, new_date, today))?;
        if !report.skipped.is_empty() {
            warn!(skipped = report.skipped.len(), "部分记录没有更早历史，未回滚");
        }
        info!(
            rolled_back = report.rolled_back,
            from = %current_date,
            to = %new_date,
            "rollback 完成"
        );
        Ok(report)
    }

    #[instrument(skip_all, fields(vendor_id = %vendor_id))]
    pub fn delay(
        &self,
        vendor_id: &str,
        current_date: NaiveDate,
        new_date: NaiveDate,
        today: NaiveDate,
    ) -> EngineResult<DelayReport> {
        let _perf = crate::perf::PerfGuard::for_vendor("temporal.delay", vendor_id);
        let report = self.with_tx(|tx| delay_tx(tx, vendor_id, current_date, new_date, today))?;
        info!(delayed = report.delayed, from = %current_date, to = %new_date, "delay 完成");
        Ok(report)
    }

    /// 当前仍到期未推进的 future 数量（推进不变量检查）
    pub fn pending_due(&self, today: NaiveDate) -> EngineResult<i64> {
        self.with_tx(|tx| {
            let mut total = 0;
            for family in PriceFamily::ALL {
                total += TemporalRepository::count_due_futures(tx, family, today)?;
            }
            Ok(total)
        })
    }

    pub fn load(&self, family: PriceFamily, row_id: i64) -> EngineResult<TemporalRow> {
        self.with_tx(|tx| load_existing(tx, family, row_id))
    }

    pub fn history(&self, family: PriceFamily, row_id: i64) -> EngineResult<Vec<crate::domain::pricing::HistoryEntry>> {
        self.with_tx(|tx| Ok(TemporalRepository::history(tx, family, row_id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::price_repo::PriceRepository;
    use chrono::Duration;

    fn setup() -> (Arc<Mutex<Connection>>, i64) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO pricing_class (vendor_id, name) VALUES ('V1', 'list price');
             INSERT INTO product (vendor_id, product_identifier) VALUES ('V1', 'S1_36_A');",
        )
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let row_id = PriceRepository::insert_class_price_tx(&conn, 1, 1, 10000, today).unwrap();
        (Arc::new(Mutex::new(conn)), row_id)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_schedule_future_then_implement() {
        let (conn, row_id) = setup();
        let store = TemporalPriceStore::new(conn);
        let today = day(2026, 3, 1);
        let due = today + Duration::days(30);

        let outcome = store
            .schedule(PriceFamily::ClassPrice, row_id, TemporalValue::Price(11000), due, today)
            .unwrap();
        assert_eq!(outcome, ScheduleOutcome::Scheduled);

        let before = store.implement(today + Duration::days(29), None).unwrap();
        assert_eq!(before.promoted, 0);
        assert_eq!(store.load(PriceFamily::ClassPrice, row_id).unwrap().value, TemporalValue::Price(10000));

        let after = store.implement(due, None).unwrap();
        assert_eq!(after.promoted, 1);
        let row = store.load(PriceFamily::ClassPrice, row_id).unwrap();
        assert_eq!(row.value, TemporalValue::Price(11000));
        assert!(row.future.is_none());

        let history = store.history(PriceFamily::ClassPrice, row_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].value, TemporalValue::Price(10000));
        assert_eq!(store.pending_due(due).unwrap(), 0);
    }

    #[test]
    fn test_schedule_same_value_is_noop() {
        let (conn, row_id) = setup();
        let store = TemporalPriceStore::new(conn);
        let today = day(2026, 3, 1);
        let outcome = store
            .schedule(PriceFamily::ClassPrice, row_id, TemporalValue::Price(10000), today, today)
            .unwrap();
        assert_eq!(outcome, ScheduleOutcome::Unchanged);
        assert!(store.history(PriceFamily::ClassPrice, row_id).unwrap().is_empty());
    }

    #[test]
    fn test_schedule_rejects_invalid_value() {
        let (conn, row_id) = setup();
        let store = TemporalPriceStore::new(conn);
        let today = day(2026, 3, 1);
        assert!(store
            .schedule(PriceFamily::ClassPrice, row_id, TemporalValue::Price(-1), today, today)
            .is_err());
        assert!(store
            .schedule(PriceFamily::ClassPrice, row_id, TemporalValue::Discount(0.2), today, today)
            .is_err());
    }

    #[test]
    fn test_window_validation() {
        let today = day(2026, 3, 1);
        assert!(validate_rollback_window(today, today, today).is_err());
        assert!(validate_rollback_window(day(2026, 1, 1), day(2026, 2, 1), today).is_err());
        assert!(validate_rollback_window(day(2026, 1, 1), day(2026, 4, 1), today).is_ok());
        assert!(validate_delay_window(day(2026, 5, 1), day(2026, 4, 1), today).is_err());
        assert!(validate_delay_window(day(2026, 5, 1), day(2026, 6, 1), today).is_ok());
    }
}
