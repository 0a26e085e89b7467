// ==========================================
// 价格目录系统 - 后台重新定价
// ==========================================
// 职责:
//   VendorLocks    : 供应商级写锁，导入与重新定价按供应商串行
//   RepricingQueue : 提交后立即返回任务句柄，后台任务自持事务
// 约束: 后台任务失败只回滚自身事务并记录 FAILED，不影响已提交的导入
// ==========================================

use crate::domain::pricing::TemporalValue;
use crate::domain::types::PriceFamily;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::temporal::{schedule_tx, ScheduleOutcome};
use crate::repository::catalog_repo::CatalogRepository;
use crate::repository::discount_repo::DiscountRepository;
use crate::repository::price_repo::PriceRepository;
use crate::repository::repricing_task_repo::RepricingTaskRepository;
use crate::repository::temporal_repo::TemporalRepository;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// VendorLocks
// ==========================================
#[derive(Default)]
pub struct VendorLocks {
    locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl VendorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取供应商写锁，持有期间同一供应商的其他写入排队
    pub async fn acquire(&self, vendor_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().await;
            map.entry(vendor_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

// ==========================================
// 重新定价
// ==========================================

/// 重新定价请求
#[derive(Debug, Clone)]
pub struct RepricingRequest {
    pub vendor_id: String,
    pub effective_date: NaiveDate,
    pub today: NaiveDate,
    /// 客户价的派生基准价格等级
    pub zero_discount_class: String,
    pub trigger_source: Option<String>,
}

/// 后台任务句柄
#[derive(Debug)]
pub struct RepricingHandle {
    pub task_id: String,
    join: JoinHandle<()>,
}

impl RepricingHandle {
    /// 等待后台任务结束（任务结果以 repricing_task 记录为准）
    pub async fn wait(self) -> EngineResult<()> {
        self.join
            .await
            .map_err(|e| EngineError::Other(anyhow::anyhow!("重新定价任务异常退出: {}", e)))
    }
}

/// 按常设折扣从零折扣类别价派生非覆盖客户价，返回变更行数
pub fn reprice_tx(
    conn: &Connection,
    vendor_id: &str,
    zero_discount_class: &str,
    effective_date: NaiveDate,
    today: NaiveDate,
    recorded_at: DateTime<Utc>,
) -> EngineResult<usize> {
    let Some(base_class_id) = CatalogRepository::find_pricing_class_tx(conn, vendor_id, zero_discount_class)? else {
        warn!(vendor_id = %vendor_id, pricing_class = %zero_discount_class, "基准价格等级不存在，跳过重新定价");
        return Ok(0);
    };

    let mut changed = 0;
    for customer_id in DiscountRepository::customers_with_discounts_tx(conn, vendor_id)? {
        for product_id in DiscountRepository::discounted_products_tx(conn, customer_id)? {
            let base = match PriceRepository::find_class_price_tx(conn, base_class_id, product_id)? {
                Some(row) if !row.deleted => row.price,
                _ => continue,
            };
            let Some(discount) = DiscountRepository::standing_discount_tx(conn, product_id, customer_id)? else {
                continue;
            };
            let derived = discount.apply(base);

            match PriceRepository::find_customer_price_tx(conn, product_id, base_class_id, customer_id)? {
                None => {
                    PriceRepository::insert_customer_price_tx(
                        conn,
                        product_id,
                        base_class_id,
                        customer_id,
                        derived,
                        effective_date,
                        false,
                    )?;
                    changed += 1;
                }
                Some(row) if row.is_override => {}
                Some(row) => {
                    if row.deleted {
                        TemporalRepository::revive(conn, PriceFamily::CustomerPrice, row.row_id)?;
                    }
                    let outcome = schedule_tx(
                        conn,
                        PriceFamily::CustomerPrice,
                        row.row_id,
                        TemporalValue::Price(derived),
                        effective_date,
                        today,
                        recorded_at,
                    )?;
                    if outcome != ScheduleOutcome::Unchanged || row.deleted {
                        changed += 1;
                    }
                }
            }
        }
    }
    Ok(changed)
}

// ==========================================
// RepricingQueue
// ==========================================
pub struct RepricingQueue {
    conn: Arc<Mutex<Connection>>,
    tasks: Arc<RepricingTaskRepository>,
    locks: Arc<VendorLocks>,
}

impl RepricingQueue {
    pub fn new(conn: Arc<Mutex<Connection>>, locks: Arc<VendorLocks>) -> Self {
        Self {
            tasks: Arc::new(RepricingTaskRepository::new(conn.clone())),
            conn,
            locks,
        }
    }

    pub fn tasks(&self) -> &RepricingTaskRepository {
        &self.tasks
    }

    /// 登记任务并在后台执行，须在 tokio 运行时内调用
    #[instrument(skip_all, fields(vendor_id = %request.vendor_id, effective_date = %request.effective_date))]
    pub fn submit(&self, request: RepricingRequest) -> EngineResult<RepricingHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EngineError::Other(anyhow::anyhow!("缺少 tokio 运行时: {}", e)))?;

        let task_id = Uuid::new_v4().to_string();
        self.tasks.insert_pending(
            &task_id,
            &request.vendor_id,
            request.effective_date,
            request.trigger_source.as_deref(),
        )?;
        info!(task_id = %task_id, "重新定价任务已登记");

        let conn = self.conn.clone();
        let tasks = self.tasks.clone();
        let locks = self.locks.clone();
        let id = task_id.clone();

        let join = runtime.spawn(async move {
            let _vendor_guard = locks.acquire(&request.vendor_id).await;
            let worker_id = id.clone();
            let worker_tasks = tasks.clone();
            let outcome = tokio::task::spawn_blocking(move || run_task(&conn, &worker_tasks, &worker_id, &request)).await;

            if let Err(e) = outcome {
                error!(task_id = %id, error = %e, "重新定价任务线程异常");
                if let Err(mark_err) = tasks.mark_failed(&id, &e.to_string()) {
                    warn!(task_id = %id, error = %mark_err, "任务状态写入失败");
                }
            }
        });

        Ok(RepricingHandle { task_id, join })
    }
}

fn run_task(
    conn: &Arc<Mutex<Connection>>,
    tasks: &RepricingTaskRepository,
    task_id: &str,
    request: &RepricingRequest,
) {
    let _perf = crate::perf::PerfGuard::for_vendor("repricing.task", &request.vendor_id);
    if let Err(e) = tasks.mark_running(task_id) {
        warn!(task_id = %task_id, error = %e, "任务状态写入失败");
    }

    let outcome = (|| -> EngineResult<usize> {
        let mut guard = conn
            .lock()
            .map_err(|e| EngineError::LockError(e.to_string()))?;
        let tx = guard.transaction()?;
        let rows = reprice_tx(
            &tx,
            &request.vendor_id,
            &request.zero_discount_class,
            request.effective_date,
            request.today,
            Utc::now(),
        )?;
        tx.commit()?;
        Ok(rows)
    })();

    let status = match outcome {
        Ok(rows) => {
            info!(task_id = %task_id, vendor_id = %request.vendor_id, repriced_rows = rows, "重新定价完成");
            tasks.mark_completed(task_id, rows)
        }
        Err(e) => {
            error!(task_id = %task_id, vendor_id = %request.vendor_id, error = %e, "重新定价失败，事务已回滚");
            tasks.mark_failed(task_id, &e.to_string())
        }
    };
    if let Err(e) = status {
        warn!(task_id = %task_id, error = %e, "任务状态写入失败");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::records::{NormalizedRecord, ReferenceRecord};
    use crate::domain::types::{BatchKind, Discount};
    use crate::engine::reconciler::{CatalogReconciler, ReconcileOptions};
    use crate::repository::repricing_task_repo::RepricingStatus;
    use std::time::Duration;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn seeded() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));

        let reconciler = CatalogReconciler::new(conn.clone());
        let opts = ReconcileOptions::default();
        let records = vec![
            NormalizedRecord::new("V1", None, "P-100".to_string(), 20000).with_pricing_class("zero discount"),
        ];
        reconciler.reconcile("V1", &records, day(1), day(1), &opts).unwrap();
        reconciler
            .reconcile_reference(
                "V1",
                BatchKind::Customers,
                &[ReferenceRecord::Customer {
                    name: "ACME".to_string(),
                    pricing_classes: vec![],
                }],
                day(1),
                day(1),
                &opts,
            )
            .unwrap();
        reconciler
            .reconcile_reference(
                "V1",
                BatchKind::ProductDiscounts,
                &[ReferenceRecord::ProductDiscount {
                    customer: "ACME".to_string(),
                    product_identifier: "P-100".to_string(),
                    discount: Discount::new(0.25).unwrap(),
                }],
                day(1),
                day(1),
                &opts,
            )
            .unwrap();
        conn
    }

    #[test]
    fn test_reprice_derives_discounted_customer_price() {
        let conn = seeded();
        let guard = conn.lock().unwrap();
        let rows = reprice_tx(&guard, "V1", "zero discount", day(1), day(1), Utc::now()).unwrap();
        assert_eq!(rows, 1);
        let price: i64 = guard
            .query_row("SELECT price FROM customer_price", [], |r| r.get(0))
            .unwrap();
        assert_eq!(price, 15000);

        // 再次执行无变化
        assert_eq!(reprice_tx(&guard, "V1", "zero discount", day(1), day(1), Utc::now()).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_queue_records_completed_task() {
        let conn = seeded();
        let queue = RepricingQueue::new(conn, Arc::new(VendorLocks::new()));
        let handle = queue
            .submit(RepricingRequest {
                vendor_id: "V1".to_string(),
                effective_date: day(1),
                today: day(1),
                zero_discount_class: "zero discount".to_string(),
                trigger_source: Some("test".to_string()),
            })
            .unwrap();
        let task_id = handle.task_id.clone();
        handle.wait().await.unwrap();

        let task = queue.tasks().find_by_id(&task_id).unwrap().unwrap();
        assert_eq!(task.status, RepricingStatus::Completed);
        assert_eq!(task.repriced_rows, 1);
    }

    #[tokio::test]
    async fn test_vendor_lock_serializes_holders() {
        let locks = Arc::new(VendorLocks::new());
        let guard = locks.acquire("V1").await;

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = contender.acquire("V1").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // 其他供应商不受影响
        let _other = locks.acquire("V2").await;

        drop(guard);
        waiter.await.unwrap();
    }
}
