// ==========================================
// 价格目录系统 - 目录对账 (CatalogReconciler)
// ==========================================
// 流程（每个供应商、每个批次一个事务）:
// 1. 暂存: 记录进入本次运行的暂存区，按自然键去重并检测冲突
// 2. 更新: 自然键命中的记录经时效存储调度（当日及以前写 current，以后写 future）
// 3. 插入: 未命中的记录按外键顺序写入（产品 → 价格）
// 4. 传播: 类别价变化后，非覆盖客户价按常设折扣重新计算
// 5. 软删除: 参考表批次中缺席的记录标记删除（仅限本供应商）
// 6. 失败: 整批回滚，另写一条 FAILED 批次审计
// ==========================================

use crate::domain::batch::{ImportBatch, ReconciliationResult, RecordIssue};
use crate::domain::pricing::TemporalValue;
use crate::domain::records::{NormalizedRecord, ReferenceRecord};
use crate::domain::types::{BatchKind, BatchStatus, Cents, Discount, PriceFamily};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::temporal::{schedule_tx, ScheduleOutcome};
use crate::repository::batch_repo::ImportBatchRepository;
use crate::repository::catalog_repo::CatalogRepository;
use crate::repository::discount_repo::{DiscountRepository, DiscountRowRef};
use crate::repository::price_repo::PriceRepository;
use crate::repository::temporal_repo::TemporalRepository;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// 对账选项
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub file_name: Option<String>,
    /// 记录未指定价格等级时使用
    pub default_pricing_class: String,
    /// 特殊净价换算基准
    pub zero_discount_class: String,
    /// 缺席记录是否退役；源表存在读取问题时由调用方关闭
    pub retire_absent: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            file_name: None,
            default_pricing_class: "list price".to_string(),
            zero_discount_class: "zero discount".to_string(),
            retire_absent: true,
        }
    }
}

/// 单次运行上下文
struct RunContext<'a> {
    vendor_id: &'a str,
    batch_id: &'a str,
    kind: BatchKind,
    effective_date: NaiveDate,
    today: NaiveDate,
    recorded_at: DateTime<Utc>,
    opts: &'a ReconcileOptions,
}

impl RunContext<'_> {
    fn conflict(&self, records: Vec<RecordIssue>) -> EngineError {
        EngineError::ReconciliationConflict {
            vendor_id: self.vendor_id.to_string(),
            batch_id: self.batch_id.to_string(),
            records,
        }
    }

    fn schedule(&self, conn: &Connection, family: PriceFamily, row_id: i64, value: TemporalValue) -> EngineResult<ScheduleOutcome> {
        schedule_tx(conn, family, row_id, value, self.effective_date, self.today, self.recorded_at)
    }
}

fn tally(result: &mut ReconciliationResult, outcome: ScheduleOutcome, revived: bool) {
    match outcome {
        ScheduleOutcome::Applied => result.updated += 1,
        ScheduleOutcome::Scheduled => result.scheduled += 1,
        ScheduleOutcome::Unchanged if revived => result.updated += 1,
        ScheduleOutcome::Unchanged => result.unchanged += 1,
    }
}

// ==========================================
// StagingArea - 运行级暂存区
// ==========================================
// 生命周期与一次对账相同，结束即丢弃
struct StagedPrice<'r> {
    identifier: String,
    pricing_class: String,
    record: &'r NormalizedRecord,
}

#[derive(Default)]
struct StagingArea<'r> {
    prices: BTreeMap<(String, String), StagedPrice<'r>>,
    references: BTreeMap<String, &'r ReferenceRecord>,
    conflicts: Vec<RecordIssue>,
    duplicates: usize,
}

impl<'r> StagingArea<'r> {
    fn stage_prices(vendor_id: &str, records: &'r [NormalizedRecord], default_class: &str) -> Self {
        let mut area = Self::default();
        for record in records {
            let identifier = record.product_identifier();
            if record.vendor_id != vendor_id {
                area.conflicts.push(RecordIssue::new(
                    identifier,
                    format!("记录属于供应商 {}，不能进入 {} 的批次", record.vendor_id, vendor_id),
                ));
                continue;
            }
            if record.price < 0 {
                area.conflicts
                    .push(RecordIssue::new(identifier, format!("负价格: {}", record.price)));
                continue;
            }

            let pricing_class = record
                .pricing_class
                .clone()
                .unwrap_or_else(|| default_class.to_string());
            let key = (identifier.clone(), pricing_class.clone());
            match area.prices.get(&key) {
                Some(existing) if existing.record.price == record.price => area.duplicates += 1,
                Some(existing) => area.conflicts.push(RecordIssue::new(
                    format!("{} ({})", identifier, pricing_class),
                    format!("同一批次内价格冲突: {} vs {}", existing.record.price, record.price),
                )),
                None => {
                    area.prices.insert(
                        key,
                        StagedPrice {
                            identifier,
                            pricing_class,
                            record,
                        },
                    );
                }
            }
        }
        area
    }

    fn stage_references(kind: BatchKind, records: &'r [ReferenceRecord], default_class: &str) -> Self {
        let mut area = Self::default();
        for record in records {
            if reference_kind(record) != kind {
                area.conflicts.push(RecordIssue::new(
                    record.label(),
                    format!("记录类型与批次类型 {} 不符", kind.as_str()),
                ));
                continue;
            }

            let key = reference_key(record, default_class);
            match area.references.get(&key) {
                Some(existing) if *existing == record => area.duplicates += 1,
                Some(_) => area
                    .conflicts
                    .push(RecordIssue::new(record.label(), "同一批次内存在取值不同的重复记录")),
                None => {
                    area.references.insert(key, record);
                }
            }
        }
        area
    }
}

fn reference_kind(record: &ReferenceRecord) -> BatchKind {
    match record {
        ReferenceRecord::Customer { .. } => BatchKind::Customers,
        ReferenceRecord::ClassDiscount { .. } => BatchKind::ClassDiscounts,
        ReferenceRecord::ProductDiscount { .. } => BatchKind::ProductDiscounts,
        ReferenceRecord::SpecialNetPrice { .. } => BatchKind::SpecialNetPrices,
        ReferenceRecord::CustomerOverride { .. } => BatchKind::CustomerOverrides,
    }
}

fn reference_key(record: &ReferenceRecord, default_class: &str) -> String {
    match record {
        ReferenceRecord::CustomerOverride {
            customer,
            product_identifier,
            pricing_class,
            ..
        } => format!(
            "{}|{}|{}",
            customer,
            product_identifier,
            pricing_class.as_deref().unwrap_or(default_class)
        ),
        other => other.label(),
    }
}

// ==========================================
// CatalogReconciler
// ==========================================
pub struct CatalogReconciler {
    conn: Arc<Mutex<Connection>>,
}

impl CatalogReconciler {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 在单个事务内运行一个批次，并写入批次审计
    fn run_batch<F>(
        &self,
        vendor_id: &str,
        kind: BatchKind,
        effective_date: NaiveDate,
        today: NaiveDate,
        opts: &ReconcileOptions,
        body: F,
    ) -> EngineResult<ReconciliationResult>
    where
        F: FnOnce(&Connection, &RunContext<'_>) -> EngineResult<ReconciliationResult>,
    {
        let _perf = crate::perf::PerfGuard::for_vendor("reconcile.batch", vendor_id);
        let batch_id = Uuid::new_v4().to_string();
        let ctx = RunContext {
            vendor_id,
            batch_id: &batch_id,
            kind,
            effective_date,
            today,
            recorded_at: Utc::now(),
            opts,
        };

        let mut guard = self
            .conn
            .lock()
            .map_err(|e| EngineError::LockError(e.to_string()))?;

        let outcome = (|| -> EngineResult<ReconciliationResult> {
            let tx = guard.transaction()?;
            let mut result = body(&tx, &ctx)?;
            result.batch_id = batch_id.clone();
            ImportBatchRepository::insert_tx(&tx, &audit_row(&ctx, &result, BatchStatus::Committed, None))?;
            tx.commit()?;
            Ok(result)
        })();

        match outcome {
            Ok(result) => {
                info!(
                    vendor_id = %vendor_id,
                    batch_id = %batch_id,
                    kind = kind.as_str(),
                    inserted = result.inserted,
                    updated = result.updated,
                    deleted = result.deleted,
                    scheduled = result.scheduled,
                    propagated = result.propagated,
                    unchanged = result.unchanged,
                    "批次对账提交"
                );
                Ok(result)
            }
            Err(e) => {
                // 事务已回滚，失败审计单独写入
                let failed = audit_row(
                    &ctx,
                    &ReconciliationResult::default(),
                    BatchStatus::Failed,
                    Some(e.to_string()),
                );
                if let Err(audit_err) = ImportBatchRepository::insert_tx(&guard, &failed) {
                    warn!(batch_id = %batch_id, error = %audit_err, "失败批次审计写入失败");
                }
                error!(vendor_id = %vendor_id, batch_id = %batch_id, error = %e, "批次对账失败，已整体回滚");
                Err(e)
            }
        }
    }

    // ===== 价目表 =====

    /// 对账一批价目记录
    #[instrument(skip_all, fields(vendor_id = %vendor_id, records = records.len(), effective_date = %effective_date))]
    pub fn reconcile(
        &self,
        vendor_id: &str,
        records: &[NormalizedRecord],
        effective_date: NaiveDate,
        today: NaiveDate,
        opts: &ReconcileOptions,
    ) -> EngineResult<ReconciliationResult> {
        self.run_batch(vendor_id, BatchKind::PriceBook, effective_date, today, opts, |conn, ctx| {
            let staging = StagingArea::stage_prices(vendor_id, records, &opts.default_pricing_class);
            if !staging.conflicts.is_empty() {
                return Err(ctx.conflict(staging.conflicts));
            }
            if staging.duplicates > 0 {
                info!(duplicates = staging.duplicates, "暂存去重");
            }

            let mut result = ReconciliationResult::default();
            let mut class_ids: HashMap<String, i64> = HashMap::new();
            let mut scopes: HashSet<(i64, Option<String>)> = HashSet::new();
            let mut touched: HashSet<i64> = HashSet::new();
            let mut issues = Vec::new();

            for staged in staging.prices.values() {
                match apply_staged_price(conn, ctx, staged, &mut class_ids, &mut result) {
                    Ok((pricing_class_id, row_id)) => {
                        scopes.insert((pricing_class_id, staged.record.series.clone()));
                        touched.insert(row_id);
                    }
                    Err(EngineError::Repository(err)) => issues.push(RecordIssue::new(
                        format!("{} ({})", staged.identifier, staged.pricing_class),
                        err.to_string(),
                    )),
                    Err(other) => return Err(other),
                }
            }

            if !issues.is_empty() {
                return Err(ctx.conflict(issues));
            }
            if opts.retire_absent {
                retire_absent_prices(conn, &scopes, &touched, &mut result)?;
            }
            Ok(result)
        })
    }

    // ===== 参考表 =====

    /// 对账客户/折扣参考表
    #[instrument(skip_all, fields(vendor_id = %vendor_id, kind = kind.as_str(), records = records.len()))]
    pub fn reconcile_reference(
        &self,
        vendor_id: &str,
        kind: BatchKind,
        records: &[ReferenceRecord],
        effective_date: NaiveDate,
        today: NaiveDate,
        opts: &ReconcileOptions,
    ) -> EngineResult<ReconciliationResult> {
        self.run_batch(vendor_id, kind, effective_date, today, opts, |conn, ctx| {
            if matches!(kind, BatchKind::PriceBook | BatchKind::PercentageIncrease) {
                return Err(ctx.conflict(vec![RecordIssue::new(
                    kind.as_str(),
                    "不是参考表批次类型",
                )]));
            }

            let staging = StagingArea::stage_references(kind, records, &opts.default_pricing_class);
            if !staging.conflicts.is_empty() {
                return Err(ctx.conflict(staging.conflicts));
            }

            let mut result = ReconciliationResult::default();
            let mut issues = Vec::new();
            let staged: Vec<&ReferenceRecord> = staging.references.values().copied().collect();

            match kind {
                BatchKind::Customers => apply_customers(conn, ctx, &staged, &mut result)?,
                _ => apply_discount_like(conn, ctx, &staged, &mut result, &mut issues)?,
            }

            if !issues.is_empty() {
                return Err(ctx.conflict(issues));
            }
            Ok(result)
        })
    }

    // ===== 百分比调价 =====

    /// 对某价格等级的全部类别价统一调价 round(price × (1 + percent/100))
    #[instrument(skip_all, fields(vendor_id = %vendor_id, pricing_class = %pricing_class, percent = percent))]
    pub fn apply_percentage_increase(
        &self,
        vendor_id: &str,
        pricing_class: &str,
        percent: f64,
        effective_date: NaiveDate,
        today: NaiveDate,
        opts: &ReconcileOptions,
    ) -> EngineResult<ReconciliationResult> {
        self.run_batch(
            vendor_id,
            BatchKind::PercentageIncrease,
            effective_date,
            today,
            opts,
            |conn, ctx| {
                if !percent.is_finite() || percent <= -100.0 {
                    return Err(ctx.conflict(vec![RecordIssue::new(
                        "percent",
                        format!("调价百分比非法: {}", percent),
                    )]));
                }
                let Some(pricing_class_id) = CatalogRepository::find_pricing_class_tx(conn, vendor_id, pricing_class)?
                else {
                    return Err(ctx.conflict(vec![RecordIssue::new(pricing_class, "价格等级不存在")]));
                };

                let factor = 1.0 + percent / 100.0;
                let mut result = ReconciliationResult::default();
                for (row_id, product_id, price) in PriceRepository::live_class_prices_tx(conn, pricing_class_id)? {
                    let new_price = (price as f64 * factor).round() as Cents;
                    let outcome = ctx.schedule(conn, PriceFamily::ClassPrice, row_id, TemporalValue::Price(new_price))?;
                    tally(&mut result, outcome, false);
                    if outcome != ScheduleOutcome::Unchanged {
                        result.propagated += propagate_tx(conn, ctx, pricing_class_id, product_id, new_price)?;
                    }
                }
                Ok(result)
            },
        )
    }
}

fn audit_row(
    ctx: &RunContext<'_>,
    result: &ReconciliationResult,
    status: BatchStatus,
    error_message: Option<String>,
) -> ImportBatch {
    ImportBatch {
        batch_id: ctx.batch_id.to_string(),
        vendor_id: ctx.vendor_id.to_string(),
        kind: ctx.kind,
        file_name: ctx.opts.file_name.clone(),
        effective_date: ctx.effective_date,
        updated: result.updated + result.scheduled,
        inserted: result.inserted,
        deleted: result.deleted,
        status,
        error_message,
        created_at: ctx.recorded_at,
    }
}

// ==========================================
// 价目记录写入
// ==========================================

fn apply_staged_price(
    conn: &Connection,
    ctx: &RunContext<'_>,
    staged: &StagedPrice<'_>,
    class_ids: &mut HashMap<String, i64>,
    result: &mut ReconciliationResult,
) -> EngineResult<(i64, i64)> {
    let record = staged.record;

    let pricing_class_id = match class_ids.get(&staged.pricing_class) {
        Some(id) => *id,
        None => {
            let id = CatalogRepository::ensure_pricing_class_tx(conn, ctx.vendor_id, &staged.pricing_class)?;
            class_ids.insert(staged.pricing_class.clone(), id);
            id
        }
    };

    // 产品先于价格
    let product_id = match CatalogRepository::find_product_tx(conn, ctx.vendor_id, &staged.identifier)? {
        Some(product) => {
            let description_changed =
                record.description.is_some() && record.description != product.description;
            if product.deleted || description_changed {
                CatalogRepository::touch_product_tx(conn, product.product_id, record.description.as_deref())?;
            }
            product.product_id
        }
        None => CatalogRepository::insert_product_tx(
            conn,
            ctx.vendor_id,
            &staged.identifier,
            record.description.as_deref(),
            record.series.as_deref(),
        )?,
    };

    for (name, rank) in &record.categories {
        let class_id = CatalogRepository::ensure_product_class_tx(conn, ctx.vendor_id, name, *rank)?;
        CatalogRepository::link_category_tx(conn, product_id, class_id)?;
    }
    for attr in &record.attributes {
        CatalogRepository::upsert_attribute_tx(conn, product_id, attr)?;
    }

    let row_id = match PriceRepository::find_class_price_tx(conn, pricing_class_id, product_id)? {
        None => {
            let row_id =
                PriceRepository::insert_class_price_tx(conn, pricing_class_id, product_id, record.price, ctx.effective_date)?;
            result.inserted += 1;
            row_id
        }
        Some(row) => {
            if row.deleted {
                TemporalRepository::revive(conn, PriceFamily::ClassPrice, row.row_id)?;
            }
            let outcome = ctx.schedule(conn, PriceFamily::ClassPrice, row.row_id, TemporalValue::Price(record.price))?;
            tally(result, outcome, row.deleted);
            if outcome != ScheduleOutcome::Unchanged || row.deleted {
                result.propagated += propagate_tx(conn, ctx, pricing_class_id, product_id, record.price)?;
            }
            row.row_id
        }
    };
    Ok((pricing_class_id, row_id))
}

/// 价目表缺席的类别价退役，范围限定为本批出现过的 (价格等级, 系列)
fn retire_absent_prices(
    conn: &Connection,
    scopes: &HashSet<(i64, Option<String>)>,
    touched: &HashSet<i64>,
    result: &mut ReconciliationResult,
) -> EngineResult<()> {
    for (pricing_class_id, series) in scopes {
        for (row_id, product_id) in
            PriceRepository::live_class_prices_in_series_tx(conn, *pricing_class_id, series.as_deref())?
        {
            if touched.contains(&row_id) {
                continue;
            }
            TemporalRepository::soft_delete(conn, PriceFamily::ClassPrice, row_id)?;
            result.deleted += 1;
            for dependent in PriceRepository::dependent_customer_prices_tx(conn, *pricing_class_id, product_id)? {
                if !dependent.is_override {
                    TemporalRepository::soft_delete(conn, PriceFamily::CustomerPrice, dependent.row_id)?;
                }
            }
        }
    }
    Ok(())
}

/// 类别价变化后，重新计算依赖它的非覆盖客户价
fn propagate_tx(
    conn: &Connection,
    ctx: &RunContext<'_>,
    pricing_class_id: i64,
    product_id: i64,
    class_price: Cents,
) -> EngineResult<usize> {
    let mut changed = 0;
    for dependent in PriceRepository::dependent_customer_prices_tx(conn, pricing_class_id, product_id)? {
        if dependent.is_override {
            continue;
        }
        let discount = DiscountRepository::standing_discount_tx(conn, product_id, dependent.customer_id)?;
        let derived = discount.map_or(class_price, |d| d.apply(class_price));
        let outcome = ctx.schedule(conn, PriceFamily::CustomerPrice, dependent.row_id, TemporalValue::Price(derived))?;
        if outcome != ScheduleOutcome::Unchanged {
            changed += 1;
        }
    }
    Ok(changed)
}

// ==========================================
// 参考表写入
// ==========================================

fn apply_customers(
    conn: &Connection,
    ctx: &RunContext<'_>,
    staged: &[&ReferenceRecord],
    result: &mut ReconciliationResult,
) -> EngineResult<()> {
    let mut seen: HashSet<i64> = HashSet::new();

    for record in staged {
        let ReferenceRecord::Customer { name, pricing_classes } = record else {
            continue;
        };

        let (customer_id, inserted, mut changed) = match CatalogRepository::find_customer_tx(conn, ctx.vendor_id, name)? {
            None => (CatalogRepository::insert_customer_tx(conn, ctx.vendor_id, name)?, true, false),
            Some(c) if c.deleted => {
                CatalogRepository::set_customer_deleted_tx(conn, c.customer_id, false)?;
                (c.customer_id, false, true)
            }
            Some(c) => (c.customer_id, false, false),
        };

        if !pricing_classes.is_empty() {
            let mut ids = pricing_classes
                .iter()
                .map(|n| CatalogRepository::ensure_pricing_class_tx(conn, ctx.vendor_id, n))
                .collect::<Result<Vec<i64>, _>>()?;
            ids.sort_unstable();
            ids.dedup();
            if CatalogRepository::customer_pricing_class_ids_tx(conn, customer_id)? != ids {
                CatalogRepository::set_customer_pricing_classes_tx(conn, customer_id, &ids)?;
                changed = true;
            }
        }

        if !seen.insert(customer_id) {
            continue;
        }
        if inserted {
            result.inserted += 1;
        } else if changed {
            result.updated += 1;
        } else {
            result.unchanged += 1;
        }
    }

    if ctx.kind.soft_deletes_absent() && ctx.opts.retire_absent {
        for customer in CatalogRepository::live_customers_tx(conn, ctx.vendor_id)? {
            if !seen.contains(&customer.customer_id) {
                CatalogRepository::set_customer_deleted_tx(conn, customer.customer_id, true)?;
                result.deleted += 1;
            }
        }
    }
    Ok(())
}

/// 解析客户与产品；找不到时记录问题并返回 None
fn resolve_customer_product(
    conn: &Connection,
    ctx: &RunContext<'_>,
    record: &ReferenceRecord,
    customer: &str,
    product_identifier: Option<&str>,
    issues: &mut Vec<RecordIssue>,
) -> EngineResult<Option<(i64, Option<i64>)>> {
    let customer_id = match CatalogRepository::find_customer_tx(conn, ctx.vendor_id, customer)? {
        Some(c) if !c.deleted => c.customer_id,
        _ => {
            issues.push(RecordIssue::new(record.label(), "客户不存在或已删除"));
            return Ok(None);
        }
    };

    let product_id = match product_identifier {
        Some(ident) => match CatalogRepository::find_product_tx(conn, ctx.vendor_id, ident)? {
            Some(p) if !p.deleted => Some(p.product_id),
            _ => {
                issues.push(RecordIssue::new(record.label(), "产品不存在或已删除"));
                return Ok(None);
            }
        },
        None => None,
    };
    Ok(Some((customer_id, product_id)))
}

/// 写入一条折扣（新增或经时效存储调度）
fn upsert_discount_tx(
    conn: &Connection,
    ctx: &RunContext<'_>,
    family: PriceFamily,
    existing: Option<DiscountRowRef>,
    discount: Discount,
    insert: impl FnOnce() -> crate::repository::error::RepositoryResult<i64>,
    result: &mut ReconciliationResult,
) -> EngineResult<i64> {
    match existing {
        None => {
            let row_id = insert()?;
            result.inserted += 1;
            Ok(row_id)
        }
        Some(row) => {
            if row.deleted {
                TemporalRepository::revive(conn, family, row.row_id)?;
            }
            let outcome = ctx.schedule(conn, family, row.row_id, TemporalValue::Discount(discount.value()))?;
            tally(result, outcome, row.deleted);
            Ok(row.row_id)
        }
    }
}

/// 折扣、特殊净价、客户覆盖价
fn apply_discount_like(
    conn: &Connection,
    ctx: &RunContext<'_>,
    staged: &[&ReferenceRecord],
    result: &mut ReconciliationResult,
    issues: &mut Vec<RecordIssue>,
) -> EngineResult<()> {
    let mut touched: HashSet<i64> = HashSet::new();

    for record in staged {
        match record {
            ReferenceRecord::ClassDiscount {
                customer,
                category,
                rank,
                discount,
            } => {
                let Some((customer_id, _)) = resolve_customer_product(conn, ctx, record, customer, None, issues)? else {
                    continue;
                };
                let class_id = CatalogRepository::ensure_product_class_tx(conn, ctx.vendor_id, category, *rank)?;
                let existing = DiscountRepository::find_class_discount_tx(conn, class_id, customer_id)?;
                let row_id = upsert_discount_tx(
                    conn,
                    ctx,
                    PriceFamily::ProductClassDiscount,
                    existing,
                    *discount,
                    || DiscountRepository::insert_class_discount_tx(conn, class_id, customer_id, *discount, ctx.effective_date),
                    result,
                )?;
                touched.insert(row_id);
            }
            ReferenceRecord::ProductDiscount {
                customer,
                product_identifier,
                discount,
            } => {
                let Some((customer_id, Some(product_id))) =
                    resolve_customer_product(conn, ctx, record, customer, Some(product_identifier), issues)?
                else {
                    continue;
                };
                let existing = DiscountRepository::find_product_discount_tx(conn, product_id, customer_id)?;
                let row_id = upsert_discount_tx(
                    conn,
                    ctx,
                    PriceFamily::ProductDiscount,
                    existing,
                    *discount,
                    || DiscountRepository::insert_product_discount_tx(conn, product_id, customer_id, *discount, ctx.effective_date),
                    result,
                )?;
                touched.insert(row_id);
            }
            ReferenceRecord::SpecialNetPrice {
                customer,
                product_identifier,
                net_price,
            } => {
                let Some((customer_id, Some(product_id))) =
                    resolve_customer_product(conn, ctx, record, customer, Some(product_identifier), issues)?
                else {
                    continue;
                };
                let Some(discount) = net_price_discount(conn, ctx, record, product_id, *net_price, issues)? else {
                    continue;
                };
                let existing = DiscountRepository::find_product_discount_tx(conn, product_id, customer_id)?;
                let row_id = upsert_discount_tx(
                    conn,
                    ctx,
                    PriceFamily::ProductDiscount,
                    existing,
                    discount,
                    || DiscountRepository::insert_product_discount_tx(conn, product_id, customer_id, discount, ctx.effective_date),
                    result,
                )?;
                touched.insert(row_id);
            }
            ReferenceRecord::CustomerOverride {
                customer,
                product_identifier,
                pricing_class,
                price,
            } => {
                let Some((customer_id, Some(product_id))) =
                    resolve_customer_product(conn, ctx, record, customer, Some(product_identifier), issues)?
                else {
                    continue;
                };
                let class_name = pricing_class
                    .as_deref()
                    .unwrap_or(&ctx.opts.default_pricing_class);
                let pricing_class_id = CatalogRepository::ensure_pricing_class_tx(conn, ctx.vendor_id, class_name)?;

                let row_id = match PriceRepository::find_customer_price_tx(conn, product_id, pricing_class_id, customer_id)? {
                    None => {
                        let id = PriceRepository::insert_customer_price_tx(
                            conn,
                            product_id,
                            pricing_class_id,
                            customer_id,
                            *price,
                            ctx.effective_date,
                            true,
                        )?;
                        result.inserted += 1;
                        id
                    }
                    Some(row) => {
                        if row.deleted {
                            TemporalRepository::revive(conn, PriceFamily::CustomerPrice, row.row_id)?;
                        }
                        if !row.is_override {
                            PriceRepository::set_override_flag_tx(conn, row.row_id, true)?;
                        }
                        let outcome = ctx.schedule(conn, PriceFamily::CustomerPrice, row.row_id, TemporalValue::Price(*price))?;
                        tally(result, outcome, row.deleted || !row.is_override);
                        row.row_id
                    }
                };
                touched.insert(row_id);
            }
            ReferenceRecord::Customer { .. } => {}
        }
    }

    if !ctx.kind.soft_deletes_absent() || !ctx.opts.retire_absent || !issues.is_empty() {
        return Ok(());
    }

    // 缺席即退役，仅限本供应商
    let (family, live) = match ctx.kind {
        BatchKind::ClassDiscounts => (
            PriceFamily::ProductClassDiscount,
            TemporalRepository::live_row_ids(conn, PriceFamily::ProductClassDiscount, ctx.vendor_id)?,
        ),
        BatchKind::ProductDiscounts => (
            PriceFamily::ProductDiscount,
            TemporalRepository::live_row_ids(conn, PriceFamily::ProductDiscount, ctx.vendor_id)?,
        ),
        BatchKind::CustomerOverrides => (
            PriceFamily::CustomerPrice,
            PriceRepository::live_override_row_ids_tx(conn, ctx.vendor_id)?,
        ),
        _ => return Ok(()),
    };
    for row_id in live {
        if !touched.contains(&row_id) {
            TemporalRepository::soft_delete(conn, family, row_id)?;
            result.deleted += 1;
        }
    }
    Ok(())
}

/// 特殊净价 → 折扣：d = 1 - net / 零折扣类别价，必须落在 (0, 1)
fn net_price_discount(
    conn: &Connection,
    ctx: &RunContext<'_>,
    record: &ReferenceRecord,
    product_id: i64,
    net_price: Cents,
    issues: &mut Vec<RecordIssue>,
) -> EngineResult<Option<Discount>> {
    let zero_class = &ctx.opts.zero_discount_class;
    let Some(zero_class_id) = CatalogRepository::find_pricing_class_tx(conn, ctx.vendor_id, zero_class)? else {
        issues.push(RecordIssue::new(record.label(), format!("价格等级不存在: {}", zero_class)));
        return Ok(None);
    };

    let base = match PriceRepository::find_class_price_tx(conn, zero_class_id, product_id)? {
        Some(row) if !row.deleted && row.price > 0 => row.price,
        _ => {
            issues.push(RecordIssue::new(record.label(), format!("缺少 {} 类别价", zero_class)));
            return Ok(None);
        }
    };

    match Discount::new(1.0 - net_price as f64 / base as f64) {
        Ok(d) => Ok(Some(d)),
        Err(_) => {
            issues.push(RecordIssue::new(
                record.label(),
                format!("净价 {} 必须低于 {} 类别价 {} 且为正", net_price, zero_class, base),
            ));
            Ok(None)
        }
    }
}
