// ==========================================
// 价格目录系统 - 价格解析 (PriceResolver)
// ==========================================
// 模式:
//   BASE     : 仅类别价
//   CUSTOMER : 客户价，产品无任何客户价时回落到类别价
//   BOTH     : 类别价，被客户覆盖价按产品整体替换（可限定分类），再并上全部客户价
// 时点替换 (as_of != today):
//   as_of >= today 且 future 生效日 <= as_of  → 取 future
//   否则 current 生效日晚于 as_of             → 取 as_of 之前最近的历史
//   替换后生效日仍晚于 as_of 的行剔除
// 只读路径，不写入任何表
// ==========================================

use crate::domain::resolution::{PriceQuery, ResolvedPrice};
use crate::domain::types::{PriceFamily, PriceMode, PriceSource};
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::catalog_repo::CatalogRepository;
use crate::repository::price_repo::{PriceRepository, PriceView};
use crate::repository::temporal_repo::TemporalRepository;
use chrono::NaiveDate;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

const NOTE_SCHEDULED: &str = "待生效价格";
const NOTE_HISTORICAL: &str = "历史价格";

pub struct PriceResolver {
    conn: Arc<Mutex<Connection>>,
}

impl PriceResolver {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 解析生效价格清单
    #[instrument(skip_all, fields(vendor_id = %query.vendor_id, mode = %query.mode, customer_id = ?query.customer_id, as_of = ?query.as_of))]
    pub fn resolve(&self, query: &PriceQuery, today: NaiveDate) -> EngineResult<Vec<ResolvedPrice>> {
        let _perf = crate::perf::PerfGuard::for_vendor("resolver.resolve", &query.vendor_id);
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| EngineError::LockError(e.to_string()))?;
        // 读事务：不会观察到进行中的批次
        let tx = guard.transaction()?;
        let rows = resolve_tx(&tx, query, today)?;
        tx.commit()?;
        debug!(rows = rows.len(), "价格解析完成");
        Ok(rows)
    }
}

/// 事务内解析
pub fn resolve_tx(conn: &Connection, query: &PriceQuery, today: NaiveDate) -> EngineResult<Vec<ResolvedPrice>> {
    let customer_id = match (query.mode, query.customer_id) {
        (PriceMode::Base, _) => None,
        (_, Some(id)) => Some(check_customer(conn, &query.vendor_id, id)?),
        (mode, None) => {
            return Err(EngineError::InvalidQuery(format!("{} 模式需要 customer_id", mode)));
        }
    };

    let class_ids = applicable_pricing_classes(conn, query, customer_id)?;
    let class_rows: Vec<PriceView> = PriceRepository::class_price_views_tx(conn, &query.vendor_id, query.product_id)?
        .into_iter()
        .filter(|v| class_ids.contains(&v.pricing_class_id))
        .collect();

    let customer_rows: Vec<PriceView> = match customer_id {
        Some(id) => PriceRepository::customer_price_views_tx(conn, id, query.product_id)?
            .into_iter()
            .filter(|v| query.pricing_classes.is_none() || class_ids.contains(&v.pricing_class_id))
            .collect(),
        None => Vec::new(),
    };

    let categories = PriceRepository::category_names_tx(conn, &query.vendor_id)?;

    let merged = match query.mode {
        PriceMode::Base => class_rows,
        PriceMode::Customer => layer_customer(class_rows, customer_rows),
        PriceMode::Both => layer_overrides(class_rows, customer_rows, query.categories.as_deref(), &categories),
    };

    let mut resolved = Vec::with_capacity(merged.len());
    for view in merged {
        if let Some(row) = at_date(conn, view, query.as_of, today, &categories)? {
            resolved.push(row);
        }
    }
    resolved.sort_by(|a, b| {
        (&a.product_identifier, &a.pricing_class, &a.customer).cmp(&(&b.product_identifier, &b.pricing_class, &b.customer))
    });
    Ok(resolved)
}

fn check_customer(conn: &Connection, vendor_id: &str, customer_id: i64) -> EngineResult<i64> {
    match CatalogRepository::find_customer_by_id_tx(conn, customer_id)? {
        Some(c) if c.vendor_id == vendor_id && !c.deleted => Ok(c.customer_id),
        _ => Err(EngineError::NotFound(format!("客户 {} (vendor={})", customer_id, vendor_id))),
    }
}

/// 适用价格等级：显式指定 > 客户分配 > 供应商全部
fn applicable_pricing_classes(
    conn: &Connection,
    query: &PriceQuery,
    customer_id: Option<i64>,
) -> EngineResult<HashSet<i64>> {
    if let Some(names) = &query.pricing_classes {
        let ids = CatalogRepository::vendor_pricing_class_ids_tx(conn, &query.vendor_id, Some(names))?;
        return Ok(ids.into_iter().collect());
    }
    if let Some(id) = customer_id {
        let assigned = CatalogRepository::customer_pricing_class_ids_tx(conn, id)?;
        if !assigned.is_empty() {
            return Ok(assigned.into_iter().collect());
        }
    }
    Ok(CatalogRepository::vendor_pricing_class_ids_tx(conn, &query.vendor_id, None)?
        .into_iter()
        .collect())
}

/// CUSTOMER: 产品有任一客户价时，该产品的类别价（所有等级）全部让位
fn layer_customer(class_rows: Vec<PriceView>, customer_rows: Vec<PriceView>) -> Vec<PriceView> {
    let covered: HashSet<i64> = customer_rows.iter().map(|v| v.product_id).collect();
    class_rows
        .into_iter()
        .filter(|v| !covered.contains(&v.product_id))
        .chain(customer_rows)
        .collect()
}

/// BOTH: 覆盖价剔除该产品的类别价（分类限定时仅剔除限定分类内的产品），再并上全部客户价
fn layer_overrides(
    class_rows: Vec<PriceView>,
    customer_rows: Vec<PriceView>,
    restriction: Option<&[String]>,
    categories: &HashMap<i64, Vec<String>>,
) -> Vec<PriceView> {
    let in_scope = |product_id: i64| match restriction {
        None => true,
        Some(allowed) => categories
            .get(&product_id)
            .is_some_and(|names| names.iter().any(|n| allowed.contains(n))),
    };

    // 按产品剔除：覆盖价压过该产品在任何适用等级上的类别价
    let overridden: HashSet<i64> = customer_rows
        .iter()
        .filter(|v| v.is_override && in_scope(v.product_id))
        .map(|v| v.product_id)
        .collect();

    class_rows
        .into_iter()
        .filter(|v| !overridden.contains(&v.product_id))
        .chain(customer_rows)
        .collect()
}

/// 时点替换，返回 None 表示 as_of 时该行尚不存在
fn at_date(
    conn: &Connection,
    view: PriceView,
    as_of: Option<NaiveDate>,
    today: NaiveDate,
    categories: &HashMap<i64, Vec<String>>,
) -> EngineResult<Option<ResolvedPrice>> {
    let mut price = view.price;
    let mut effective_date = view.effective_date;
    let mut note = None;

    if let Some(as_of) = as_of.filter(|d| *d != today) {
        let pulled_forward = view
            .future
            .filter(|f| as_of >= today && f.effective_date <= as_of)
            .and_then(|f| f.value.as_price().map(|p| (p, f.effective_date)));

        if let Some((p, d)) = pulled_forward {
            price = p;
            effective_date = d;
            note = Some(NOTE_SCHEDULED.to_string());
        } else if effective_date > as_of {
            if let Some(entry) = TemporalRepository::closest_history_before(conn, view.family, view.row_id, as_of)? {
                if let Some(p) = entry.value.as_price() {
                    price = p;
                    effective_date = entry.effective_date;
                    note = Some(NOTE_HISTORICAL.to_string());
                }
            }
        }

        if effective_date > as_of {
            return Ok(None);
        }
    }

    let (source, customer) = match view.family {
        PriceFamily::CustomerPrice => (PriceSource::Customer, view.customer),
        _ => (PriceSource::Class, None),
    };

    Ok(Some(ResolvedPrice {
        product_id: view.product_id,
        category: categories.get(&view.product_id).and_then(|names| names.first().cloned()),
        product_identifier: view.product_identifier,
        description: view.description,
        pricing_class: view.pricing_class,
        customer,
        price,
        effective_date,
        source,
        is_override: view.is_override,
        note,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::records::{NormalizedRecord, ReferenceRecord};
    use crate::domain::types::BatchKind;
    use crate::engine::reconciler::{CatalogReconciler, ReconcileOptions};
    use crate::engine::temporal::TemporalPriceStore;

    struct Fixture {
        conn: Arc<Mutex<Connection>>,
        reconciler: CatalogReconciler,
        resolver: PriceResolver,
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn fixture() -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        Fixture {
            reconciler: CatalogReconciler::new(conn.clone()),
            resolver: PriceResolver::new(conn.clone()),
            conn,
        }
    }

    fn seed(f: &Fixture) -> i64 {
        let opts = ReconcileOptions::default();
        let records = vec![
            NormalizedRecord::new("V1", Some("S1"), "36_A".to_string(), 10000).with_category("S1", 1),
            NormalizedRecord::new("V1", Some("S1"), "36_B".to_string(), 12000).with_category("S1", 1),
        ];
        f.reconciler.reconcile("V1", &records, day(1), day(1), &opts).unwrap();

        let customers = vec![ReferenceRecord::Customer {
            name: "ACME".to_string(),
            pricing_classes: vec!["list price".to_string()],
        }];
        f.reconciler
            .reconcile_reference("V1", BatchKind::Customers, &customers, day(1), day(1), &opts)
            .unwrap();

        let guard = f.conn.lock().unwrap();
        CatalogRepository::find_customer_tx(&guard, "V1", "ACME")
            .unwrap()
            .unwrap()
            .customer_id
    }

    fn add_override(f: &Fixture, product: &str, price: i64) {
        let overrides = vec![ReferenceRecord::CustomerOverride {
            customer: "ACME".to_string(),
            product_identifier: product.to_string(),
            pricing_class: None,
            price,
        }];
        f.reconciler
            .reconcile_reference("V1", BatchKind::CustomerOverrides, &overrides, day(1), day(1), &ReconcileOptions::default())
            .unwrap();
    }

    #[test]
    fn test_base_returns_reconciled_price() {
        let f = fixture();
        seed(&f);
        let rows = f.resolver.resolve(&PriceQuery::new("V1", PriceMode::Base), day(1)).unwrap();
        let prices: Vec<(String, i64)> = rows.iter().map(|r| (r.product_identifier.clone(), r.price)).collect();
        assert_eq!(prices, vec![("S1_36_A".to_string(), 10000), ("S1_36_B".to_string(), 12000)]);
        assert_eq!(rows[0].category.as_deref(), Some("S1"));
    }

    #[test]
    fn test_both_override_replaces_class_price() {
        let f = fixture();
        let customer_id = seed(&f);
        add_override(&f, "S1_36_A", 9000);

        let mut query = PriceQuery::new("V1", PriceMode::Both);
        query.customer_id = Some(customer_id);
        let rows = f.resolver.resolve(&query, day(1)).unwrap();

        let for_a: Vec<&ResolvedPrice> = rows.iter().filter(|r| r.product_identifier == "S1_36_A").collect();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].price, 9000);
        assert!(for_a[0].is_override);
        assert_eq!(for_a[0].source, PriceSource::Customer);
        assert!(rows.iter().any(|r| r.product_identifier == "S1_36_B" && r.price == 12000));
    }

    /// 客户未分配等级时适用供应商全部等级；覆盖价须压过所有等级的类别价
    #[test]
    fn test_override_suppresses_class_prices_of_every_pricing_class() {
        let f = fixture();
        let opts = ReconcileOptions::default();
        let records = vec![
            NormalizedRecord::new("V1", None, "P-1".to_string(), 10000).with_pricing_class("list price"),
            NormalizedRecord::new("V1", None, "P-1".to_string(), 8000).with_pricing_class("zero discount"),
            NormalizedRecord::new("V1", None, "P-2".to_string(), 5000).with_pricing_class("list price"),
        ];
        f.reconciler.reconcile("V1", &records, day(1), day(1), &opts).unwrap();
        let customers = vec![ReferenceRecord::Customer {
            name: "ACME".to_string(),
            pricing_classes: vec![],
        }];
        f.reconciler
            .reconcile_reference("V1", BatchKind::Customers, &customers, day(1), day(1), &opts)
            .unwrap();
        let overrides = vec![ReferenceRecord::CustomerOverride {
            customer: "ACME".to_string(),
            product_identifier: "P-1".to_string(),
            pricing_class: Some("list price".to_string()),
            price: 7000,
        }];
        f.reconciler
            .reconcile_reference("V1", BatchKind::CustomerOverrides, &overrides, day(1), day(1), &opts)
            .unwrap();
        let customer_id = {
            let guard = f.conn.lock().unwrap();
            CatalogRepository::find_customer_tx(&guard, "V1", "ACME").unwrap().unwrap().customer_id
        };

        for mode in [PriceMode::Both, PriceMode::Customer] {
            let mut query = PriceQuery::new("V1", mode);
            query.customer_id = Some(customer_id);
            let rows = f.resolver.resolve(&query, day(1)).unwrap();

            let p1: Vec<(i64, PriceSource)> = rows
                .iter()
                .filter(|r| r.product_identifier == "P-1")
                .map(|r| (r.price, r.source))
                .collect();
            assert_eq!(p1, vec![(7000, PriceSource::Customer)], "mode={}", mode);
            assert!(rows.iter().any(|r| r.product_identifier == "P-2" && r.price == 5000));
        }
    }

    #[test]
    fn test_both_category_restriction_keeps_class_price_outside_scope() {
        let f = fixture();
        let customer_id = seed(&f);
        add_override(&f, "S1_36_A", 9000);

        let mut query = PriceQuery::new("V1", PriceMode::Both);
        query.customer_id = Some(customer_id);
        query.categories = Some(vec!["OTHER".to_string()]);
        let rows = f.resolver.resolve(&query, day(1)).unwrap();

        let for_a: Vec<i64> = rows
            .iter()
            .filter(|r| r.product_identifier == "S1_36_A")
            .map(|r| r.price)
            .collect();
        assert_eq!(for_a, vec![10000, 9000]);
    }

    #[test]
    fn test_as_of_pulls_future_and_walks_history() {
        let f = fixture();
        seed(&f);
        let store = TemporalPriceStore::new(f.conn.clone());
        let opts = ReconcileOptions::default();

        // day 10 生效 11000，今天为 day 10
        let bumped = vec![
            NormalizedRecord::new("V1", Some("S1"), "36_A".to_string(), 11000),
            NormalizedRecord::new("V1", Some("S1"), "36_B".to_string(), 12000),
        ];
        f.reconciler.reconcile("V1", &bumped, day(10), day(10), &opts).unwrap();
        // day 20 待生效 13000
        let future = vec![
            NormalizedRecord::new("V1", Some("S1"), "36_A".to_string(), 13000),
            NormalizedRecord::new("V1", Some("S1"), "36_B".to_string(), 12000),
        ];
        f.reconciler.reconcile("V1", &future, day(20), day(10), &opts).unwrap();
        assert_eq!(store.implement(day(10), None).unwrap().promoted, 0);

        let price_of_a = |as_of: NaiveDate| {
            let mut q = PriceQuery::new("V1", PriceMode::Base);
            q.as_of = Some(as_of);
            f.resolver
                .resolve(&q, day(10))
                .unwrap()
                .into_iter()
                .find(|r| r.product_identifier == "S1_36_A")
                .map(|r| (r.price, r.note))
        };

        assert_eq!(price_of_a(day(25)), Some((13000, Some(NOTE_SCHEDULED.to_string()))));
        assert_eq!(price_of_a(day(15)), Some((11000, None)));
        assert_eq!(price_of_a(day(5)), Some((10000, Some(NOTE_HISTORICAL.to_string()))));
    }

    #[test]
    fn test_as_of_before_first_price_excludes_row() {
        let f = fixture();
        seed(&f);
        let mut q = PriceQuery::new("V1", PriceMode::Base);
        q.as_of = Some(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert!(f.resolver.resolve(&q, day(1)).unwrap().is_empty());
    }

    #[test]
    fn test_customer_mode_requires_customer() {
        let f = fixture();
        seed(&f);
        let err = f
            .resolver
            .resolve(&PriceQuery::new("V1", PriceMode::Customer), day(1))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuery(_)));
    }

    #[test]
    fn test_customer_mode_falls_back_to_class_price() {
        let f = fixture();
        let customer_id = seed(&f);
        add_override(&f, "S1_36_B", 11500);

        let mut q = PriceQuery::new("V1", PriceMode::Customer);
        q.customer_id = Some(customer_id);
        let rows = f.resolver.resolve(&q, day(1)).unwrap();
        let prices: Vec<(String, i64, PriceSource)> = rows
            .iter()
            .map(|r| (r.product_identifier.clone(), r.price, r.source))
            .collect();
        assert_eq!(
            prices,
            vec![
                ("S1_36_A".to_string(), 10000, PriceSource::Class),
                ("S1_36_B".to_string(), 11500, PriceSource::Customer),
            ]
        );
    }
}
