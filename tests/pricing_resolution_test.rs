// ==========================================
// 客户定价 + 价格解析 集成测试
// ==========================================
// 覆盖: 参考表对账 → 后台重新定价 → BASE/CUSTOMER/BOTH 解析 → 覆盖价优先
// ==========================================


use price_catalog::domain::{
    BatchKind, Discount, NormalizedRecord, PriceFamily, PriceMode, PriceQuery, PriceSource, ReferenceRecord,
    ResolvedPrice, TemporalValue,
};
use price_catalog::engine::{
    CatalogReconciler, EngineError, PriceResolver, ReconcileOptions, RepricingQueue, RepricingRequest,
    TemporalPriceStore, VendorLocks,
};
use price_catalog::importer::{CellGrid, ReferenceSheetKind};
use price_catalog::logging;
use price_catalog::repository::{CatalogRepository, DiscountRepository, RepricingStatus};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use test_helpers::{customer_id, day, shared_test_db};

const VENDOR: &str = "V1";
const ZERO: &str = "zero discount";

struct Fixture {
    _temp_file: NamedTempFile,
    conn: Arc<Mutex<Connection>>,
    reconciler: CatalogReconciler,
    resolver: PriceResolver,
    queue: RepricingQueue,
}

fn fixture() -> Fixture {
    let (temp_file, conn) = shared_test_db();
    Fixture {
        _temp_file: temp_file,
        reconciler: CatalogReconciler::new(conn.clone()),
        resolver: PriceResolver::new(conn.clone()),
        queue: RepricingQueue::new(conn.clone(), Arc::new(VendorLocks::new())),
        conn,
    }
}

fn price_book(a: i64, b: i64) -> Vec<NormalizedRecord> {
    vec![
        NormalizedRecord::new(VENDOR, Some("CP"), "36_A".to_string(), a)
            .with_pricing_class(ZERO)
            .with_category("CP", 1),
        NormalizedRecord::new(VENDOR, Some("CP"), "36_B".to_string(), b)
            .with_pricing_class(ZERO)
            .with_category("CP", 1),
        NormalizedRecord::new(VENDOR, Some("CP"), "36_A".to_string(), 25000).with_category("CP", 1),
        NormalizedRecord::new(VENDOR, Some("CP"), "36_B".to_string(), 36000).with_category("CP", 1),
    ]
}

fn reference(f: &Fixture, kind: BatchKind, records: Vec<ReferenceRecord>) {
    f.reconciler
        .reconcile_reference(VENDOR, kind, &records, day(2026, 3, 1), day(2026, 3, 1), &ReconcileOptions::default())
        .unwrap();
}

/// 价目表 + ACME 客户 + 常设折扣
fn seed(f: &Fixture) -> i64 {
    let today = day(2026, 3, 1);
    f.reconciler
        .reconcile(VENDOR, &price_book(20000, 30000), today, today, &ReconcileOptions::default())
        .unwrap();

    reference(
        f,
        BatchKind::Customers,
        vec![ReferenceRecord::Customer {
            name: "ACME".to_string(),
            pricing_classes: vec![ZERO.to_string()],
        }],
    );
    reference(
        f,
        BatchKind::ProductDiscounts,
        vec![ReferenceRecord::ProductDiscount {
            customer: "ACME".to_string(),
            product_identifier: "CP_36_A".to_string(),
            discount: Discount::new(0.25).unwrap(),
        }],
    );
    reference(
        f,
        BatchKind::ClassDiscounts,
        vec![ReferenceRecord::ClassDiscount {
            customer: "ACME".to_string(),
            category: "CP".to_string(),
            rank: 1,
            discount: Discount::new(0.10).unwrap(),
        }],
    );
    customer_id(&f.conn, VENDOR, "ACME")
}

async fn reprice(f: &Fixture) -> usize {
    let today = day(2026, 3, 1);
    let handle = f
        .queue
        .submit(RepricingRequest {
            vendor_id: VENDOR.to_string(),
            effective_date: today,
            today,
            zero_discount_class: ZERO.to_string(),
            trigger_source: Some("test".to_string()),
        })
        .unwrap();
    let task_id = handle.task_id.clone();
    handle.wait().await.unwrap();

    let task = f.queue.tasks().find_by_id(&task_id).unwrap().unwrap();
    assert_eq!(task.status, RepricingStatus::Completed);
    task.repriced_rows
}

fn resolve(f: &Fixture, mode: PriceMode, customer: Option<i64>) -> Vec<ResolvedPrice> {
    let mut query = PriceQuery::new(VENDOR, mode);
    query.customer_id = customer;
    f.resolver.resolve(&query, day(2026, 3, 1)).unwrap()
}

fn price_of<'a>(rows: &'a [ResolvedPrice], identifier: &str, class: &str) -> &'a ResolvedPrice {
    rows.iter()
        .find(|r| r.product_identifier == identifier && r.pricing_class == class)
        .unwrap_or_else(|| panic!("缺少 {} / {}", identifier, class))
}

#[tokio::test]
async fn test_repricing_derives_customer_prices_from_zero_discount_class() {
    logging::init_test();
    let f = fixture();
    let acme = seed(&f);

    assert_eq!(reprice(&f).await, 2);
    // 第二次无变化
    assert_eq!(reprice(&f).await, 0);

    let rows = resolve(&f, PriceMode::Customer, Some(acme));
    // 产品折扣 0.25 优先于分类折扣 0.10
    let a = price_of(&rows, "CP_36_A", ZERO);
    assert_eq!((a.price, a.source, a.is_override), (15000, PriceSource::Customer, false));
    let b = price_of(&rows, "CP_36_B", ZERO);
    assert_eq!(b.price, 27000);
    // 客户仅适用零折扣等级
    assert!(rows.iter().all(|r| r.pricing_class == ZERO));
}

#[tokio::test]
async fn test_special_net_price_becomes_product_discount() {
    logging::init_test();
    let f = fixture();
    let acme = seed(&f);

    reference(
        &f,
        BatchKind::SpecialNetPrices,
        vec![ReferenceRecord::SpecialNetPrice {
            customer: "ACME".to_string(),
            product_identifier: "CP_36_B".to_string(),
            net_price: 24000,
        }],
    );
    {
        let guard = f.conn.lock().unwrap();
        let product = CatalogRepository::find_product_tx(&guard, VENDOR, "CP_36_B").unwrap().unwrap();
        let discount = DiscountRepository::find_product_discount_tx(&guard, product.product_id, acme)
            .unwrap()
            .unwrap();
        assert!((discount.discount - 0.2).abs() < 1e-9);
    }

    reprice(&f).await;
    let rows = resolve(&f, PriceMode::Customer, Some(acme));
    assert_eq!(price_of(&rows, "CP_36_B", ZERO).price, 24000);
    // 特殊净价批次不退役其它产品折扣
    assert_eq!(price_of(&rows, "CP_36_A", ZERO).price, 15000);
}

#[tokio::test]
async fn test_override_wins_and_survives_price_changes() {
    logging::init_test();
    let f = fixture();
    let acme = seed(&f);
    reprice(&f).await;

    reference(
        &f,
        BatchKind::CustomerOverrides,
        vec![ReferenceRecord::CustomerOverride {
            customer: "ACME".to_string(),
            product_identifier: "CP_36_A".to_string(),
            pricing_class: Some(ZERO.to_string()),
            price: 14000,
        }],
    );

    let both = resolve(&f, PriceMode::Both, Some(acme));
    let a = price_of(&both, "CP_36_A", ZERO);
    assert_eq!((a.price, a.is_override), (14000, true));
    assert_eq!(a.customer.as_deref(), Some("ACME"));
    // 没有覆盖价的产品保留类别价
    let b = price_of(&both, "CP_36_B", ZERO);
    assert_eq!((b.price, b.source), (30000, PriceSource::Class));

    // 零折扣价上调后，派生价随之变化，覆盖价不变
    let today = day(2026, 3, 1);
    let result = f
        .reconciler
        .reconcile(VENDOR, &price_book(22000, 40000), today, today, &ReconcileOptions::default())
        .unwrap();
    assert_eq!(result.updated, 2);
    assert_eq!(result.propagated, 1);

    let customer = resolve(&f, PriceMode::Customer, Some(acme));
    assert_eq!(price_of(&customer, "CP_36_A", ZERO).price, 14000);
    assert_eq!(price_of(&customer, "CP_36_B", ZERO).price, 36000);

    // BASE 不受客户影响
    let base = resolve(&f, PriceMode::Base, None);
    assert_eq!(price_of(&base, "CP_36_A", ZERO).price, 22000);
    assert_eq!(price_of(&base, "CP_36_A", "list price").price, 25000);
}

#[test]
fn test_discount_bound_is_rejected_at_write() {
    logging::init_test();
    assert!(Discount::new(0.0).is_err());
    assert!(Discount::new(1.0).is_err());
    assert!(Discount::from_ingress(150.0).is_err());

    let grid = CellGrid::from_strings(&[
        ["Customer", "Product", "Discount"],
        ["ACME", "CP_36_A", "150"],
        ["ACME", "CP_36_B", "35"],
    ]);
    let (records, issues) = ReferenceSheetKind::ProductDiscounts.parse(&grid, 1);
    assert_eq!(records.len(), 1);
    assert_eq!(issues.len(), 1);
    match &records[0] {
        ReferenceRecord::ProductDiscount { discount, .. } => assert!((discount.value() - 0.35).abs() < 1e-9),
        other => panic!("unexpected record: {:?}", other),
    }

    let f = fixture();
    let acme = seed(&f);
    let row_id = {
        let guard = f.conn.lock().unwrap();
        let product = CatalogRepository::find_product_tx(&guard, VENDOR, "CP_36_A").unwrap().unwrap();
        DiscountRepository::find_product_discount_tx(&guard, product.product_id, acme)
            .unwrap()
            .unwrap()
            .row_id
    };
    let store = TemporalPriceStore::new(f.conn.clone());
    let today = day(2026, 3, 1);
    assert!(store
        .schedule(PriceFamily::ProductDiscount, row_id, TemporalValue::Discount(1.0), today, today)
        .is_err());
    assert_eq!(
        store.load(PriceFamily::ProductDiscount, row_id).unwrap().value,
        TemporalValue::Discount(0.25)
    );
}

#[test]
fn test_removed_customer_is_soft_deleted_and_not_resolvable() {
    logging::init_test();
    let f = fixture();
    let acme = seed(&f);

    reference(
        &f,
        BatchKind::Customers,
        vec![ReferenceRecord::Customer {
            name: "BETA".to_string(),
            pricing_classes: vec![ZERO.to_string()],
        }],
    );

    let live = CatalogRepository::new(f.conn.clone()).list_customers(VENDOR, false).unwrap();
    let names: Vec<&str> = live.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["BETA"]);

    let mut query = PriceQuery::new(VENDOR, PriceMode::Customer);
    query.customer_id = Some(acme);
    let err = f.resolver.resolve(&query, day(2026, 3, 1)).unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    // 重新出现即恢复
    let today = day(2026, 3, 1);
    let result = f
        .reconciler
        .reconcile_reference(
            VENDOR,
            BatchKind::Customers,
            &[
                ReferenceRecord::Customer {
                    name: "ACME".to_string(),
                    pricing_classes: vec![],
                },
                ReferenceRecord::Customer {
                    name: "BETA".to_string(),
                    pricing_classes: vec![],
                },
            ],
            today,
            today,
            &ReconcileOptions::default(),
        )
        .unwrap();
    assert_eq!(result.updated, 1);
    assert_eq!(result.unchanged, 1);
    assert!(f.resolver.resolve(&query, today).is_ok());
}

#[test]
fn test_customer_modes_require_customer() {
    logging::init_test();
    let f = fixture();
    seed(&f);
    for mode in [PriceMode::Customer, PriceMode::Both] {
        let err = f.resolver.resolve(&PriceQuery::new(VENDOR, mode), day(2026, 3, 1)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuery(_)));
    }
}

#[test]
fn test_as_of_resolution_uses_future_and_history() {
    logging::init_test();
    let f = fixture();
    seed(&f);
    let opts = ReconcileOptions::default();

    // 3/10 生效 21000，今天 3/10；3/20 待生效 23000
    f.reconciler
        .reconcile(VENDOR, &price_book(21000, 30000), day(2026, 3, 10), day(2026, 3, 10), &opts)
        .unwrap();
    f.reconciler
        .reconcile(VENDOR, &price_book(23000, 30000), day(2026, 3, 20), day(2026, 3, 10), &opts)
        .unwrap();

    let at = |as_of| {
        let mut q = PriceQuery::new(VENDOR, PriceMode::Base);
        q.as_of = Some(as_of);
        let rows = f.resolver.resolve(&q, day(2026, 3, 10)).unwrap();
        rows.into_iter()
            .find(|r| r.product_identifier == "CP_36_A" && r.pricing_class == ZERO)
            .map(|r| (r.price, r.note.is_some()))
    };

    assert_eq!(at(day(2026, 3, 25)), Some((23000, true)));
    assert_eq!(at(day(2026, 3, 15)), Some((21000, false)));
    assert_eq!(at(day(2026, 3, 5)), Some((20000, true)));
    assert_eq!(at(day(2026, 2, 1)), None);
}

/// 客户同时适用两个价格等级：客户价只落在零折扣等级，另一等级的类别价也不得出现
#[tokio::test]
async fn test_customer_price_displaces_class_prices_across_assigned_classes() {
    logging::init_test();
    let f = fixture();
    let acme = seed(&f);
    reference(
        &f,
        BatchKind::Customers,
        vec![ReferenceRecord::Customer {
            name: "ACME".to_string(),
            pricing_classes: vec![ZERO.to_string(), "list price".to_string()],
        }],
    );
    reprice(&f).await;

    let customer = resolve(&f, PriceMode::Customer, Some(acme));
    let a: Vec<(&str, i64, PriceSource)> = customer
        .iter()
        .filter(|r| r.product_identifier == "CP_36_A")
        .map(|r| (r.pricing_class.as_str(), r.price, r.source))
        .collect();
    assert_eq!(a, vec![(ZERO, 15000, PriceSource::Customer)]);

    reference(
        &f,
        BatchKind::CustomerOverrides,
        vec![ReferenceRecord::CustomerOverride {
            customer: "ACME".to_string(),
            product_identifier: "CP_36_B".to_string(),
            pricing_class: Some(ZERO.to_string()),
            price: 26000,
        }],
    );

    let both = resolve(&f, PriceMode::Both, Some(acme));
    let b: Vec<(&str, i64, bool)> = both
        .iter()
        .filter(|r| r.product_identifier == "CP_36_B")
        .map(|r| (r.pricing_class.as_str(), r.price, r.is_override))
        .collect();
    assert_eq!(b, vec![(ZERO, 26000, true)]);

    // 未覆盖的产品在两个等级上都保留类别价，外加派生客户价
    let a_classes: Vec<(&str, PriceSource)> = both
        .iter()
        .filter(|r| r.product_identifier == "CP_36_A")
        .map(|r| (r.pricing_class.as_str(), r.source))
        .collect();
    assert_eq!(
        a_classes,
        vec![("list price", PriceSource::Class), (ZERO, PriceSource::Class), (ZERO, PriceSource::Customer)]
    );
}
