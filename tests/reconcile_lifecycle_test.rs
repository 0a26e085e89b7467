// ==========================================
// 对账 + 时效存储 集成测试
// ==========================================
// 覆盖: 抽取 → 对账 → 待生效 → 推进 → 回滚 → 顺延
// ==========================================


use chrono::Duration;
use price_catalog::domain::{BatchStatus, NormalizedRecord, PriceFamily, PriceMode, PriceQuery, TemporalValue};
use price_catalog::engine::{CatalogReconciler, EngineError, PriceResolver, ReconcileOptions, TemporalPriceStore};
use price_catalog::importer::{CellGrid, ExtractContext, LongWindowExtractor, SeriesExtractor};
use price_catalog::logging;
use price_catalog::repository::{CatalogRepository, ImportBatchRepository};
use test_helpers::{class_price, day, shared_test_db};

const VENDOR: &str = "V1";

fn extract_window(rows: &[[&'static str; 3]]) -> Vec<NormalizedRecord> {
    let grid = CellGrid::from_strings(rows);
    LongWindowExtractor::tonnage_option(0)
        .extract(&grid, &ExtractContext::new(VENDOR, "S1"))
        .expect("抽取失败")
        .records
}

#[test]
fn test_window_to_future_price_lifecycle() {
    logging::init_test();
    let (_temp_file, conn) = shared_test_db();
    let reconciler = CatalogReconciler::new(conn.clone());
    let store = TemporalPriceStore::new(conn.clone());
    let opts = ReconcileOptions::default();
    let today = day(2026, 3, 1);

    let records = extract_window(&[["36", "A", "100.00"], ["36", "B", "120.00"]]);
    let keys: Vec<(&str, i64)> = records.iter().map(|r| (r.key.as_str(), r.price)).collect();
    assert_eq!(keys, vec![("36_A", 10000), ("36_B", 12000)]);

    let first = reconciler.reconcile(VENDOR, &records, today, today, &opts).unwrap();
    assert_eq!(first.inserted, 2);
    assert_eq!(first.deleted, 0);

    // 30 天后生效的新价
    let due = today + Duration::days(30);
    let bumped = extract_window(&[["36", "A", "110.00"], ["36", "B", "120.00"]]);
    let second = reconciler.reconcile(VENDOR, &bumped, due, today, &opts).unwrap();
    assert_eq!(second.scheduled, 1);
    assert_eq!(second.unchanged, 1);

    let a = class_price(&conn, VENDOR, "list price", "S1_36_A").unwrap();
    assert_eq!(a.price, 10000);
    let row = store.load(PriceFamily::ClassPrice, a.row_id).unwrap();
    assert_eq!(row.future.map(|f| (f.value, f.effective_date)), Some((TemporalValue::Price(11000), due)));

    // 到期前推进是空操作
    assert_eq!(store.implement(due - Duration::days(1), None).unwrap().promoted, 0);
    assert_eq!(class_price(&conn, VENDOR, "list price", "S1_36_A").unwrap().price, 10000);

    // 到期当日推进
    assert_eq!(store.implement(due, None).unwrap().promoted, 1);
    let a = class_price(&conn, VENDOR, "list price", "S1_36_A").unwrap();
    assert_eq!((a.price, a.effective_date), (11000, due));
    assert_eq!(store.pending_due(due).unwrap(), 0);

    // 再次推进幂等
    assert_eq!(store.implement(due, None).unwrap().promoted, 0);

    let history = store.history(PriceFamily::ClassPrice, a.row_id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].value, TemporalValue::Price(10000));
    assert_eq!(history[0].effective_date, today);
}

#[test]
fn test_reconcile_is_idempotent_and_round_trips_through_base_resolve() {
    logging::init_test();
    let (_temp_file, conn) = shared_test_db();
    let reconciler = CatalogReconciler::new(conn.clone());
    let resolver = PriceResolver::new(conn.clone());
    let store = TemporalPriceStore::new(conn.clone());
    let opts = ReconcileOptions::default();
    let today = day(2026, 3, 1);

    let records = extract_window(&[["24", "A", "80.00"], ["36", "A", "100.00"], ["48", "C", "150.50"]]);
    let first = reconciler.reconcile(VENDOR, &records, today, today, &opts).unwrap();
    assert_eq!(first.inserted, 3);

    let again = reconciler.reconcile(VENDOR, &records, today, today, &opts).unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.updated, 0);
    assert_eq!(again.deleted, 0);
    assert_eq!(again.unchanged, 3);

    let rows = resolver.resolve(&PriceQuery::new(VENDOR, PriceMode::Base), today).unwrap();
    let mut resolved: Vec<(String, i64)> = rows.iter().map(|r| (r.product_identifier.clone(), r.price)).collect();
    resolved.sort();
    assert_eq!(
        resolved,
        vec![
            ("S1_24_A".to_string(), 8000),
            ("S1_36_A".to_string(), 10000),
            ("S1_48_C".to_string(), 15050),
        ]
    );

    let a = class_price(&conn, VENDOR, "list price", "S1_36_A").unwrap();
    assert!(store.history(PriceFamily::ClassPrice, a.row_id).unwrap().is_empty());

    let batches = ImportBatchRepository::new(conn.clone()).list_by_vendor(VENDOR).unwrap();
    assert_eq!(batches.len(), 2);
    assert!(batches.iter().all(|b| b.status == BatchStatus::Committed));
}

#[test]
fn test_absent_records_are_retired_and_revived() {
    logging::init_test();
    let (_temp_file, conn) = shared_test_db();
    let reconciler = CatalogReconciler::new(conn.clone());
    let opts = ReconcileOptions::default();
    let today = day(2026, 3, 1);

    let full = extract_window(&[["36", "A", "100.00"], ["36", "B", "120.00"]]);
    reconciler.reconcile(VENDOR, &full, today, today, &opts).unwrap();

    let partial = extract_window(&[["36", "A", "100.00"]]);
    let retired = reconciler.reconcile(VENDOR, &partial, today, today, &opts).unwrap();
    assert_eq!(retired.deleted, 1);
    assert!(class_price(&conn, VENDOR, "list price", "S1_36_B").unwrap().deleted);

    // 不退役模式下缺席记录保持原状
    let keep = ReconcileOptions {
        retire_absent: false,
        ..ReconcileOptions::default()
    };
    let revived = reconciler.reconcile(VENDOR, &full, today, today, &keep).unwrap();
    assert_eq!(revived.updated, 1);
    assert!(!class_price(&conn, VENDOR, "list price", "S1_36_B").unwrap().deleted);

    let untouched = reconciler.reconcile(VENDOR, &partial, today, today, &keep).unwrap();
    assert_eq!(untouched.deleted, 0);
    assert!(!class_price(&conn, VENDOR, "list price", "S1_36_B").unwrap().deleted);
}

#[test]
fn test_rollback_restores_previous_value_and_delay_moves_future() {
    logging::init_test();
    let (_temp_file, conn) = shared_test_db();
    let reconciler = CatalogReconciler::new(conn.clone());
    let store = TemporalPriceStore::new(conn.clone());
    let opts = ReconcileOptions::default();

    let start = day(2026, 1, 1);
    let raise = day(2026, 2, 1);
    reconciler
        .reconcile(VENDOR, &extract_window(&[["36", "A", "100.00"]]), start, start, &opts)
        .unwrap();
    reconciler
        .reconcile(VENDOR, &extract_window(&[["36", "A", "125.00"]]), raise, raise, &opts)
        .unwrap();
    let before = class_price(&conn, VENDOR, "list price", "S1_36_A").unwrap();
    assert_eq!((before.price, before.effective_date), (12500, raise));

    // 回滚: 恢复 2026-01-01 的价格，被回滚的 125.00 改为 2026-03-15 生效
    let today = day(2026, 2, 10);
    let reapply = day(2026, 3, 15);
    let report = store.rollback(VENDOR, raise, reapply, today).unwrap();
    assert_eq!(report.rolled_back, 1);
    assert!(report.skipped.is_empty());

    let rolled = class_price(&conn, VENDOR, "list price", "S1_36_A").unwrap();
    assert_eq!((rolled.price, rolled.effective_date), (10000, start));
    let row = store.load(PriceFamily::ClassPrice, rolled.row_id).unwrap();
    assert_eq!(
        row.future.map(|f| (f.value, f.effective_date)),
        Some((TemporalValue::Price(12500), reapply))
    );

    // 顺延
    let later = day(2026, 4, 1);
    let delayed = store.delay(VENDOR, reapply, later, today).unwrap();
    assert_eq!(delayed.delayed, 1);
    assert_eq!(store.implement(reapply, None).unwrap().promoted, 0);
    assert_eq!(store.implement(later, None).unwrap().promoted, 1);

    let promoted = class_price(&conn, VENDOR, "list price", "S1_36_A").unwrap();
    assert_eq!((promoted.price, promoted.effective_date), (12500, later));
}

#[test]
fn test_rollback_and_delay_reject_invalid_windows() {
    logging::init_test();
    let (_temp_file, conn) = shared_test_db();
    let store = TemporalPriceStore::new(conn);
    let today = day(2026, 3, 1);

    let err = store.rollback(VENDOR, day(2026, 2, 1), day(2026, 2, 15), today).unwrap_err();
    assert!(matches!(err, EngineError::InvalidScheduleWindow { .. }));

    let err = store.delay(VENDOR, day(2026, 4, 1), day(2026, 3, 20), today).unwrap_err();
    assert!(matches!(err, EngineError::InvalidScheduleWindow { .. }));
}

#[test]
fn test_rollback_without_history_is_skipped() {
    logging::init_test();
    let (_temp_file, conn) = shared_test_db();
    let reconciler = CatalogReconciler::new(conn.clone());
    let store = TemporalPriceStore::new(conn.clone());
    let start = day(2026, 1, 1);
    reconciler
        .reconcile(VENDOR, &extract_window(&[["36", "A", "100.00"]]), start, start, &ReconcileOptions::default())
        .unwrap();

    let report = store.rollback(VENDOR, start, day(2026, 4, 1), day(2026, 3, 1)).unwrap();
    assert_eq!(report.rolled_back, 0);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(class_price(&conn, VENDOR, "list price", "S1_36_A").unwrap().price, 10000);
}

#[test]
fn test_reconciled_product_exposes_categories_attributes_and_classes() {
    logging::init_test();
    let (_temp_file, conn) = shared_test_db();
    let reconciler = CatalogReconciler::new(conn.clone());
    let catalog = CatalogRepository::new(conn.clone());
    let today = day(2026, 3, 1);
    reconciler
        .reconcile(VENDOR, &extract_window(&[["36", "A", "100.00"]]), today, today, &ReconcileOptions::default())
        .unwrap();

    let product = catalog.find_product(VENDOR, "S1_36_A").unwrap().expect("产品应已建档");
    assert_eq!(product.series.as_deref(), Some("S1"));
    assert!(!product.deleted);
    assert!(catalog.find_product(VENDOR, "S1_48_A").unwrap().is_none());
    assert!(catalog.find_product("OTHER", "S1_36_A").unwrap().is_none());

    let categories: Vec<(String, i32)> = catalog
        .product_categories(product.product_id)
        .unwrap()
        .into_iter()
        .map(|c| (c.name, c.rank))
        .collect();
    assert_eq!(categories, vec![("S1".to_string(), 1)]);

    let attrs = catalog.product_attributes(product.product_id).unwrap();
    assert_eq!(attrs.len(), 1);
    assert_eq!((attrs[0].attr.as_str(), attrs[0].value.as_str()), ("tonnage", "36"));

    let classes: Vec<String> = catalog
        .list_pricing_classes(VENDOR)
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(classes, vec!["list price".to_string()]);
    assert!(catalog.list_pricing_classes("OTHER").unwrap().is_empty());
}
