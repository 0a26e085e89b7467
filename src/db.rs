// ==========================================
// 价格目录系统 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 统一建表入口，所有表结构幂等创建
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::path::Path;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection<P: AsRef<Path>>(db_path: P) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 时效价格族的三张表（current / future / history）
///
/// future 与 history 表统一使用 `value` 列，current 表使用各族的原生列名。
fn temporal_family_ddl(table: &str, value_column: &str, value_type: &str, check: &str, extra_columns: &str, unique: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            {extra_columns}
            {value_column} {value_type} NOT NULL CHECK ({check_current}),
            effective_date TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE({unique})
        );

        CREATE TABLE IF NOT EXISTS {table}_future (
            row_id INTEGER PRIMARY KEY REFERENCES {table}(row_id),
            value {value_type} NOT NULL CHECK ({check_value}),
            effective_date TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS {table}_history (
            history_id INTEGER PRIMARY KEY AUTOINCREMENT,
            row_id INTEGER NOT NULL REFERENCES {table}(row_id),
            value {value_type} NOT NULL,
            effective_date TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_{table}_history_row ON {table}_history(row_id, effective_date);
        CREATE INDEX IF NOT EXISTS idx_{table}_future_date ON {table}_future(effective_date);

        CREATE TRIGGER IF NOT EXISTS trg_{table}_history_no_update
        BEFORE UPDATE ON {table}_history
        BEGIN
            SELECT RAISE(ABORT, 'history is append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS trg_{table}_history_no_delete
        BEFORE DELETE ON {table}_history
        BEGIN
            SELECT RAISE(ABORT, 'history is append-only');
        END;
        "#,
        table = table,
        value_column = value_column,
        value_type = value_type,
        check_current = check.replace("{col}", value_column),
        check_value = check.replace("{col}", "value"),
        extra_columns = extra_columns,
        unique = unique,
    )
}

/// 幂等建表（所有表、索引、触发器）
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS product (
            product_id INTEGER PRIMARY KEY AUTOINCREMENT,
            vendor_id TEXT NOT NULL,
            product_identifier TEXT NOT NULL,
            description TEXT,
            series TEXT,
            deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(vendor_id, product_identifier)
        );

        CREATE TABLE IF NOT EXISTS product_attr (
            product_id INTEGER NOT NULL REFERENCES product(product_id),
            attr TEXT NOT NULL,
            attr_type TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (product_id, attr)
        );

        CREATE TABLE IF NOT EXISTS product_class (
            product_class_id INTEGER PRIMARY KEY AUTOINCREMENT,
            vendor_id TEXT NOT NULL,
            name TEXT NOT NULL,
            rank INTEGER NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            UNIQUE(vendor_id, name, rank)
        );

        CREATE TABLE IF NOT EXISTS product_category (
            product_id INTEGER NOT NULL REFERENCES product(product_id),
            product_class_id INTEGER NOT NULL REFERENCES product_class(product_class_id),
            PRIMARY KEY (product_id, product_class_id)
        );

        CREATE TABLE IF NOT EXISTS pricing_class (
            pricing_class_id INTEGER PRIMARY KEY AUTOINCREMENT,
            vendor_id TEXT NOT NULL,
            name TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            UNIQUE(vendor_id, name)
        );

        CREATE TABLE IF NOT EXISTS customer (
            customer_id INTEGER PRIMARY KEY AUTOINCREMENT,
            vendor_id TEXT NOT NULL,
            name TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            UNIQUE(vendor_id, name)
        );

        CREATE TABLE IF NOT EXISTS customer_pricing_class (
            customer_id INTEGER NOT NULL REFERENCES customer(customer_id),
            pricing_class_id INTEGER NOT NULL REFERENCES pricing_class(pricing_class_id),
            PRIMARY KEY (customer_id, pricing_class_id)
        );

        CREATE TABLE IF NOT EXISTS import_batch (
            batch_id TEXT PRIMARY KEY,
            vendor_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            file_name TEXT,
            effective_date TEXT NOT NULL,
            updated_rows INTEGER NOT NULL DEFAULT 0,
            inserted_rows INTEGER NOT NULL DEFAULT 0,
            deleted_rows INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            error_message TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS repricing_task (
            task_id TEXT PRIMARY KEY,
            vendor_id TEXT NOT NULL,
            effective_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            repriced_rows INTEGER NOT NULL DEFAULT 0,
            trigger_source TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            error_message TEXT
        );
        "#,
    )?;

    conn.execute_batch(&temporal_family_ddl(
        "class_price",
        "price",
        "INTEGER",
        "{col} >= 0",
        "pricing_class_id INTEGER NOT NULL REFERENCES pricing_class(pricing_class_id),
            product_id INTEGER NOT NULL REFERENCES product(product_id),",
        "pricing_class_id, product_id",
    ))?;

    conn.execute_batch(&temporal_family_ddl(
        "customer_price",
        "price",
        "INTEGER",
        "{col} >= 0",
        "product_id INTEGER NOT NULL REFERENCES product(product_id),
            pricing_class_id INTEGER NOT NULL REFERENCES pricing_class(pricing_class_id),
            customer_id INTEGER NOT NULL REFERENCES customer(customer_id),
            is_override INTEGER NOT NULL DEFAULT 0,",
        "product_id, pricing_class_id, customer_id",
    ))?;

    conn.execute_batch(&temporal_family_ddl(
        "product_class_discount",
        "discount",
        "REAL",
        "{col} > 0 AND {col} < 1",
        "product_class_id INTEGER NOT NULL REFERENCES product_class(product_class_id),
            customer_id INTEGER NOT NULL REFERENCES customer(customer_id),",
        "product_class_id, customer_id",
    ))?;

    conn.execute_batch(&temporal_family_ddl(
        "product_discount",
        "discount",
        "REAL",
        "{col} > 0 AND {col} < 1",
        "product_id INTEGER NOT NULL REFERENCES product(product_id),
            customer_id INTEGER NOT NULL REFERENCES customer(customer_id),",
        "product_id, customer_id",
    ))?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_history_rows_are_append_only() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();

        conn.execute_batch(
            r#"
            INSERT INTO pricing_class (vendor_id, name) VALUES ('V1', 'list price');
            INSERT INTO product (vendor_id, product_identifier) VALUES ('V1', 'P1');
            INSERT INTO class_price (pricing_class_id, product_id, price, effective_date)
                VALUES (1, 1, 100, '2026-01-01');
            INSERT INTO class_price_history (row_id, value, effective_date, recorded_at)
                VALUES (1, 90, '2025-01-01', '2026-01-01T00:00:00Z');
            "#,
        )
        .unwrap();

        assert!(conn
            .execute("UPDATE class_price_history SET value = 1", [])
            .is_err());
        assert!(conn.execute("DELETE FROM class_price_history", []).is_err());
    }

    #[test]
    fn test_discount_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();

        conn.execute_batch(
            r#"
            INSERT INTO customer (vendor_id, name) VALUES ('V1', 'ACME');
            INSERT INTO product (vendor_id, product_identifier) VALUES ('V1', 'P1');
            "#,
        )
        .unwrap();

        let bad = conn.execute(
            "INSERT INTO product_discount (product_id, customer_id, discount, effective_date) VALUES (1, 1, 35.0, '2026-01-01')",
            [],
        );
        assert!(bad.is_err());
    }
}
