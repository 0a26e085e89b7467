// ==========================================
// 价格目录系统 - 类别价 / 客户价 Repository
// ==========================================
// 职责: class_price / customer_price 的键查找、插入与解析视图查询
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::pricing::{FutureEntry, TemporalValue};
use crate::domain::types::{Cents, PriceFamily};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

/// current 行的最小引用（对账用）
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRowRef {
    pub row_id: i64,
    pub price: Cents,
    pub effective_date: NaiveDate,
    pub deleted: bool,
}

/// 客户价 current 行
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerPriceRef {
    pub row_id: i64,
    pub product_id: i64,
    pub pricing_class_id: i64,
    pub customer_id: i64,
    pub price: Cents,
    pub effective_date: NaiveDate,
    pub is_override: bool,
    pub deleted: bool,
}

// ==========================================
// PriceView - 解析读路径使用的扁平视图
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct PriceView {
    pub family: PriceFamily,
    pub row_id: i64,
    pub product_id: i64,
    pub product_identifier: String,
    pub description: Option<String>,
    pub pricing_class_id: i64,
    pub pricing_class: String,
    pub customer: Option<String>,
    pub price: Cents,
    pub effective_date: NaiveDate,
    pub is_override: bool,
    pub future: Option<FutureEntry>,
}

fn future_from_row(row: &Row, value_idx: usize, date_idx: usize) -> rusqlite::Result<Option<FutureEntry>> {
    match row.get_ref(value_idx)? {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(v) => Ok(Some(FutureEntry {
            value: TemporalValue::Price(v),
            effective_date: row.get(date_idx)?,
        })),
        ValueRef::Real(v) => Ok(Some(FutureEntry {
            value: TemporalValue::Price(v.round() as Cents),
            effective_date: row.get(date_idx)?,
        })),
        other => Err(rusqlite::Error::InvalidColumnType(
            value_idx,
            "future.value".to_string(),
            other.data_type(),
        )),
    }
}

fn map_customer_price(row: &Row) -> rusqlite::Result<CustomerPriceRef> {
    Ok(CustomerPriceRef {
        row_id: row.get(0)?,
        product_id: row.get(1)?,
        pricing_class_id: row.get(2)?,
        customer_id: row.get(3)?,
        price: row.get(4)?,
        effective_date: row.get(5)?,
        is_override: row.get::<_, i64>(6)? != 0,
        deleted: row.get::<_, i64>(7)? != 0,
    })
}

const CUSTOMER_PRICE_COLUMNS: &str =
    "row_id, product_id, pricing_class_id, customer_id, price, effective_date, is_override, deleted";

// ==========================================
// PriceRepository
// ==========================================
pub struct PriceRepository;

impl PriceRepository {
    // ===== class_price =====

    pub fn find_class_price_tx(
        conn: &Connection,
        pricing_class_id: i64,
        product_id: i64,
    ) -> RepositoryResult<Option<PriceRowRef>> {
        let row = conn
            .query_row(
                "SELECT row_id, price, effective_date, deleted FROM class_price
                 WHERE pricing_class_id = ?1 AND product_id = ?2",
                params![pricing_class_id, product_id],
                |row| {
                    Ok(PriceRowRef {
                        row_id: row.get(0)?,
                        price: row.get(1)?,
                        effective_date: row.get(2)?,
                        deleted: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_class_price_tx(
        conn: &Connection,
        pricing_class_id: i64,
        product_id: i64,
        price: Cents,
        effective_date: NaiveDate,
    ) -> RepositoryResult<i64> {
        if price < 0 {
            return Err(RepositoryError::NegativePrice(price));
        }
        conn.execute(
            "INSERT INTO class_price (pricing_class_id, product_id, price, effective_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![pricing_class_id, product_id, price, effective_date],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 某价格等级下全部未删除的类别价 (row_id, product_id, price)
    pub fn live_class_prices_tx(
        conn: &Connection,
        pricing_class_id: i64,
    ) -> RepositoryResult<Vec<(i64, i64, Cents)>> {
        let mut stmt = conn.prepare(
            "SELECT t.row_id, t.product_id, t.price FROM class_price t
             JOIN product p ON p.product_id = t.product_id
             WHERE t.pricing_class_id = ?1 AND t.deleted = 0 AND p.deleted = 0
             ORDER BY t.row_id",
        )?;
        let rows = stmt
            .query_map(params![pricing_class_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 某价格等级下属于某系列的未删除类别价 (row_id, product_id)
    ///
    /// series 为 None 时匹配无系列的产品（零件表）
    pub fn live_class_prices_in_series_tx(
        conn: &Connection,
        pricing_class_id: i64,
        series: Option<&str>,
    ) -> RepositoryResult<Vec<(i64, i64)>> {
        let mut stmt = conn.prepare(
            "SELECT t.row_id, t.product_id FROM class_price t
             JOIN product p ON p.product_id = t.product_id
             WHERE t.pricing_class_id = ?1 AND p.series IS ?2 AND t.deleted = 0
             ORDER BY t.row_id",
        )?;
        let rows = stmt
            .query_map(params![pricing_class_id, series], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ===== customer_price =====

    pub fn find_customer_price_tx(
        conn: &Connection,
        product_id: i64,
        pricing_class_id: i64,
        customer_id: i64,
    ) -> RepositoryResult<Option<CustomerPriceRef>> {
        let sql = format!(
            "SELECT {} FROM customer_price
             WHERE product_id = ?1 AND pricing_class_id = ?2 AND customer_id = ?3",
            CUSTOMER_PRICE_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![product_id, pricing_class_id, customer_id], map_customer_price)
            .optional()?;
        Ok(row)
    }

    pub fn insert_customer_price_tx(
        conn: &Connection,
        product_id: i64,
        pricing_class_id: i64,
        customer_id: i64,
        price: Cents,
        effective_date: NaiveDate,
        is_override: bool,
    ) -> RepositoryResult<i64> {
        if price < 0 {
            return Err(RepositoryError::NegativePrice(price));
        }
        conn.execute(
            "INSERT INTO customer_price
                (product_id, pricing_class_id, customer_id, price, effective_date, is_override)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                product_id,
                pricing_class_id,
                customer_id,
                price,
                effective_date,
                is_override as i64
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_override_flag_tx(conn: &Connection, row_id: i64, is_override: bool) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE customer_price SET is_override = ?1 WHERE row_id = ?2",
            params![is_override as i64, row_id],
        )?;
        Ok(())
    }

    /// 依赖某类别价的未删除客户价
    pub fn dependent_customer_prices_tx(
        conn: &Connection,
        pricing_class_id: i64,
        product_id: i64,
    ) -> RepositoryResult<Vec<CustomerPriceRef>> {
        let sql = format!(
            "SELECT {} FROM customer_price
             WHERE pricing_class_id = ?1 AND product_id = ?2 AND deleted = 0
             ORDER BY row_id",
            CUSTOMER_PRICE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![pricing_class_id, product_id], map_customer_price)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 供应商范围内未删除的覆盖价 row_id
    pub fn live_override_row_ids_tx(conn: &Connection, vendor_id: &str) -> RepositoryResult<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT t.row_id FROM customer_price t
             JOIN customer c ON c.customer_id = t.customer_id
             WHERE c.vendor_id = ?1 AND t.is_override = 1 AND t.deleted = 0",
        )?;
        let ids = stmt
            .query_map(params![vendor_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    // ===== 解析视图 =====

    /// 供应商的类别价视图（可限定产品）
    pub fn class_price_views_tx(
        conn: &Connection,
        vendor_id: &str,
        product_id: Option<i64>,
    ) -> RepositoryResult<Vec<PriceView>> {
        let mut stmt = conn.prepare(
            "SELECT t.row_id, t.product_id, p.product_identifier, p.description,
                    t.pricing_class_id, s.name, t.price, t.effective_date,
                    f.value, f.effective_date
             FROM class_price t
             JOIN product p ON p.product_id = t.product_id
             JOIN pricing_class s ON s.pricing_class_id = t.pricing_class_id
             LEFT JOIN class_price_future f ON f.row_id = t.row_id
             WHERE s.vendor_id = ?1 AND s.deleted = 0 AND t.deleted = 0 AND p.deleted = 0
               AND (?2 IS NULL OR t.product_id = ?2)
             ORDER BY p.product_identifier, s.name",
        )?;
        let views = stmt
            .query_map(params![vendor_id, product_id], |row| {
                Ok(PriceView {
                    family: PriceFamily::ClassPrice,
                    row_id: row.get(0)?,
                    product_id: row.get(1)?,
                    product_identifier: row.get(2)?,
                    description: row.get(3)?,
                    pricing_class_id: row.get(4)?,
                    pricing_class: row.get(5)?,
                    customer: None,
                    price: row.get(6)?,
                    effective_date: row.get(7)?,
                    is_override: false,
                    future: future_from_row(row, 8, 9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(views)
    }

    /// 某客户的客户价视图（可限定产品）
    pub fn customer_price_views_tx(
        conn: &Connection,
        customer_id: i64,
        product_id: Option<i64>,
    ) -> RepositoryResult<Vec<PriceView>> {
        let mut stmt = conn.prepare(
            "SELECT t.row_id, t.product_id, p.product_identifier, p.description,
                    t.pricing_class_id, s.name, c.name, t.price, t.effective_date,
                    t.is_override, f.value, f.effective_date
             FROM customer_price t
             JOIN product p ON p.product_id = t.product_id
             JOIN pricing_class s ON s.pricing_class_id = t.pricing_class_id
             JOIN customer c ON c.customer_id = t.customer_id
             LEFT JOIN customer_price_future f ON f.row_id = t.row_id
             WHERE t.customer_id = ?1 AND t.deleted = 0 AND p.deleted = 0 AND c.deleted = 0
               AND (?2 IS NULL OR t.product_id = ?2)
             ORDER BY p.product_identifier, s.name",
        )?;
        let views = stmt
            .query_map(params![customer_id, product_id], |row| {
                Ok(PriceView {
                    family: PriceFamily::CustomerPrice,
                    row_id: row.get(0)?,
                    product_id: row.get(1)?,
                    product_identifier: row.get(2)?,
                    description: row.get(3)?,
                    pricing_class_id: row.get(4)?,
                    pricing_class: row.get(5)?,
                    customer: Some(row.get(6)?),
                    price: row.get(7)?,
                    effective_date: row.get(8)?,
                    is_override: row.get::<_, i64>(9)? != 0,
                    future: future_from_row(row, 10, 11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(views)
    }

    /// 供应商全部产品的分类名称（rank 降序）
    pub fn category_names_tx(
        conn: &Connection,
        vendor_id: &str,
    ) -> RepositoryResult<HashMap<i64, Vec<String>>> {
        let mut stmt = conn.prepare(
            "SELECT pc.product_id, c.name FROM product_category pc
             JOIN product_class c ON c.product_class_id = pc.product_class_id
             WHERE c.vendor_id = ?1 AND c.deleted = 0
             ORDER BY pc.product_id, c.rank DESC, c.name",
        )?;
        let mut map: HashMap<i64, Vec<String>> = HashMap::new();
        let rows = stmt.query_map(params![vendor_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (product_id, name) = row?;
            map.entry(product_id).or_default().push(name);
        }
        Ok(map)
    }
}
