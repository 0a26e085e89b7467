// ==========================================
// 价格目录系统 - 折扣 Repository
// ==========================================
// 职责: product_class_discount / product_discount 的数据访问
// 约束: 折扣统一以小数存储 (0 < d < 1)，写入前由 Discount 类型保证
// ==========================================

use crate::domain::types::Discount;
use crate::repository::error::RepositoryResult;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

/// 折扣 current 行的最小引用
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountRowRef {
    pub row_id: i64,
    pub discount: f64,
    pub effective_date: NaiveDate,
    pub deleted: bool,
}

fn map_discount_row(row: &rusqlite::Row) -> rusqlite::Result<DiscountRowRef> {
    Ok(DiscountRowRef {
        row_id: row.get(0)?,
        discount: row.get(1)?,
        effective_date: row.get(2)?,
        deleted: row.get::<_, i64>(3)? != 0,
    })
}

pub struct DiscountRepository;

impl DiscountRepository {
    pub fn find_class_discount_tx(
        conn: &Connection,
        product_class_id: i64,
        customer_id: i64,
    ) -> RepositoryResult<Option<DiscountRowRef>> {
        let row = conn
            .query_row(
                "SELECT row_id, discount, effective_date, deleted FROM product_class_discount
                 WHERE product_class_id = ?1 AND customer_id = ?2",
                params![product_class_id, customer_id],
                map_discount_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_class_discount_tx(
        conn: &Connection,
        product_class_id: i64,
        customer_id: i64,
        discount: Discount,
        effective_date: NaiveDate,
    ) -> RepositoryResult<i64> {
        conn.execute(
            "INSERT INTO product_class_discount (product_class_id, customer_id, discount, effective_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![product_class_id, customer_id, discount.value(), effective_date],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_product_discount_tx(
        conn: &Connection,
        product_id: i64,
        customer_id: i64,
    ) -> RepositoryResult<Option<DiscountRowRef>> {
        let row = conn
            .query_row(
                "SELECT row_id, discount, effective_date, deleted FROM product_discount
                 WHERE product_id = ?1 AND customer_id = ?2",
                params![product_id, customer_id],
                map_discount_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_product_discount_tx(
        conn: &Connection,
        product_id: i64,
        customer_id: i64,
        discount: Discount,
        effective_date: NaiveDate,
    ) -> RepositoryResult<i64> {
        conn.execute(
            "INSERT INTO product_discount (product_id, customer_id, discount, effective_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![product_id, customer_id, discount.value(), effective_date],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 客户对某产品的常设折扣
    ///
    /// 优先级: 产品折扣 > 最细 rank 的分类折扣
    pub fn standing_discount_tx(
        conn: &Connection,
        product_id: i64,
        customer_id: i64,
    ) -> RepositoryResult<Option<Discount>> {
        let product_level: Option<f64> = conn
            .query_row(
                "SELECT discount FROM product_discount
                 WHERE product_id = ?1 AND customer_id = ?2 AND deleted = 0",
                params![product_id, customer_id],
                |row| row.get(0),
            )
            .optional()?;

        let value = match product_level {
            Some(d) => Some(d),
            None => conn
                .query_row(
                    "SELECT d.discount FROM product_class_discount d
                     JOIN product_category pc ON pc.product_class_id = d.product_class_id
                     JOIN product_class c ON c.product_class_id = d.product_class_id
                     WHERE pc.product_id = ?1 AND d.customer_id = ?2
                       AND d.deleted = 0 AND c.deleted = 0
                     ORDER BY c.rank DESC
                     LIMIT 1",
                    params![product_id, customer_id],
                    |row| row.get(0),
                )
                .optional()?,
        };

        Ok(match value {
            Some(v) => Some(Discount::new(v)?),
            None => None,
        })
    }

    /// 持有常设折扣的客户
    pub fn customers_with_discounts_tx(conn: &Connection, vendor_id: &str) -> RepositoryResult<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT c.customer_id FROM customer c
             WHERE c.vendor_id = ?1 AND c.deleted = 0 AND (
                 EXISTS (SELECT 1 FROM product_discount d WHERE d.customer_id = c.customer_id AND d.deleted = 0)
              OR EXISTS (SELECT 1 FROM product_class_discount d WHERE d.customer_id = c.customer_id AND d.deleted = 0)
             )
             ORDER BY c.customer_id",
        )?;
        let ids = stmt
            .query_map(params![vendor_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// 客户折扣覆盖到的产品
    pub fn discounted_products_tx(conn: &Connection, customer_id: i64) -> RepositoryResult<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT product_id FROM product_discount WHERE customer_id = ?1 AND deleted = 0
             UNION
             SELECT pc.product_id FROM product_class_discount d
             JOIN product_category pc ON pc.product_class_id = d.product_class_id
             WHERE d.customer_id = ?1 AND d.deleted = 0
             ORDER BY 1",
        )?;
        let ids = stmt
            .query_map(params![customer_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }
}
