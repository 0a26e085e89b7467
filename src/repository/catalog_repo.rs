// ==========================================
// 价格目录系统 - 目录实体 Repository
// ==========================================
// 职责: product / product_class / pricing_class / customer 的数据访问
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::catalog::{Customer, PricingClass, Product, ProductAttribute, ProductClass};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

fn map_product(row: &Row) -> rusqlite::Result<Product> {
    Ok(Product {
        product_id: row.get(0)?,
        vendor_id: row.get(1)?,
        product_identifier: row.get(2)?,
        description: row.get(3)?,
        series: row.get(4)?,
        deleted: row.get::<_, i64>(5)? != 0,
    })
}

fn map_customer(row: &Row) -> rusqlite::Result<Customer> {
    Ok(Customer {
        customer_id: row.get(0)?,
        vendor_id: row.get(1)?,
        name: row.get(2)?,
        deleted: row.get::<_, i64>(3)? != 0,
    })
}

// ==========================================
// CatalogRepository
// ==========================================
pub struct CatalogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CatalogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ===== 只读接口（自行加锁）=====

    pub fn find_product(&self, vendor_id: &str, identifier: &str) -> RepositoryResult<Option<Product>> {
        let conn = self.get_conn()?;
        Self::find_product_tx(&conn, vendor_id, identifier)
    }

    pub fn list_products(&self, vendor_id: &str) -> RepositoryResult<Vec<Product>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT product_id, vendor_id, product_identifier, description, series, deleted
             FROM product WHERE vendor_id = ?1 ORDER BY product_identifier",
        )?;
        let products = stmt
            .query_map(params![vendor_id], map_product)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    pub fn find_customer(&self, vendor_id: &str, name: &str) -> RepositoryResult<Option<Customer>> {
        let conn = self.get_conn()?;
        Self::find_customer_tx(&conn, vendor_id, name)
    }

    pub fn list_customers(&self, vendor_id: &str, include_deleted: bool) -> RepositoryResult<Vec<Customer>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT customer_id, vendor_id, name, deleted FROM customer
             WHERE vendor_id = ?1 AND (?2 = 1 OR deleted = 0) ORDER BY name",
        )?;
        let customers = stmt
            .query_map(params![vendor_id, include_deleted as i64], map_customer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(customers)
    }

    pub fn list_pricing_classes(&self, vendor_id: &str) -> RepositoryResult<Vec<PricingClass>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT pricing_class_id, vendor_id, name, deleted FROM pricing_class
             WHERE vendor_id = ?1 ORDER BY name",
        )?;
        let classes = stmt
            .query_map(params![vendor_id], |row| {
                Ok(PricingClass {
                    pricing_class_id: row.get(0)?,
                    vendor_id: row.get(1)?,
                    name: row.get(2)?,
                    deleted: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(classes)
    }

    pub fn product_categories(&self, product_id: i64) -> RepositoryResult<Vec<ProductClass>> {
        let conn = self.get_conn()?;
        Self::product_categories_tx(&conn, product_id)
    }

    pub fn product_attributes(&self, product_id: i64) -> RepositoryResult<Vec<ProductAttribute>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT attr, attr_type, value FROM product_attr WHERE product_id = ?1 ORDER BY attr",
        )?;
        let attrs = stmt
            .query_map(params![product_id], |row| {
                Ok(ProductAttribute {
                    attr: row.get(0)?,
                    attr_type: row.get(1)?,
                    value: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(attrs)
    }

    // ===== 事务内原语 =====

    pub fn find_product_tx(
        conn: &Connection,
        vendor_id: &str,
        identifier: &str,
    ) -> RepositoryResult<Option<Product>> {
        let product = conn
            .query_row(
                "SELECT product_id, vendor_id, product_identifier, description, series, deleted
                 FROM product WHERE vendor_id = ?1 AND product_identifier = ?2",
                params![vendor_id, identifier],
                map_product,
            )
            .optional()?;
        Ok(product)
    }

    pub fn insert_product_tx(
        conn: &Connection,
        vendor_id: &str,
        identifier: &str,
        description: Option<&str>,
        series: Option<&str>,
    ) -> RepositoryResult<i64> {
        conn.execute(
            "INSERT INTO product (vendor_id, product_identifier, description, series)
             VALUES (?1, ?2, ?3, ?4)",
            params![vendor_id, identifier, description, series],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 描述变化或复活时更新产品行
    pub fn touch_product_tx(
        conn: &Connection,
        product_id: i64,
        description: Option<&str>,
    ) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE product SET deleted = 0, description = COALESCE(?1, description)
             WHERE product_id = ?2",
            params![description, product_id],
        )?;
        Ok(())
    }

    pub fn upsert_attribute_tx(
        conn: &Connection,
        product_id: i64,
        attr: &ProductAttribute,
    ) -> RepositoryResult<()> {
        conn.execute(
            "INSERT INTO product_attr (product_id, attr, attr_type, value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(product_id, attr) DO UPDATE SET attr_type = excluded.attr_type,
                                                         value = excluded.value",
            params![product_id, attr.attr, attr.attr_type, attr.value],
        )?;
        Ok(())
    }

    /// 查找或创建产品分类，返回 product_class_id
    pub fn ensure_product_class_tx(
        conn: &Connection,
        vendor_id: &str,
        name: &str,
        rank: i32,
    ) -> RepositoryResult<i64> {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT product_class_id FROM product_class
                 WHERE vendor_id = ?1 AND name = ?2 AND rank = ?3",
                params![vendor_id, name, rank],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            conn.execute(
                "UPDATE product_class SET deleted = 0 WHERE product_class_id = ?1",
                params![id],
            )?;
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO product_class (vendor_id, name, rank) VALUES (?1, ?2, ?3)",
            params![vendor_id, name, rank],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn link_category_tx(conn: &Connection, product_id: i64, product_class_id: i64) -> RepositoryResult<()> {
        conn.execute(
            "INSERT OR IGNORE INTO product_category (product_id, product_class_id) VALUES (?1, ?2)",
            params![product_id, product_class_id],
        )?;
        Ok(())
    }

    /// 产品所属分类（rank 降序，最细的在前）
    pub fn product_categories_tx(conn: &Connection, product_id: i64) -> RepositoryResult<Vec<ProductClass>> {
        let mut stmt = conn.prepare(
            "SELECT c.product_class_id, c.vendor_id, c.name, c.rank, c.deleted
             FROM product_category pc
             JOIN product_class c ON c.product_class_id = pc.product_class_id
             WHERE pc.product_id = ?1 AND c.deleted = 0
             ORDER BY c.rank DESC, c.name",
        )?;
        let classes = stmt
            .query_map(params![product_id], |row| {
                Ok(ProductClass {
                    product_class_id: row.get(0)?,
                    vendor_id: row.get(1)?,
                    name: row.get(2)?,
                    rank: row.get(3)?,
                    deleted: row.get::<_, i64>(4)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(classes)
    }

    /// 查找或创建价格等级，返回 pricing_class_id
    pub fn ensure_pricing_class_tx(conn: &Connection, vendor_id: &str, name: &str) -> RepositoryResult<i64> {
        if let Some(id) = Self::find_pricing_class_tx(conn, vendor_id, name)? {
            return Ok(id);
        }
        conn.execute(
            "INSERT INTO pricing_class (vendor_id, name) VALUES (?1, ?2)
             ON CONFLICT(vendor_id, name) DO UPDATE SET deleted = 0",
            params![vendor_id, name],
        )?;
        let id = conn.query_row(
            "SELECT pricing_class_id FROM pricing_class WHERE vendor_id = ?1 AND name = ?2",
            params![vendor_id, name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn find_pricing_class_tx(conn: &Connection, vendor_id: &str, name: &str) -> RepositoryResult<Option<i64>> {
        let id = conn
            .query_row(
                "SELECT pricing_class_id FROM pricing_class
                 WHERE vendor_id = ?1 AND name = ?2 AND deleted = 0",
                params![vendor_id, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn find_customer_tx(conn: &Connection, vendor_id: &str, name: &str) -> RepositoryResult<Option<Customer>> {
        let customer = conn
            .query_row(
                "SELECT customer_id, vendor_id, name, deleted FROM customer
                 WHERE vendor_id = ?1 AND name = ?2",
                params![vendor_id, name],
                map_customer,
            )
            .optional()?;
        Ok(customer)
    }

    pub fn find_customer_by_id_tx(conn: &Connection, customer_id: i64) -> RepositoryResult<Option<Customer>> {
        let customer = conn
            .query_row(
                "SELECT customer_id, vendor_id, name, deleted FROM customer WHERE customer_id = ?1",
                params![customer_id],
                map_customer,
            )
            .optional()?;
        Ok(customer)
    }

    pub fn insert_customer_tx(conn: &Connection, vendor_id: &str, name: &str) -> RepositoryResult<i64> {
        conn.execute(
            "INSERT INTO customer (vendor_id, name) VALUES (?1, ?2)",
            params![vendor_id, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_customer_deleted_tx(conn: &Connection, customer_id: i64, deleted: bool) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE customer SET deleted = ?1 WHERE customer_id = ?2",
            params![deleted as i64, customer_id],
        )?;
        Ok(())
    }

    /// 供应商范围内未删除的客户
    pub fn live_customers_tx(conn: &Connection, vendor_id: &str) -> RepositoryResult<Vec<Customer>> {
        let mut stmt = conn.prepare(
            "SELECT customer_id, vendor_id, name, deleted FROM customer
             WHERE vendor_id = ?1 AND deleted = 0",
        )?;
        let customers = stmt
            .query_map(params![vendor_id], map_customer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(customers)
    }

    /// 替换客户适用的价格等级集合
    pub fn set_customer_pricing_classes_tx(
        conn: &Connection,
        customer_id: i64,
        pricing_class_ids: &[i64],
    ) -> RepositoryResult<()> {
        conn.execute(
            "DELETE FROM customer_pricing_class WHERE customer_id = ?1",
            params![customer_id],
        )?;
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO customer_pricing_class (customer_id, pricing_class_id) VALUES (?1, ?2)",
        )?;
        for id in pricing_class_ids {
            stmt.execute(params![customer_id, id])?;
        }
        Ok(())
    }

    pub fn customer_pricing_class_ids_tx(conn: &Connection, customer_id: i64) -> RepositoryResult<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT cpc.pricing_class_id FROM customer_pricing_class cpc
             JOIN pricing_class p ON p.pricing_class_id = cpc.pricing_class_id
             WHERE cpc.customer_id = ?1 AND p.deleted = 0
             ORDER BY cpc.pricing_class_id",
        )?;
        let ids = stmt
            .query_map(params![customer_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    pub fn vendor_pricing_class_ids_tx(
        conn: &Connection,
        vendor_id: &str,
        names: Option<&[String]>,
    ) -> RepositoryResult<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT pricing_class_id, name FROM pricing_class
             WHERE vendor_id = ?1 AND deleted = 0 ORDER BY pricing_class_id",
        )?;
        let rows = stmt
            .query_map(params![vendor_id], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter(|(_, name)| names.map_or(true, |n| n.iter().any(|x| x == name)))
            .map(|(id, _)| id)
            .collect())
    }
}
