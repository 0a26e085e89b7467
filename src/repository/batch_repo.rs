// ==========================================
// 价格目录系统 - 导入批次 Repository
// ==========================================
// 职责: import_batch 审计记录读写
// ==========================================

use crate::domain::batch::ImportBatch;
use crate::domain::types::{BatchKind, BatchStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

fn parse_kind(raw: &str) -> BatchKind {
    match raw {
        "CUSTOMERS" => BatchKind::Customers,
        "CLASS_DISCOUNTS" => BatchKind::ClassDiscounts,
        "PRODUCT_DISCOUNTS" => BatchKind::ProductDiscounts,
        "SPECIAL_NET_PRICES" => BatchKind::SpecialNetPrices,
        "CUSTOMER_OVERRIDES" => BatchKind::CustomerOverrides,
        "PERCENTAGE_INCREASE" => BatchKind::PercentageIncrease,
        _ => BatchKind::PriceBook,
    }
}

fn map_batch(row: &Row) -> rusqlite::Result<ImportBatch> {
    let kind: String = row.get(2)?;
    let status: String = row.get(9)?;
    Ok(ImportBatch {
        batch_id: row.get(0)?,
        vendor_id: row.get(1)?,
        kind: parse_kind(&kind),
        file_name: row.get(3)?,
        effective_date: row.get(4)?,
        updated: row.get::<_, i64>(5)? as usize,
        inserted: row.get::<_, i64>(6)? as usize,
        deleted: row.get::<_, i64>(7)? as usize,
        error_message: row.get(8)?,
        status: if status == "COMMITTED" {
            BatchStatus::Committed
        } else {
            BatchStatus::Failed
        },
        created_at: row.get(10)?,
    })
}

const BATCH_COLUMNS: &str = "batch_id, vendor_id, kind, file_name, effective_date, updated_rows, inserted_rows, deleted_rows, error_message, status, created_at";

pub struct ImportBatchRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportBatchRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入批次记录（失败批次在回滚后单独写入）
    pub fn insert(&self, batch: &ImportBatch) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, batch)
    }

    pub fn insert_tx(conn: &Connection, batch: &ImportBatch) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO import_batch (
                batch_id, vendor_id, kind, file_name, effective_date,
                updated_rows, inserted_rows, deleted_rows, status, error_message, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                batch.batch_id,
                batch.vendor_id,
                batch.kind.as_str(),
                batch.file_name,
                batch.effective_date,
                batch.updated as i64,
                batch.inserted as i64,
                batch.deleted as i64,
                batch.status.as_str(),
                batch.error_message,
                batch.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, batch_id: &str) -> RepositoryResult<Option<ImportBatch>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM import_batch WHERE batch_id = ?1", BATCH_COLUMNS);
        let batch = conn
            .query_row(&sql, params![batch_id], map_batch)
            .optional()?;
        Ok(batch)
    }

    pub fn list_by_vendor(&self, vendor_id: &str) -> RepositoryResult<Vec<ImportBatch>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM import_batch WHERE vendor_id = ?1 ORDER BY created_at DESC",
            BATCH_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let batches = stmt
            .query_map(params![vendor_id], map_batch)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(batches)
    }
}
