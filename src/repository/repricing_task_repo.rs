// ==========================================
// 价格目录系统 - 重新定价任务 Repository
// ==========================================
// 职责: repricing_task 表的状态流转记录
// 状态: PENDING → RUNNING → COMPLETED / FAILED
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepricingStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RepricingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepricingStatus::Pending => "PENDING",
            RepricingStatus::Running => "RUNNING",
            RepricingStatus::Completed => "COMPLETED",
            RepricingStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "PENDING" => RepricingStatus::Pending,
            "RUNNING" => RepricingStatus::Running,
            "COMPLETED" => RepricingStatus::Completed,
            _ => RepricingStatus::Failed,
        }
    }
}

/// 任务记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepricingTaskEntity {
    pub task_id: String,
    pub vendor_id: String,
    pub effective_date: NaiveDate,
    pub status: RepricingStatus,
    pub repriced_rows: usize,
    pub trigger_source: Option<String>,
    pub error_message: Option<String>,
}

pub struct RepricingTaskRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RepricingTaskRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert_pending(
        &self,
        task_id: &str,
        vendor_id: &str,
        effective_date: NaiveDate,
        trigger_source: Option<&str>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO repricing_task (task_id, vendor_id, effective_date, status, trigger_source, created_at)
             VALUES (?1, ?2, ?3, 'PENDING', ?4, ?5)",
            params![task_id, vendor_id, effective_date, trigger_source, Utc::now()],
        )?;
        Ok(())
    }

    pub fn mark_running(&self, task_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE repricing_task SET status = 'RUNNING', started_at = ?1 WHERE task_id = ?2",
            params![Utc::now(), task_id],
        )?;
        Ok(())
    }

    pub fn mark_completed(&self, task_id: &str, repriced_rows: usize) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE repricing_task SET status = 'COMPLETED', repriced_rows = ?1, completed_at = ?2
             WHERE task_id = ?3",
            params![repriced_rows as i64, Utc::now(), task_id],
        )?;
        Ok(())
    }

    pub fn mark_failed(&self, task_id: &str, error_message: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE repricing_task SET status = 'FAILED', error_message = ?1, completed_at = ?2
             WHERE task_id = ?3",
            params![error_message, Utc::now(), task_id],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, task_id: &str) -> RepositoryResult<Option<RepricingTaskEntity>> {
        let conn = self.get_conn()?;
        let task = conn
            .query_row(
                "SELECT task_id, vendor_id, effective_date, status, repriced_rows, trigger_source, error_message
                 FROM repricing_task WHERE task_id = ?1",
                params![task_id],
                |row| {
                    let status: String = row.get(3)?;
                    Ok(RepricingTaskEntity {
                        task_id: row.get(0)?,
                        vendor_id: row.get(1)?,
                        effective_date: row.get(2)?,
                        status: RepricingStatus::parse(&status),
                        repriced_rows: row.get::<_, i64>(4)? as usize,
                        trigger_source: row.get(5)?,
                        error_message: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(task)
    }
}
