// ==========================================
// 价格目录系统 - 导入批次与对账结果
// ==========================================

use crate::domain::types::{BatchKind, BatchStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 导入批次审计记录（import_batch 表）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub batch_id: String,
    pub vendor_id: String,
    pub kind: BatchKind,
    pub file_name: Option<String>,
    pub effective_date: NaiveDate,
    pub updated: usize,
    pub inserted: usize,
    pub deleted: usize,
    pub status: BatchStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 单条记录的问题描述（错误报告或非致命警告）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIssue {
    pub record: String,
    pub reason: String,
}

impl RecordIssue {
    pub fn new(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            record: record.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.record, self.reason)
    }
}

// ==========================================
// ReconciliationResult - 对账结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub batch_id: String,
    pub updated: usize,
    pub inserted: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// 已排入 future 槽位的记录数
    pub scheduled: usize,
    /// 重新计算的客户价数量
    pub propagated: usize,
    /// 非致命问题（致命问题会整体回滚并以错误返回）
    pub errors: Vec<RecordIssue>,
}
