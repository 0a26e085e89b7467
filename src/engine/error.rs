// ==========================================
// 价格目录系统 - 引擎层错误类型
// ==========================================
// 策略: 对账与时效变更按批次原子执行，任何错误整批回滚
// ==========================================

use crate::domain::batch::RecordIssue;
use crate::repository::error::RepositoryError;
use chrono::NaiveDate;
use thiserror::Error;

fn summarize(records: &[RecordIssue]) -> String {
    const SHOWN: usize = 5;
    let mut parts: Vec<String> = records.iter().take(SHOWN).map(|r| r.to_string()).collect();
    if records.len() > SHOWN {
        parts.push(format!("… 共 {} 条", records.len()));
    }
    parts.join("; ")
}

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 暂存记录无法一致地匹配或写入，整批回滚
    #[error("对账冲突 (vendor={vendor_id}, batch={batch_id}): {}", summarize(.records))]
    ReconciliationConflict {
        vendor_id: String,
        batch_id: String,
        records: Vec<RecordIssue>,
    },

    /// rollback/delay 日期窗口非法，变更前拒绝
    #[error("非法调度窗口 ({operation}): {from} → {to} (today={today}): {reason}")]
    InvalidScheduleWindow {
        operation: String,
        from: NaiveDate,
        to: NaiveDate,
        today: NaiveDate,
        reason: String,
    },

    #[error("未找到: {0}")]
    NotFound(String),

    /// 查询条件不完整或不一致
    #[error("非法查询: {0}")]
    InvalidQuery(String),

    #[error("锁获取失败: {0}")]
    LockError(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Repository(RepositoryError::from(err))
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_names_records() {
        let err = EngineError::ReconciliationConflict {
            vendor_id: "V1".to_string(),
            batch_id: "b-1".to_string(),
            records: vec![RecordIssue::new("S1_36_A", "价格冲突")],
        };
        let msg = err.to_string();
        assert!(msg.contains("V1"));
        assert!(msg.contains("b-1"));
        assert!(msg.contains("S1_36_A"));
    }
}
