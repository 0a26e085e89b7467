// ==========================================
// 价格目录系统 - 仓储层错误类型
// ==========================================
// 约束违反按 SQLite 扩展错误码归类，其余数据库错误保留原文
// ==========================================

use crate::domain::types::{Cents, DiscountError};
use rusqlite::ffi;
use std::fmt;
use thiserror::Error;

/// 约束类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    Check,
    NotNull,
    Other,
}

impl ConstraintKind {
    fn from_extended_code(code: i32) -> Self {
        match code {
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ConstraintKind::Unique,
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ConstraintKind::ForeignKey,
            ffi::SQLITE_CONSTRAINT_CHECK => ConstraintKind::Check,
            ffi::SQLITE_CONSTRAINT_NOTNULL => ConstraintKind::NotNull,
            _ => ConstraintKind::Other,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConstraintKind::Unique => "唯一约束",
            ConstraintKind::ForeignKey => "外键约束",
            ConstraintKind::Check => "检查约束",
            ConstraintKind::NotNull => "非空约束",
            ConstraintKind::Other => "约束",
        };
        f.write_str(s)
    }
}

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("{kind}违反: {message}")]
    ConstraintViolation { kind: ConstraintKind, message: String },

    #[error("数据库错误: {0}")]
    Database(String),

    // ===== 写入校验 =====
    #[error(transparent)]
    InvalidDiscount(#[from] DiscountError),

    #[error("负价格: {0}")]
    NegativePrice(Cents),

    #[error("字段值错误 (field={field}): {message}")]
    FieldValueError { field: String, message: String },

    #[error("内部错误: {0}")]
    InternalError(String),
}

impl RepositoryError {
    pub fn is_constraint(&self, kind: ConstraintKind) -> bool {
        matches!(self, RepositoryError::ConstraintViolation { kind: k, .. } if *k == kind)
    }
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, ref msg) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                RepositoryError::ConstraintViolation {
                    kind: ConstraintKind::from_extended_code(e.extended_code),
                    message: msg.clone().unwrap_or_else(|| err.to_string()),
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "row".to_string(),
                id: "?".to_string(),
            },
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;
