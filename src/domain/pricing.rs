// ==========================================
// 价格目录系统 - 时效价格模型
// ==========================================
// 角色: current（生效）/ future（待生效，至多一条）/ history（只追加）
// ==========================================

use crate::domain::types::{Cents, PriceFamily};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 时效值：金额族存分，折扣族存小数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemporalValue {
    Price(Cents),
    Discount(f64),
}

impl TemporalValue {
    pub fn as_price(&self) -> Option<Cents> {
        match self {
            TemporalValue::Price(p) => Some(*p),
            TemporalValue::Discount(_) => None,
        }
    }

    pub fn as_discount(&self) -> Option<f64> {
        match self {
            TemporalValue::Discount(d) => Some(*d),
            TemporalValue::Price(_) => None,
        }
    }

    /// 比较是否为同一值（折扣按 1e-9 容差）
    pub fn same_as(&self, other: &TemporalValue) -> bool {
        match (self, other) {
            (TemporalValue::Price(a), TemporalValue::Price(b)) => a == b,
            (TemporalValue::Discount(a), TemporalValue::Discount(b)) => (a - b).abs() < 1e-9,
            _ => false,
        }
    }
}

/// 待生效条目
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FutureEntry {
    pub value: TemporalValue,
    pub effective_date: NaiveDate,
}

/// 历史条目（不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub history_id: i64,
    pub value: TemporalValue,
    pub effective_date: NaiveDate,
    pub recorded_at: DateTime<Utc>,
}

// ==========================================
// TemporalRow - 某一族中的一条 current 记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalRow {
    pub family: PriceFamily,
    pub row_id: i64,
    pub value: TemporalValue,
    pub effective_date: NaiveDate,
    pub future: Option<FutureEntry>,
}
