// ==========================================
// 价格目录系统 - 价格解析结果
// ==========================================

use crate::domain::types::{Cents, PriceMode, PriceSource};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 价格查询条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuery {
    pub vendor_id: String,
    pub product_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub mode: PriceMode,
    pub as_of: Option<NaiveDate>,
    /// BOTH 模式下覆盖价仅作用于这些分类（None 表示不限制）
    pub categories: Option<Vec<String>>,
    /// 限定价格等级（None 表示客户适用等级或供应商全部等级）
    pub pricing_classes: Option<Vec<String>>,
}

impl PriceQuery {
    pub fn new(vendor_id: &str, mode: PriceMode) -> Self {
        Self {
            vendor_id: vendor_id.to_string(),
            product_id: None,
            customer_id: None,
            mode,
            as_of: None,
            categories: None,
            pricing_classes: None,
        }
    }
}

// ==========================================
// ResolvedPrice - 生效价格清单中的一行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPrice {
    pub product_id: i64,
    pub product_identifier: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub pricing_class: String,
    pub customer: Option<String>,
    pub price: Cents,
    pub effective_date: NaiveDate,
    pub source: PriceSource,
    pub is_override: bool,
    pub note: Option<String>,
}
