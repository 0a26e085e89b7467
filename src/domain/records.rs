// ==========================================
// 价格目录系统 - 暂存记录
// ==========================================
// NormalizedRecord 即 SeriesPriceKey：抽取输出，对账后丢弃
// ==========================================

use crate::domain::catalog::ProductAttribute;
use crate::domain::types::{Cents, Discount};
use serde::{Deserialize, Serialize};

/// 分类路径：(名称, rank)，rank 越大越细
pub type CategoryPath = Vec<(String, i32)>;

// ==========================================
// NormalizedRecord - 抽取后的 (key, price) 记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub vendor_id: String,
    pub series: Option<String>,
    pub key: String,
    pub price: Cents,
    /// 价格等级名称；None 表示使用供应商默认价目表
    pub pricing_class: Option<String>,
    pub description: Option<String>,
    pub categories: CategoryPath,
    #[serde(default)]
    pub attributes: Vec<ProductAttribute>,
}

impl NormalizedRecord {
    pub fn new(vendor_id: &str, series: Option<&str>, key: String, price: Cents) -> Self {
        Self {
            vendor_id: vendor_id.to_string(),
            series: series.map(|s| s.to_string()),
            key,
            price,
            pricing_class: None,
            description: None,
            categories: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn with_pricing_class(mut self, pricing_class: &str) -> Self {
        self.pricing_class = Some(pricing_class.to_string());
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_category(mut self, name: &str, rank: i32) -> Self {
        self.categories.push((name.to_string(), rank));
        self
    }

    pub fn with_attribute(mut self, attr: &str, attr_type: &str, value: &str) -> Self {
        self.attributes.push(ProductAttribute {
            attr: attr.to_string(),
            attr_type: attr_type.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// 产品标识：系列记录以 "{series}_{key}" 落到 Product
    pub fn product_identifier(&self) -> String {
        match &self.series {
            Some(series) if !series.is_empty() => format!("{}_{}", series, self.key),
            _ => self.key.clone(),
        }
    }
}

/// 加价项原始行（描述 + 十进制价格）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdderRow {
    pub row_number: usize,
    pub description: String,
    pub price: f64,
}

// ==========================================
// ReferenceRecord - 客户/折扣参考表记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceRecord {
    Customer {
        name: String,
        pricing_classes: Vec<String>,
    },
    ClassDiscount {
        customer: String,
        category: String,
        rank: i32,
        discount: Discount,
    },
    ProductDiscount {
        customer: String,
        product_identifier: String,
        discount: Discount,
    },
    SpecialNetPrice {
        customer: String,
        product_identifier: String,
        net_price: Cents,
    },
    CustomerOverride {
        customer: String,
        product_identifier: String,
        pricing_class: Option<String>,
        price: Cents,
    },
}

impl ReferenceRecord {
    /// 用于错误报告的记录标识
    pub fn label(&self) -> String {
        match self {
            ReferenceRecord::Customer { name, .. } => format!("customer={}", name),
            ReferenceRecord::ClassDiscount {
                customer,
                category,
                rank,
                ..
            } => format!("customer={} category={} rank={}", customer, category, rank),
            ReferenceRecord::ProductDiscount {
                customer,
                product_identifier,
                ..
            }
            | ReferenceRecord::SpecialNetPrice {
                customer,
                product_identifier,
                ..
            }
            | ReferenceRecord::CustomerOverride {
                customer,
                product_identifier,
                ..
            } => format!("customer={} product={}", customer, product_identifier),
        }
    }
}
