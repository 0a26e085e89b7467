// ==========================================
// 价格目录系统 - 目录实体
// ==========================================
// 对齐: db.rs 中 product / product_class / pricing_class / customer 表
// 软删除: deleted 标记，不做物理删除
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// Product - 产品
// ==========================================
// 唯一键: (vendor_id, product_identifier)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: i64,
    pub vendor_id: String,
    pub product_identifier: String,
    pub description: Option<String>,
    pub series: Option<String>,
    pub deleted: bool,
}

/// 产品自由属性 (attr, type, value)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAttribute {
    pub attr: String,
    pub attr_type: String,
    pub value: String,
}

// ==========================================
// ProductClass - 产品分类
// ==========================================
// 唯一键: (vendor_id, name, rank)
// rank 1 = 大类，rank 2 = 细分类，数值越大越细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductClass {
    pub product_class_id: i64,
    pub vendor_id: String,
    pub name: String,
    pub rank: i32,
    pub deleted: bool,
}

// ==========================================
// PricingClass - 价格等级（价目表）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingClass {
    pub pricing_class_id: i64,
    pub vendor_id: String,
    pub name: String,
    pub deleted: bool,
}

// ==========================================
// Customer - 客户
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: i64,
    pub vendor_id: String,
    pub name: String,
    pub deleted: bool,
}
