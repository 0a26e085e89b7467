// ==========================================
// 价格目录系统 - 领域类型定义
// ==========================================
// 金额: 以最小货币单位（分）存储的非负整数
// 折扣: 统一使用小数表示 0 < d < 1
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 最小货币单位（分）
pub type Cents = i64;

// ==========================================
// 价格解析模式 (Price Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceMode {
    Base,     // 仅类别价
    Customer, // 客户价，缺失时回落到类别价
    Both,     // 类别价 + 客户覆盖价
}

impl fmt::Display for PriceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceMode::Base => write!(f, "BASE"),
            PriceMode::Customer => write!(f, "CUSTOMER"),
            PriceMode::Both => write!(f, "BOTH"),
        }
    }
}

impl FromStr for PriceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BASE" => Ok(PriceMode::Base),
            "CUSTOMER" => Ok(PriceMode::Customer),
            "BOTH" => Ok(PriceMode::Both),
            other => Err(format!("未知价格模式: {}", other)),
        }
    }
}

// ==========================================
// 时效价格族 (Price Family)
// ==========================================
// 每个族都有 current / future / history 三种角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceFamily {
    ClassPrice,
    CustomerPrice,
    ProductClassDiscount,
    ProductDiscount,
}

impl PriceFamily {
    pub const ALL: [PriceFamily; 4] = [
        PriceFamily::ClassPrice,
        PriceFamily::CustomerPrice,
        PriceFamily::ProductClassDiscount,
        PriceFamily::ProductDiscount,
    ];

    /// 该族的值是否为折扣（否则为金额）
    pub fn is_discount(&self) -> bool {
        matches!(
            self,
            PriceFamily::ProductClassDiscount | PriceFamily::ProductDiscount
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceFamily::ClassPrice => "CLASS_PRICE",
            PriceFamily::CustomerPrice => "CUSTOMER_PRICE",
            PriceFamily::ProductClassDiscount => "PRODUCT_CLASS_DISCOUNT",
            PriceFamily::ProductDiscount => "PRODUCT_DISCOUNT",
        }
    }
}

impl fmt::Display for PriceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 解析结果来源
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceSource {
    Class,
    Customer,
}

// ==========================================
// 导入批次类型与状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchKind {
    PriceBook,
    Customers,
    ClassDiscounts,
    ProductDiscounts,
    SpecialNetPrices,
    CustomerOverrides,
    PercentageIncrease,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::PriceBook => "PRICE_BOOK",
            BatchKind::Customers => "CUSTOMERS",
            BatchKind::ClassDiscounts => "CLASS_DISCOUNTS",
            BatchKind::ProductDiscounts => "PRODUCT_DISCOUNTS",
            BatchKind::SpecialNetPrices => "SPECIAL_NET_PRICES",
            BatchKind::CustomerOverrides => "CUSTOMER_OVERRIDES",
            BatchKind::PercentageIncrease => "PERCENTAGE_INCREASE",
        }
    }

    /// 缺席即软删除的批次
    ///
    /// 价目表按 (价格等级, 系列) 范围退役；特殊净价表与产品折扣表共用
    /// product_discount，只追加不退役；百分比调价不携带记录集
    pub fn soft_deletes_absent(&self) -> bool {
        !matches!(self, BatchKind::PercentageIncrease | BatchKind::SpecialNetPrices)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Committed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Committed => "COMMITTED",
            BatchStatus::Failed => "FAILED",
        }
    }
}

// ==========================================
// 折扣 (Discount)
// ==========================================
// 不变量: 0 < d < 1，写入时校验
#[derive(Debug, Error, Clone, PartialEq)]
#[error("折扣越界: {value}（要求 0 < d < 1）")]
pub struct DiscountError {
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Discount(f64);

impl Discount {
    pub fn new(value: f64) -> Result<Self, DiscountError> {
        if value.is_finite() && value > 0.0 && value < 1.0 {
            Ok(Self(value))
        } else {
            Err(DiscountError { value })
        }
    }

    /// 百分点表示（如 35 表示 35%）转换为小数
    pub fn from_percentage_points(points: f64) -> Result<Self, DiscountError> {
        Self::new(points / 100.0)
    }

    /// 入口统一转换：不小于 1 的值视为百分点（1 表示 1%），小于 1 的值视为小数
    pub fn from_ingress(value: f64) -> Result<Self, DiscountError> {
        if value >= 1.0 {
            Self::from_percentage_points(value)
        } else {
            Self::new(value)
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// 对基准价应用折扣，结果四舍五入到分
    pub fn apply(&self, base: Cents) -> Cents {
        (base as f64 * (1.0 - self.0)).round() as Cents
    }
}

impl TryFrom<f64> for Discount {
    type Error = DiscountError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Discount::new(value)
    }
}

impl From<Discount> for f64 {
    fn from(d: Discount) -> Self {
        d.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_bounds() {
        assert!(Discount::new(0.25).is_ok());
        assert!(Discount::new(0.0).is_err());
        assert!(Discount::new(1.0).is_err());
        assert!(Discount::new(-0.1).is_err());
        assert!(Discount::new(f64::NAN).is_err());
    }

    #[test]
    fn test_discount_ingress_conversion() {
        let d = Discount::from_ingress(35.0).unwrap();
        assert!((d.value() - 0.35).abs() < 1e-9);

        let d = Discount::from_ingress(0.35).unwrap();
        assert!((d.value() - 0.35).abs() < 1e-9);

        assert!(Discount::from_ingress(100.0).is_err());
    }

    #[test]
    fn test_discount_ingress_one_is_one_percent() {
        let d = Discount::from_ingress(1.0).unwrap();
        assert!((d.value() - 0.01).abs() < 1e-9);

        let d = Discount::from_ingress(0.999).unwrap();
        assert!((d.value() - 0.999).abs() < 1e-9);

        assert!(Discount::from_ingress(0.0).is_err());
        assert!(Discount::from_ingress(-5.0).is_err());
    }

    #[test]
    fn test_discount_apply_rounds_to_cents() {
        let d = Discount::new(0.3).unwrap();
        assert_eq!(d.apply(10000), 7000);
        assert_eq!(d.apply(333), 233);
    }

    #[test]
    fn test_price_mode_parse() {
        assert_eq!("both".parse::<PriceMode>().unwrap(), PriceMode::Both);
        assert!("nope".parse::<PriceMode>().is_err());
    }
}
