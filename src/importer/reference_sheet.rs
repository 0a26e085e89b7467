// ==========================================
// 价格目录系统 - 客户/折扣参考表解析
// ==========================================
// 列布局（首行为表头，按 header_rows 跳过）:
// - Customers         : 客户, 价格等级（逗号/分号分隔，可空）
// - ClassDiscounts    : 客户, 分类, rank, 折扣
// - ProductDiscounts  : 客户, 产品, 折扣
// - SpecialNetPrices  : 客户, 产品, 净价
// - CustomerOverrides : 客户, 产品, 价格, [价格等级]
// 折扣在入口统一转为小数；不小于 1 的值按百分点处理（1 即 1%）
// ==========================================

use crate::domain::batch::RecordIssue;
use crate::domain::records::ReferenceRecord;
use crate::domain::types::{BatchKind, Discount};
use crate::importer::cell_grid::{Cell, CellGrid};
use crate::importer::data_cleaner::{normalize_null, to_cents};
use crate::importer::error::ImportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSheetKind {
    Customers,
    ClassDiscounts,
    ProductDiscounts,
    SpecialNetPrices,
    CustomerOverrides,
}

impl ReferenceSheetKind {
    pub fn batch_kind(&self) -> BatchKind {
        match self {
            ReferenceSheetKind::Customers => BatchKind::Customers,
            ReferenceSheetKind::ClassDiscounts => BatchKind::ClassDiscounts,
            ReferenceSheetKind::ProductDiscounts => BatchKind::ProductDiscounts,
            ReferenceSheetKind::SpecialNetPrices => BatchKind::SpecialNetPrices,
            ReferenceSheetKind::CustomerOverrides => BatchKind::CustomerOverrides,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceSheetKind::Customers => "customers",
            ReferenceSheetKind::ClassDiscounts => "class_discounts",
            ReferenceSheetKind::ProductDiscounts => "product_discounts",
            ReferenceSheetKind::SpecialNetPrices => "special_net_prices",
            ReferenceSheetKind::CustomerOverrides => "customer_overrides",
        }
    }

    /// 解析整张参考表；单行错误收集为问题，不中止
    pub fn parse(&self, grid: &CellGrid, header_rows: usize) -> (Vec<ReferenceRecord>, Vec<RecordIssue>) {
        let mut records = Vec::new();
        let mut issues = Vec::new();

        for (idx, cells) in grid.rows().enumerate().skip(header_rows) {
            if cells.iter().all(Cell::is_empty) {
                continue;
            }
            match self.parse_row(cells) {
                Ok(record) => records.push(record),
                Err(reason) => issues.push(RecordIssue::new(
                    format!("{} 行 {}", self.as_str(), idx + 1),
                    reason,
                )),
            }
        }
        (records, issues)
    }

    fn parse_row(&self, cells: &[Cell]) -> Result<ReferenceRecord, String> {
        let customer = text_at(cells, 0).ok_or("缺少客户名称")?;

        match self {
            ReferenceSheetKind::Customers => Ok(ReferenceRecord::Customer {
                name: customer,
                pricing_classes: text_at(cells, 1)
                    .map(|s| {
                        s.split(|c: char| c == ',' || c == ';')
                            .filter_map(normalize_null)
                            .collect()
                    })
                    .unwrap_or_default(),
            }),
            ReferenceSheetKind::ClassDiscounts => {
                let category = text_at(cells, 1).ok_or("缺少分类")?;
                let rank = number_at(cells, 2)?;
                if rank.fract() != 0.0 || rank < 1.0 {
                    return Err(format!("rank 必须是正整数: {}", rank));
                }
                Ok(ReferenceRecord::ClassDiscount {
                    customer,
                    category,
                    rank: rank as i32,
                    discount: discount_at(cells, 3)?,
                })
            }
            ReferenceSheetKind::ProductDiscounts => Ok(ReferenceRecord::ProductDiscount {
                customer,
                product_identifier: product_at(cells, 1)?,
                discount: discount_at(cells, 2)?,
            }),
            ReferenceSheetKind::SpecialNetPrices => {
                let product_identifier = product_at(cells, 1)?;
                let net = number_at(cells, 2)?;
                if net <= 0.0 {
                    return Err(format!("净价必须为正: {}", net));
                }
                Ok(ReferenceRecord::SpecialNetPrice {
                    customer,
                    product_identifier,
                    net_price: to_cents(net),
                })
            }
            ReferenceSheetKind::CustomerOverrides => {
                let product_identifier = product_at(cells, 1)?;
                let price = number_at(cells, 2)?;
                if price < 0.0 {
                    return Err(format!("价格不能为负: {}", price));
                }
                Ok(ReferenceRecord::CustomerOverride {
                    customer,
                    product_identifier,
                    price: to_cents(price),
                    pricing_class: text_at(cells, 3),
                })
            }
        }
    }
}

impl fmt::Display for ReferenceSheetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceSheetKind {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "customers" => Ok(ReferenceSheetKind::Customers),
            "class_discounts" => Ok(ReferenceSheetKind::ClassDiscounts),
            "product_discounts" => Ok(ReferenceSheetKind::ProductDiscounts),
            "special_net_prices" => Ok(ReferenceSheetKind::SpecialNetPrices),
            "customer_overrides" => Ok(ReferenceSheetKind::CustomerOverrides),
            other => Err(ImportError::InternalError(format!("未知参考表类型: {}", other))),
        }
    }
}

fn text_at(cells: &[Cell], idx: usize) -> Option<String> {
    cells.get(idx).and_then(|c| normalize_null(&c.as_text()))
}

fn product_at(cells: &[Cell], idx: usize) -> Result<String, String> {
    text_at(cells, idx)
        .map(|s| s.to_uppercase())
        .ok_or_else(|| "缺少产品标识".to_string())
}

fn number_at(cells: &[Cell], idx: usize) -> Result<f64, String> {
    let cell = cells.get(idx).unwrap_or(&Cell::Empty);
    cell.as_number()
        .ok_or_else(|| format!("第 {} 列不是数值: {:?}", idx + 1, cell.as_text()))
}

fn discount_at(cells: &[Cell], idx: usize) -> Result<Discount, String> {
    let raw = text_at(cells, idx).unwrap_or_default();
    let discount = match raw.strip_suffix('%') {
        Some(points) => {
            let points = crate::importer::data_cleaner::parse_decimal(points)
                .ok_or_else(|| format!("折扣不是数值: {}", raw))?;
            Discount::from_percentage_points(points)
        }
        None => Discount::from_ingress(number_at(cells, idx)?),
    };
    discount.map_err(|e| e.to_string())
}
