// ==========================================
// 价格目录系统 - 系列抽取策略
// ==========================================
// LongWindowExtractor  : (标识…, suffix, 价格) 长表
// TierMatrixExtractor  : 标识列 + 档位价格列的宽表，可多个区域
// PartsListExtractor   : 零件清单（料号, 描述, [单位], 列表价, 零折扣价）
// ==========================================

use crate::domain::batch::RecordIssue;
use crate::domain::records::NormalizedRecord;
use crate::importer::cell_grid::CellGrid;
use crate::importer::data_cleaner::{normalize_null, normalize_token, to_cents, TokenRule};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::extractor_trait::{ExtractContext, Extraction, SeriesExtractor};
use crate::importer::window::{IdColumn, Layout, WindowSpec};

/// 工作表允许的最大行数（区域上界）
const SHEET_ROW_LIMIT: usize = 100_000;

fn tonnage_column() -> IdColumn {
    IdColumn::new(
        "tonnage",
        vec![TokenRule::Trim, TokenRule::StripChars(vec!['*']), TokenRule::IntegerCode],
    )
    .filled()
}

fn option_suffix_rules() -> Vec<TokenRule> {
    vec![
        TokenRule::Trim,
        TokenRule::StripChars(vec!['*', '†']),
        TokenRule::Uppercase,
    ]
}

// ==========================================
// LongWindowExtractor
// ==========================================
pub struct LongWindowExtractor {
    window: WindowSpec,
}

impl LongWindowExtractor {
    pub fn new(window: WindowSpec) -> Self {
        Self { window }
    }

    /// 吨位 + 选项后缀 + 价格，从 `first_row` 开始到表尾
    pub fn tonnage_option(first_row: usize) -> Self {
        Self::new(
            WindowSpec::new("tonnage_option", first_row..SHEET_ROW_LIMIT, 0..3, Layout::Long)
                .accept_widths(&[3])
                .id(tonnage_column())
                .suffix_rules(option_suffix_rules()),
        )
    }
}

impl SeriesExtractor for LongWindowExtractor {
    fn name(&self) -> &'static str {
        "long_window"
    }

    fn extract(&self, grid: &CellGrid, ctx: &ExtractContext<'_>) -> ImportResult<Extraction> {
        self.window.extract(grid, ctx)
    }
}

// ==========================================
// TierMatrixExtractor
// ==========================================
pub struct TierMatrixExtractor {
    windows: Vec<WindowSpec>,
}

impl TierMatrixExtractor {
    pub fn new(windows: Vec<WindowSpec>) -> Self {
        Self { windows }
    }

    /// 吨位 × 板片矩阵: 每个区域首行为档位表头，key = 吨位_板片_档位
    pub fn slab_tonnage(windows: &[(usize, usize)]) -> Self {
        let specs = windows
            .iter()
            .enumerate()
            .map(|(i, (start, end))| {
                WindowSpec::new(&format!("matrix_{}", i + 1), *start..*end, 0..8, Layout::Wide)
                    .accept_widths(&[4, 5, 6])
                    .id(tonnage_column())
                    .id(IdColumn::new(
                        "slab",
                        vec![TokenRule::Trim, TokenRule::IntegerCode, TokenRule::PadLeft(2, '0')],
                    )
                    .filled())
                    .suffix_rules(option_suffix_rules())
            })
            .collect();
        Self::new(specs)
    }
}

impl SeriesExtractor for TierMatrixExtractor {
    fn name(&self) -> &'static str {
        "tier_matrix"
    }

    fn extract(&self, grid: &CellGrid, ctx: &ExtractContext<'_>) -> ImportResult<Extraction> {
        let mut out = Extraction::default();
        for window in &self.windows {
            out.merge(window.extract(grid, ctx)?);
        }
        Ok(out)
    }
}

// ==========================================
// PartsListExtractor
// ==========================================
// 4 列: 料号, 描述, 列表价, 零折扣价
// 5 列: 料号, 描述, 单位, 列表价, 零折扣价
// 其他列数一律 SchemaMismatch
pub struct PartsListExtractor {
    first_row: usize,
    list_class: String,
    zero_discount_class: String,
}

impl PartsListExtractor {
    pub fn new(first_row: usize, list_class: &str, zero_discount_class: &str) -> Self {
        Self {
            first_row,
            list_class: list_class.to_string(),
            zero_discount_class: zero_discount_class.to_string(),
        }
    }
}

impl SeriesExtractor for PartsListExtractor {
    fn name(&self) -> &'static str {
        "parts_list"
    }

    fn extract(&self, grid: &CellGrid, ctx: &ExtractContext<'_>) -> ImportResult<Extraction> {
        let data = grid
            .slice(self.first_row..SHEET_ROW_LIMIT, 0..16)
            .drop_empty_rows()
            .drop_empty_columns();

        let width = data.width();
        let has_uom = match width {
            4 => false,
            5 => true,
            found => {
                return Err(ImportError::SchemaMismatch {
                    vendor_id: ctx.vendor_id.to_string(),
                    series: ctx.series.to_string(),
                    window: "parts_list".to_string(),
                    expected: vec![4, 5],
                    found,
                })
            }
        };
        let (list_col, zero_col) = if has_uom { (3, 4) } else { (2, 3) };

        let mut out = Extraction::default();
        for row in 0..data.height() {
            let list = data.get(row, list_col).as_number().filter(|p| *p > 0.0);
            let zero = data.get(row, zero_col).as_number().filter(|p| *p > 0.0);
            if list.is_none() && zero.is_none() {
                continue;
            }

            let part = match normalize_token(
                &data.get(row, 0).as_text(),
                &[TokenRule::Trim, TokenRule::Uppercase],
            ) {
                Ok(p) => p,
                Err(reason) => {
                    out.issues
                        .push(RecordIssue::new(format!("{} 行 {}", ctx.series, row + 1), reason));
                    continue;
                }
            };
            let description = normalize_null(&data.get(row, 1).as_text());
            let uom = if has_uom {
                normalize_null(&data.get(row, 2).as_text())
            } else {
                None
            };

            for (class, price) in [(&self.list_class, list), (&self.zero_discount_class, zero)] {
                let Some(price) = price else { continue };
                // 料号全局唯一，不带系列前缀
                let mut record = NormalizedRecord::new(ctx.vendor_id, None, part.clone(), to_cents(price))
                    .with_pricing_class(class)
                    .with_description(description.clone())
                    .with_category(ctx.series, 1);
                if let Some(u) = &uom {
                    record = record.with_attribute("uom", "text", u);
                }
                out.records.push(record);
            }
        }

        Ok(out)
    }
}
