// ==========================================
// 价格目录系统 - 固定区域抽取
// ==========================================
// 流程（每个区域）:
// 1. 切片并删除全空行/列，校验列数
// 2. 标识列向下填充
// 3. 标识 token 清洗
// 4. 宽表 → 长表（每个价格列一个 suffix）
// 5. 按固定分隔符拼接 key
// 6. 过滤缺失/非正价格
// 7. 换算为分
// 8. 打 vendor / series 标签
// ==========================================

use crate::domain::batch::RecordIssue;
use crate::domain::records::NormalizedRecord;
use crate::importer::cell_grid::{Cell, CellGrid};
use crate::importer::data_cleaner::{normalize_token, to_cents, TokenRule};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::extractor_trait::{ExtractContext, Extraction};
use std::ops::Range;

/// 标识列定义
#[derive(Debug, Clone)]
pub struct IdColumn {
    /// 列名，同时作为产品属性名
    pub name: String,
    pub fill_down: bool,
    pub rules: Vec<TokenRule>,
}

impl IdColumn {
    pub fn new(name: &str, rules: Vec<TokenRule>) -> Self {
        Self {
            name: name.to_string(),
            fill_down: false,
            rules,
        }
    }

    pub fn filled(mut self) -> Self {
        self.fill_down = true;
        self
    }
}

/// 区域布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// 标识列…, suffix, 价格
    Long,
    /// 首行为档位表头；标识列…, 每档一个价格列
    Wide,
}

/// 固定区域声明
#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub name: String,
    pub rows: Range<usize>,
    pub cols: Range<usize>,
    pub layout: Layout,
    /// 去空后可接受的列数
    pub accepted_widths: Vec<usize>,
    pub id_columns: Vec<IdColumn>,
    pub suffix_rules: Vec<TokenRule>,
    /// key 中标识字段的顺序（下标指向 id_columns）
    pub key_order: Option<Vec<usize>>,
    pub delimiter: String,
    pub pricing_class: Option<String>,
}

impl WindowSpec {
    pub fn new(name: &str, rows: Range<usize>, cols: Range<usize>, layout: Layout) -> Self {
        Self {
            name: name.to_string(),
            rows,
            cols,
            layout,
            accepted_widths: Vec::new(),
            id_columns: Vec::new(),
            suffix_rules: vec![TokenRule::Trim],
            key_order: None,
            delimiter: "_".to_string(),
            pricing_class: None,
        }
    }

    pub fn accept_widths(mut self, widths: &[usize]) -> Self {
        self.accepted_widths = widths.to_vec();
        self
    }

    pub fn id(mut self, column: IdColumn) -> Self {
        self.id_columns.push(column);
        self
    }

    pub fn suffix_rules(mut self, rules: Vec<TokenRule>) -> Self {
        self.suffix_rules = rules;
        self
    }

    pub fn key_order(mut self, order: Vec<usize>) -> Self {
        self.key_order = Some(order);
        self
    }

    pub fn pricing_class(mut self, name: &str) -> Self {
        self.pricing_class = Some(name.to_string());
        self
    }

    fn schema_mismatch(&self, ctx: &ExtractContext<'_>, found: usize) -> ImportError {
        ImportError::SchemaMismatch {
            vendor_id: ctx.vendor_id.to_string(),
            series: ctx.series.to_string(),
            window: self.name.clone(),
            expected: self.accepted_widths.clone(),
            found,
        }
    }

    fn build_record(
        &self,
        ctx: &ExtractContext<'_>,
        ids: &[String],
        suffix: &str,
        price: f64,
    ) -> NormalizedRecord {
        let mut parts: Vec<&str> = match &self.key_order {
            Some(order) => order.iter().filter_map(|&i| ids.get(i).map(|s| s.as_str())).collect(),
            None => ids.iter().map(|s| s.as_str()).collect(),
        };
        parts.push(suffix);

        let mut record = NormalizedRecord::new(
            ctx.vendor_id,
            Some(ctx.series),
            parts.join(&self.delimiter),
            to_cents(price),
        )
        .with_category(ctx.series, 1);

        for (column, value) in self.id_columns.iter().zip(ids) {
            record = record.with_attribute(&column.name, "text", value);
        }
        if let Some(class) = &self.pricing_class {
            record = record.with_pricing_class(class);
        }
        record
    }

    /// 解析一行的标识字段；失败时返回问题描述
    fn row_ids(&self, data: &CellGrid, row: usize) -> Result<Vec<String>, String> {
        self.id_columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                normalize_token(&data.get(row, i).as_text(), &column.rules)
                    .map_err(|e| format!("{}: {}", column.name, e))
            })
            .collect()
    }

    /// 对网格应用本区域
    pub fn extract(&self, grid: &CellGrid, ctx: &ExtractContext<'_>) -> ImportResult<Extraction> {
        let window = grid
            .slice(self.rows.clone(), self.cols.clone())
            .drop_empty_rows()
            .drop_empty_columns();

        let width = window.width();
        if !self.accepted_widths.contains(&width) {
            return Err(self.schema_mismatch(ctx, width));
        }

        let n_ids = self.id_columns.len();
        let min_width = match self.layout {
            Layout::Long => n_ids + 2,
            Layout::Wide => n_ids + 1,
        };
        if width < min_width {
            return Err(self.schema_mismatch(ctx, width));
        }

        let (header, mut data) = match self.layout {
            Layout::Wide => (
                Some(window.slice(0..1, 0..width)),
                window.slice(1..window.height(), 0..width),
            ),
            Layout::Long => (None, window),
        };

        for (i, column) in self.id_columns.iter().enumerate() {
            if column.fill_down {
                data.forward_fill(i);
            }
        }

        // 档位表头
        let tier_labels: Vec<Result<String, String>> = match &header {
            Some(h) => (n_ids..width)
                .map(|c| normalize_token(&h.get(0, c).as_text(), &self.suffix_rules))
                .collect(),
            None => Vec::new(),
        };

        let mut out = Extraction::default();
        for row in 0..data.height() {
            let row_label = format!("{}/{} 行 {}", ctx.series, self.name, row + 1);

            // (suffix, price) 候选；先看价格，无有效价格的行（表头、备注）直接跳过
            let candidates: Vec<(Result<String, String>, f64)> = match self.layout {
                Layout::Long => positive_price(data.get(row, width - 1))
                    .map(|p| {
                        let suffix = normalize_token(&data.get(row, n_ids).as_text(), &self.suffix_rules);
                        vec![(suffix, p)]
                    })
                    .unwrap_or_default(),
                Layout::Wide => (n_ids..width)
                    .filter_map(|c| positive_price(data.get(row, c)).map(|p| (tier_labels[c - n_ids].clone(), p)))
                    .collect(),
            };
            if candidates.is_empty() {
                continue;
            }

            let ids = match self.row_ids(&data, row) {
                Ok(ids) => ids,
                Err(reason) => {
                    out.issues.push(RecordIssue::new(row_label, reason));
                    continue;
                }
            };

            for (suffix, price) in candidates {
                match suffix {
                    Ok(s) => out.records.push(self.build_record(ctx, &ids, &s, price)),
                    Err(reason) => out
                        .issues
                        .push(RecordIssue::new(row_label.clone(), format!("suffix: {}", reason))),
                }
            }
        }

        Ok(out)
    }
}

fn positive_price(cell: &Cell) -> Option<f64> {
    cell.as_number().filter(|p| *p > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tonnage_rules() -> Vec<TokenRule> {
        vec![TokenRule::Trim, TokenRule::StripChars(vec!['*']), TokenRule::IntegerCode]
    }

    #[test]
    fn test_long_window_with_fill_down() {
        let grid = CellGrid::from_strings(&[
            ["Tonnage", "Option", "Price"],
            ["36*", "A", "100.00"],
            ["", "B", "120.00"],
            ["", "C", "0"],
            ["48", "A", ""],
        ]);
        let spec = WindowSpec::new("main", 0..100, 0..3, Layout::Long)
            .accept_widths(&[3])
            .id(IdColumn::new("tonnage", tonnage_rules()).filled());

        let ctx = ExtractContext::new("V1", "S1");
        let out = spec.extract(&grid, &ctx).unwrap();

        let keys: Vec<(&str, i64)> = out.records.iter().map(|r| (r.key.as_str(), r.price)).collect();
        assert_eq!(keys, vec![("36_A", 10000), ("36_B", 12000)]);
        assert!(out.issues.is_empty());
        assert_eq!(out.records[0].series.as_deref(), Some("S1"));
        assert_eq!(out.records[0].attributes[0].value, "36");
    }

    #[test]
    fn test_wide_window_reshapes_tiers() {
        let grid = CellGrid::from_strings(&[
            ["Tons", "Slab", "A", "B*"],
            ["36", "5", "100", "110"],
            ["", "7", "105", ""],
        ]);
        let spec = WindowSpec::new("matrix", 0..10, 0..4, Layout::Wide)
            .accept_widths(&[4])
            .id(IdColumn::new("tonnage", tonnage_rules()).filled())
            .id(IdColumn::new("slab", vec![TokenRule::IntegerCode, TokenRule::PadLeft(2, '0')]))
            .suffix_rules(vec![TokenRule::Trim, TokenRule::StripChars(vec!['*'])]);

        let out = spec.extract(&grid, &ExtractContext::new("V1", "CP")).unwrap();
        let keys: Vec<&str> = out.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["36_05_A", "36_05_B", "36_07_A"]);
    }

    #[test]
    fn test_width_drift_is_schema_mismatch() {
        let grid = CellGrid::from_strings(&[["36", "A", "100", "extra"]]);
        let spec = WindowSpec::new("main", 0..10, 0..10, Layout::Long)
            .accept_widths(&[3])
            .id(IdColumn::new("tonnage", tonnage_rules()));

        let err = spec.extract(&grid, &ExtractContext::new("V1", "S1")).unwrap_err();
        match err {
            ImportError::SchemaMismatch { expected, found, .. } => {
                assert_eq!(expected, vec![3]);
                assert_eq!(found, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_identifier_is_collected_not_fatal() {
        let grid = CellGrid::from_strings(&[["36", "A", "100"], ["x1", "A", "90"]]);
        let spec = WindowSpec::new("main", 0..10, 0..3, Layout::Long)
            .accept_widths(&[3])
            .id(IdColumn::new("tonnage", tonnage_rules()));

        let out = spec.extract(&grid, &ExtractContext::new("V1", "S1")).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.issues.len(), 1);
    }
}
