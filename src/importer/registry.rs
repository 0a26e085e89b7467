// ==========================================
// 价格目录系统 - 抽取策略注册表
// ==========================================
// (vendor_id, series) → SeriesExtractor
// 新系列通过注册新策略接入，不修改已有分支
// 其它供应商的系列可在配置 extractor/<series> 中以 JSON 声明
// ==========================================

use crate::importer::cell_grid::CellGrid;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::extractor_trait::{ExtractContext, Extraction, SeriesExtractor};
use crate::importer::extractors::{LongWindowExtractor, PartsListExtractor, TierMatrixExtractor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// 内置策略所属供应商
pub const BUILTIN_VENDOR: &str = "ADP";

/// 配置声明的抽取策略
///
/// ```json
/// {"kind": "long_window", "first_row": 2}
/// {"kind": "tier_matrix", "windows": [[2, 40], [42, 80]]}
/// {"kind": "parts_list", "first_row": 1}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorSpec {
    LongWindow { first_row: usize },
    TierMatrix { windows: Vec<(usize, usize)> },
    PartsList { first_row: usize },
}

impl ExtractorSpec {
    /// 构建策略；零件清单的两个价格等级取自当前供应商配置
    pub fn build(&self, list_class: &str, zero_discount_class: &str) -> Box<dyn SeriesExtractor> {
        match self {
            ExtractorSpec::LongWindow { first_row } => Box::new(LongWindowExtractor::tonnage_option(*first_row)),
            ExtractorSpec::TierMatrix { windows } => Box::new(TierMatrixExtractor::slab_tonnage(windows)),
            ExtractorSpec::PartsList { first_row } => {
                Box::new(PartsListExtractor::new(*first_row, list_class, zero_discount_class))
            }
        }
    }
}

#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<(String, String), Box<dyn SeriesExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置策略
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(BUILTIN_VENDOR, "AMH", Box::new(LongWindowExtractor::tonnage_option(2)));
        registry.register(
            BUILTIN_VENDOR,
            "CP",
            Box::new(TierMatrixExtractor::slab_tonnage(&[(2, 40), (42, 80)])),
        );
        registry.register(
            BUILTIN_VENDOR,
            "PARTS",
            Box::new(PartsListExtractor::new(1, "list price", "zero discount")),
        );
        registry
    }

    pub fn register(&mut self, vendor_id: &str, series: &str, extractor: Box<dyn SeriesExtractor>) {
        self.extractors
            .insert((vendor_id.to_string(), series.to_string()), extractor);
    }

    pub fn contains(&self, vendor_id: &str, series: &str) -> bool {
        self.extractors
            .contains_key(&(vendor_id.to_string(), series.to_string()))
    }

    /// 按 (vendor, series) 选择策略并抽取
    pub fn extract(&self, grid: &CellGrid, vendor_id: &str, series: &str) -> ImportResult<Extraction> {
        let extractor = self
            .extractors
            .get(&(vendor_id.to_string(), series.to_string()))
            .ok_or_else(|| ImportError::UnknownSeries {
                vendor_id: vendor_id.to_string(),
                series: series.to_string(),
            })?;
        Self::run(extractor.as_ref(), grid, vendor_id, series)
    }

    /// 用给定策略抽取（配置声明的策略走这里）
    pub fn run(
        extractor: &dyn SeriesExtractor,
        grid: &CellGrid,
        vendor_id: &str,
        series: &str,
    ) -> ImportResult<Extraction> {
        let ctx = ExtractContext::new(vendor_id, series);
        let out = extractor.extract(grid, &ctx)?;
        debug!(
            vendor_id = %vendor_id,
            series = %series,
            strategy = extractor.name(),
            records = out.records.len(),
            issues = out.issues.len(),
            "系列抽取完成"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_series() {
        let registry = ExtractorRegistry::with_defaults();
        let grid = CellGrid::default();
        let result = registry.extract(&grid, "V9", "NOPE");
        assert!(matches!(result, Err(ImportError::UnknownSeries { .. })));
    }

    #[test]
    fn test_spec_from_json_builds_strategy() {
        let spec: ExtractorSpec = serde_json::from_str(r#"{"kind": "tier_matrix", "windows": [[0, 10]]}"#).unwrap();
        assert_eq!(spec, ExtractorSpec::TierMatrix { windows: vec![(0, 10)] });
        assert_eq!(spec.build("list price", "zero discount").name(), "tier_matrix");

        let spec: ExtractorSpec = serde_json::from_str(r#"{"kind": "long_window", "first_row": 0}"#).unwrap();
        let extractor = spec.build("list price", "zero discount");
        let grid = CellGrid::from_strings(&[["48", "c", "150.00"]]);
        let out = ExtractorRegistry::run(extractor.as_ref(), &grid, "V2", "S9").unwrap();
        assert_eq!(out.records[0].key, "48_C");
        assert_eq!(out.records[0].vendor_id, "V2");
    }

    #[test]
    fn test_registered_strategy_is_used() {
        let mut registry = ExtractorRegistry::new();
        registry.register("V1", "S1", Box::new(LongWindowExtractor::tonnage_option(0)));
        assert!(registry.contains("V1", "S1"));

        let grid = CellGrid::from_strings(&[["36", "A", "100.00"]]);
        let out = registry.extract(&grid, "V1", "S1").unwrap();
        assert_eq!(out.records[0].key, "36_A");
        assert_eq!(out.records[0].vendor_id, "V1");
    }
}
