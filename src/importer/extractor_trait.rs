// ==========================================
// 价格目录系统 - 系列抽取器 Trait
// ==========================================
// 职责: 定义 (vendor, series) 抽取策略接口（不包含实现）
// 实现者: LongWindowExtractor / TierMatrixExtractor / PartsListExtractor
// ==========================================

use crate::domain::batch::RecordIssue;
use crate::domain::records::NormalizedRecord;
use crate::importer::cell_grid::CellGrid;
use crate::importer::error::ImportResult;

/// 抽取上下文：输出记录统一打上 vendor / series 标签
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext<'a> {
    pub vendor_id: &'a str,
    pub series: &'a str,
}

impl<'a> ExtractContext<'a> {
    pub fn new(vendor_id: &'a str, series: &'a str) -> Self {
        Self { vendor_id, series }
    }
}

/// 抽取结果：记录 + 行级问题（行级问题不阻断导入）
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<NormalizedRecord>,
    pub issues: Vec<RecordIssue>,
}

impl Extraction {
    pub fn merge(&mut self, other: Extraction) {
        self.records.extend(other.records);
        self.issues.extend(other.issues);
    }
}

// ==========================================
// SeriesExtractor Trait
// ==========================================
// 约定:
// - 区域列数不匹配任何已知结构时返回 SchemaMismatch（整次导入中止）
// - 单行无法解析时写入 issues 并跳过该行
pub trait SeriesExtractor: Send + Sync {
    /// 策略名称（日志用）
    fn name(&self) -> &'static str;

    fn extract(&self, grid: &CellGrid, ctx: &ExtractContext<'_>) -> ImportResult<Extraction>;
}
