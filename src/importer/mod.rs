// ==========================================
// 价格目录系统 - 导入层
// ==========================================
// 职责: 供应商价目工作簿与参考表 → 标准化记录 → 对账
// 支持: Excel (xlsx/xlsm/xls/ods), CSV
// ==========================================

// 模块声明
pub mod adder_expander;
pub mod cell_grid;
pub mod data_cleaner;
pub mod error;
pub mod extractor_trait;
pub mod extractors;
pub mod file_parser;
pub mod ingest;
pub mod reference_sheet;
pub mod registry;
pub mod window;

// 重导出核心类型
pub use adder_expander::{AdderExpander, AdderExpansion, AdderMapping, CompositeRule};
pub use cell_grid::{Cell, CellGrid, Workbook};
pub use error::{ImportError, ImportResult};
pub use extractor_trait::{ExtractContext, Extraction, SeriesExtractor};
pub use extractors::{LongWindowExtractor, PartsListExtractor, TierMatrixExtractor};
pub use file_parser::{CsvParser, ExcelParser, FileParser, WorkbookParser};
pub use ingest::{IngestOutcome, IngestService, StagedWorkbook};
pub use reference_sheet::ReferenceSheetKind;
pub use registry::{ExtractorRegistry, ExtractorSpec, BUILTIN_VENDOR};
pub use window::{IdColumn, Layout, WindowSpec};
