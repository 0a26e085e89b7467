// ==========================================
// 价格目录系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 策略: SchemaMismatch 致命（整次导入中止）；单行问题尽量收集后继续
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xlsm/.xls/.ods/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("工作表不存在: {0}")]
    SheetNotFound(String),

    // ===== 抽取错误 =====
    #[error("区域结构不匹配 (vendor={vendor_id}, series={series}, window={window}): 期望列数 {expected:?}，实际 {found}")]
    SchemaMismatch {
        vendor_id: String,
        series: String,
        window: String,
        expected: Vec<usize>,
        found: usize,
    },

    #[error("未注册的系列抽取规则: vendor={vendor_id}, series={series}")]
    UnknownSeries { vendor_id: String, series: String },

    /// 非致命：未映射的加价项按原描述透传，仅作为警告载荷使用
    #[error("未映射的加价项 (series={series}): {description}")]
    UnmappedAdder { series: String, description: String },

    // ===== 配置错误 =====
    #[error("配置读取失败 (key: {key}): {message}")]
    ConfigReadError { key: String, message: String },

    // ===== 下游错误 =====
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Repository(RepositoryError::from(err))
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
