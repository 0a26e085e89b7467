// ==========================================
// 价格目录系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 供应商价目表导入、目录对账、时效价格解析
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 对账、时效存储、价格解析
pub mod engine;

// 导入层 - 工作簿与参考表
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// 性能观测（SQL 计数/慢查询）
pub mod perf;

// 价格清单导出
pub mod export;

// 应用层 - 服务组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{BatchKind, Cents, Discount, PriceFamily, PriceMode, PriceSource};

// 领域实体
pub use domain::{NormalizedRecord, PriceQuery, ReconciliationResult, ReferenceRecord, ResolvedPrice};

// 引擎
pub use engine::{CatalogReconciler, PriceResolver, RepricingQueue, TemporalPriceStore, VendorLocks};

// 导入
pub use importer::{ExtractorRegistry, IngestService, WorkbookParser};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "价格目录系统";
