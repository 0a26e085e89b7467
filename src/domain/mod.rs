// ==========================================
// 价格目录系统 - 领域层
// ==========================================
// 职责: 实体、值类型与暂存记录定义
// 红线: 领域层不依赖数据库与文件格式
// ==========================================

pub mod batch;
pub mod catalog;
pub mod pricing;
pub mod records;
pub mod resolution;
pub mod types;

pub use batch::{ImportBatch, ReconciliationResult, RecordIssue};
pub use catalog::{Customer, PricingClass, Product, ProductAttribute, ProductClass};
pub use pricing::{FutureEntry, HistoryEntry, TemporalRow, TemporalValue};
pub use records::{AdderRow, CategoryPath, NormalizedRecord, ReferenceRecord};
pub use resolution::{PriceQuery, ResolvedPrice};
pub use types::{
    BatchKind, BatchStatus, Cents, Discount, DiscountError, PriceFamily, PriceMode, PriceSource,
};
