// ==========================================
// 价格目录系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约定: `*_tx` 函数接收 &Connection，由调用方持有事务
// ==========================================

pub mod batch_repo;
pub mod catalog_repo;
pub mod discount_repo;
pub mod error;
pub mod price_repo;
pub mod repricing_task_repo;
pub mod temporal_repo;

// 重导出核心仓储
pub use batch_repo::ImportBatchRepository;
pub use catalog_repo::CatalogRepository;
pub use discount_repo::{DiscountRepository, DiscountRowRef};
pub use error::{RepositoryError, RepositoryResult};
pub use price_repo::{CustomerPriceRef, PriceRepository, PriceRowRef, PriceView};
pub use repricing_task_repo::{RepricingStatus, RepricingTaskEntity, RepricingTaskRepository};
pub use temporal_repo::{DueFuture, FamilyTable, TemporalRepository};
