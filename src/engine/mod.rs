// ==========================================
// 价格目录系统 - 引擎层
// ==========================================
// 职责: 对账、时效状态机、价格解析、后台重新定价
// 红线: Engine 不拼业务以外的 SQL，数据访问统一走 repository 的 *_tx 函数
// 约束: 写操作按供应商、按批次原子执行
// ==========================================

pub mod error;
pub mod reconciler;
pub mod repricing;
pub mod resolver;
pub mod temporal;

// 重导出核心引擎
pub use error::{EngineError, EngineResult};
pub use reconciler::{CatalogReconciler, ReconcileOptions};
pub use repricing::{RepricingHandle, RepricingQueue, RepricingRequest, VendorLocks};
pub use resolver::PriceResolver;
pub use temporal::{DelayReport, ImplementReport, RollbackReport, ScheduleOutcome, TemporalPriceStore};
