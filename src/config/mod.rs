// ==========================================
// 价格目录系统 - 配置层
// ==========================================
// 职责: 供应商工作表映射、加价项映射、价格等级等配置
// 存储: config_kv 表（global / 供应商作用域）
// ==========================================

pub mod config_manager;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, ConfigScope};
pub use import_config_trait::IngestConfigReader;
