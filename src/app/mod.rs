// ==========================================
// 价格目录系统 - 应用层
// ==========================================
// 职责: 组装共享连接与服务，供命令行与上层 API 调用
// ==========================================

pub mod state;

// 重导出
pub use state::{default_db_path, AppState, DB_FILE_NAME};
