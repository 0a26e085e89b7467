// ==========================================
// 价格目录系统 - 应用状态
// ==========================================
// 职责: 管理共享连接与各服务实例
// ==========================================

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use rusqlite::Connection;

use crate::config::config_manager::ConfigManager;
use crate::engine::{PriceResolver, TemporalPriceStore, VendorLocks};
use crate::importer::IngestService;
use crate::repository::{CatalogRepository, ImportBatchRepository};

/// 应用状态
///
/// 所有服务共享同一个 SQLite 连接，写操作按供应商写锁串行
pub struct AppState {
    /// 数据库路径
    pub db_path: PathBuf,

    /// 共享连接
    pub conn: Arc<Mutex<Connection>>,

    /// 配置管理
    pub config: Arc<ConfigManager>,

    /// 供应商写锁
    pub locks: Arc<VendorLocks>,

    /// 导入服务
    pub ingest: IngestService<ConfigManager>,

    /// 时效存储（implement / rollback / delay）
    pub temporal: TemporalPriceStore,

    /// 价格解析
    pub resolver: PriceResolver,

    /// 目录查询
    pub catalog: CatalogRepository,

    /// 批次审计
    pub batches: ImportBatchRepository,
}

impl AppState {
    /// 打开数据库并初始化所有服务
    ///
    /// # 说明
    /// 1. 打开连接并统一 PRAGMA
    /// 2. 幂等建表
    /// 3. 创建服务实例
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self, String> {
        let db_path = db_path.into();
        tracing::info!("初始化AppState，数据库路径: {}", db_path.display());

        let mut conn = crate::db::open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::perf::install_sqlite_tracing(&mut conn);
        crate::db::ensure_schema(&conn).map_err(|e| format!("建表失败: {}", e))?;

        Self::from_connection(db_path, Arc::new(Mutex::new(conn)))
    }

    /// 基于已有连接组装（调用方负责建表）
    pub fn from_connection(db_path: PathBuf, conn: Arc<Mutex<Connection>>) -> Result<Self, String> {
        let config = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let locks = Arc::new(VendorLocks::new());

        Ok(Self {
            ingest: IngestService::new(conn.clone(), config.clone(), locks.clone()),
            temporal: TemporalPriceStore::new(conn.clone()),
            resolver: PriceResolver::new(conn.clone()),
            catalog: CatalogRepository::new(conn.clone()),
            batches: ImportBatchRepository::new(conn.clone()),
            db_path,
            conn,
            config,
            locks,
        })
    }
}

/// 数据库文件名
pub const DB_FILE_NAME: &str = "catalog.sqlite3";

/// 用户数据目录下的默认数据库位置: <data_local_dir>/price-catalog/catalog.sqlite3
///
/// 没有用户数据目录时落在当前目录；命令行 --db / PRICE_CATALOG_DB 可覆盖
pub fn default_db_path() -> std::io::Result<PathBuf> {
    let dir = match dirs::data_local_dir() {
        Some(base) => base.join("price-catalog"),
        None => return Ok(PathBuf::from(DB_FILE_NAME)),
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join(DB_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_db_path_names_catalog_file() {
        let path = default_db_path().unwrap();
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some(DB_FILE_NAME));
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            assert!(parent.is_dir());
        }
    }

    #[test]
    fn test_app_state_bootstraps_schema() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let state = AppState::new(file.path()).unwrap();

        let guard = state.conn.lock().unwrap();
        let version = crate::db::read_schema_version(&guard).unwrap();
        assert_eq!(version, Some(crate::db::CURRENT_SCHEMA_VERSION));
    }
}
