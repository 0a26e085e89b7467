// ==========================================
// 价格目录系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 作用域: 'global' 或供应商编号，供应商配置优先
// ==========================================

use crate::config::import_config_trait::IngestConfigReader;
use crate::importer::adder_expander::{AdderMapping, CompositeRule};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::registry::ExtractorSpec;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigScope - 配置作用域
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    Global,
    Vendor { vendor_id: String },
}

impl ConfigScope {
    pub fn vendor(vendor_id: &str) -> Self {
        ConfigScope::Vendor {
            vendor_id: vendor_id.to_string(),
        }
    }

    pub fn scope_id(&self) -> &str {
        match self {
            ConfigScope::Global => "global",
            ConfigScope::Vendor { vendor_id } => vendor_id,
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取单个作用域的配置值
    pub fn get_scoped_value(&self, scope: &ConfigScope, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![scope.scope_id(), key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取配置值：供应商作用域优先，其次 global
    pub fn get_value(&self, vendor_id: Option<&str>, key: &str) -> RepositoryResult<Option<String>> {
        if let Some(vendor) = vendor_id {
            if let Some(v) = self.get_scoped_value(&ConfigScope::vendor(vendor), key)? {
                return Ok(Some(v));
            }
        }
        self.get_scoped_value(&ConfigScope::Global, key)
    }

    fn get_value_or_default(&self, vendor_id: &str, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self
            .get_value(Some(vendor_id), key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入配置（UPSERT）
    pub fn set_value(&self, scope: &ConfigScope, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![scope.scope_id(), key, value],
        )?;
        Ok(())
    }

    /// 删除配置
    pub fn remove_value(&self, scope: &ConfigScope, key: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![scope.scope_id(), key],
        )?;
        Ok(affected > 0)
    }

    fn read(&self, vendor_id: &str, key: &str) -> ImportResult<Option<String>> {
        self.get_value(Some(vendor_id), key)
            .map_err(|e| ImportError::ConfigReadError {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    fn read_or_default(&self, vendor_id: &str, key: &str, default: &str) -> ImportResult<String> {
        self.get_value_or_default(vendor_id, key, default)
            .map_err(|e| ImportError::ConfigReadError {
                key: key.to_string(),
                message: e.to_string(),
            })
    }
}

// ==========================================
// IngestConfigReader Trait 实现
// ==========================================
#[async_trait]
impl IngestConfigReader for ConfigManager {
    async fn get_sheet_series(&self, vendor_id: &str, sheet: &str) -> ImportResult<Option<String>> {
        self.read(vendor_id, &config_keys::sheet_series(sheet))
    }

    async fn get_adder_sheet_series(&self, vendor_id: &str, sheet: &str) -> ImportResult<Option<String>> {
        self.read(vendor_id, &config_keys::adder_sheet(sheet))
    }

    async fn get_default_pricing_class(&self, vendor_id: &str) -> ImportResult<String> {
        self.read_or_default(vendor_id, config_keys::DEFAULT_PRICING_CLASS, "list price")
    }

    async fn get_zero_discount_class(&self, vendor_id: &str) -> ImportResult<String> {
        self.read_or_default(vendor_id, config_keys::ZERO_DISCOUNT_CLASS, "zero discount")
    }

    async fn get_adder_mapping(&self, vendor_id: &str, series: &str) -> ImportResult<AdderMapping> {
        let key = config_keys::adder_mapping(series);
        match self.read(vendor_id, &key)? {
            Some(raw) => {
                let value: serde_json::Value =
                    serde_json::from_str(&raw).map_err(|e| ImportError::ConfigReadError {
                        key: key.clone(),
                        message: e.to_string(),
                    })?;
                AdderMapping::from_json(&value)
            }
            None => Ok(AdderMapping::new()),
        }
    }

    async fn get_adder_composites(&self, vendor_id: &str, series: &str) -> ImportResult<Vec<CompositeRule>> {
        let key = config_keys::adder_composites(series);
        match self.read(vendor_id, &key)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| ImportError::ConfigReadError {
                key,
                message: e.to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn get_extractor_spec(&self, vendor_id: &str, series: &str) -> ImportResult<Option<ExtractorSpec>> {
        let key = config_keys::extractor(series);
        match self.read(vendor_id, &key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| ImportError::ConfigReadError {
                    key,
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn is_repricing_enabled(&self, vendor_id: &str) -> ImportResult<bool> {
        let value = self.read_or_default(vendor_id, config_keys::REPRICING_ENABLED, "true")?;
        Ok(matches!(
            value.trim().to_lowercase().as_str(),
            "true" | "1" | "yes" | "y"
        ))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 价格等级
    pub const DEFAULT_PRICING_CLASS: &str = "default_pricing_class";
    pub const ZERO_DISCOUNT_CLASS: &str = "zero_discount_class";

    // 后台重定价
    pub const REPRICING_ENABLED: &str = "repricing_enabled";

    /// 工作表 → 系列
    pub fn sheet_series(sheet: &str) -> String {
        format!("sheet_series/{}", sheet.trim())
    }

    /// 加价项工作表 → 系列
    pub fn adder_sheet(sheet: &str) -> String {
        format!("adder_sheet/{}", sheet.trim())
    }

    /// 加价项描述映射 (JSON 对象)
    pub fn adder_mapping(series: &str) -> String {
        format!("adder_mapping/{}", series)
    }

    /// 组合加价规则 (JSON 数组)
    pub fn adder_composites(series: &str) -> String {
        format!("adder_composites/{}", series)
    }

    /// 系列抽取策略 (JSON，见 ExtractorSpec)
    pub fn extractor(series: &str) -> String {
        format!("extractor/{}", series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_vendor_scope_overrides_global() {
        let cfg = manager();
        cfg.set_value(&ConfigScope::Global, config_keys::ZERO_DISCOUNT_CLASS, "net")
            .unwrap();
        assert_eq!(cfg.get_zero_discount_class("V1").await.unwrap(), "net");

        cfg.set_value(&ConfigScope::vendor("V1"), config_keys::ZERO_DISCOUNT_CLASS, "dealer net")
            .unwrap();
        assert_eq!(cfg.get_zero_discount_class("V1").await.unwrap(), "dealer net");
        assert_eq!(cfg.get_zero_discount_class("V2").await.unwrap(), "net");
    }

    #[tokio::test]
    async fn test_defaults() {
        let cfg = manager();
        assert_eq!(cfg.get_default_pricing_class("V1").await.unwrap(), "list price");
        assert!(cfg.is_repricing_enabled("V1").await.unwrap());
        assert!(cfg.get_sheet_series("V1", "Sheet1").await.unwrap().is_none());
        assert!(cfg.get_adder_mapping("V1", "S1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adder_config_parsing() {
        let cfg = manager();
        cfg.set_value(
            &ConfigScope::vendor("V1"),
            &config_keys::adder_mapping("S1"),
            r#"{"Coated Coil": ["COAT", "COAT_ALT"]}"#,
        )
        .unwrap();
        cfg.set_value(
            &ConfigScope::vendor("V1"),
            &config_keys::adder_composites("S1"),
            r#"[{"key": "COAT_CUFIN", "sources": ["coated coil", "copper fin"]}]"#,
        )
        .unwrap();

        let mapping = cfg.get_adder_mapping("V1", "S1").await.unwrap();
        assert_eq!(mapping.lookup("coatedcoil").map(|k| k.len()), Some(2));

        let composites = cfg.get_adder_composites("V1", "S1").await.unwrap();
        assert_eq!(composites.len(), 1);
        assert!(composites[0].consume_sources);
    }

    #[tokio::test]
    async fn test_extractor_spec_and_removal() {
        let cfg = manager();
        let scope = ConfigScope::vendor("V1");
        cfg.set_value(&scope, &config_keys::extractor("S1"), r#"{"kind": "long_window", "first_row": 1}"#)
            .unwrap();
        assert_eq!(
            cfg.get_extractor_spec("V1", "S1").await.unwrap(),
            Some(ExtractorSpec::LongWindow { first_row: 1 })
        );
        assert!(cfg.get_extractor_spec("V2", "S1").await.unwrap().is_none());

        cfg.set_value(&scope, &config_keys::extractor("S2"), r#"{"kind": "pivot"}"#)
            .unwrap();
        assert!(matches!(
            cfg.get_extractor_spec("V1", "S2").await,
            Err(ImportError::ConfigReadError { .. })
        ));

        assert!(cfg.remove_value(&scope, &config_keys::extractor("S1")).unwrap());
        assert!(!cfg.remove_value(&scope, &config_keys::extractor("S1")).unwrap());
        assert!(cfg.get_scoped_value(&scope, &config_keys::extractor("S1")).unwrap().is_none());
    }
}
