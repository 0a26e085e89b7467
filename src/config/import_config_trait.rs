// ==========================================
// 价格目录系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入流水线所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// 作用域: 供应商配置覆盖全局配置
// ==========================================

use crate::importer::adder_expander::{AdderMapping, CompositeRule};
use crate::importer::error::ImportResult;
use crate::importer::registry::ExtractorSpec;
use async_trait::async_trait;

// ==========================================
// IngestConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
// 测试: MockConfigReader
#[async_trait]
pub trait IngestConfigReader: Send + Sync {
    // ===== 工作表映射 =====

    /// 价目工作表对应的产品系列
    ///
    /// # 返回
    /// - Some(series): 该工作表按系列抽取
    /// - None: 该工作表不是价目表
    async fn get_sheet_series(&self, vendor_id: &str, sheet: &str) -> ImportResult<Option<String>>;

    /// 加价项工作表对应的产品系列
    async fn get_adder_sheet_series(&self, vendor_id: &str, sheet: &str) -> ImportResult<Option<String>>;

    // ===== 价格等级 =====

    /// 系列记录默认写入的价格等级
    ///
    /// # 默认值
    /// - "list price"
    async fn get_default_pricing_class(&self, vendor_id: &str) -> ImportResult<String>;

    /// 零折扣价格等级（特殊净价换算与重定价的基准）
    ///
    /// # 默认值
    /// - "zero discount"
    async fn get_zero_discount_class(&self, vendor_id: &str) -> ImportResult<String>;

    // ===== 加价项 =====

    /// 加价项描述映射表（未配置时为空表，全部透传）
    async fn get_adder_mapping(&self, vendor_id: &str, series: &str) -> ImportResult<AdderMapping>;

    /// 组合加价规则（未配置时为空）
    async fn get_adder_composites(&self, vendor_id: &str, series: &str) -> ImportResult<Vec<CompositeRule>>;

    // ===== 抽取策略 =====

    /// 系列的抽取策略声明；配置存在时优先于内置注册表
    async fn get_extractor_spec(&self, vendor_id: &str, series: &str) -> ImportResult<Option<ExtractorSpec>>;

    // ===== 后台任务 =====

    /// 导入后是否提交后台重定价
    ///
    /// # 默认值
    /// - true
    async fn is_repricing_enabled(&self, vendor_id: &str) -> ImportResult<bool>;
}
