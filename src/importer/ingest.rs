// ==========================================
// 价格目录系统 - 导入服务
// ==========================================
// 流程: 解析工作簿 → 工作表映射系列 → 抽取 / 加价项展开 → 供应商写锁下对账 → 可选后台重新定价
// 约束:
// - 抽取阶段的单行问题收集后继续，存在问题时本批不退役缺席记录
// - SchemaMismatch 等结构错误中止整次导入
// - 重新定价在后台执行，导入请求立即返回任务句柄
// ==========================================

use crate::config::IngestConfigReader;
use crate::domain::batch::{ReconciliationResult, RecordIssue};
use crate::domain::records::NormalizedRecord;
use crate::engine::reconciler::{CatalogReconciler, ReconcileOptions};
use crate::engine::repricing::{RepricingHandle, RepricingQueue, RepricingRequest, VendorLocks};
use crate::importer::adder_expander::{read_adder_rows, AdderExpander};
use crate::importer::cell_grid::{CellGrid, Workbook};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::extractor_trait::{ExtractContext, Extraction};
use crate::importer::file_parser::WorkbookParser;
use crate::importer::reference_sheet::ReferenceSheetKind;
use crate::importer::registry::ExtractorRegistry;
use chrono::NaiveDate;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// 加价项表首行为表头
const ADDER_HEADER_ROWS: usize = 1;
/// 参考表首行为表头
const REFERENCE_HEADER_ROWS: usize = 1;

/// 工作簿暂存结果（尚未写库）
#[derive(Debug, Clone, Default)]
pub struct StagedWorkbook {
    pub records: Vec<NormalizedRecord>,
    pub issues: Vec<RecordIssue>,
    /// 已识别的系列
    pub series: Vec<String>,
    /// 透传的未映射加价项
    pub unmapped_adders: Vec<String>,
    /// 未配置系列的工作表
    pub skipped_sheets: Vec<String>,
}

/// 一次导入的结果
#[derive(Debug)]
pub struct IngestOutcome {
    pub vendor_id: String,
    pub result: ReconciliationResult,
    pub issues: Vec<RecordIssue>,
    pub unmapped_adders: Vec<String>,
    /// 后台重新定价任务
    pub repricing: Option<RepricingHandle>,
}

// ==========================================
// IngestService
// ==========================================
pub struct IngestService<C>
where
    C: IngestConfigReader,
{
    config: Arc<C>,
    parser: WorkbookParser,
    registry: ExtractorRegistry,
    reconciler: CatalogReconciler,
    repricing: RepricingQueue,
    locks: Arc<VendorLocks>,
}

impl<C> IngestService<C>
where
    C: IngestConfigReader,
{
    pub fn new(conn: Arc<Mutex<Connection>>, config: Arc<C>, locks: Arc<VendorLocks>) -> Self {
        Self {
            config,
            parser: WorkbookParser,
            registry: ExtractorRegistry::with_defaults(),
            reconciler: CatalogReconciler::new(conn.clone()),
            repricing: RepricingQueue::new(conn, locks.clone()),
            locks,
        }
    }

    /// 替换抽取规则表
    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn repricing(&self) -> &RepricingQueue {
        &self.repricing
    }

    async fn options(&self, vendor_id: &str, file_name: Option<String>, retire_absent: bool) -> ImportResult<ReconcileOptions> {
        Ok(ReconcileOptions {
            file_name,
            default_pricing_class: self.config.get_default_pricing_class(vendor_id).await?,
            zero_discount_class: self.config.get_zero_discount_class(vendor_id).await?,
            retire_absent,
        })
    }

    // ===== 价目表 =====

    /// 导入供应商价目工作簿
    #[instrument(skip_all, fields(vendor_id = %vendor_id, effective_date = %effective_date))]
    pub async fn ingest_price_book<P: AsRef<Path>>(
        &self,
        vendor_id: &str,
        path: P,
        effective_date: NaiveDate,
        today: NaiveDate,
    ) -> ImportResult<IngestOutcome> {
        let path = path.as_ref();
        info!(file = %path.display(), "开始导入价目工作簿");

        let workbook = self.parser.parse(path)?;
        let staged = self.stage_workbook(vendor_id, &workbook).await?;
        if staged.series.is_empty() {
            return Err(ImportError::SheetNotFound(format!(
                "供应商 {} 没有已配置系列的工作表 (sheets: {:?})",
                vendor_id, staged.skipped_sheets
            )));
        }

        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        self.ingest_records(vendor_id, staged, effective_date, today, file_name).await
    }

    /// 批量导入多个价目工作簿
    ///
    /// 解析并发进行；对账仍按供应商写锁逐个提交，单个文件失败不影响其余文件
    pub async fn batch_ingest_price_books<P: AsRef<Path>>(
        &self,
        vendor_id: &str,
        paths: &[P],
        effective_date: NaiveDate,
        today: NaiveDate,
    ) -> Vec<ImportResult<IngestOutcome>> {
        use futures::future::join_all;

        info!(vendor_id = %vendor_id, count = paths.len(), "开始批量导入价目工作簿");
        let tasks = paths
            .iter()
            .map(|path| self.ingest_price_book(vendor_id, path, effective_date, today));
        let results = join_all(tasks).await;

        for (path, result) in paths.iter().zip(&results) {
            if let Err(e) = result {
                warn!(file = %path.as_ref().display(), error = %e, "文件导入失败");
            }
        }
        info!(
            total = results.len(),
            success = results.iter().filter(|r| r.is_ok()).count(),
            failed = results.iter().filter(|r| r.is_err()).count(),
            "批量导入完成"
        );
        results
    }

    /// 工作簿 → 暂存记录（不写库）
    pub async fn stage_workbook(&self, vendor_id: &str, workbook: &Workbook) -> ImportResult<StagedWorkbook> {
        let mut staged = StagedWorkbook::default();

        for (sheet, grid) in workbook.sheets() {
            if let Some(series) = self.config.get_sheet_series(vendor_id, sheet).await? {
                let extraction = self.extract_series(vendor_id, &series, grid).await?;
                debug!(sheet = %sheet, series = %series, records = extraction.records.len(), issues = extraction.issues.len(), "工作表抽取完成");
                staged.records.extend(extraction.records);
                staged.issues.extend(extraction.issues);
                staged.series.push(series);
            } else if let Some(series) = self.config.get_adder_sheet_series(vendor_id, sheet).await? {
                self.stage_adders(vendor_id, &series, grid, &mut staged).await?;
                staged.series.push(series);
            } else {
                debug!(sheet = %sheet, "工作表未配置系列，跳过");
                staged.skipped_sheets.push(sheet.to_string());
            }
        }
        Ok(staged)
    }

    /// 配置声明的策略优先，其次内置注册表
    async fn extract_series(&self, vendor_id: &str, series: &str, grid: &CellGrid) -> ImportResult<Extraction> {
        match self.config.get_extractor_spec(vendor_id, series).await? {
            Some(spec) => {
                let list_class = self.config.get_default_pricing_class(vendor_id).await?;
                let zero_class = self.config.get_zero_discount_class(vendor_id).await?;
                let extractor = spec.build(&list_class, &zero_class);
                debug!(series = %series, strategy = extractor.name(), "使用配置声明的抽取策略");
                ExtractorRegistry::run(extractor.as_ref(), grid, vendor_id, series)
            }
            None => self.registry.extract(grid, vendor_id, series),
        }
    }

    async fn stage_adders(
        &self,
        vendor_id: &str,
        series: &str,
        grid: &CellGrid,
        staged: &mut StagedWorkbook,
    ) -> ImportResult<()> {
        let mapping = self.config.get_adder_mapping(vendor_id, series).await?;
        let composites = self.config.get_adder_composites(vendor_id, series).await?;
        let (rows, issues) = read_adder_rows(grid, ADDER_HEADER_ROWS);

        let expansion = AdderExpander::expand(&mapping, &rows, &composites, &ExtractContext::new(vendor_id, series));
        debug!(series = %series, rows = rows.len(), records = expansion.records.len(), unmapped = expansion.unmapped.len(), "加价项展开完成");

        staged.records.extend(expansion.records);
        staged.issues.extend(issues);
        staged.unmapped_adders.extend(expansion.unmapped);
        Ok(())
    }

    /// 对账已暂存的记录
    pub async fn ingest_records(
        &self,
        vendor_id: &str,
        staged: StagedWorkbook,
        effective_date: NaiveDate,
        today: NaiveDate,
        file_name: Option<String>,
    ) -> ImportResult<IngestOutcome> {
        let retire_absent = staged.issues.is_empty();
        if !retire_absent {
            warn!(vendor_id = %vendor_id, issues = staged.issues.len(), "存在读取问题，本批不退役缺席记录");
        }
        let opts = self.options(vendor_id, file_name, retire_absent).await?;

        let _vendor_guard = self.locks.acquire(vendor_id).await;
        let result = self
            .reconciler
            .reconcile(vendor_id, &staged.records, effective_date, today, &opts)?;
        let repricing = self.maybe_reprice(vendor_id, effective_date, today, &opts, "price_book").await?;

        Ok(IngestOutcome {
            vendor_id: vendor_id.to_string(),
            result,
            issues: staged.issues,
            unmapped_adders: staged.unmapped_adders,
            repricing,
        })
    }

    // ===== 参考表 =====

    /// 导入客户/折扣参考表
    #[instrument(skip_all, fields(vendor_id = %vendor_id, kind = %kind, effective_date = %effective_date))]
    pub async fn ingest_reference<P: AsRef<Path>>(
        &self,
        vendor_id: &str,
        kind: ReferenceSheetKind,
        path: P,
        effective_date: NaiveDate,
        today: NaiveDate,
    ) -> ImportResult<IngestOutcome> {
        let path = path.as_ref();
        let workbook = self.parser.parse(path)?;
        let grid = workbook
            .sheet(kind.as_str())
            .or_else(|| workbook.sheets().next().map(|(_, g)| g))
            .ok_or_else(|| ImportError::SheetNotFound(kind.as_str().to_string()))?;

        let (records, issues) = kind.parse(grid, REFERENCE_HEADER_ROWS);
        info!(records = records.len(), issues = issues.len(), "参考表解析完成");

        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        let opts = self.options(vendor_id, file_name, issues.is_empty()).await?;

        let _vendor_guard = self.locks.acquire(vendor_id).await;
        let result = self.reconciler.reconcile_reference(
            vendor_id,
            kind.batch_kind(),
            &records,
            effective_date,
            today,
            &opts,
        )?;
        let repricing = self.maybe_reprice(vendor_id, effective_date, today, &opts, kind.as_str()).await?;

        Ok(IngestOutcome {
            vendor_id: vendor_id.to_string(),
            result,
            issues,
            unmapped_adders: Vec::new(),
            repricing,
        })
    }

    // ===== 百分比调价 =====

    /// 对价格等级统一调价（不经文件）
    #[instrument(skip_all, fields(vendor_id = %vendor_id, pricing_class = %pricing_class, percent = percent))]
    pub async fn apply_percentage_increase(
        &self,
        vendor_id: &str,
        pricing_class: &str,
        percent: f64,
        effective_date: NaiveDate,
        today: NaiveDate,
    ) -> ImportResult<IngestOutcome> {
        let opts = self.options(vendor_id, None, false).await?;

        let _vendor_guard = self.locks.acquire(vendor_id).await;
        let result = self.reconciler.apply_percentage_increase(
            vendor_id,
            pricing_class,
            percent,
            effective_date,
            today,
            &opts,
        )?;
        let repricing = self
            .maybe_reprice(vendor_id, effective_date, today, &opts, "percentage_increase")
            .await?;

        Ok(IngestOutcome {
            vendor_id: vendor_id.to_string(),
            result,
            issues: Vec::new(),
            unmapped_adders: Vec::new(),
            repricing,
        })
    }

    /// 提交后台重新定价；任务在当前持锁者释放供应商写锁后才开始
    async fn maybe_reprice(
        &self,
        vendor_id: &str,
        effective_date: NaiveDate,
        today: NaiveDate,
        opts: &ReconcileOptions,
        trigger_source: &str,
    ) -> ImportResult<Option<RepricingHandle>> {
        if !self.config.is_repricing_enabled(vendor_id).await? {
            return Ok(None);
        }
        let handle = self.repricing.submit(RepricingRequest {
            vendor_id: vendor_id.to_string(),
            effective_date,
            today,
            zero_discount_class: opts.zero_discount_class.clone(),
            trigger_source: Some(trigger_source.to_string()),
        })?;
        Ok(Some(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{config_keys, ConfigManager, ConfigScope};

    fn service() -> (IngestService<ConfigManager>, Arc<ConfigManager>) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let config = Arc::new(ConfigManager::from_connection(conn.clone()).unwrap());
        let vendor = ConfigScope::Vendor {
            vendor_id: "ADP".to_string(),
        };
        config
            .set_value(&vendor, &config_keys::sheet_series("AMH Coils"), "AMH")
            .unwrap();
        config
            .set_value(&vendor, &config_keys::adder_sheet("AMH Adders"), "AMH")
            .unwrap();
        config
            .set_value(
                &vendor,
                &config_keys::adder_mapping("AMH"),
                r#"{"Copper Coil": ["CU"], "Hard Start Kit": "HSK"}"#,
            )
            .unwrap();
        let service = IngestService::new(conn, config.clone(), Arc::new(VendorLocks::new()));
        (service, config)
    }

    fn workbook() -> Workbook {
        let mut wb = Workbook::new();
        wb.add_sheet(
            "AMH Coils",
            CellGrid::from_strings(&[
                ["AMH Price Book", "", ""],
                ["Tonnage", "Option", "Price"],
                ["36", "A", "100.00"],
                ["36", "B", "120.00"],
            ]),
        );
        wb.add_sheet(
            "AMH Adders",
            CellGrid::from_strings(&[
                ["Adder", "Price"],
                ["Copper Coil", "15.00"],
                ["Hard Start Kit", "42.50"],
                ["Mystery Option", "5.00"],
            ]),
        );
        wb.add_sheet("Notes", CellGrid::from_strings(&[["free text"]]));
        wb
    }

    #[tokio::test]
    async fn test_stage_workbook_routes_sheets_by_config() {
        let (service, _) = service();
        let staged = service.stage_workbook("ADP", &workbook()).await.unwrap();

        let keys: Vec<(String, i64)> = staged.records.iter().map(|r| (r.key.clone(), r.price)).collect();
        assert!(keys.contains(&("36_A".to_string(), 10000)));
        assert!(keys.contains(&("36_B".to_string(), 12000)));
        assert!(keys.contains(&("CU".to_string(), 1500)));
        assert!(keys.contains(&("HSK".to_string(), 4250)));
        assert_eq!(staged.unmapped_adders, vec!["mysteryoption".to_string()]);
        assert_eq!(staged.skipped_sheets, vec!["Notes".to_string()]);
    }

    #[tokio::test]
    async fn test_ingest_records_commits_and_skips_repricing_when_disabled() {
        let (service, config) = service();
        config
            .set_value(&ConfigScope::Global, config_keys::REPRICING_ENABLED, "false")
            .unwrap();
        let staged = service.stage_workbook("ADP", &workbook()).await.unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        let outcome = service.ingest_records("ADP", staged, day, day, None).await.unwrap();
        assert_eq!(outcome.result.inserted, 5);
        assert!(outcome.repricing.is_none());
    }
}
