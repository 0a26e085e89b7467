// ==========================================
// 价格目录系统 - 命令行入口
// ==========================================
// 数据库位置: --db > PRICE_CATALOG_DB > 用户数据目录
// 日期格式: YYYY-MM-DD；省略时取本地今日
// ==========================================

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use price_catalog::app::{default_db_path, AppState};
use price_catalog::config::ConfigScope;
use price_catalog::domain::{PriceMode, PriceQuery};
use price_catalog::importer::{IngestOutcome, ReferenceSheetKind};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "price-catalog")]
#[command(about = "供应商价目表导入、对账与时效价格解析")]
struct Cli {
    /// SQLite 数据库文件
    #[arg(long, global = true, env = "PRICE_CATALOG_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 建库建表
    Init,

    /// 导入价目表工作簿
    Ingest {
        vendor: String,
        file: PathBuf,
        #[arg(long)]
        effective_date: Option<NaiveDate>,
    },

    /// 导入参考表（customers / class_discounts / product_discounts / special_net_prices / customer_overrides）
    Reference {
        vendor: String,
        kind: ReferenceSheetKind,
        file: PathBuf,
        #[arg(long)]
        effective_date: Option<NaiveDate>,
    },

    /// 按价格等级整体调价
    Percent {
        vendor: String,
        pricing_class: String,
        #[arg(allow_hyphen_values = true)]
        percent: f64,
        #[arg(long)]
        effective_date: Option<NaiveDate>,
    },

    /// 将到期的未来价提升为当前价
    Implement {
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// 推迟某日生效的未来价
    Delay { vendor: String, from: NaiveDate, to: NaiveDate },

    /// 回滚某日生效的当前价
    Rollback { vendor: String, from: NaiveDate, to: NaiveDate },

    /// 导出解析后的价格
    Export {
        vendor: String,
        #[arg(long)]
        customer: Option<String>,
        /// BASE / CUSTOMER / BOTH；有客户时默认 BOTH
        #[arg(long)]
        mode: Option<PriceMode>,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// 输出 JSON 而非 CSV
        #[arg(long)]
        json: bool,
    },

    /// 列出供应商的价格等级
    Classes { vendor: String },

    /// 查看单个产品的分类与属性
    Product { vendor: String, identifier: String },

    /// 读写配置项
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// 读取配置（供应商作用域优先，其次全局）
    Get {
        key: String,
        #[arg(long)]
        vendor: Option<String>,
    },
    /// 写入配置；不指定 --vendor 时写入全局作用域
    Set {
        key: String,
        value: String,
        #[arg(long)]
        vendor: Option<String>,
    },
    /// 删除配置
    Unset {
        key: String,
        #[arg(long)]
        vendor: Option<String>,
    },
}

fn scope_of(vendor: Option<&str>) -> ConfigScope {
    vendor.map_or(ConfigScope::Global, ConfigScope::vendor)
}

fn print_outcome(outcome: &IngestOutcome) {
    let r = &outcome.result;
    println!(
        "batch_id={} inserted={} updated={} scheduled={} unchanged={} deleted={} propagated={}",
        r.batch_id, r.inserted, r.updated, r.scheduled, r.unchanged, r.deleted, r.propagated
    );
    for issue in &outcome.issues {
        println!("issue: {}", issue);
    }
    for adder in &outcome.unmapped_adders {
        println!("unmapped_adder: {}", adder);
    }
}

async fn finish(state: &AppState, outcome: IngestOutcome) -> Result<()> {
    print_outcome(&outcome);
    if let Some(handle) = outcome.repricing {
        let task_id = handle.task_id.clone();
        handle.wait().await.context("重新定价任务失败")?;
        if let Some(task) = state.ingest.repricing().tasks().find_by_id(&task_id)? {
            println!(
                "repricing task_id={} status={} rows={}",
                task.task_id,
                task.status.as_str(),
                task.repriced_rows
            );
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path().context("无法确定默认数据库位置")?,
    };
    let state = AppState::new(db_path).map_err(anyhow::Error::msg)?;
    let today = chrono::Local::now().date_naive();

    match cli.command {
        Commands::Init => {
            println!("数据库已就绪: {}", state.db_path.display());
        }
        Commands::Ingest { vendor, file, effective_date } => {
            let outcome = state
                .ingest
                .ingest_price_book(&vendor, &file, effective_date.unwrap_or(today), today)
                .await
                .with_context(|| format!("导入失败: {}", file.display()))?;
            finish(&state, outcome).await?;
        }
        Commands::Reference { vendor, kind, file, effective_date } => {
            let outcome = state
                .ingest
                .ingest_reference(&vendor, kind, &file, effective_date.unwrap_or(today), today)
                .await
                .with_context(|| format!("参考表导入失败: {}", file.display()))?;
            finish(&state, outcome).await?;
        }
        Commands::Percent { vendor, pricing_class, percent, effective_date } => {
            let outcome = state
                .ingest
                .apply_percentage_increase(&vendor, &pricing_class, percent, effective_date.unwrap_or(today), today)
                .await?;
            finish(&state, outcome).await?;
        }
        Commands::Implement { today: as_of } => {
            let report = state.temporal.implement(as_of.unwrap_or(today), None)?;
            println!("promoted={}", report.promoted);
            for (family, n) in report.per_family {
                println!("  {}={}", family, n);
            }
        }
        Commands::Delay { vendor, from, to } => {
            let _guard = state.locks.acquire(&vendor).await;
            let report = state.temporal.delay(&vendor, from, to, today)?;
            println!("delayed={}", report.delayed);
        }
        Commands::Rollback { vendor, from, to } => {
            let _guard = state.locks.acquire(&vendor).await;
            let report = state.temporal.rollback(&vendor, from, to, today)?;
            println!("rolled_back={} skipped={}", report.rolled_back, report.skipped.len());
        }
        Commands::Export { vendor, customer, mode, as_of, json } => {
            let customer = customer.filter(|s| !s.trim().is_empty());
            let mode = mode.unwrap_or(if customer.is_some() { PriceMode::Both } else { PriceMode::Base });

            let mut query = PriceQuery::new(&vendor, mode);
            if let Some(name) = &customer {
                let found = state
                    .catalog
                    .find_customer(&vendor, name)?
                    .with_context(|| format!("客户不存在: {}", name))?;
                query.customer_id = Some(found.customer_id);
            }
            query.as_of = as_of;

            let rows = state.resolver.resolve(&query, today)?;
            if json {
                println!("{}", price_catalog::export::to_json(&rows)?);
            } else {
                price_catalog::export::write_csv(&rows, std::io::stdout().lock())?;
            }
        }
        Commands::Classes { vendor } => {
            for class in state.catalog.list_pricing_classes(&vendor)? {
                let marker = if class.deleted { " (deleted)" } else { "" };
                println!("{}{}", class.name, marker);
            }
        }
        Commands::Product { vendor, identifier } => {
            let product = state
                .catalog
                .find_product(&vendor, &identifier)?
                .with_context(|| format!("产品不存在: {}/{}", vendor, identifier))?;
            println!(
                "{} series={} deleted={}",
                product.product_identifier,
                product.series.as_deref().unwrap_or("-"),
                product.deleted
            );
            for category in state.catalog.product_categories(product.product_id)? {
                println!("  category rank={} {}", category.rank, category.name);
            }
            for attr in state.catalog.product_attributes(product.product_id)? {
                println!("  attr {}:{}={}", attr.attr, attr.attr_type, attr.value);
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Get { key, vendor } => match state.config.get_value(vendor.as_deref(), &key)? {
                Some(value) => println!("{}", value),
                None => anyhow::bail!("配置项不存在: {}", key),
            },
            ConfigAction::Set { key, value, vendor } => {
                state.config.set_value(&scope_of(vendor.as_deref()), &key, &value)?;
            }
            ConfigAction::Unset { key, vendor } => {
                let removed = state.config.remove_value(&scope_of(vendor.as_deref()), &key)?;
                println!("removed={}", removed);
            }
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    price_catalog::logging::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "命令执行失败");
        return Err(e);
    }
    Ok(())
}
