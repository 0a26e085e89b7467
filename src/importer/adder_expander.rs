// ==========================================
// 价格目录系统 - 加价项展开
// ==========================================
// 流程:
// 1. 描述标准化（小写 + 去空白），与映射表键同一规则
// 2. 左连接映射表；一条描述可对应多个规范 key（一对多展开）
// 3. 未映射描述按标准化文本透传为 key，并记录警告
// 4. 组合加价：所有来源项同时出现时求和生成合成行，按规则排除来源行
// 5. 换算为分，打 vendor / series 标签，(key, price) 去重
// ==========================================

use crate::domain::batch::RecordIssue;
use crate::domain::records::{AdderRow, NormalizedRecord};
use crate::importer::cell_grid::CellGrid;
use crate::importer::data_cleaner::{normalize_description, to_cents};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::extractor_trait::ExtractContext;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

// ==========================================
// AdderMapping - 描述 → 规范 key（一对多）
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct AdderMapping {
    entries: HashMap<String, Vec<String>>,
}

impl AdderMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, description: &str, key: &str) {
        let keys = self.entries.entry(normalize_description(description)).or_default();
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }

    pub fn lookup(&self, description: &str) -> Option<&[String]> {
        self.entries
            .get(&normalize_description(description))
            .map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 从 JSON 对象构造: {"描述": "key"} 或 {"描述": ["key1", "key2"]}
    pub fn from_json(value: &serde_json::Value) -> ImportResult<Self> {
        let object = value.as_object().ok_or_else(|| ImportError::ConfigReadError {
            key: "adder_mapping".to_string(),
            message: "映射表必须是 JSON 对象".to_string(),
        })?;

        let mut mapping = Self::new();
        for (description, target) in object {
            match target {
                serde_json::Value::String(key) => mapping.insert(description, key),
                serde_json::Value::Array(keys) => {
                    for key in keys {
                        let key = key.as_str().ok_or_else(|| ImportError::ConfigReadError {
                            key: "adder_mapping".to_string(),
                            message: format!("{} 的映射值必须是字符串", description),
                        })?;
                        mapping.insert(description, key);
                    }
                }
                _ => {
                    return Err(ImportError::ConfigReadError {
                        key: "adder_mapping".to_string(),
                        message: format!("{} 的映射值类型不支持", description),
                    })
                }
            }
        }
        Ok(mapping)
    }
}

// ==========================================
// CompositeRule - 组合加价规则
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRule {
    /// 合成行的规范 key
    pub key: String,
    /// 来源描述（全部出现才生效）
    pub sources: Vec<String>,
    /// 是否从输出中排除来源行
    #[serde(default = "default_consume")]
    pub consume_sources: bool,
}

fn default_consume() -> bool {
    true
}

/// 展开结果
#[derive(Debug, Clone, Default)]
pub struct AdderExpansion {
    pub records: Vec<NormalizedRecord>,
    /// 透传的未映射描述（标准化后）
    pub unmapped: Vec<String>,
}

/// 读取加价项行：首列描述，最后一个数值列为价格
///
/// 无价格的行（表头、分组标题）跳过；有价格但无描述、或价格非正（如 "(25.00)"）的行记为问题
pub fn read_adder_rows(grid: &CellGrid, first_row: usize) -> (Vec<AdderRow>, Vec<RecordIssue>) {
    let mut rows = Vec::new();
    let mut issues = Vec::new();

    for (idx, cells) in grid.rows().enumerate().skip(first_row) {
        let price = cells.iter().rev().find_map(|c| c.as_number());
        let Some(price) = price else { continue };

        let description = cells.first().map(|c| c.as_text()).unwrap_or_default();
        if description.is_empty() || description.parse::<f64>().is_ok() {
            issues.push(RecordIssue::new(format!("adder 行 {}", idx + 1), "缺少加价项描述"));
            continue;
        }
        if price <= 0.0 {
            issues.push(RecordIssue::new(
                format!("adder 行 {} ({})", idx + 1, description),
                format!("加价项价格必须为正: {}", price),
            ));
            continue;
        }
        rows.push(AdderRow {
            row_number: idx + 1,
            description,
            price,
        });
    }
    (rows, issues)
}

pub struct AdderExpander;

impl AdderExpander {
    pub fn expand(
        mapping: &AdderMapping,
        rows: &[AdderRow],
        composites: &[CompositeRule],
        ctx: &ExtractContext<'_>,
    ) -> AdderExpansion {
        let normalized: Vec<String> = rows.iter().map(|r| normalize_description(&r.description)).collect();

        // 组合加价
        let mut consumed: HashSet<usize> = HashSet::new();
        let mut synthetic: Vec<(String, f64)> = Vec::new();
        for rule in composites {
            let positions: Option<Vec<usize>> = rule
                .sources
                .iter()
                .map(|s| {
                    let wanted = normalize_description(s);
                    normalized.iter().position(|n| *n == wanted)
                })
                .collect();
            let Some(positions) = positions else { continue };
            if positions.is_empty() {
                continue;
            }

            let total: f64 = positions.iter().map(|&i| rows[i].price).sum();
            synthetic.push((rule.key.clone(), total));
            if rule.consume_sources {
                consumed.extend(positions);
            }
        }

        // 映射展开
        let mut expanded: Vec<(String, f64)> = Vec::new();
        let mut unmapped = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            if consumed.contains(&i) {
                continue;
            }
            match mapping.lookup(&row.description) {
                Some(keys) => {
                    for key in keys {
                        expanded.push((key.clone(), row.price));
                    }
                }
                None => {
                    warn!(
                        vendor_id = %ctx.vendor_id,
                        series = %ctx.series,
                        description = %row.description,
                        "{}",
                        ImportError::UnmappedAdder {
                            series: ctx.series.to_string(),
                            description: normalized[i].clone(),
                        }
                    );
                    unmapped.push(normalized[i].clone());
                    expanded.push((normalized[i].clone(), row.price));
                }
            }
        }
        expanded.extend(synthetic);

        // 换算 + 去重
        let mut seen: HashSet<(String, i64)> = HashSet::new();
        let mut records = Vec::new();
        for (key, price) in expanded {
            let cents = to_cents(price);
            if cents <= 0 {
                warn!(vendor_id = %ctx.vendor_id, series = %ctx.series, key = %key, cents, "非正加价项已丢弃");
                continue;
            }
            if seen.insert((key.clone(), cents)) {
                records.push(
                    NormalizedRecord::new(ctx.vendor_id, Some(ctx.series), key, cents)
                        .with_category(ctx.series, 1),
                );
            }
        }

        AdderExpansion { records, unmapped }
    }
}
