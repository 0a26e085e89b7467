// ==========================================
// 价格目录系统 - 时效价格族通用数据访问
// ==========================================
// 职责: current / future / history 三表的读写原语
// 红线: 只做数据 CRUD，推进/回滚规则在 engine::temporal
// 约束: 所有函数接收 &Connection，可在调用方事务内执行
// ==========================================

use crate::domain::pricing::{FutureEntry, HistoryEntry, TemporalRow, TemporalValue};
use crate::domain::types::{Discount, PriceFamily};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, ToSql};

impl ToSql for TemporalValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            TemporalValue::Price(p) => ToSqlOutput::from(*p),
            TemporalValue::Discount(d) => ToSqlOutput::from(*d),
        })
    }
}

/// 按族解析数值列
fn value_from_ref(family: PriceFamily, value: ValueRef<'_>) -> rusqlite::Result<TemporalValue> {
    if family.is_discount() {
        let v = match value {
            ValueRef::Real(f) => f,
            ValueRef::Integer(i) => i as f64,
            other => {
                return Err(rusqlite::Error::InvalidColumnType(
                    0,
                    "discount".to_string(),
                    other.data_type(),
                ))
            }
        };
        Ok(TemporalValue::Discount(v))
    } else {
        let v = match value {
            ValueRef::Integer(i) => i,
            ValueRef::Real(f) => f.round() as i64,
            other => {
                return Err(rusqlite::Error::InvalidColumnType(
                    0,
                    "price".to_string(),
                    other.data_type(),
                ))
            }
        };
        Ok(TemporalValue::Price(v))
    }
}

// ==========================================
// FamilyTable - 族到表结构的映射
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct FamilyTable {
    pub family: PriceFamily,
    pub table: &'static str,
    pub value_column: &'static str,
    /// 以别名 t 连接到带 vendor_id 的表（别名 v）
    pub vendor_join: &'static str,
}

impl FamilyTable {
    pub fn of(family: PriceFamily) -> Self {
        match family {
            PriceFamily::ClassPrice => Self {
                family,
                table: "class_price",
                value_column: "price",
                vendor_join: "JOIN pricing_class v ON v.pricing_class_id = t.pricing_class_id",
            },
            PriceFamily::CustomerPrice => Self {
                family,
                table: "customer_price",
                value_column: "price",
                vendor_join: "JOIN customer v ON v.customer_id = t.customer_id",
            },
            PriceFamily::ProductClassDiscount => Self {
                family,
                table: "product_class_discount",
                value_column: "discount",
                vendor_join: "JOIN customer v ON v.customer_id = t.customer_id",
            },
            PriceFamily::ProductDiscount => Self {
                family,
                table: "product_discount",
                value_column: "discount",
                vendor_join: "JOIN customer v ON v.customer_id = t.customer_id",
            },
        }
    }
}

/// 到期待推进的 future 条目
#[derive(Debug, Clone, PartialEq)]
pub struct DueFuture {
    pub row_id: i64,
    pub current_value: TemporalValue,
    pub current_effective_date: NaiveDate,
    pub future: FutureEntry,
}

// ==========================================
// TemporalRepository - 三表读写原语
// ==========================================
pub struct TemporalRepository;

impl TemporalRepository {
    /// 写入前校验值域（折扣 0<d<1，金额非负）
    pub fn validate_value(family: PriceFamily, value: &TemporalValue) -> RepositoryResult<()> {
        match (family.is_discount(), value) {
            (true, TemporalValue::Discount(d)) => {
                Discount::new(*d)?;
                Ok(())
            }
            (false, TemporalValue::Price(p)) => {
                if *p < 0 {
                    Err(RepositoryError::NegativePrice(*p))
                } else {
                    Ok(())
                }
            }
            _ => Err(RepositoryError::FieldValueError {
                field: family.as_str().to_string(),
                message: format!("值类型与价格族不匹配: {:?}", value),
            }),
        }
    }

    /// 读取一条 current 记录（含 future）
    pub fn load_row(
        conn: &Connection,
        family: PriceFamily,
        row_id: i64,
    ) -> RepositoryResult<Option<TemporalRow>> {
        let ft = FamilyTable::of(family);
        let sql = format!(
            "SELECT t.{col}, t.effective_date, f.value, f.effective_date
             FROM {table} t
             LEFT JOIN {table}_future f ON f.row_id = t.row_id
             WHERE t.row_id = ?1",
            col = ft.value_column,
            table = ft.table,
        );

        let row = conn
            .query_row(&sql, params![row_id], |row| {
                let value = value_from_ref(family, row.get_ref(0)?)?;
                let effective_date: NaiveDate = row.get(1)?;
                let future = match row.get_ref(2)? {
                    ValueRef::Null => None,
                    v => Some(FutureEntry {
                        value: value_from_ref(family, v)?,
                        effective_date: row.get(3)?,
                    }),
                };
                Ok(TemporalRow {
                    family,
                    row_id,
                    value,
                    effective_date,
                    future,
                })
            })
            .optional()?;

        Ok(row)
    }

    /// 覆写 current 的值与生效日期
    pub fn set_current(
        conn: &Connection,
        family: PriceFamily,
        row_id: i64,
        value: TemporalValue,
        effective_date: NaiveDate,
    ) -> RepositoryResult<()> {
        Self::validate_value(family, &value)?;
        let ft = FamilyTable::of(family);
        let sql = format!(
            "UPDATE {table} SET {col} = ?1, effective_date = ?2, updated_at = datetime('now')
             WHERE row_id = ?3",
            table = ft.table,
            col = ft.value_column,
        );
        let affected = conn.execute(&sql, params![value, effective_date, row_id])?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: ft.table.to_string(),
                id: row_id.to_string(),
            });
        }
        Ok(())
    }

    /// 追加历史条目（只追加）
    pub fn append_history(
        conn: &Connection,
        family: PriceFamily,
        row_id: i64,
        value: TemporalValue,
        effective_date: NaiveDate,
        recorded_at: DateTime<Utc>,
    ) -> RepositoryResult<i64> {
        let ft = FamilyTable::of(family);
        let sql = format!(
            "INSERT INTO {table}_history (row_id, value, effective_date, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            table = ft.table,
        );
        conn.execute(&sql, params![row_id, value, effective_date, recorded_at])?;
        Ok(conn.last_insert_rowid())
    }

    /// 写入/覆盖唯一的 future 槽位
    pub fn upsert_future(
        conn: &Connection,
        family: PriceFamily,
        row_id: i64,
        value: TemporalValue,
        effective_date: NaiveDate,
    ) -> RepositoryResult<()> {
        Self::validate_value(family, &value)?;
        let ft = FamilyTable::of(family);
        let sql = format!(
            "INSERT INTO {table}_future (row_id, value, effective_date) VALUES (?1, ?2, ?3)
             ON CONFLICT(row_id) DO UPDATE SET value = excluded.value,
                                               effective_date = excluded.effective_date",
            table = ft.table,
        );
        conn.execute(&sql, params![row_id, value, effective_date])?;
        Ok(())
    }

    /// 清空 future 槽位
    pub fn clear_future(conn: &Connection, family: PriceFamily, row_id: i64) -> RepositoryResult<usize> {
        let ft = FamilyTable::of(family);
        let sql = format!("DELETE FROM {table}_future WHERE row_id = ?1", table = ft.table);
        Ok(conn.execute(&sql, params![row_id])?)
    }

    /// 查询到期（effective_date <= today）的 future 条目
    pub fn due_futures(
        conn: &Connection,
        family: PriceFamily,
        today: NaiveDate,
        vendor_id: Option<&str>,
    ) -> RepositoryResult<Vec<DueFuture>> {
        let ft = FamilyTable::of(family);
        let sql = format!(
            "SELECT t.row_id, t.{col}, t.effective_date, f.value, f.effective_date
             FROM {table}_future f
             JOIN {table} t ON t.row_id = f.row_id
             {join}
             WHERE f.effective_date <= ?1
               AND t.deleted = 0
               AND (?2 IS NULL OR v.vendor_id = ?2)
             ORDER BY t.row_id",
            col = ft.value_column,
            table = ft.table,
            join = ft.vendor_join,
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![today, vendor_id], |row| {
                Ok(DueFuture {
                    row_id: row.get(0)?,
                    current_value: value_from_ref(family, row.get_ref(1)?)?,
                    current_effective_date: row.get(2)?,
                    future: FutureEntry {
                        value: value_from_ref(family, row.get_ref(3)?)?,
                        effective_date: row.get(4)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 统计仍然到期未推进的 future 数量（用于校验推进不变量）
    pub fn count_due_futures(
        conn: &Connection,
        family: PriceFamily,
        today: NaiveDate,
    ) -> RepositoryResult<i64> {
        let ft = FamilyTable::of(family);
        let sql = format!(
            "SELECT COUNT(*) FROM {table}_future f JOIN {table} t ON t.row_id = f.row_id
             WHERE f.effective_date <= ?1 AND t.deleted = 0",
            table = ft.table,
        );
        Ok(conn.query_row(&sql, params![today], |row| row.get(0))?)
    }

    /// 查询供应商范围内 current 生效日期等于指定日期的记录
    pub fn rows_with_current_date(
        conn: &Connection,
        family: PriceFamily,
        vendor_id: &str,
        effective_date: NaiveDate,
    ) -> RepositoryResult<Vec<i64>> {
        let ft = FamilyTable::of(family);
        let sql = format!(
            "SELECT t.row_id FROM {table} t {join}
             WHERE v.vendor_id = ?1 AND t.effective_date = ?2 AND t.deleted = 0
             ORDER BY t.row_id",
            table = ft.table,
            join = ft.vendor_join,
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![vendor_id, effective_date], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// 某条记录的全部历史（按生效日期升序）
    pub fn history(
        conn: &Connection,
        family: PriceFamily,
        row_id: i64,
    ) -> RepositoryResult<Vec<HistoryEntry>> {
        let ft = FamilyTable::of(family);
        let sql = format!(
            "SELECT history_id, value, effective_date, recorded_at FROM {table}_history
             WHERE row_id = ?1 ORDER BY effective_date, history_id",
            table = ft.table,
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![row_id], |row| {
                Ok(HistoryEntry {
                    history_id: row.get(0)?,
                    value: value_from_ref(family, row.get_ref(1)?)?,
                    effective_date: row.get(2)?,
                    recorded_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// 生效日期严格早于 before 的最近一条历史
    pub fn closest_history_before(
        conn: &Connection,
        family: PriceFamily,
        row_id: i64,
        before: NaiveDate,
    ) -> RepositoryResult<Option<HistoryEntry>> {
        let ft = FamilyTable::of(family);
        let sql = format!(
            "SELECT history_id, value, effective_date, recorded_at FROM {table}_history
             WHERE row_id = ?1 AND effective_date < ?2
             ORDER BY effective_date DESC, history_id DESC
             LIMIT 1",
            table = ft.table,
        );
        let entry = conn
            .query_row(&sql, params![row_id, before], |row| {
                Ok(HistoryEntry {
                    history_id: row.get(0)?,
                    value: value_from_ref(family, row.get_ref(1)?)?,
                    effective_date: row.get(2)?,
                    recorded_at: row.get(3)?,
                })
            })
            .optional()?;
        Ok(entry)
    }

    /// 将供应商范围内 future 生效日期为 from 的条目改为 to
    pub fn delay_futures(
        conn: &Connection,
        family: PriceFamily,
        vendor_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<usize> {
        let ft = FamilyTable::of(family);
        let sql = format!(
            "UPDATE {table}_future SET effective_date = ?1
             WHERE effective_date = ?2
               AND row_id IN (SELECT t.row_id FROM {table} t {join} WHERE v.vendor_id = ?3)",
            table = ft.table,
            join = ft.vendor_join,
        );
        Ok(conn.execute(&sql, params![to, from, vendor_id])?)
    }

    /// 软删除
    pub fn soft_delete(conn: &Connection, family: PriceFamily, row_id: i64) -> RepositoryResult<()> {
        let ft = FamilyTable::of(family);
        let sql = format!(
            "UPDATE {table} SET deleted = 1, updated_at = datetime('now') WHERE row_id = ?1",
            table = ft.table,
        );
        conn.execute(&sql, params![row_id])?;
        Self::clear_future(conn, family, row_id)?;
        Ok(())
    }

    /// 恢复被软删除的记录
    pub fn revive(conn: &Connection, family: PriceFamily, row_id: i64) -> RepositoryResult<()> {
        let ft = FamilyTable::of(family);
        let sql = format!(
            "UPDATE {table} SET deleted = 0, updated_at = datetime('now') WHERE row_id = ?1",
            table = ft.table,
        );
        conn.execute(&sql, params![row_id])?;
        Ok(())
    }

    /// 供应商范围内未删除记录的 row_id 列表
    pub fn live_row_ids(
        conn: &Connection,
        family: PriceFamily,
        vendor_id: &str,
    ) -> RepositoryResult<Vec<i64>> {
        let ft = FamilyTable::of(family);
        let sql = format!(
            "SELECT t.row_id FROM {table} t {join} WHERE v.vendor_id = ?1 AND t.deleted = 0",
            table = ft.table,
            join = ft.vendor_join,
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![vendor_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }
}
