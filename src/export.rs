// ==========================================
// 价格目录系统 - 价格清单导出
// ==========================================
// 输出: CSV（金额以元为单位两位小数）与 JSON
// ==========================================

use crate::domain::resolution::ResolvedPrice;
use crate::domain::types::Cents;
use csv::Writer;
use std::io::Write;

/// CSV 表头
pub const CSV_HEADER: &[&str] = &[
    "product",
    "description",
    "category",
    "pricing_class",
    "customer",
    "price",
    "effective_date",
    "override",
    "note",
];

/// 分 → 两位小数金额文本
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

fn to_row(row: &ResolvedPrice) -> Vec<String> {
    vec![
        row.product_identifier.clone(),
        row.description.clone().unwrap_or_default(),
        row.category.clone().unwrap_or_default(),
        row.pricing_class.clone(),
        row.customer.clone().unwrap_or_default(),
        format_cents(row.price),
        row.effective_date.to_string(),
        if row.is_override { "Y" } else { "N" }.to_string(),
        row.note.clone().unwrap_or_default(),
    ]
}

/// 写出 CSV 价格清单
pub fn write_csv<W: Write>(rows: &[ResolvedPrice], writer: W) -> csv::Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for row in rows {
        wtr.write_record(to_row(row))?;
    }
    wtr.flush()?;
    Ok(())
}

/// JSON 价格清单
pub fn to_json(rows: &[ResolvedPrice]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::PriceSource;
    use chrono::NaiveDate;

    fn sample() -> ResolvedPrice {
        ResolvedPrice {
            product_id: 1,
            product_identifier: "AMH_36_A".to_string(),
            description: Some("Coil, 3 ton".to_string()),
            category: Some("AMH".to_string()),
            pricing_class: "list price".to_string(),
            customer: None,
            price: 10005,
            effective_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            source: PriceSource::Class,
            is_override: false,
            note: None,
        }
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(10005), "100.05");
        assert_eq!(format_cents(7), "0.07");
        assert_eq!(format_cents(-150), "-1.50");
    }

    #[test]
    fn test_write_csv_quotes_and_formats() {
        let mut buf = Vec::new();
        write_csv(&[sample()], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("product,description,category,pricing_class,customer,price,effective_date,override,note")
        );
        assert_eq!(
            lines.next(),
            Some("AMH_36_A,\"Coil, 3 ton\",AMH,list price,,100.05,2026-03-01,N,")
        );
    }

    #[test]
    fn test_to_json_keeps_cents() {
        let json = to_json(&[sample()]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["price"], 10005);
        assert_eq!(value[0]["source"], "CLASS");
    }
}
