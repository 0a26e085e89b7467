// ==========================================
// 价格目录系统 - 文件解析器实现
// ==========================================
// 职责: 读取价目表工作簿，输出按工作表名索引的单元格网格
// 支持: Excel (.xlsx/.xlsm/.xls/.ods) / CSV (.csv)
// 约定: 网格坐标保持工作表绝对坐标，固定区域依赖这一点
// ==========================================

use crate::importer::cell_grid::{Cell, CellGrid, Workbook};
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::fs::File;
use std::path::Path;
use tracing::debug;

// ==========================================
// FileParser Trait
// ==========================================
pub trait FileParser: Send + Sync {
    fn parse_workbook(&self, file_path: &Path) -> ImportResult<Workbook>;
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

// ==========================================
// CSV Parser 实现
// ==========================================
// CSV 只有一个工作表，以文件名（不含扩展名）命名
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_workbook(&self, file_path: &Path) -> ImportResult<Workbook> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let file = File::open(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false) // 价目表没有统一表头，区域由抽取规则决定
            .flexible(true)
            .from_reader(file);

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(Cell::from).collect::<Vec<_>>());
        }

        let sheet_name = file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Sheet1")
            .to_string();

        debug!(sheet = %sheet_name, rows = rows.len(), "CSV 解析完成");

        let mut workbook = Workbook::new();
        workbook.add_sheet(sheet_name, CellGrid::from_rows(rows));
        Ok(workbook)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::from(s.as_str()),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::Error(_) => Cell::Empty,
        other => Cell::Text(other.to_string()),
    }
}

impl FileParser for ExcelParser {
    fn parse_workbook(&self, file_path: &Path) -> ImportResult<Workbook> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if !matches!(ext.as_str(), "xlsx" | "xlsm" | "xls" | "ods") {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut source = open_workbook_auto(file_path)?;
        let sheet_names = source.sheet_names().to_vec();
        if sheet_names.is_empty() {
            return Err(ImportError::ExcelParseError("Excel 文件无工作表".to_string()));
        }

        let mut workbook = Workbook::new();
        for name in sheet_names {
            let range = source.worksheet_range(&name)?;

            // calamine 的 Range 从首个非空单元格开始，补齐前导空行/空列以还原绝对坐标
            let (row_offset, col_offset) = range
                .start()
                .map(|(r, c)| (r as usize, c as usize))
                .unwrap_or((0, 0));

            let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row_offset];
            for data_row in range.rows() {
                let mut row = vec![Cell::Empty; col_offset];
                row.extend(data_row.iter().map(convert_cell));
                rows.push(row);
            }

            debug!(sheet = %name, rows = rows.len(), "工作表解析完成");
            workbook.add_sheet(name, CellGrid::from_rows(rows));
        }

        Ok(workbook)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct WorkbookParser;

impl WorkbookParser {
    pub fn parse<P: AsRef<Path>>(&self, file_path: P) -> ImportResult<Workbook> {
        let path = file_path.as_ref();
        match extension_of(path).as_str() {
            "csv" => CsvParser.parse_workbook(path),
            "xlsx" | "xlsm" | "xls" | "ods" => ExcelParser.parse_workbook(path),
            other => {
                ensure_exists(path)?;
                Err(ImportError::UnsupportedFormat(other.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_csv_parser_keeps_absolute_layout() {
        let mut temp_file = Builder::new().prefix("S1").suffix(".csv").tempfile().unwrap();
        writeln!(temp_file, "Price Book,,").unwrap();
        writeln!(temp_file, ",,").unwrap();
        writeln!(temp_file, "36,A,\"$100.00\"").unwrap();
        temp_file.flush().unwrap();

        let workbook = WorkbookParser.parse(temp_file.path()).unwrap();
        let names = workbook.sheet_names();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("S1"));

        let grid = workbook.sheet(&names[0]).unwrap();
        assert_eq!(grid.height(), 3);
        assert!(grid.get(1, 0).is_empty());
        assert_eq!(grid.get(2, 2).as_number(), Some(100.0));
    }

    #[test]
    fn test_missing_file() {
        let result = WorkbookParser.parse("/nonexistent/book.csv");
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let temp_file = Builder::new().suffix(".txt").tempfile().unwrap();
        let result = WorkbookParser.parse(temp_file.path());
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));
    }
}
