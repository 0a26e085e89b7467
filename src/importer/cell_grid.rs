// ==========================================
// 价格目录系统 - 单元格网格
// ==========================================
// 职责: 工作簿的二维单元格表示，提供区域切片、去空、向下填充
// 约定: 坐标为工作表绝对坐标（从 0 开始）
// ==========================================

use std::ops::Range;

static EMPTY: Cell = Cell::Empty;

/// 单元格
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// 空白文本视为空单元格
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// 文本形式（整数值的数字不带小数点）
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
        }
    }

    /// 数值形式（文本按货币格式清洗后解析）
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Empty => None,
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => crate::importer::data_cleaner::parse_decimal(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

// ==========================================
// CellGrid - 稠密二维网格
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellGrid {
    rows: Vec<Vec<Cell>>,
}

impl CellGrid {
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// 由字符串二维数组构造（空串为空单元格）
    pub fn from_strings<R: AsRef<[&'static str]>>(rows: &[R]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|r| r.as_ref().iter().map(|s| Cell::from(*s)).collect())
                .collect(),
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.iter().all(Cell::is_empty))
    }

    pub fn get(&self, row: usize, col: usize) -> &Cell {
        self.rows.get(row).and_then(|r| r.get(col)).unwrap_or(&EMPTY)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    /// 切出一个区域（越界部分自动截断），结果宽度统一补齐
    pub fn slice(&self, rows: Range<usize>, cols: Range<usize>) -> CellGrid {
        let row_end = rows.end.min(self.height());
        let col_end = cols.end.min(self.width());
        if rows.start >= row_end || cols.start >= col_end {
            return CellGrid::default();
        }
        let out = (rows.start..row_end)
            .map(|r| (cols.start..col_end).map(|c| self.get(r, c).clone()).collect())
            .collect();
        CellGrid { rows: out }
    }

    /// 删除全空行
    pub fn drop_empty_rows(mut self) -> Self {
        self.rows.retain(|r| !r.iter().all(Cell::is_empty));
        self
    }

    /// 删除全空列
    pub fn drop_empty_columns(mut self) -> Self {
        let width = self.width();
        let keep: Vec<bool> = (0..width)
            .map(|c| self.rows.iter().any(|r| r.get(c).map_or(false, |cell| !cell.is_empty())))
            .collect();
        for row in &mut self.rows {
            row.resize(width, Cell::Empty);
            let mut idx = 0;
            row.retain(|_| {
                let k = keep[idx];
                idx += 1;
                k
            });
        }
        self
    }

    /// 向下填充：空白单元格继承上方最近的非空值（模拟合并单元格）
    pub fn forward_fill(&mut self, col: usize) {
        let mut last: Option<Cell> = None;
        for row in &mut self.rows {
            if row.len() <= col {
                row.resize(col + 1, Cell::Empty);
            }
            if row[col].is_empty() {
                if let Some(prev) = &last {
                    row[col] = prev.clone();
                }
            } else {
                last = Some(row[col].clone());
            }
        }
    }
}

// ==========================================
// Workbook - 按名称索引的工作表集合
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<(String, CellGrid)>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sheet(&mut self, name: impl Into<String>, grid: CellGrid) {
        self.sheets.push((name.into(), grid));
    }

    pub fn sheet(&self, name: &str) -> Option<&CellGrid> {
        self.sheets
            .iter()
            .find(|(n, _)| n.trim().eq_ignore_ascii_case(name.trim()))
            .map(|(_, g)| g)
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn sheets(&self) -> impl Iterator<Item = (&str, &CellGrid)> {
        self.sheets.iter().map(|(n, g)| (n.as_str(), g))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_clamps_out_of_range() {
        let grid = CellGrid::from_strings(&[["a", "b"], ["c", "d"]]);
        let s = grid.slice(1..10, 0..10);
        assert_eq!(s.height(), 1);
        assert_eq!(s.get(0, 1), &Cell::Text("d".to_string()));
        assert!(grid.slice(5..6, 0..1).is_empty());
    }

    #[test]
    fn test_drop_empty_rows_and_columns() {
        let grid = CellGrid::from_strings(&[
            ["36", "", "A", "100"],
            ["", "", "", ""],
            ["", "", "B", "120"],
        ]);
        let cleaned = grid.drop_empty_rows().drop_empty_columns();
        assert_eq!(cleaned.height(), 2);
        assert_eq!(cleaned.width(), 3);
        assert_eq!(cleaned.get(1, 1).as_text(), "B");
    }

    #[test]
    fn test_forward_fill_inherits_last_value() {
        let mut grid = CellGrid::from_strings(&[["36", "A"], ["", "B"], ["48", "A"], ["", "B"]]);
        grid.forward_fill(0);
        assert_eq!(grid.get(1, 0).as_text(), "36");
        assert_eq!(grid.get(3, 0).as_text(), "48");
    }

    #[test]
    fn test_number_text_form() {
        assert_eq!(Cell::Number(36.0).as_text(), "36");
        assert_eq!(Cell::Number(12.5).as_text(), "12.5");
        assert_eq!(Cell::from("$1,234.50").as_number(), Some(1234.5));
    }

    #[test]
    fn test_workbook_sheet_lookup_is_case_insensitive() {
        let mut wb = Workbook::new();
        wb.add_sheet("Price List", CellGrid::from_strings(&[["x"]]));
        assert!(wb.sheet("price list").is_some());
        assert!(wb.sheet("missing").is_none());
    }
}
