//! In-memory sheet: a header row plus rows of raw cells

use crate::sanitize::Cell;
use std::ops::Range;

static EMPTY_CELL: Cell = Cell::Empty;

/// One worksheet, rectangular after construction
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(|c| c.trim().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a table from literal headers and rows.
    #[cfg(test)]
    pub fn from_rows(name: &str, columns: &[&str], rows: Vec<Vec<Cell>>) -> Self {
        let mut table = Self::new(name, columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Append a row, padding short rows with empty cells and truncating long ones.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first column whose header equals `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Resolve the first candidate header present in this sheet.
    /// Used once per sheet so rows never re-check fallback names.
    pub fn resolve(&self, candidates: &[&str]) -> Option<usize> {
        candidates.iter().find_map(|c| self.column_index(c))
    }

    #[cfg(test)]
    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|cells| Row { index, cells })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, cells)| Row { index, cells })
    }

    /// Rows in `range`, clamped to the table bounds.
    pub fn rows_in(&self, range: Range<usize>) -> impl Iterator<Item = Row<'_>> {
        let end = range.end.min(self.rows.len());
        let start = range.start.min(end);
        self.rows[start..end]
            .iter()
            .enumerate()
            .map(move |(offset, cells)| Row {
                index: start + offset,
                cells,
            })
    }
}

/// Borrowed view of one row
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    index: usize,
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    /// Zero-based position in the sheet's data rows.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Cell at a resolved column, `Empty` when the column does not exist.
    pub fn cell(&self, column: Option<usize>) -> &'a Cell {
        column
            .and_then(|i| self.cells.get(i))
            .unwrap_or(&EMPTY_CELL)
    }
}
