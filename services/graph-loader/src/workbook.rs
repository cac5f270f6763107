//! Workbook reader - loads every sheet of an xlsx/xls/ods file into tables

use crate::sanitize::Cell;
use crate::schema::FACT_SHEET;
use crate::table::Table;
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Startup failures. All of them abort the run before the store is touched.
#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("workbook not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to open workbook {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("failed to read sheet '{sheet}': {source}")]
    Sheet {
        sheet: String,
        #[source]
        source: calamine::Error,
    },

    #[error("mandatory sheet '{0}' is missing")]
    MissingSheet(String),

    #[error("mandatory sheet '{0}' is empty")]
    EmptySheet(String),

    #[error("sheet '{sheet}' has no '{column}' column")]
    MissingColumn { sheet: String, column: String },
}

/// All sheets of one workbook, by name
#[derive(Debug)]
pub struct Workbook {
    path: PathBuf,
    sheets: BTreeMap<String, Table>,
}

impl Workbook {
    /// Read every sheet. The first row of each sheet is its header.
    pub fn open(path: &Path) -> Result<Self, WorkbookError> {
        if !path.exists() {
            return Err(WorkbookError::NotFound(path.to_path_buf()));
        }

        // calamine auto-detects xls, xlsx, xlsb and ods
        let mut workbook = open_workbook_auto(path).map_err(|source| WorkbookError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut sheets = BTreeMap::new();
        for name in workbook.sheet_names().to_vec() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|source| WorkbookError::Sheet {
                    sheet: name.clone(),
                    source,
                })?;
            let table = range_to_table(&name, &range);
            debug!(sheet = %name, rows = table.len(), columns = table.columns().len(), "sheet read");
            sheets.insert(name, table);
        }

        info!(path = %path.display(), sheets = sheets.len(), "workbook read");
        Ok(Self {
            path: path.to_path_buf(),
            sheets,
        })
    }

    /// Assemble a workbook from tables already in memory.
    #[cfg(test)]
    pub fn from_tables(path: impl Into<PathBuf>, tables: Vec<Table>) -> Self {
        Self {
            path: path.into(),
            sheets: tables
                .into_iter()
                .map(|t| (t.name().to_string(), t))
                .collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet(&self, name: &str) -> Option<&Table> {
        self.sheets.get(name)
    }

    /// A sheet that must exist and hold at least one data row.
    pub fn require(&self, name: &str) -> Result<&Table, WorkbookError> {
        let table = self
            .sheets
            .get(name)
            .ok_or_else(|| WorkbookError::MissingSheet(name.to_string()))?;
        if table.is_empty() {
            return Err(WorkbookError::EmptySheet(name.to_string()));
        }
        Ok(table)
    }

    /// The `ocorrencias` fact sheet.
    pub fn facts(&self) -> Result<&Table, WorkbookError> {
        self.require(FACT_SHEET)
    }
}

fn range_to_table(name: &str, range: &Range<Data>) -> Table {
    let mut rows = range.rows();

    let headers: Vec<String> = match rows.next() {
        Some(header) => header
            .iter()
            .map(|cell| match cell {
                Data::String(s) => s.trim().to_string(),
                Data::Empty => String::new(),
                other => other.to_string(),
            })
            .collect(),
        None => return Table::new(name, Vec::new()),
    };

    let mut table = Table::new(name, headers);
    for row in rows {
        table.push_row(row.iter().map(to_cell).collect());
    }
    table
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) => Cell::Float(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => {
            // Serial values below 1.0 are pure times of day (HORARIO_FATO)
            let serial = dt.as_f64();
            match dt.as_datetime() {
                Some(value) if serial < 1.0 => Cell::Text(value.format("%H:%M:%S").to_string()),
                Some(value) => Cell::DateTime(value),
                None => Cell::Float(serial),
            }
        }
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workbook(tables: Vec<Table>) -> Workbook {
        Workbook::from_tables("memory.xlsx", tables)
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = Workbook::open(Path::new("/definitely/not/here.xlsx")).unwrap_err();
        assert!(matches!(err, WorkbookError::NotFound(_)));
        assert!(err.to_string().contains("/definitely/not/here.xlsx"));
    }

    #[test]
    fn test_missing_fact_sheet() {
        let wb = workbook(vec![Table::from_rows("dim_meio", &["DESCRICAO_MEIO_UTILIZADO"], vec![])]);
        let err = wb.facts().unwrap_err();
        assert!(matches!(err, WorkbookError::MissingSheet(ref s) if s == "ocorrencias"));
    }

    #[test]
    fn test_empty_fact_sheet() {
        let wb = workbook(vec![Table::from_rows("ocorrencias", &["NUMERO_REDS"], vec![])]);
        let err = wb.facts().unwrap_err();
        assert!(matches!(err, WorkbookError::EmptySheet(_)));
        assert_eq!(err.to_string(), "mandatory sheet 'ocorrencias' is empty");
    }

    #[test]
    fn test_fact_sheet_present() {
        let wb = workbook(vec![Table::from_rows(
            "ocorrencias",
            &["NUMERO_REDS"],
            vec![vec![Cell::from("2024-000001")]],
        )]);
        assert_eq!(wb.facts().unwrap().len(), 1);
        assert!(wb.sheet("dim_bairro").is_none());
    }

    #[test]
    fn test_range_to_table_uses_first_row_as_header() {
        let mut range: Range<Data> = Range::new((0, 0), (2, 1));
        range.set_value((0, 0), Data::String(" NUMERO_REDS ".to_string()));
        range.set_value((0, 1), Data::String("LATITUDE".to_string()));
        range.set_value((1, 0), Data::String("R1".to_string()));
        range.set_value((1, 1), Data::Float(-19.9));
        range.set_value((2, 0), Data::Int(7));

        let table = range_to_table("ocorrencias", &range);
        assert_eq!(table.columns(), &["NUMERO_REDS".to_string(), "LATITUDE".to_string()]);
        assert_eq!(table.len(), 2);
        let row = table.row(1).unwrap();
        assert_eq!(row.cell(Some(0)), &Cell::Int(7));
        assert_eq!(row.cell(Some(1)), &Cell::Empty);
    }

    #[test]
    fn test_error_cells_read_as_empty() {
        assert_eq!(to_cell(&Data::Error(calamine::CellErrorType::NA)), Cell::Empty);
        assert_eq!(to_cell(&Data::Bool(true)), Cell::Bool(true));
    }
}
