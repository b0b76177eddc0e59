// 🗂️ Tabular Store - the remote spreadsheet collaborator
//
// Workbooks hold one tab per period. The engine only ever reads whole tabs,
// overwrites individual cells and duplicates a tab for rollover, so that is
// the whole contract. Implementations may be slow or rate-limited; wrap them
// in RetryingStore for transient failures.

mod csv_store;
mod memory;

pub use csv_store::CsvWorkbookStore;
pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Workbook '{0}' not found")]
    WorkbookNotFound(String),

    #[error("Tab '{tab}' not found in workbook '{workbook}'")]
    TabNotFound { workbook: String, tab: String },

    #[error("Cell ({row}, {col}) out of range in {workbook}/{tab}")]
    OutOfRange {
        workbook: String,
        tab: String,
        row: usize,
        col: usize,
    },

    /// Rate limiting, timeouts, 5xx - the kind of failure worth retrying
    #[error("Transient store failure (status {status}): {message}")]
    Transient { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl StoreError {
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Transient { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// TABLE
// ============================================================================

/// One tab: header row plus data rows, all cells as text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Table { header, rows }
    }

    /// Build from string literals (tests, fixtures)
    pub fn from_rows(header: &[&str], rows: &[&[&str]]) -> Self {
        Table {
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    /// Column index for a header, matched after trimming
    pub fn column(&self, header: &str) -> Option<usize> {
        self.header.iter().position(|h| h.trim() == header.trim())
    }

    /// Cell text, empty when the row is short
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Apply cell updates in place, padding short rows. Nothing is written
    /// when any update falls outside the table; that update is returned.
    pub fn apply<'a>(&mut self, updates: &'a [CellUpdate]) -> Option<&'a CellUpdate> {
        let width = self.header.len();
        let out_of_range = updates.iter().find(|u| match self.rows.get(u.row) {
            Some(row) => u.col >= width.max(row.len()),
            None => true,
        });
        if out_of_range.is_some() {
            return out_of_range;
        }

        for update in updates {
            let row = &mut self.rows[update.row];
            if row.len() <= update.col {
                row.resize(update.col + 1, String::new());
            }
            row[update.col] = update.value.clone();
        }
        None
    }
}

/// Overwrite one data cell (row index excludes the header)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellUpdate {
    pub row: usize,
    pub col: usize,
    pub value: String,
}

impl CellUpdate {
    pub fn new(row: usize, col: usize, value: impl Into<String>) -> Self {
        CellUpdate {
            row,
            col,
            value: value.into(),
        }
    }
}

// ============================================================================
// STORE TRAIT
// ============================================================================

pub trait TabularStore {
    /// Tab names in a workbook
    fn list_tabs(&self, workbook: &str) -> StoreResult<Vec<String>>;

    /// Whole tab, or None when the workbook has no such tab
    fn read_tab(&self, workbook: &str, tab: &str) -> StoreResult<Option<Table>>;

    /// Overwrite cells of an existing tab
    fn write_cells(&mut self, workbook: &str, tab: &str, updates: &[CellUpdate]) -> StoreResult<()>;

    /// Copy a tab under a new name; fails if the source tab is missing
    fn duplicate_tab(&mut self, workbook: &str, from: &str, to: &str) -> StoreResult<()>;

    fn has_tab(&self, workbook: &str, tab: &str) -> StoreResult<bool> {
        Ok(self.list_tabs(workbook)?.iter().any(|t| t == tab))
    }
}

impl<S: TabularStore + ?Sized> TabularStore for Box<S> {
    fn list_tabs(&self, workbook: &str) -> StoreResult<Vec<String>> {
        (**self).list_tabs(workbook)
    }

    fn read_tab(&self, workbook: &str, tab: &str) -> StoreResult<Option<Table>> {
        (**self).read_tab(workbook, tab)
    }

    fn write_cells(&mut self, workbook: &str, tab: &str, updates: &[CellUpdate]) -> StoreResult<()> {
        (**self).write_cells(workbook, tab, updates)
    }

    fn duplicate_tab(&mut self, workbook: &str, from: &str, to: &str) -> StoreResult<()> {
        (**self).duplicate_tab(workbook, from, to)
    }
}
