// CSV-backed TabularStore: one directory per workbook, one <tab>.csv per tab

use super::{CellUpdate, StoreError, StoreResult, Table, TabularStore};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CsvWorkbookStore {
    root: PathBuf,
}

impl CsvWorkbookStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CsvWorkbookStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn workbook_dir(&self, workbook: &str) -> StoreResult<PathBuf> {
        let dir = self.root.join(workbook);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(StoreError::WorkbookNotFound(workbook.to_string()))
        }
    }

    fn tab_path(&self, workbook: &str, tab: &str) -> StoreResult<PathBuf> {
        Ok(self.workbook_dir(workbook)?.join(format!("{}.csv", tab)))
    }

    fn load(path: &Path) -> StoreResult<Table> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut records = reader.records();
        let header = match records.next() {
            Some(record) => record?.iter().map(|s| s.to_string()).collect(),
            None => Vec::new(),
        };

        let mut rows = Vec::new();
        for record in records {
            rows.push(record?.iter().map(|s| s.to_string()).collect());
        }

        Ok(Table::new(header, rows))
    }

    /// Write through a sibling temp file so a crash never leaves half a tab
    fn save(path: &Path, table: &Table) -> StoreResult<()> {
        let tmp = path.with_extension("csv.tmp");
        {
            let mut writer = WriterBuilder::new().flexible(true).from_path(&tmp)?;
            writer.write_record(&table.header)?;
            for row in &table.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl TabularStore for CsvWorkbookStore {
    fn list_tabs(&self, workbook: &str) -> StoreResult<Vec<String>> {
        let dir = self.workbook_dir(workbook)?;
        let mut tabs = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("csv") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    tabs.push(stem.to_string());
                }
            }
        }
        tabs.sort();
        Ok(tabs)
    }

    fn read_tab(&self, workbook: &str, tab: &str) -> StoreResult<Option<Table>> {
        let path = self.tab_path(workbook, tab)?;
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "reading tab");
        Self::load(&path).map(Some)
    }

    fn write_cells(&mut self, workbook: &str, tab: &str, updates: &[CellUpdate]) -> StoreResult<()> {
        let path = self.tab_path(workbook, tab)?;
        if !path.exists() {
            return Err(StoreError::TabNotFound {
                workbook: workbook.to_string(),
                tab: tab.to_string(),
            });
        }

        let mut table = Self::load(&path)?;
        if let Some(bad) = table.apply(updates) {
            return Err(StoreError::OutOfRange {
                workbook: workbook.to_string(),
                tab: tab.to_string(),
                row: bad.row,
                col: bad.col,
            });
        }
        debug!(path = %path.display(), cells = updates.len(), "writing cells");
        Self::save(&path, &table)
    }

    fn duplicate_tab(&mut self, workbook: &str, from: &str, to: &str) -> StoreResult<()> {
        let source = self.tab_path(workbook, from)?;
        if !source.exists() {
            return Err(StoreError::TabNotFound {
                workbook: workbook.to_string(),
                tab: from.to_string(),
            });
        }
        let target = self.tab_path(workbook, to)?;
        fs::copy(&source, &target)?;
        Ok(())
    }
}
