// In-memory TabularStore for tests and dry runs

use super::{CellUpdate, StoreError, StoreResult, Table, TabularStore};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    workbooks: BTreeMap<String, BTreeMap<String, Table>>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Insert or replace a tab, creating the workbook on demand
    pub fn insert_tab(&mut self, workbook: &str, tab: &str, table: Table) {
        self.workbooks
            .entry(workbook.to_string())
            .or_default()
            .insert(tab.to_string(), table);
    }

    /// Builder form of insert_tab
    pub fn with_tab(mut self, workbook: &str, tab: &str, table: Table) -> Self {
        self.insert_tab(workbook, tab, table);
        self
    }

    pub fn tab(&self, workbook: &str, tab: &str) -> Option<&Table> {
        self.workbooks.get(workbook).and_then(|w| w.get(tab))
    }

    /// Number of write_cells calls that reached the store
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl TabularStore for MemoryStore {
    fn list_tabs(&self, workbook: &str) -> StoreResult<Vec<String>> {
        self.workbooks
            .get(workbook)
            .map(|w| w.keys().cloned().collect())
            .ok_or_else(|| StoreError::WorkbookNotFound(workbook.to_string()))
    }

    fn read_tab(&self, workbook: &str, tab: &str) -> StoreResult<Option<Table>> {
        let book = self
            .workbooks
            .get(workbook)
            .ok_or_else(|| StoreError::WorkbookNotFound(workbook.to_string()))?;
        Ok(book.get(tab).cloned())
    }

    fn write_cells(&mut self, workbook: &str, tab: &str, updates: &[CellUpdate]) -> StoreResult<()> {
        let table = self
            .workbooks
            .get_mut(workbook)
            .and_then(|w| w.get_mut(tab))
            .ok_or_else(|| StoreError::TabNotFound {
                workbook: workbook.to_string(),
                tab: tab.to_string(),
            })?;

        if let Some(bad) = table.apply(updates) {
            return Err(StoreError::OutOfRange {
                workbook: workbook.to_string(),
                tab: tab.to_string(),
                row: bad.row,
                col: bad.col,
            });
        }
        self.writes += 1;
        Ok(())
    }

    fn duplicate_tab(&mut self, workbook: &str, from: &str, to: &str) -> StoreResult<()> {
        let book = self
            .workbooks
            .get_mut(workbook)
            .ok_or_else(|| StoreError::WorkbookNotFound(workbook.to_string()))?;
        let source = book.get(from).cloned().ok_or_else(|| StoreError::TabNotFound {
            workbook: workbook.to_string(),
            tab: from.to_string(),
        })?;
        book.insert(to.to_string(), source);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_missing_tab_is_none() {
        let store = MemoryStore::new().with_tab("ledger", "202401", Table::default());
        assert!(store.read_tab("ledger", "202402").unwrap().is_none());
        assert!(store.read_tab("other", "202401").is_err());
    }

    #[test]
    fn test_duplicate_and_write() {
        let table = Table::from_rows(&["ArtistName", "PriorBalance"], &[&["Han", "10"]]);
        let mut store = MemoryStore::new().with_tab("ledger", "202401", table);

        store.duplicate_tab("ledger", "202401", "202402").unwrap();
        store
            .write_cells("ledger", "202402", &[CellUpdate::new(0, 1, "20")])
            .unwrap();

        assert_eq!(store.tab("ledger", "202401").unwrap().cell(0, 1), "10");
        assert_eq!(store.tab("ledger", "202402").unwrap().cell(0, 1), "20");
        assert_eq!(store.write_count(), 1);
        assert!(store.has_tab("ledger", "202402").unwrap());
    }
}
