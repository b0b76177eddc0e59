// 📅 Month Rollover Manager
//
// Seeds next month's ledger tab from this month's results:
//   PriorBalance(P+1)   = RemainingBalance(P), 0 when the artist is absent from P
//                         (blank RemainingBalance: Prior + Accrual - Deduction)
//   CurrentAccrual(P+1) = 0
// Every other column of P+1 is left as it is. Running it twice writes the
// same values again.

use crate::engine::load_tab;
use crate::error::Result;
use crate::ledger::{format_amount, parse_number, LedgerColumns};
use crate::normalize::{is_summary_key, normalize};
use crate::period::Period;
use crate::store::{CellUpdate, TabularStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloverSummary {
    pub from: Period,
    pub to: Period,
    /// The P+1 tab did not exist and was copied from P
    pub created_tab: bool,
    /// Rows whose prior balance came from P
    pub carried: usize,
    /// Rows whose artist is not in P; prior balance set to 0
    pub zeroed: Vec<String>,
    pub updated_rows: usize,
}

pub struct RolloverManager {
    ledger_workbook: String,
    columns: LedgerColumns,
}

impl RolloverManager {
    pub fn new(ledger_workbook: &str, columns: LedgerColumns) -> Self {
        RolloverManager {
            ledger_workbook: ledger_workbook.to_string(),
            columns,
        }
    }

    pub fn rollover<S: TabularStore + ?Sized>(
        &self,
        store: &mut S,
        period: Period,
    ) -> Result<RolloverSummary> {
        let workbook = self.ledger_workbook.as_str();
        let from_tab = period.tab_name();
        let next = period.next()?;
        let to_tab = next.tab_name();

        let current = load_tab(&*store, workbook, &from_tab)?;
        let cols = self.columns.resolve(&current, &from_tab)?;

        let mut remaining: BTreeMap<String, f64> = BTreeMap::new();
        for row in 0..current.len() {
            let key = normalize(current.cell(row, cols.artist));
            if is_summary_key(&key) {
                continue;
            }
            let persisted = current.cell(row, cols.remaining_balance).trim();
            let value = if persisted.is_empty() {
                // never written back (excluded artist): nothing was deducted
                parse_number(current.cell(row, cols.prior_balance))
                    + parse_number(current.cell(row, cols.current_accrual))
                    - parse_number(current.cell(row, cols.deduction))
            } else {
                parse_number(persisted)
            };
            remaining.entry(key).or_insert(value);
        }

        let created_tab = !store.has_tab(workbook, &to_tab)?;
        if created_tab {
            info!("Creating ledger tab {} from {}", to_tab, from_tab);
            store.duplicate_tab(workbook, &from_tab, &to_tab)?;
        }

        let target = load_tab(&*store, workbook, &to_tab)?;
        let target_cols = self.columns.resolve(&target, &to_tab)?;

        let mut updates = Vec::new();
        let mut carried = 0;
        let mut zeroed = Vec::new();
        for row in 0..target.len() {
            let key = normalize(target.cell(row, target_cols.artist));
            if is_summary_key(&key) {
                continue;
            }
            let prior = match remaining.get(&key) {
                Some(value) => {
                    carried += 1;
                    *value
                }
                None => {
                    zeroed.push(key);
                    0.0
                }
            };
            updates.push(CellUpdate::new(row, target_cols.prior_balance, format_amount(prior)));
            updates.push(CellUpdate::new(row, target_cols.current_accrual, "0"));
        }

        if !zeroed.is_empty() {
            warn!(
                "{} artist(s) in {} have no row in {}; prior balance set to 0",
                zeroed.len(),
                to_tab,
                from_tab
            );
        }

        if !updates.is_empty() {
            store.write_cells(workbook, &to_tab, &updates)?;
        }

        let summary = RolloverSummary {
            from: period,
            to: next,
            created_tab,
            carried,
            zeroed,
            updated_rows: updates.len() / 2,
        };
        info!(
            "Rollover {} -> {}: {} rows updated ({} carried)",
            summary.from, summary.to, summary.updated_rows, summary.carried
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SettlementError;
    use crate::store::{MemoryStore, Table};

    const LEDGER: &str = "cost_ledger";
    const HEADER: &[&str] = &[
        "Affiliation",
        "ArtistName",
        "SettlementRate",
        "PriorBalance",
        "CurrentAccrual",
        "Deduction",
        "RemainingBalance",
    ];

    fn period() -> Period {
        "202412".parse().unwrap()
    }

    fn december() -> Table {
        Table::from_rows(
            HEADER,
            &[
                &["A", "Han", "50", "1000000", "0", "1000000", "0"],
                &["A", "Kim", "70", "2000000", "0", "800000", "1200000"],
                &["", "합계", "", "3000000", "0", "1800000", "1200000"],
            ],
        )
    }

    fn manager() -> RolloverManager {
        RolloverManager::new(LEDGER, LedgerColumns::default())
    }

    #[test]
    fn test_rollover_creates_next_tab() {
        let mut store = MemoryStore::new().with_tab(LEDGER, "202412", december());

        let summary = manager().rollover(&mut store, period()).unwrap();
        assert!(summary.created_tab);
        assert_eq!(summary.to.to_string(), "202501");
        assert_eq!(summary.carried, 2);

        let january = store.tab(LEDGER, "202501").unwrap();
        assert_eq!(january.cell(0, 3), "0");
        assert_eq!(january.cell(1, 3), "1200000");
        assert_eq!(january.cell(1, 4), "0");
        // remaining balance column untouched
        assert_eq!(january.cell(1, 6), "1200000");
        // summary row untouched
        assert_eq!(january.cell(2, 3), "3000000");
        // source month untouched
        assert_eq!(store.tab(LEDGER, "202412").unwrap().cell(1, 3), "2000000");
    }

    #[test]
    fn test_rollover_reuses_existing_tab() {
        let january = Table::from_rows(
            HEADER,
            &[
                &["B", "Kim ", "70", "5", "300", "", ""],
                &["A", "New Artist", "50", "999", "100", "", ""],
            ],
        );
        let mut store = MemoryStore::new()
            .with_tab(LEDGER, "202412", december())
            .with_tab(LEDGER, "202501", january);

        let summary = manager().rollover(&mut store, period()).unwrap();
        assert!(!summary.created_tab);
        assert_eq!(summary.zeroed, vec!["New Artist".to_string()]);

        let january = store.tab(LEDGER, "202501").unwrap();
        assert_eq!(january.cell(0, 3), "1200000");
        assert_eq!(january.cell(0, 4), "0");
        assert_eq!(january.cell(0, 0), "B");
        assert_eq!(january.cell(1, 3), "0");
        assert_eq!(january.cell(1, 4), "0");
    }

    #[test]
    fn test_rollover_is_idempotent() {
        let mut store = MemoryStore::new().with_tab(LEDGER, "202412", december());

        manager().rollover(&mut store, period()).unwrap();
        let first = store.tab(LEDGER, "202501").cloned().unwrap();
        let second = manager().rollover(&mut store, period()).unwrap();

        assert!(!second.created_tab);
        assert_eq!(store.tab(LEDGER, "202501").unwrap(), &first);
    }

    #[test]
    fn test_rollover_missing_period_is_fatal() {
        let mut store = MemoryStore::new().with_tab(LEDGER, "202411", december());

        let err = manager().rollover(&mut store, period()).unwrap_err();
        assert!(matches!(err, SettlementError::MissingSource { .. }));
        assert!(store.tab(LEDGER, "202501").is_none());
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_rollover_past_last_period_is_rejected() {
        let mut store = MemoryStore::new().with_tab(LEDGER, "999912", december());

        let last: Period = "999912".parse().unwrap();
        let err = manager().rollover(&mut store, last).unwrap_err();
        assert!(matches!(err, SettlementError::InvalidPeriod(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_rollover_keeps_balance_of_unsettled_row() {
        let december = Table::from_rows(
            HEADER,
            &[
                &["A", "Han", "50", "1000000", "0", "1000000", "0"],
                &["A,B", "Choi", "50", "100000", "20000", "", ""],
            ],
        );
        let mut store = MemoryStore::new().with_tab(LEDGER, "202412", december);

        let summary = manager().rollover(&mut store, period()).unwrap();
        assert_eq!(summary.carried, 2);
        assert!(summary.zeroed.is_empty());

        let january = store.tab(LEDGER, "202501").unwrap();
        assert_eq!(january.cell(0, 3), "0");
        assert_eq!(january.cell(1, 3), "120000");
        assert_eq!(january.cell(1, 4), "0");
    }
}
