// 📒 Cost Ledger Parser
//
// One ledger tab per period: per-artist affiliation, settlement rate and
// cost balances. Columns are located by header text. Summary rows (empty
// artist, "합계"/"grand total") are skipped wherever they appear, which
// covers the trailing aggregate row.

use crate::affiliation::{AffiliationSet, AffiliationVocabulary};
use crate::error::{Result, SettlementError};
use crate::normalize::{is_summary_key, normalize};
use crate::store::Table;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// COLUMN NAMES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerColumns {
    pub affiliation: String,
    pub artist: String,
    pub rate: String,
    pub prior_balance: String,
    pub current_accrual: String,
    pub deduction: String,
    pub remaining_balance: String,
}

impl Default for LedgerColumns {
    fn default() -> Self {
        LedgerColumns {
            affiliation: "Affiliation".to_string(),
            artist: "ArtistName".to_string(),
            rate: "SettlementRate".to_string(),
            prior_balance: "PriorBalance".to_string(),
            current_accrual: "CurrentAccrual".to_string(),
            deduction: "Deduction".to_string(),
            remaining_balance: "RemainingBalance".to_string(),
        }
    }
}

/// Header positions of the ledger columns in one tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerColumnIndex {
    pub affiliation: usize,
    pub artist: usize,
    pub rate: usize,
    pub prior_balance: usize,
    pub current_accrual: usize,
    pub deduction: usize,
    pub remaining_balance: usize,
}

impl LedgerColumns {
    pub fn resolve(&self, table: &Table, tab: &str) -> Result<LedgerColumnIndex> {
        let find = |header: &str| {
            table.column(header).ok_or_else(|| SettlementError::MissingColumn {
                tab: tab.to_string(),
                header: header.to_string(),
            })
        };

        Ok(LedgerColumnIndex {
            affiliation: find(&self.affiliation)?,
            artist: find(&self.artist)?,
            rate: find(&self.rate)?,
            prior_balance: find(&self.prior_balance)?,
            current_accrual: find(&self.current_accrual)?,
            deduction: find(&self.deduction)?,
            remaining_balance: find(&self.remaining_balance)?,
        })
    }
}

// ============================================================================
// ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLedgerEntry {
    pub artist_key: String,
    pub raw_artist: String,
    pub affiliations: AffiliationSet,
    /// Settlement rate in percent (50.0 = 50%)
    pub rate: f64,
    pub prior_balance: f64,
    pub current_accrual: f64,
    /// Persisted values as read; overwritten by the engine after computation
    pub deduction: f64,
    pub remaining_balance: f64,
    /// Data-row index in the tab (header excluded), used for write-back
    pub row: usize,
    /// Deduction or remaining balance cell was non-empty when read
    pub has_persisted_values: bool,
}

impl CostLedgerEntry {
    /// Cost balance that revenue can be deducted from this period
    pub fn available(&self) -> f64 {
        self.prior_balance + self.current_accrual
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnrecognizedAffiliation {
    pub artist_key: String,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateLedgerRow {
    pub artist_key: String,
    pub row: usize,
    pub first_row: usize,
}

// ============================================================================
// PARSE RESULT
// ============================================================================

#[derive(Debug, Clone)]
pub struct LedgerParse {
    pub entries: Vec<CostLedgerEntry>,
    pub ambiguous: Vec<String>,
    pub unrecognized: Vec<UnrecognizedAffiliation>,
    pub duplicates: Vec<DuplicateLedgerRow>,
    pub skipped_rows: usize,
    pub columns: LedgerColumnIndex,
    index: BTreeMap<String, usize>,
}

impl LedgerParse {
    pub fn get(&self, artist_key: &str) -> Option<&CostLedgerEntry> {
        self.index.get(artist_key).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, artist_key: &str) -> bool {
        self.index.contains_key(artist_key)
    }

    /// Artist keys in sorted order
    pub fn artist_keys(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(|k| k.as_str())
    }

    pub fn is_ambiguous(&self, artist_key: &str) -> bool {
        self.get(artist_key)
            .map(|e| e.affiliations.is_ambiguous())
            .unwrap_or(false)
    }
}

// ============================================================================
// PARSER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct LedgerParser {
    columns: LedgerColumns,
    vocabulary: AffiliationVocabulary,
}

impl LedgerParser {
    pub fn new(columns: LedgerColumns, vocabulary: AffiliationVocabulary) -> Self {
        LedgerParser {
            columns,
            vocabulary,
        }
    }

    pub fn columns(&self) -> &LedgerColumns {
        &self.columns
    }

    pub fn parse(&self, table: &Table, tab: &str) -> Result<LedgerParse> {
        let cols = self.columns.resolve(table, tab)?;

        let mut entries: Vec<CostLedgerEntry> = Vec::new();
        let mut index: BTreeMap<String, usize> = BTreeMap::new();
        let mut ambiguous = Vec::new();
        let mut unrecognized = Vec::new();
        let mut duplicates = Vec::new();
        let mut skipped_rows = 0;

        for row in 0..table.len() {
            let raw_artist = table.cell(row, cols.artist);
            let artist_key = normalize(raw_artist);
            if is_summary_key(&artist_key) {
                skipped_rows += 1;
                continue;
            }

            if let Some(&first) = index.get(&artist_key) {
                let first_row = entries[first].row;
                duplicates.push(DuplicateLedgerRow {
                    artist_key,
                    row,
                    first_row,
                });
                continue;
            }

            let affiliations = self.vocabulary.parse(table.cell(row, cols.affiliation));
            if affiliations.is_ambiguous() {
                ambiguous.push(artist_key.clone());
            }
            if !affiliations.unrecognized.is_empty() {
                unrecognized.push(UnrecognizedAffiliation {
                    artist_key: artist_key.clone(),
                    tokens: affiliations.unrecognized.clone(),
                });
            }

            let deduction_cell = table.cell(row, cols.deduction);
            let remaining_cell = table.cell(row, cols.remaining_balance);

            index.insert(artist_key.clone(), entries.len());
            entries.push(CostLedgerEntry {
                artist_key,
                raw_artist: raw_artist.to_string(),
                affiliations,
                rate: parse_number(table.cell(row, cols.rate)),
                prior_balance: parse_number(table.cell(row, cols.prior_balance)),
                current_accrual: parse_number(table.cell(row, cols.current_accrual)),
                deduction: parse_number(deduction_cell),
                remaining_balance: parse_number(remaining_cell),
                row,
                has_persisted_values: !deduction_cell.trim().is_empty()
                    || !remaining_cell.trim().is_empty(),
            });
        }

        ambiguous.sort();

        Ok(LedgerParse {
            entries,
            ambiguous,
            unrecognized,
            duplicates,
            skipped_rows,
            columns: cols,
            index,
        })
    }
}

/// Permissive numeric parse: strips thousands separators, percent signs and
/// whitespace. Empty or unparsable cells count as 0.0.
pub fn parse_number(cell: &str) -> f64 {
    let cleaned: String = cell
        .chars()
        .filter(|c| !matches!(c, ',' | '%') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return 0.0;
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Text written back to the ledger: shortest round-trip form, no rounding
pub fn format_amount(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return "0".to_string();
    }
    value.to_string()
}
