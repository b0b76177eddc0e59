// ⚖️ Reconciliation Engine - cross-check ledger against every revenue source
//
// Three checks, none of which ever abort a run:
//   (a) artist sets: who is in a revenue source but not in the ledger, and
//       who is in the ledger but missing from the sources of their affiliation
//   (b) row counts: raw rows == processed rows + unmatched rows, per source,
//       with every unmatched row listed and explained
//   (c) numeric drift: persisted ledger numbers vs recomputed ones
//
// The report only annotates output for operator review.

use crate::aggregator::RevenueAggregation;
use crate::ledger::{DuplicateLedgerRow, LedgerParse, UnrecognizedAffiliation};
use crate::period::Period;
use crate::settlement::SettlementOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// REPORT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnmatchedReason {
    /// Normalized artist has no ledger row
    ArtistNotInLedger,
    /// Ledger row exists but settles under another affiliation
    AffiliationMismatch { ledger_affiliation: String },
    /// Ledger row lists several affiliations; excluded from deduction
    AmbiguousAffiliation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedRow {
    pub source: String,
    pub row: usize,
    pub raw_artist: String,
    pub artist_key: String,
    pub amount: f64,
    pub reason: UnmatchedReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowCounts {
    pub source: String,
    pub raw_rows: usize,
    pub processed_rows: usize,
    pub unmatched_rows: usize,
}

impl RowCounts {
    pub fn gap(&self) -> usize {
        self.raw_rows.saturating_sub(self.processed_rows)
    }

    pub fn is_complete(&self) -> bool {
        self.processed_rows + self.unmatched_rows == self.raw_rows
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistSetDiff {
    pub source: String,
    /// In this source, absent from the ledger
    pub missing_in_ledger: Vec<String>,
    /// In the ledger under this source's affiliation, absent from the source
    pub missing_in_revenue: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriftField {
    /// prior + current - persisted deduction vs persisted remaining balance
    RemainingBalance,
    /// recomputed deduction vs persisted deduction
    Deduction,
    /// recomputed settlement vs the one recorded by the previous run
    NetSettlement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftCheck {
    pub artist_key: String,
    pub field: DriftField,
    pub persisted: f64,
    pub recomputed: f64,
    pub matches: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub period: Period,
    pub missing_artists_in_ledger: Vec<String>,
    pub missing_artists_in_revenue: Vec<String>,
    pub artist_set_diffs: Vec<ArtistSetDiff>,
    pub row_counts: Vec<RowCounts>,
    pub ambiguous_affiliation_artists: Vec<String>,
    pub unrecognized_affiliations: Vec<UnrecognizedAffiliation>,
    pub duplicate_ledger_artists: Vec<DuplicateLedgerRow>,
    pub unmatched_rows: Vec<UnmatchedRow>,
    pub drift_checks: Vec<DriftCheck>,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn drift_mismatches(&self) -> impl Iterator<Item = &DriftCheck> {
        self.drift_checks.iter().filter(|c| !c.matches)
    }

    pub fn unmatched_in(&self, source: &str) -> usize {
        self.unmatched_rows.iter().filter(|r| r.source == source).count()
    }

    /// Nothing for the operator to look at
    pub fn is_clean(&self) -> bool {
        self.missing_artists_in_ledger.is_empty()
            && self.missing_artists_in_revenue.is_empty()
            && self.ambiguous_affiliation_artists.is_empty()
            && self.unrecognized_affiliations.is_empty()
            && self.duplicate_ledger_artists.is_empty()
            && self.unmatched_rows.is_empty()
            && self.drift_mismatches().next().is_none()
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation for {}: {} missing in ledger, {} missing in revenue, {} ambiguous, {} unmatched rows, {} drift mismatches",
            self.period,
            self.missing_artists_in_ledger.len(),
            self.missing_artists_in_revenue.len(),
            self.ambiguous_affiliation_artists.len(),
            self.unmatched_rows.len(),
            self.drift_mismatches().count(),
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Tolerance for floating-point comparisons (default: 0.001)
    pub tolerance: f64,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine { tolerance: 0.001 }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        ReconciliationEngine { tolerance }
    }

    /// `previous` maps artist key to the net settlement checkpointed by an
    /// earlier run of the same period. Persisted ledger outputs are only
    /// drift-checked for those artists; anything else in the Deduction and
    /// RemainingBalance cells (a tab seeded by rollover, say) was not written
    /// by this period's settlement.
    pub fn verify(
        &self,
        period: Period,
        ledger: &LedgerParse,
        revenue: &RevenueAggregation,
        outcomes: &[SettlementOutcome],
        previous: &BTreeMap<String, f64>,
        reconciled_at: DateTime<Utc>,
    ) -> ReconciliationReport {
        let (artist_set_diffs, missing_in_ledger, missing_in_revenue) =
            self.compare_artist_sets(ledger, revenue);
        let (row_counts, unmatched_rows) = self.count_rows(ledger, revenue);
        let drift_checks = self.check_drift(ledger, outcomes, previous);

        ReconciliationReport {
            period,
            missing_artists_in_ledger: missing_in_ledger,
            missing_artists_in_revenue: missing_in_revenue,
            artist_set_diffs,
            row_counts,
            ambiguous_affiliation_artists: ledger.ambiguous.clone(),
            unrecognized_affiliations: ledger.unrecognized.clone(),
            duplicate_ledger_artists: ledger.duplicates.clone(),
            unmatched_rows,
            drift_checks,
            reconciled_at,
        }
    }

    /// Check (a): artist-set differences per source and overall
    fn compare_artist_sets(
        &self,
        ledger: &LedgerParse,
        revenue: &RevenueAggregation,
    ) -> (Vec<ArtistSetDiff>, Vec<String>, Vec<String>) {
        let ledger_all: BTreeSet<&str> = ledger.artist_keys().collect();
        let mut diffs = Vec::new();
        let mut missing_in_ledger = BTreeSet::new();

        for schema in &revenue.schemas {
            let in_source: BTreeSet<&str> = revenue.artists_in(&schema.id).into_iter().collect();
            let affiliated: BTreeSet<&str> = ledger
                .entries
                .iter()
                .filter(|e| e.affiliations.contains(schema.affiliation))
                .map(|e| e.artist_key.as_str())
                .collect();

            let not_in_ledger: Vec<String> = in_source
                .difference(&ledger_all)
                .map(|s| s.to_string())
                .collect();
            let not_in_source: Vec<String> = affiliated
                .difference(&in_source)
                .map(|s| s.to_string())
                .collect();

            missing_in_ledger.extend(not_in_ledger.iter().cloned());
            diffs.push(ArtistSetDiff {
                source: schema.id.clone(),
                missing_in_ledger: not_in_ledger,
                missing_in_revenue: not_in_source,
            });
        }

        let missing_in_revenue = ledger_all
            .iter()
            .filter(|k| revenue.get(k).map(|a| a.line_items.is_empty()).unwrap_or(true))
            .map(|k| k.to_string())
            .collect();

        (diffs, missing_in_ledger.into_iter().collect(), missing_in_revenue)
    }

    /// Check (b): raw vs processed rows, each unmatched row explained
    fn count_rows(
        &self,
        ledger: &LedgerParse,
        revenue: &RevenueAggregation,
    ) -> (Vec<RowCounts>, Vec<UnmatchedRow>) {
        let mut counts = Vec::new();
        let mut unmatched = Vec::new();

        for schema in &revenue.schemas {
            let raw_rows = revenue.stats.get(&schema.id).map(|s| s.raw_rows).unwrap_or(0);
            let mut processed = 0;
            let mut source_unmatched = 0;

            for item in revenue.line_items_in(&schema.id) {
                let reason = match ledger.get(&item.artist_key) {
                    None => Some(UnmatchedReason::ArtistNotInLedger),
                    Some(entry) if entry.affiliations.is_ambiguous() => {
                        Some(UnmatchedReason::AmbiguousAffiliation)
                    }
                    Some(entry) if entry.affiliations.single() != Some(schema.affiliation) => {
                        Some(UnmatchedReason::AffiliationMismatch {
                            ledger_affiliation: entry.affiliations.raw.trim().to_string(),
                        })
                    }
                    Some(_) => None,
                };

                match reason {
                    None => processed += 1,
                    Some(reason) => {
                        source_unmatched += 1;
                        unmatched.push(UnmatchedRow {
                            source: schema.id.clone(),
                            row: item.row,
                            raw_artist: item.artist_raw.clone(),
                            artist_key: item.artist_key.clone(),
                            amount: item.amount,
                            reason,
                        });
                    }
                }
            }

            counts.push(RowCounts {
                source: schema.id.clone(),
                raw_rows,
                processed_rows: processed,
                unmatched_rows: source_unmatched,
            });
        }

        (counts, unmatched)
    }

    /// Check (c): persisted ledger numbers vs recomputed ones
    fn check_drift(
        &self,
        ledger: &LedgerParse,
        outcomes: &[SettlementOutcome],
        previous: &BTreeMap<String, f64>,
    ) -> Vec<DriftCheck> {
        let mut checks = Vec::new();

        for entry in ledger
            .entries
            .iter()
            .filter(|e| e.has_persisted_values && previous.contains_key(&e.artist_key))
        {
            checks.push(self.drift(
                &entry.artist_key,
                DriftField::RemainingBalance,
                entry.remaining_balance,
                entry.available() - entry.deduction,
            ));
        }

        for result in outcomes.iter().filter_map(|o| o.result()) {
            if let Some(entry) = ledger.get(&result.artist_key) {
                if entry.has_persisted_values && previous.contains_key(&result.artist_key) {
                    checks.push(self.drift(
                        &result.artist_key,
                        DriftField::Deduction,
                        entry.deduction,
                        result.deduction_applied,
                    ));
                }
            }
            if let Some(&persisted) = previous.get(&result.artist_key) {
                checks.push(self.drift(
                    &result.artist_key,
                    DriftField::NetSettlement,
                    persisted,
                    result.net_settlement_amount,
                ));
            }
        }

        checks
    }

    fn drift(&self, artist_key: &str, field: DriftField, persisted: f64, recomputed: f64) -> DriftCheck {
        DriftCheck {
            artist_key: artist_key.to_string(),
            field,
            persisted,
            recomputed,
            matches: (persisted - recomputed).abs() < self.tolerance,
        }
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
