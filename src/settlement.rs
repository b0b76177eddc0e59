// 🧮 Deduction & Settlement Calculator
//
//   available  = prior_balance + current_accrual
//   deduction  = min(revenue, available), never negative
//   remaining  = available - deduction
//   net        = (revenue - deduction) * rate / 100
//
// Full f64 precision throughout; rounding to whole currency units belongs
// to the renderer.

use crate::aggregator::ArtistRevenueAggregate;
use crate::ledger::CostLedgerEntry;
use crate::period::Period;
use crate::sources::{sources_for, SourceSchema};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub artist_key: String,
    pub period: Period,
    pub gross_revenue: f64,
    pub available_balance: f64,
    pub deduction_applied: f64,
    pub remaining_carry_forward: f64,
    pub post_deduction_revenue: f64,
    pub rate: f64,
    pub net_settlement_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExclusionReason {
    /// Ledger lists more than one affiliation for the artist
    AmbiguousAffiliation { raw: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettlementOutcome {
    Settled(SettlementResult),
    /// No automatic deduction; nothing is written back
    Excluded {
        artist_key: String,
        reason: ExclusionReason,
    },
}

impl SettlementOutcome {
    pub fn artist_key(&self) -> &str {
        match self {
            SettlementOutcome::Settled(r) => &r.artist_key,
            SettlementOutcome::Excluded { artist_key, .. } => artist_key,
        }
    }

    pub fn result(&self) -> Option<&SettlementResult> {
        match self {
            SettlementOutcome::Settled(r) => Some(r),
            SettlementOutcome::Excluded { .. } => None,
        }
    }

    pub fn is_excluded(&self) -> bool {
        matches!(self, SettlementOutcome::Excluded { .. })
    }
}

pub struct SettlementCalculator<'a> {
    schemas: &'a [SourceSchema],
}

impl<'a> SettlementCalculator<'a> {
    pub fn new(schemas: &'a [SourceSchema]) -> Self {
        SettlementCalculator { schemas }
    }

    /// Revenue the entry settles against: sources of its single affiliation.
    /// Unrecognized tokens resolve to no affiliation and contribute 0.
    pub fn revenue_for(&self, entry: &CostLedgerEntry, aggregate: Option<&ArtistRevenueAggregate>) -> f64 {
        match (entry.affiliations.single(), aggregate) {
            (Some(affiliation), Some(aggregate)) => {
                aggregate.total_for(&sources_for(self.schemas, affiliation))
            }
            _ => 0.0,
        }
    }

    pub fn compute(
        &self,
        entry: &CostLedgerEntry,
        aggregate: Option<&ArtistRevenueAggregate>,
        period: Period,
    ) -> SettlementOutcome {
        if entry.affiliations.is_ambiguous() {
            return SettlementOutcome::Excluded {
                artist_key: entry.artist_key.clone(),
                reason: ExclusionReason::AmbiguousAffiliation {
                    raw: entry.affiliations.raw.clone(),
                },
            };
        }

        let revenue = self.revenue_for(entry, aggregate);
        SettlementOutcome::Settled(settle(
            &entry.artist_key,
            period,
            revenue,
            entry.prior_balance,
            entry.current_accrual,
            entry.rate,
        ))
    }
}

/// The arithmetic on its own, for callers that already have the numbers
pub fn settle(
    artist_key: &str,
    period: Period,
    revenue: f64,
    prior_balance: f64,
    current_accrual: f64,
    rate: f64,
) -> SettlementResult {
    let available = prior_balance + current_accrual;
    let deduction = revenue.min(available).max(0.0);
    let remaining = available - deduction;
    let post_deduction = revenue - deduction;
    let net = post_deduction * (rate / 100.0);

    SettlementResult {
        artist_key: artist_key.to_string(),
        period,
        gross_revenue: revenue,
        available_balance: available,
        deduction_applied: deduction,
        remaining_carry_forward: remaining,
        post_deduction_revenue: post_deduction,
        rate,
        net_settlement_amount: net,
    }
}
