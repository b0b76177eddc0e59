// Royalty Settlement Engine - Core Library
// Exposes all modules for use in the CLI and tests

pub mod error;
pub mod period;
pub mod normalize;      // Artist identity normalizer
pub mod affiliation;
pub mod store;          // Tabular store boundary (CSV, memory)
pub mod retry;
pub mod sources;        // Table-driven revenue source schemas
pub mod ledger;         // Cost ledger parser
pub mod aggregator;     // Revenue source aggregator
pub mod settlement;     // Deduction & settlement calculator
pub mod reconciliation;
pub mod journal;        // SQLite checkpoint journal
pub mod render;
pub mod rollover;       // Month rollover manager
pub mod config;
pub mod engine;

// Re-export commonly used types
pub use error::{Result, SettlementError};
pub use period::Period;
pub use normalize::{is_reserved_marker, is_summary_key, normalize};
pub use affiliation::{Affiliation, AffiliationSet, AffiliationVocabulary};
pub use store::{
    CellUpdate, CsvWorkbookStore, MemoryStore, StoreError, StoreResult, Table, TabularStore,
};
pub use retry::{RetryPolicy, RetryingStore};
pub use sources::{FieldMapping, SourceSchema};
pub use ledger::{CostLedgerEntry, LedgerColumns, LedgerParse, LedgerParser};
pub use aggregator::{ArtistRevenueAggregate, RevenueAggregation, RevenueAggregator, RevenueLineItem};
pub use settlement::{settle, SettlementCalculator, SettlementOutcome, SettlementResult};
pub use reconciliation::{ReconciliationEngine, ReconciliationReport};
pub use journal::{Journal, RunStatus};
pub use render::{JsonReportRenderer, MemoryRenderer, ReportRenderer, SettlementDocument};
pub use rollover::{RolloverManager, RolloverSummary};
pub use config::Config;
pub use engine::{RunMode, RunOptions, RunSummary, SettlementEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
