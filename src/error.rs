// 🚨 Error types for the settlement engine
//
// Fatal conditions abort a run before any ledger write. Recoverable anomalies
// (ambiguous affiliations, unmatched artists, malformed numbers) never show
// up here; they are annotated in the ReconciliationReport instead.

use crate::store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SettlementError>;

#[derive(Error, Debug)]
pub enum SettlementError {
    /// Ledger or revenue tab absent for the requested period
    #[error("Missing source: workbook '{workbook}' has no tab '{tab}'")]
    MissingSource { workbook: String, tab: String },

    /// Expected header absent from a tab
    #[error("Missing column '{header}' in tab '{tab}'")]
    MissingColumn { tab: String, header: String },

    #[error("Invalid period '{0}': expected YYYYMM")]
    InvalidPeriod(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Journal error: {0}")]
    Journal(#[from] rusqlite::Error),

    #[error("Render error for '{artist}': {message}")]
    Render { artist: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SettlementError {
    /// Fatal errors raised while loading inputs, before computation starts
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            SettlementError::MissingSource { .. } | SettlementError::MissingColumn { .. }
        )
    }
}
