// 🏭 Settlement Engine - one monthly run end to end
//
// Phase 1 loads every input tab; a missing tab or header aborts here, before
// anything is written. Phase 2 is pure: parse, aggregate, compute, reconcile.
// Phase 3 (settle mode only) walks artists in key order and, per artist,
// writes Deduction/RemainingBalance back, renders the document, then records
// the checkpoint. Artists whose inputs are unchanged since their checkpoint
// are skipped.

use crate::aggregator::{RevenueAggregation, RevenueAggregator, RevenueLineItem};
use crate::config::Config;
use crate::error::{Result, SettlementError};
use crate::journal::{compute_input_hash, Event, Journal, RunStatus};
use crate::ledger::{format_amount, LedgerParse, LedgerParser};
use crate::period::Period;
use crate::reconciliation::{ReconciliationEngine, ReconciliationReport};
use crate::render::ReportRenderer;
use crate::settlement::{SettlementCalculator, SettlementOutcome, SettlementResult};
use crate::sources::{sources_for, SourceSchema};
use crate::store::{CellUpdate, StoreError, Table, TabularStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Read a whole tab; an absent workbook or tab is a MissingSource
pub fn load_tab<S: TabularStore + ?Sized>(store: &S, workbook: &str, tab: &str) -> Result<Table> {
    let missing = || SettlementError::MissingSource {
        workbook: workbook.to_string(),
        tab: tab.to_string(),
    };
    match store.read_tab(workbook, tab) {
        Ok(Some(table)) => Ok(table),
        Ok(None) => Err(missing()),
        Err(StoreError::WorkbookNotFound(_)) | Err(StoreError::TabNotFound { .. }) => Err(missing()),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// RUN TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    /// Compute, write back, render, checkpoint
    Settle,
    /// Compute and reconcile only; no writes anywhere
    Verify,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Settle => "settle",
            RunMode::Verify => "verify",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Redo artists even when their checkpoint matches
    pub force: bool,
}

impl RunOptions {
    pub fn settle() -> Self {
        RunOptions {
            mode: RunMode::Settle,
            force: false,
        }
    }

    pub fn verify() -> Self {
        RunOptions {
            mode: RunMode::Verify,
            force: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Everything a run reads, loaded up front
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub period: Period,
    pub ledger: LedgerParse,
    pub revenue: RevenueAggregation,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub period: Period,
    pub mode: RunMode,
    pub run_id: Option<String>,
    pub outcomes: Vec<SettlementOutcome>,
    pub report: ReconciliationReport,
    /// Artists written back and rendered in this run
    pub written: Vec<String>,
    /// Artists skipped because their checkpoint matched
    pub skipped: Vec<String>,
    pub excluded: Vec<String>,
    pub report_path: Option<PathBuf>,
}

impl RunSummary {
    pub fn result(&self, artist_key: &str) -> Option<&SettlementResult> {
        self.outcomes
            .iter()
            .find(|o| o.artist_key() == artist_key)
            .and_then(|o| o.result())
    }

    pub fn total_net_settlement(&self) -> f64 {
        self.outcomes
            .iter()
            .filter_map(|o| o.result())
            .map(|r| r.net_settlement_amount)
            .sum()
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct SettlementEngine {
    ledger_workbook: String,
    parser: LedgerParser,
    schemas: Vec<SourceSchema>,
    reconciliation: ReconciliationEngine,
    report_dir: Option<PathBuf>,
}

impl SettlementEngine {
    pub fn new(ledger_workbook: &str, parser: LedgerParser, schemas: Vec<SourceSchema>) -> Self {
        SettlementEngine {
            ledger_workbook: ledger_workbook.to_string(),
            parser,
            schemas,
            reconciliation: ReconciliationEngine::new(),
            report_dir: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        SettlementEngine::new(
            &config.store.ledger_workbook,
            config.ledger_parser(),
            config.sources.clone(),
        )
        .with_reconciliation(config.reconciliation_engine())
        .with_report_dir(&config.output.dir)
    }

    pub fn with_reconciliation(mut self, reconciliation: ReconciliationEngine) -> Self {
        self.reconciliation = reconciliation;
        self
    }

    /// Write reconciliation_<period>.json under `dir` after each run
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    pub fn schemas(&self) -> &[SourceSchema] {
        &self.schemas
    }

    /// Phase 1: read and parse every tab of the period
    pub fn load<S: TabularStore + ?Sized>(&self, store: &S, period: Period) -> Result<RunInputs> {
        let tab = period.tab_name();

        let ledger_table = load_tab(store, &self.ledger_workbook, &tab)?;
        let revenue_tables = self
            .schemas
            .iter()
            .map(|schema| load_tab(store, &schema.workbook, &tab).map(|t| (schema, t)))
            .collect::<Result<Vec<_>>>()?;

        let ledger = self
            .parser
            .parse(&ledger_table, &format!("{}/{}", self.ledger_workbook, tab))?;

        let mut aggregator = RevenueAggregator::new();
        for (schema, table) in &revenue_tables {
            aggregator.ingest(schema, table, &tab)?;
        }
        let revenue = aggregator.finish();

        debug!(
            "Loaded {}: {} ledger entries, {} revenue artists",
            period,
            ledger.entries.len(),
            revenue.aggregates.len()
        );

        Ok(RunInputs {
            period,
            ledger,
            revenue,
        })
    }

    /// Phase 2: one outcome per ledger artist, in artist-key order
    pub fn compute(&self, inputs: &RunInputs) -> Vec<SettlementOutcome> {
        let calculator = SettlementCalculator::new(&self.schemas);
        inputs
            .ledger
            .artist_keys()
            .filter_map(|key| inputs.ledger.get(key))
            .map(|entry| calculator.compute(entry, inputs.revenue.get(&entry.artist_key), inputs.period))
            .collect()
    }

    pub fn run<S, R>(
        &self,
        store: &mut S,
        renderer: &mut R,
        journal: &Journal,
        period: Period,
        options: RunOptions,
    ) -> Result<RunSummary>
    where
        S: TabularStore + ?Sized,
        R: ReportRenderer + ?Sized,
    {
        info!("Starting {} run for {}", options.mode.as_str(), period);

        let inputs = self.load(&*store, period)?;
        let outcomes = self.compute(&inputs);
        let previous = journal.previous_settlements(period)?;
        let report = self
            .reconciliation
            .verify(period, &inputs.ledger, &inputs.revenue, &outcomes, &previous, Utc::now());

        let excluded: Vec<String> = outcomes
            .iter()
            .filter(|o| o.is_excluded())
            .map(|o| o.artist_key().to_string())
            .collect();
        for artist in &excluded {
            warn!("{}: ambiguous affiliation, excluded from automatic deduction", artist);
        }

        let mut summary = RunSummary {
            period,
            mode: options.mode,
            run_id: None,
            outcomes,
            report,
            written: Vec::new(),
            skipped: Vec::new(),
            excluded,
            report_path: None,
        };

        if options.mode == RunMode::Settle {
            let run_id = journal.start_run(period, options.mode.as_str())?;
            match self.write_back(store, renderer, journal, &run_id, &inputs, &mut summary, options.force) {
                Ok(()) => journal.finish_run(&run_id, RunStatus::Completed)?,
                Err(e) => {
                    warn!("Run {} failed after {} artists: {}", run_id, summary.written.len(), e);
                    journal.finish_run(&run_id, RunStatus::Failed)?;
                    return Err(e);
                }
            }
            summary.run_id = Some(run_id);
        }

        if let Some(dir) = &self.report_dir {
            summary.report_path = Some(write_report(dir, &summary.report)?);
        }

        if summary.report.is_clean() {
            info!("{}", summary.report.summary());
        } else {
            warn!("{}", summary.report.summary());
        }
        info!(
            "Finished {} run for {}: {} written, {} skipped, {} excluded",
            options.mode.as_str(),
            period,
            summary.written.len(),
            summary.skipped.len(),
            summary.excluded.len()
        );

        Ok(summary)
    }

    /// Phase 3: per-artist write-back, render, checkpoint
    #[allow(clippy::too_many_arguments)]
    fn write_back<S, R>(
        &self,
        store: &mut S,
        renderer: &mut R,
        journal: &Journal,
        run_id: &str,
        inputs: &RunInputs,
        summary: &mut RunSummary,
        force: bool,
    ) -> Result<()>
    where
        S: TabularStore + ?Sized,
        R: ReportRenderer + ?Sized,
    {
        let tab = inputs.period.tab_name();
        let cols = inputs.ledger.columns;

        for outcome in &summary.outcomes {
            let result = match outcome.result() {
                Some(result) => result,
                None => continue,
            };
            let entry = match inputs.ledger.get(&result.artist_key) {
                Some(entry) => entry,
                None => continue,
            };
            let aggregate = inputs.revenue.get(&result.artist_key);
            let input_hash = compute_input_hash(entry, aggregate);

            if !force && journal.is_done(inputs.period, &result.artist_key, &input_hash)? {
                debug!("{}: checkpoint unchanged, skipping", result.artist_key);
                summary.skipped.push(result.artist_key.clone());
                continue;
            }

            let updates = [
                CellUpdate::new(entry.row, cols.deduction, format_amount(result.deduction_applied)),
                CellUpdate::new(
                    entry.row,
                    cols.remaining_balance,
                    format_amount(result.remaining_carry_forward),
                ),
            ];
            store.write_cells(&self.ledger_workbook, &tab, &updates)?;

            let line_items: Vec<&RevenueLineItem> = match (entry.affiliations.single(), aggregate) {
                (Some(affiliation), Some(aggregate)) => {
                    aggregate.line_items_for(&sources_for(&self.schemas, affiliation))
                }
                _ => Vec::new(),
            };
            renderer.render(&result.artist_key, inputs.period, &line_items, result)?;

            journal.record(run_id, result, &input_hash)?;
            journal.insert_event(&Event::new(
                "artist_settled",
                "artist",
                &result.artist_key,
                json!({
                    "period": inputs.period.to_string(),
                    "run_id": run_id,
                    "gross_revenue": result.gross_revenue,
                    "deduction": result.deduction_applied,
                    "remaining": result.remaining_carry_forward,
                    "net_settlement": result.net_settlement_amount,
                }),
                "settlement_engine",
            ))?;

            info!(
                "{}: revenue {:.2}, deduction {:.2}, remaining {:.2}, net {:.2}",
                result.artist_key,
                result.gross_revenue,
                result.deduction_applied,
                result.remaining_carry_forward,
                result.net_settlement_amount
            );
            summary.written.push(result.artist_key.clone());
        }

        Ok(())
    }
}

/// <dir>/reconciliation_<period>.json
pub fn write_report(dir: &Path, report: &ReconciliationReport) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("reconciliation_{}.json", report.period));
    fs::write(&path, serde_json::to_string_pretty(report)?)?;
    Ok(path)
}
