// royalty-settle - monthly settlement CLI
//
//   royalty-settle [--config FILE] settle   <PERIOD> [--force]
//   royalty-settle [--config FILE] verify   <PERIOD>
//   royalty-settle [--config FILE] rollover <PERIOD>

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use royalty_settlement::{
    Config, CsvWorkbookStore, Journal, JsonReportRenderer, Period, RetryingStore, RolloverManager,
    RunOptions, RunSummary, SettlementEngine,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "royalty-settle")]
#[command(about = "Monthly royalty settlement against the cost ledger")]
#[command(version)]
struct Args {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(short, long, env = "ROYALTY_SETTLE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute, write Deduction/RemainingBalance back, render documents
    Settle {
        /// Period as YYYYMM
        period: Period,
        /// Redo artists whose checkpoint is unchanged
        #[arg(long)]
        force: bool,
    },
    /// Compute and reconcile without writing anything to the ledger
    Verify { period: Period },
    /// Seed the next month's ledger tab from this month's balances
    Rollover { period: Period },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    info!("Workbooks under {}", config.store.root.display());

    let mut store = RetryingStore::new(
        CsvWorkbookStore::new(&config.store.root),
        config.retry.clone(),
    );

    match args.command {
        Command::Settle { period, force } => {
            let options = if force {
                RunOptions::settle().forced()
            } else {
                RunOptions::settle()
            };
            let summary = run(&config, &mut store, period, options)?;
            print_summary(&summary);
        }
        Command::Verify { period } => {
            let summary = run(&config, &mut store, period, RunOptions::verify())?;
            print_summary(&summary);
        }
        Command::Rollover { period } => {
            let manager =
                RolloverManager::new(&config.store.ledger_workbook, config.ledger_columns.clone());
            let summary = manager
                .rollover(&mut store, period)
                .with_context(|| format!("Rollover of {} failed", period))?;

            println!("📅 Rollover {} → {}", summary.from, summary.to);
            if summary.created_tab {
                println!("   Created tab {}", summary.to);
            }
            println!("   {} rows updated, {} carried forward", summary.updated_rows, summary.carried);
            for artist in &summary.zeroed {
                println!("   ⚠️  {} not in {}, prior balance 0", artist, summary.from);
            }
        }
    }

    Ok(())
}

fn run(
    config: &Config,
    store: &mut RetryingStore<CsvWorkbookStore>,
    period: Period,
    options: RunOptions,
) -> Result<RunSummary> {
    let journal = Journal::open(&config.journal.path)
        .with_context(|| format!("Failed to open journal {}", config.journal.path.display()))?;
    let mut renderer = JsonReportRenderer::new(&config.output.dir, Local::now().date_naive());

    SettlementEngine::from_config(config)
        .run(store, &mut renderer, &journal, period, options)
        .with_context(|| format!("Settlement run for {} failed", period))
}

fn print_summary(summary: &RunSummary) {
    println!("💰 {} ({})", summary.period.label(), summary.mode.as_str());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for outcome in &summary.outcomes {
        match outcome.result() {
            Some(r) => println!(
                "  {:<24} revenue {:>14.0}  deduction {:>14.0}  remaining {:>14.0}  net {:>14.0}",
                r.artist_key,
                r.gross_revenue,
                r.deduction_applied,
                r.remaining_carry_forward,
                r.net_settlement_amount
            ),
            None => println!("  {:<24} ⚠️  excluded (ambiguous affiliation)", outcome.artist_key()),
        }
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "✓ {} written, {} unchanged, {} excluded; net total {:.0}",
        summary.written.len(),
        summary.skipped.len(),
        summary.excluded.len(),
        summary.total_net_settlement()
    );

    let report = &summary.report;
    if report.is_clean() {
        println!("✅ Reconciliation clean");
    } else {
        println!("⚠️  {}", report.summary());
    }
    if let Some(path) = &summary.report_path {
        println!("📄 Report: {}", path.display());
    }
}
