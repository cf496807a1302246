//! PriceSync CLI — sync runs, checkpoint status, and gap tooling.
//!
//! Commands:
//! - `run` — execute a full (or resumed) sync over the universe file
//! - `status <run-id>` — print a run's checkpoint row
//! - `incomplete` — print the most recent resumable run
//! - `gaps detect|repair|report` — per-entity gap operations

mod logging;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pricesync_core::cancel::CancelToken;
use pricesync_core::gaps::GapRepairer;
use pricesync_core::provider::{
    CircuitBreaker, HistoryProvider, ProviderChain, StooqProvider, YahooProvider,
};
use pricesync_core::store::{CheckpointStore, PriceStore, SyncRun};
use pricesync_core::sync::{SyncConfig, SyncError, SyncOrchestrator};
use pricesync_core::universe::FileEntitySource;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pricesync", about = "PriceSync — daily price history sync engine")]
struct Cli {
    /// Data directory holding price partitions and checkpoint rows.
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a full sync run over the universe file.
    Run {
        /// Universe TOML file (sectors + ranked priority list).
        #[arg(long, default_value = "universe.toml")]
        universe: PathBuf,

        /// Size of the priority subset taken from the ranked list.
        #[arg(long, default_value_t = 20)]
        top: usize,

        /// Run identifier. Defaults to a fresh UUID.
        #[arg(long)]
        run_id: Option<String>,

        /// Resume the most recent incomplete run instead of starting fresh.
        #[arg(long, default_value_t = false)]
        resume: bool,

        /// Calendar-day threshold for gap detection.
        #[arg(long, default_value_t = 4)]
        gap_threshold: i64,
    },
    /// Print a run's checkpoint row.
    Status {
        /// Run identifier.
        run_id: String,
    },
    /// Print the most recent resumable run, if any.
    Incomplete,
    /// Gap detection and repair for stored history.
    Gaps {
        #[command(subcommand)]
        action: GapsAction,
    },
}

#[derive(Subcommand)]
enum GapsAction {
    /// List gaps for one entity, or every stored entity with --all.
    Detect {
        /// Entity code (omit with --all).
        code: Option<String>,

        /// Scan every entity in the store.
        #[arg(long, default_value_t = false)]
        all: bool,

        /// Calendar-day threshold.
        #[arg(long, default_value_t = 4)]
        threshold: i64,
    },
    /// Re-fetch and upsert missing ranges for one entity.
    Repair {
        code: String,

        #[arg(long, default_value_t = 4)]
        threshold: i64,
    },
    /// Read-only gap report (gaps + aggregate stats) for one entity.
    Report {
        code: String,

        #[arg(long, default_value_t = 4)]
        threshold: i64,
    },
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            universe,
            top,
            run_id,
            resume,
            gap_threshold,
        } => run_sync(&cli.data_dir, &universe, top, run_id, resume, gap_threshold),
        Commands::Status { run_id } => show_status(&cli.data_dir, &run_id),
        Commands::Incomplete => show_incomplete(&cli.data_dir),
        Commands::Gaps { action } => match action {
            GapsAction::Detect {
                code,
                all,
                threshold,
            } => gaps_detect(&cli.data_dir, code, all, threshold),
            GapsAction::Repair { code, threshold } => gaps_repair(&cli.data_dir, &code, threshold),
            GapsAction::Report { code, threshold } => gaps_report(&cli.data_dir, &code, threshold),
        },
    }
}

fn default_chain() -> ProviderChain {
    let providers: Vec<Box<dyn HistoryProvider>> = vec![
        Box::new(YahooProvider::new(Arc::new(CircuitBreaker::default_provider()))),
        Box::new(StooqProvider::new(Arc::new(CircuitBreaker::default_provider()))),
    ];
    ProviderChain::new(providers)
}

fn prices_at(data_dir: &Path) -> PriceStore {
    PriceStore::new(data_dir.join("prices"))
}

fn checkpoints_at(data_dir: &Path) -> CheckpointStore {
    CheckpointStore::new(data_dir.join("runs"))
}

fn run_sync(
    data_dir: &Path,
    universe: &Path,
    top: usize,
    run_id: Option<String>,
    resume: bool,
    gap_threshold: i64,
) -> Result<()> {
    if resume && run_id.is_some() {
        bail!("--resume and --run-id are mutually exclusive");
    }

    let prices = prices_at(data_dir);
    let checkpoints = checkpoints_at(data_dir);
    let chain = default_chain();
    let source = FileEntitySource::from_file(universe)
        .with_context(|| format!("loading universe from {}", universe.display()))?;

    let run_id = if resume {
        match checkpoints.get_incomplete_run()? {
            Some(run) => {
                println!("Resuming run {} ({}/{} processed)", run.run_id, run.processed, run.total);
                run.run_id
            }
            None => bail!("no incomplete run to resume"),
        }
    } else {
        run_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    };

    let config = SyncConfig {
        priority_limit: top,
        gap_threshold_days: gap_threshold,
        ..SyncConfig::default()
    };

    let orchestrator = SyncOrchestrator::new(&chain, &prices, &checkpoints, &source, config);

    // Ctrl+C interrupts the current wait and leaves the checkpoint resumable.
    let token = orchestrator.cancel_token();
    ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received (Ctrl+C)");
        token.cancel();
    })
    .context("installing Ctrl+C handler")?;

    match orchestrator.run(&run_id) {
        Ok(summary) => {
            println!();
            println!("=== Sync Run {} ===", summary.run_id);
            println!("Entities:       {}/{} processed", summary.processed, summary.total);
            println!("Successful:     {}", summary.successful);
            println!("Failed:         {}", summary.failed);
            println!("Priority:       {} processed", summary.priority_processed);
            println!("Records:        {} fetched, {} from gap repair", summary.records_fetched, summary.gap_records);
            println!("Gaps:           {} found, {} repaired", summary.gaps_found, summary.gaps_repaired);
            Ok(())
        }
        Err(SyncError::Cancelled) => {
            eprintln!("Run {run_id} interrupted; re-run with --resume to continue.");
            std::process::exit(130);
        }
        Err(e) => Err(e).context("sync run failed"),
    }
}

fn show_status(data_dir: &Path, run_id: &str) -> Result<()> {
    let run = checkpoints_at(data_dir).get_run(run_id)?;
    print_run(&run);
    Ok(())
}

fn show_incomplete(data_dir: &Path) -> Result<()> {
    match checkpoints_at(data_dir).get_incomplete_run()? {
        Some(run) => print_run(&run),
        None => println!("No incomplete runs."),
    }
    Ok(())
}

fn print_run(run: &SyncRun) {
    println!("Run:            {}", run.run_id);
    println!("Status:         {:?}", run.status);
    println!("Started:        {}", run.started_at);
    match &run.completed_at {
        Some(at) => println!("Completed:      {at}"),
        None => println!("Completed:      -"),
    }
    println!("Progress:       {}/{} ({} ok, {} failed)", run.processed, run.total, run.successful, run.failed);
    println!(
        "Priority:       {}/{}{}",
        run.priority_processed,
        run.priority_total,
        if run.priority_completed { " (done)" } else { "" }
    );
    for (name, value) in &run.aux_counters {
        println!("{name}: {value}");
    }
    if let Some(err) = &run.error {
        println!("Error:          {err}");
    }
}

fn gaps_detect(data_dir: &Path, code: Option<String>, all: bool, threshold: i64) -> Result<()> {
    let prices = prices_at(data_dir);
    let chain = default_chain();
    let repairer = GapRepairer::new(&chain, &prices, threshold);

    let codes = if all {
        prices.list_entities()?
    } else {
        match code {
            Some(c) => vec![c],
            None => bail!("provide an entity code or --all"),
        }
    };

    for code in codes {
        let gaps = repairer.detect(&code)?;
        if gaps.is_empty() {
            println!("{code}: no gaps");
            continue;
        }
        for gap in gaps {
            println!(
                "{code}: {} to {} ({} missing days)",
                gap.start, gap.end, gap.missing_days
            );
        }
    }
    Ok(())
}

fn gaps_repair(data_dir: &Path, code: &str, threshold: i64) -> Result<()> {
    let prices = prices_at(data_dir);
    let chain = default_chain();
    let repairer = GapRepairer::new(&chain, &prices, threshold);

    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel()).context("installing Ctrl+C handler")?;

    let summary = repairer.repair(code, &token)?;
    println!(
        "{code}: {} gaps found, {} repaired, {} records inserted",
        summary.gaps_found, summary.gaps_repaired, summary.records_inserted
    );
    Ok(())
}

fn gaps_report(data_dir: &Path, code: &str, threshold: i64) -> Result<()> {
    let prices = prices_at(data_dir);
    let chain = default_chain();
    let repairer = GapRepairer::new(&chain, &prices, threshold);

    let report = repairer.report(code)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
