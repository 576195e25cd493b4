//! CLI entry point for the service status engine.
//!
//! Runs recomputation cycles over a cycle input file against the in-memory
//! store and reports route snapshots, summaries and delay announcements.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use service_status::config::{EngineConfig, StopNames};
use service_status::cycle::CycleRunner;
use service_status::ledger::{AnnouncementSink, RecordingSink};
use service_status::output::{append_record, print_json, print_pretty, CsvEventSink};
use service_status::parser::{load_cycle_input, CycleInput};
use service_status::store::snapshots::{get_all_route_summaries, get_route_snapshot};
use service_status::store::{MemoryStore, TimeWindowedStore};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "service_status")]
#[command(about = "Infers transit service status and tracks delay notifications", long_about = None)]
struct Cli {
    /// Engine configuration JSON (thresholds, timers, excluded routes)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Stop id to display name JSON object
    #[arg(long, global = true)]
    stop_names: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run recomputation cycles over a cycle input file
    Run {
        /// Cycle input JSON (routes, trips, schedule)
        #[arg(value_name = "INPUT")]
        input: String,

        /// Number of cycles to run (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 1)]
        cycles: usize,

        /// Seconds between cycles
        #[arg(short, long, default_value_t = 30)]
        interval: u64,

        /// File the delay ledger is restored from and saved to
        #[arg(long)]
        ledger_file: Option<String>,

        /// CSV file to append notification events to
        #[arg(short, long, default_value = "events.csv")]
        events: String,

        /// Optional CSV file to append cycle stats to
        #[arg(long)]
        stats: Option<String>,
    },
    /// Run one cycle and log a route's snapshot
    Status {
        /// Cycle input JSON
        #[arg(value_name = "INPUT")]
        input: String,

        #[arg(value_name = "ROUTE")]
        route_id: String,
    },
    /// Run one cycle and log every route's status summary
    Summaries {
        /// Cycle input JSON
        #[arg(value_name = "INPUT")]
        input: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/service_status.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("service_status.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = Arc::new(EngineConfig::load(cli.config.as_deref())?);
    let names = Arc::new(match cli.stop_names.as_deref() {
        Some(path) => StopNames::load(path)?,
        None => StopNames::default(),
    });
    info!(stop_names = names.len(), "Configuration loaded");

    match cli.command {
        Commands::Run {
            input,
            cycles,
            interval,
            ledger_file,
            events,
            stats,
        } => {
            let sink: Arc<dyn AnnouncementSink> = Arc::new(CsvEventSink::new(events));
            run_cycles(
                &input,
                config,
                names,
                sink,
                cycles,
                interval,
                ledger_file.as_deref(),
                stats.as_deref(),
            )
            .await?;
        }
        Commands::Status { input, route_id } => {
            let (runner, _) = single_cycle(&input, config.clone(), names).await?;
            let now = Utc::now().timestamp();
            match get_route_snapshot(runner.store(), &route_id, now, config.snapshot_ttl_secs).await? {
                Some(snapshot) => {
                    print_pretty(&snapshot);
                    print_json(&snapshot)?;
                }
                None => warn!(route_id = %route_id, "No fresh data for route"),
            }
        }
        Commands::Summaries { input } => {
            let (runner, _) = single_cycle(&input, config.clone(), names).await?;
            let now = Utc::now().timestamp();
            let summaries = get_all_route_summaries(runner.store(), now, config.snapshot_ttl_secs).await?;
            info!(routes = summaries.len(), "Route summaries");
            print_json(&summaries)?;
        }
    }

    Ok(())
}

/// Builds a runner over a freshly seeded in-memory store.
async fn prepare(
    input: &str,
    config: Arc<EngineConfig>,
    names: Arc<StopNames>,
    sink: Arc<dyn AnnouncementSink>,
) -> Result<(CycleRunner, CycleInput)> {
    let cycle_input = load_cycle_input(input)?;
    let store: Arc<dyn TimeWindowedStore> =
        Arc::new(MemoryStore::with_visit_retention(config.visit_retention_secs()));
    cycle_input
        .seed(store.as_ref())
        .await
        .context("seeding travel times")?;
    info!(routes = cycle_input.routes.len(), "Cycle input loaded");
    Ok((CycleRunner::new(store, config, names, sink), cycle_input))
}

/// Runs a single cycle, collecting announcements in memory.
async fn single_cycle(
    input: &str,
    config: Arc<EngineConfig>,
    names: Arc<StopNames>,
) -> Result<(CycleRunner, CycleInput)> {
    let sink = Arc::new(RecordingSink::new());
    let (runner, cycle_input) = prepare(input, config, names, sink.clone()).await?;
    runner.run_cycle(&cycle_input.routes, Utc::now()).await;
    for event in sink.events().await {
        info!(
            kind = %event.kind,
            routes = ?event.route_ids,
            direction = %event.direction,
            "Delay announcement"
        );
    }
    Ok((runner, cycle_input))
}

/// Runs cycles on a fixed cadence, carrying the delay ledger across runs
/// through `ledger_file`.
#[allow(clippy::too_many_arguments)]
#[tracing::instrument(skip(config, names, sink), fields(input, cycles, interval))]
async fn run_cycles(
    input: &str,
    config: Arc<EngineConfig>,
    names: Arc<StopNames>,
    sink: Arc<dyn AnnouncementSink>,
    cycles: usize,
    interval: u64,
    ledger_file: Option<&str>,
    stats_file: Option<&str>,
) -> Result<()> {
    let (runner, cycle_input) = prepare(input, config, names, sink).await?;

    if let Some(path) = ledger_file.filter(|p| Path::new(p).exists()) {
        let bytes = std::fs::read(path).with_context(|| format!("reading ledger file '{path}'"))?;
        runner.store().put_delay_ledger(bytes).await?;
        info!(path, "Delay ledger restored");
    }

    if cycles == 0 {
        info!(interval, "Cycling infinitely. Press Ctrl+C to stop.");
    } else {
        info!(cycles, interval, "Starting cycles");
    }

    let mut cycle_count = 0;
    loop {
        // Check if we've reached the cycle limit (0 = infinite)
        if cycles > 0 && cycle_count >= cycles {
            break;
        }
        cycle_count += 1;

        let outcome = runner.run_cycle(&cycle_input.routes, Utc::now()).await;

        if let Some(path) = ledger_file {
            if let Some(bytes) = runner.store().prior_delay_ledger().await? {
                std::fs::write(path, bytes).with_context(|| format!("writing ledger file '{path}'"))?;
            }
        }
        if let Some(path) = stats_file {
            append_record(path, &outcome.stats)?;
        }

        if cycles == 0 || cycle_count < cycles {
            tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
        }
    }

    info!(cycles = cycle_count, "Finished running cycles");
    Ok(())
}
