// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Corridor Runner
//
// Usage:
//   cargo run --release --bin corridor                                  # 60 simulated ticks, default corridor
//   cargo run --release --bin corridor -- --config config/corridor.json --ticks 240 --summary
//   cargo run --release --bin corridor -- --time-series corridor-results/ticks.jsonl
//   cargo run --release --bin corridor -- --live --interval-ms 500 --ticks 20
//
// Logging follows RUST_LOG (default `info`).

mod report;
mod time_series;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use corridor_engine::driver::TickDriver;
use corridor_engine::failsafe::{ManualClock, MonotonicClock};
use corridor_engine::{CorridorConfig, IntersectionRegistry};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use report::SummaryCollector;
use time_series::TimeSeriesRecorder;

// ─── CLI ────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "corridor", version, about = "Run the corridor signal simulation")]
struct Cli {
    /// Corridor configuration (JSON). Built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to run.
    #[arg(long, default_value_t = 60)]
    ticks: u64,

    /// Override `demand.seed`.
    #[arg(long)]
    seed: Option<u64>,

    /// Tick on wall-clock time in a background driver instead of a simulated clock.
    #[arg(long)]
    live: bool,

    /// Override `driver.tick_interval_ms`.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Write one JSON line per intersection per tick.
    #[arg(long, value_name = "PATH")]
    time_series: Option<PathBuf>,

    /// Write a JSON run summary under corridor-results/.
    #[arg(long)]
    summary: bool,
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn load_config(cli: &Cli) -> Result<CorridorConfig, BoxError> {
    let mut config = match &cli.config {
        Some(path) => CorridorConfig::from_json_file(path)?,
        None => CorridorConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.demand.seed = seed;
    }
    if let Some(ms) = cli.interval_ms {
        config.driver.tick_interval_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

// ─── Runs ───────────────────────────────────────────────────────────────────

/// Simulated clock: each tick advances it by one interval, no sleeping.
fn run_headless(
    config: CorridorConfig,
    ticks: u64,
    recorder: &mut Option<TimeSeriesRecorder>,
    summary: &mut SummaryCollector,
) -> Result<IntersectionRegistry, BoxError> {
    let interval = Duration::from_millis(config.driver.tick_interval_ms);
    let clock = Arc::new(ManualClock::starting_monday());
    let registry = IntersectionRegistry::builder(config).clock(clock.clone()).build()?;

    for _ in 0..ticks {
        clock.advance(interval);
        let report = registry.tick();
        for (id, reason) in report.failures() {
            warn!(intersection = %id, tick = report.tick, %reason, "intersection tick failed");
        }
        let states = registry.snapshots();
        if let Some(rec) = recorder.as_mut() {
            rec.record(report.tick, &states);
        }
        summary.observe(&report, &states);
    }
    Ok(registry)
}

/// Wall clock: the background driver ticks every interval until `ticks` ran.
fn run_live(config: CorridorConfig, ticks: u64) -> Result<IntersectionRegistry, BoxError> {
    let interval = Duration::from_millis(config.driver.tick_interval_ms);
    let registry = Arc::new(
        IntersectionRegistry::builder(config)
            .clock(Arc::new(MonotonicClock::new()))
            .build()?,
    );
    let driver = TickDriver::spawn(registry.clone(), interval, Some(ticks))?;
    let ran = driver.join();
    info!(ticks = ran, "live run finished");
    Arc::try_unwrap(registry).map_err(|_| "tick driver still holds the registry".into())
}

fn run(cli: Cli) -> Result<(), BoxError> {
    let config = load_config(&cli)?;
    let seed = config.demand.seed;

    println!("\n  Corridor Runner v{}", env!("CARGO_PKG_VERSION"));
    println!("  PRNG: ChaCha8Rng | Seed: {} | Intersections: {} | Ticks: {} | {}",
        seed,
        config.intersections.len(),
        cli.ticks,
        if cli.live { "live" } else { "simulated clock" },
    );

    let mut recorder = cli.time_series.as_ref().map(|_| TimeSeriesRecorder::new());
    let mut summary = SummaryCollector::new();

    let registry = if cli.live {
        if cli.time_series.is_some() {
            warn!("--time-series and --summary sample only the final tick in live mode");
        }
        let registry = run_live(config, cli.ticks)?;
        if let Some(rec) = recorder.as_mut() {
            rec.record_latest(&registry);
        }
        summary.observe_latest(&registry);
        registry
    } else {
        run_headless(config, cli.ticks, &mut recorder, &mut summary)?
    };

    if let (Some(rec), Some(path)) = (recorder.as_ref(), cli.time_series.as_deref()) {
        rec.write_jsonl(path)?;
        info!(path = %path.display(), lines = rec.len(), "time series written");
    }

    let states = registry.snapshots();
    let status = registry.status();
    let run_summary = summary.finish(seed, cli.live, &states, &status);
    println!();
    run_summary.print();

    for entry in registry.decision_log(10) {
        info!(intersection = %entry.intersection_id, action = ?entry.action, outcome = %entry.outcome, "decision");
    }

    if cli.summary {
        let path = run_summary.write(Path::new("corridor-results"))?;
        println!("  Results saved to: {}\n", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "corridor run failed");
            ExitCode::FAILURE
        }
    }
}
