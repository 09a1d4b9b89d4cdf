//! trajmatch - trajectory reduction and map matching CLI
//!
//! Reads a JSON array of points, decimates and simplifies it, optionally
//! snaps the result to the road network, and writes a JSON report.
//!
//! Usage:
//!   trajmatch --input track.json --output report.json
//!   trajmatch --input track.json --provider amap --tolerance 0.0005
//!   trajmatch --input track.json --no-match

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use trajmatch::domain::stats::format_file_size;
use trajmatch::domain::{MatchOutcome, Point, TrajectoryStats};
use trajmatch::infra::{Config, MatchMetrics, ProviderKind};
use trajmatch::io::build_provider;
use trajmatch::services::{reduce, MatchEngine, MatchProgress, ReductionOptions};

/// Reduce a GPS trajectory and snap it to roads
#[derive(Parser, Debug)]
#[command(name = "trajmatch", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// JSON array of points (`x`, `y`, optional `speed`, `heading`, `timestamp`)
    #[arg(short, long)]
    input: PathBuf,

    /// Report destination (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the configured provider (mapbox or amap)
    #[arg(long)]
    provider: Option<ProviderKind>,

    /// Skip map matching
    #[arg(long)]
    no_match: bool,

    /// Override the simplification tolerance (degrees)
    #[arg(long)]
    tolerance: Option<f64>,

    /// Override the decimation interval (seconds, 0 disables)
    #[arg(long)]
    interval_secs: Option<i64>,
}

#[derive(Serialize)]
struct Report<'a> {
    file_size: String,
    stats: &'a TrajectoryStats,
    reduced: &'a [Point],
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'a MatchOutcome>,
}

fn apply_overrides(mut config: Config, args: &Args) -> Config {
    if let Some(provider) = args.provider {
        config = config.with_provider(provider);
    }
    if let Some(tolerance) = args.tolerance {
        config = config.with_tolerance(tolerance);
    }
    if let Some(interval) = args.interval_secs {
        config = config.with_interval_secs(interval);
    }
    config
}

async fn run_matching(config: &Config, points: &[Point]) -> anyhow::Result<Option<MatchOutcome>> {
    let metrics = Arc::new(MatchMetrics::new());
    let provider = build_provider(config, Some(metrics.clone()))?;
    let engine = MatchEngine::from_config(provider, config).with_metrics(metrics.clone());

    info!(
        provider = %engine.provider_name(),
        chunk_size = %engine.chunk_size(),
        overlap = %config.chunk_overlap(),
        inter_chunk_delay_ms = %config.inter_chunk_delay().as_millis(),
        "matching_configured"
    );

    // Ctrl-C supersedes the run; in-flight requests finish and are discarded
    let generation = engine.generation();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt_received");
            generation.invalidate();
        }
    });

    let (progress_tx, mut progress_rx) = watch::channel(MatchProgress::default());
    let progress_logger = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let progress = *progress_rx.borrow_and_update();
            info!(current = %progress.current, total = %progress.total, "match_progress");
        }
    });

    let ticket = engine.begin();
    let outcome = engine
        .match_trajectory(points, &config.match_params(), &ticket, Some(&progress_tx))
        .await;

    drop(progress_tx);
    let _ = progress_logger.await;
    interrupt.abort();

    metrics.summary().log();
    Ok(outcome)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Logs go to stderr so the report can be piped from stdout
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = apply_overrides(Config::load(args.config.as_deref()), &args).with_env_credentials();
    config.validate()?;

    info!(
        config_file = %config.config_file(),
        provider = %config.provider().as_str(),
        tolerance = %config.tolerance(),
        interval_secs = %config.interval_secs(),
        high_quality = %config.high_quality(),
        confidence_threshold = %config.confidence_threshold(),
        "config_loaded"
    );

    let bytes = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read input {}", args.input.display()))?;
    let points: Vec<Point> = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse input {}", args.input.display()))?;
    let file_size = bytes.len() as u64;

    info!(points = %points.len(), file_size = %format_file_size(file_size), "input_loaded");

    let reduction = reduce(&points, &ReductionOptions::from(&config), file_size);

    let outcome = if args.no_match {
        None
    } else {
        match run_matching(&config, &reduction.points).await? {
            Some(outcome) => Some(outcome),
            None => {
                warn!("match_run_cancelled");
                None
            }
        }
    };

    let stats = match &outcome {
        Some(o) => reduction.stats.clone().with_map_matched(o.trajectory.len()),
        None => reduction.stats.clone(),
    };

    let report = Report {
        file_size: format_file_size(file_size),
        stats: &stats,
        reduced: &reduction.points,
        outcome: outcome.as_ref(),
    };
    let json = serde_json::to_string_pretty(&report)?;

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write report {}", path.display()))?;
            info!(output = %path.display(), "report_written");
        }
        None => println!("{}", json),
    }

    info!(
        original = %stats.original_count,
        final_count = %stats.final_count,
        compression_ratio = %stats.compression_ratio,
        "trajmatch_finished"
    );
    Ok(())
}
