//! Mock map matching server
//!
//! Serves both matching routes locally, echoing the posted path as the
//! snapped result, for running the CLI without network access or
//! credentials.
//!
//! Usage:
//!   cargo run --bin mock_matcher -- --port 8089 --confidence 0.3
//!   cargo run --bin mock_matcher -- --fail-status 503

use clap::Parser;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use trajmatch::io::{FailMode, MockBehavior, MockMatcher};

#[derive(Parser, Debug)]
#[command(name = "mock_matcher")]
#[command(about = "Mock map matching services for local runs")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: std::net::IpAddr,

    /// TCP port to listen on
    #[arg(short, long, default_value = "8089")]
    port: u16,

    /// Confidence reported for every matching
    #[arg(long, default_value = "0.9")]
    confidence: f64,

    /// Fail every request with this HTTP status
    #[arg(long)]
    fail_status: Option<u16>,

    /// Answer every request with a no-match result
    #[arg(long)]
    no_match: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let behavior = MockBehavior {
        confidence: args.confidence,
        fail: args.fail_status.map_or(FailMode::Never, FailMode::Always),
        no_match: args.no_match,
    };

    let server = MockMatcher::start_on(SocketAddr::new(args.host, args.port), behavior).await?;
    info!(
        mapbox_url = %server.mapbox_url(),
        amap_url = %server.amap_url(),
        "mock_matcher_ready"
    );

    tokio::signal::ctrl_c().await?;
    info!(requests = %server.request_count(), "mock_matcher_stopping");
    server.shutdown();
    Ok(())
}
