//! Symbol node watcher
//!
//! Periodically crawls the peer set of a Symbol-like network, computes the
//! network-wide consensus block height, drops lagging peers, and publishes
//! a latency-ranked snapshot for downstream consumers. A small HTTP API
//! serves the snapshot and a cache-fronted consensus height lookup.
//!
//! ```text
//! Discovery -> Dedup -> Bounded Prober -> Median -> Staleness Filter
//!     -> latency sort -> atomic snapshot replace
//! ```
//!
//! The height query path is independent of the crawl: it asks the trusted
//! nodes directly and never reads the snapshot.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

mod api;
mod config;
mod crawler;
mod height;
mod rest;
mod types;

use api::ApiState;
use config::WatchConfig;
use crawler::Crawler;
use rest::NodeRestClient;

/// Symbol node watcher - peer crawler and consensus height service
#[derive(Parser, Debug)]
#[command(name = "symbol-nodewatch")]
#[command(version)]
#[command(about = "Crawl-and-consensus peer watcher for Symbol network nodes", long_about = None)]
struct Args {
    /// HTTP API port (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Snapshot output path (overrides SNAPSHOT_PATH)
    #[arg(short, long)]
    snapshot: Option<String>,

    /// Run a single crawl cycle and exit (for external scheduling)
    #[arg(long)]
    oneshot: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .init();

    info!("Symbol node watcher v{}", env!("CARGO_PKG_VERSION"));

    // Environment-sourced configuration with CLI overrides
    let mut config = WatchConfig::from_env().with_snapshot_path(args.snapshot);
    if let Some(port) = args.port {
        config = config.with_api_port(port);
    }
    config.validate()?;

    info!("Configuration:");
    info!("   Trusted nodes: {}", config.trusted_nodes.join(", "));
    info!("   Chunk size: {}", config.chunk_size);
    info!("   Crawl timeout: {}ms", config.crawl_timeout_ms);
    info!("   Height threshold: {}", config.height_threshold);
    info!("   Height cache TTL: {}s", config.cache_ttl_secs);
    info!("   Snapshot path: {}", config.snapshot_path);

    let config = Arc::new(config);
    let client = Arc::new(NodeRestClient::new()?);

    let crawler = Arc::new(Crawler::new(config.clone(), client.clone()));

    if args.oneshot {
        let summary = crawler.run_cycle().await?;
        info!(
            "One-shot crawl done: {} peers published (median height {:?})",
            summary.published, summary.median_height
        );
        return Ok(());
    }

    let crawl_handle = tokio::spawn(crawler::run_scheduler(
        crawler,
        config.crawl_interval(),
    ));

    let api_state = Arc::new(ApiState::new(config.clone(), client));
    let api_handle = tokio::spawn(api::run_api_server(api_state));

    info!("All services started");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        result = crawl_handle => {
            error!("Crawl scheduler exited: {:?}", result);
        }
        result = api_handle => {
            error!("HTTP API exited: {:?}", result);
        }
    }

    info!("Symbol node watcher shutting down");
    Ok(())
}
