mod broadcaster;
mod config;
mod error;
mod handler;
mod protocol;
mod server;

use anyhow::{anyhow, Result};
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trading_core::UpsertPolicy;
use trading_data_services::{FeedName, FeedsConfig};

use config::ServerConfig;
use server::RpcServer;

#[derive(Parser)]
#[command(name = "market-rpc-server")]
#[command(about = "Cross-exchange quote aggregator with a JSON-RPC query and push API")]
struct Cli {
    /// Server host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to bind to
    #[arg(long, default_value = "7879")]
    port: u16,

    /// Canonical pairs to track, e.g. BTC-USDT,ETH-USDT (defaults to the built-in list)
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// Feeds to start, e.g. binance-spot,okx-futures (defaults to the built-in set)
    #[arg(long, value_delimiter = ',')]
    feeds: Vec<FeedName>,

    /// Period of market.update pushes in milliseconds
    #[arg(long, default_value = "700")]
    broadcast_interval_ms: u64,

    /// How a cell is replaced (last-received, last-timestamped)
    #[arg(long, default_value = "last-received")]
    upsert_policy: UpsertPolicy,

    /// Override every poller's REST timeout in milliseconds
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// Switch reconnect delays to doubling, capped at this many milliseconds
    #[arg(long)]
    max_backoff_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "market_rpc_server={},trading_data_services={},trading_core={}",
                cli.log_level, cli.log_level, cli.log_level
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut feeds = FeedsConfig::default();
    if !cli.symbols.is_empty() {
        feeds.symbols =
            FeedsConfig::parse_symbols(&cli.symbols).map_err(|e| anyhow!("--symbols: {}", e))?;
    }
    if !cli.feeds.is_empty() {
        feeds.feeds = cli.feeds;
    }
    feeds.request_timeout = cli.request_timeout_ms.map(Duration::from_millis);
    feeds.max_backoff = cli.max_backoff_ms.map(Duration::from_millis);

    if cli.broadcast_interval_ms == 0 {
        return Err(anyhow!("--broadcast-interval-ms must be positive"));
    }

    tracing::info!("🚀 Market JSON-RPC Server Starting");
    tracing::info!("Configuration:");
    tracing::info!("  Host: {}", cli.host);
    tracing::info!("  Port: {}", cli.port);
    tracing::info!("  Symbols: {}", feeds.symbols.len());
    tracing::info!(
        "  Feeds: {}",
        feeds.feeds.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(",")
    );
    tracing::info!("  Broadcast Interval: {}ms", cli.broadcast_interval_ms);
    tracing::info!("  Upsert Policy: {}", cli.upsert_policy);

    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        broadcast_interval: Duration::from_millis(cli.broadcast_interval_ms),
        upsert_policy: cli.upsert_policy,
        feeds,
        ..ServerConfig::default()
    };

    let server = RpcServer::new(config)?;
    server.run().await?;

    Ok(())
}
