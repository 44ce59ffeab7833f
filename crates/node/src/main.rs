//! Ballot Sync Node
//!
//! Accepts votes, commits them to the ledger when it is reachable and queues
//! them locally when it is not. Queued votes are drained in the background.
//! Local vote records are persisted to disk and survive restarts.

use admin_server::{HttpAdminServer, WebSocketServer};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod context;

use config::{LedgerKind, NodeConfig, StoreKind};
use context::NodeContext;

/// Ballot sync node
#[derive(Parser, Debug)]
#[command(name = "ballot-sync")]
#[command(about = "Offline-tolerant vote submission and ledger sync", long_about = None)]
struct Args {
    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP admin bind address
    #[arg(long)]
    http_addr: Option<String>,

    /// WebSocket feed bind address
    #[arg(long)]
    ws_addr: Option<String>,

    /// Ledger client
    #[arg(long, value_enum)]
    ledger: Option<LedgerKind>,

    /// Ledger gateway HTTP endpoint
    #[arg(long)]
    ledger_url: Option<String>,

    /// Ledger gateway WebSocket endpoint
    #[arg(long)]
    ledger_ws_url: Option<String>,

    /// Local vote store
    #[arg(long, value_enum)]
    store: Option<StoreKind>,

    /// Data directory for persistent state
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Sync interval in milliseconds
    #[arg(long)]
    sync_interval_ms: Option<u64>,

    /// Reachability probe interval in milliseconds
    #[arg(long)]
    probe_interval_ms: Option<u64>,

    /// Retries per vote per sync cycle
    #[arg(long)]
    max_retries: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(self, config: &mut NodeConfig) {
        if let Some(v) = self.http_addr {
            config.http_addr = v;
        }
        if let Some(v) = self.ws_addr {
            config.ws_addr = v;
        }
        if let Some(v) = self.ledger {
            config.ledger = v;
        }
        if self.ledger_url.is_some() {
            config.ledger_url = self.ledger_url;
        }
        if self.ledger_ws_url.is_some() {
            config.ledger_ws_url = self.ledger_ws_url;
        }
        if let Some(v) = self.store {
            config.store = v;
        }
        if let Some(v) = self.data_dir {
            config.data_dir = v;
        }
        if let Some(v) = self.sync_interval_ms {
            config.sync_interval_ms = v;
        }
        if let Some(v) = self.probe_interval_ms {
            config.probe_interval_ms = v;
        }
        if let Some(v) = self.max_retries {
            config.max_retries = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = NodeConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    run(config).await
}

async fn run(config: NodeConfig) -> Result<()> {
    tracing::info!("Starting ballot sync node");
    tracing::info!("  HTTP admin: {}", config.http_addr);
    tracing::info!("  WebSocket feed: {}", config.ws_addr);
    tracing::info!("  Ledger: {:?} {}", config.ledger, config.ledger_url.as_deref().unwrap_or(""));
    tracing::info!("  Store: {:?} ({:?})", config.store, config.data_dir);
    tracing::info!(
        "  Sync every {}ms, {} retries, {}ms backoff",
        config.sync_interval_ms,
        config.max_retries,
        config.retry_backoff_ms
    );

    let node = NodeContext::build(&config)?;
    let recovered = node.sync.pending_count();
    if recovered > 0 {
        tracing::info!("{} votes pending from the previous run", recovered);
    }

    node.start().await?;

    let admin = config.admin_config();

    // Start HTTP admin server
    let http_context = node.admin.clone();
    let http_addr = admin.http_addr.clone();
    let http_server = tokio::spawn(async move {
        let server = HttpAdminServer::new(http_context);
        if let Err(e) = server.run(&http_addr).await {
            tracing::error!("HTTP admin server error: {}", e);
        }
    });

    // Start WebSocket feed
    let feed = node.admin.feed.clone();
    let ws_addr = admin.ws_addr.clone();
    let ws_server = tokio::spawn(async move {
        let server = WebSocketServer::new(feed);
        if let Err(e) = server.run(&ws_addr).await {
            tracing::error!("WebSocket server error: {}", e);
        }
    });

    tracing::info!("Ballot sync node running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");

    http_server.abort();
    ws_server.abort();
    node.stop().await;

    tracing::info!("Node stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "ballot-sync",
            "--ledger",
            "rpc",
            "--ledger-url",
            "http://gateway:8545",
            "--store",
            "memory",
            "--max-retries",
            "7",
        ]);

        let mut config = NodeConfig::default();
        args.apply(&mut config);

        assert_eq!(config.ledger, LedgerKind::Rpc);
        assert_eq!(config.ledger_url.as_deref(), Some("http://gateway:8545"));
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.max_retries, 7);
        // Untouched fields keep their values
        assert_eq!(config.http_addr, NodeConfig::default().http_addr);
    }
}
