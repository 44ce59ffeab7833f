//! Node Configuration

use admin_server::AdminServerConfig;
use anyhow::Context;
use clap::ValueEnum;
use ledger_bridge::{MonitorConfig, RpcLedgerConfig, DEFAULT_PROBE_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use vote_sync::{
    OrchestratorConfig, SyncConfig, CONFIRMATION_TIMEOUT_MS, MAX_RETRIES, RETRY_BACKOFF_MS,
    SYNC_INTERVAL_MS,
};

/// Which ledger client to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    /// In-process ledger, for development
    Memory,
    /// JSON-RPC ledger gateway
    Rpc,
}

/// Where local vote records live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Lost on restart
    Memory,
    /// Sled database under the data directory
    Sled,
}

/// Node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeConfig {
    /// HTTP admin bind address
    pub http_addr: String,
    /// WebSocket feed bind address
    pub ws_addr: String,
    pub ledger: LedgerKind,
    /// Gateway HTTP endpoint (rpc ledger)
    pub ledger_url: Option<String>,
    /// Gateway WebSocket endpoint for vote-cast events (rpc ledger)
    pub ledger_ws_url: Option<String>,
    pub store: StoreKind,
    /// Data directory for the sled store
    pub data_dir: PathBuf,
    pub probe_interval_ms: u64,
    pub sync_interval_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub confirmation_timeout_ms: u64,
    /// Per-request timeout against the gateway
    pub request_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let admin = AdminServerConfig::default();
        Self {
            http_addr: admin.http_addr,
            ws_addr: admin.ws_addr,
            ledger: LedgerKind::Memory,
            ledger_url: None,
            ledger_ws_url: None,
            store: StoreKind::Sled,
            data_dir: PathBuf::from("./data"),
            probe_interval_ms: DEFAULT_PROBE_INTERVAL_MS,
            sync_interval_ms: SYNC_INTERVAL_MS,
            max_retries: MAX_RETRIES,
            retry_backoff_ms: RETRY_BACKOFF_MS,
            confirmation_timeout_ms: CONFIRMATION_TIMEOUT_MS,
            request_timeout_ms: 10_000,
        }
    }
}

impl NodeConfig {
    /// Load from a JSON file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::default().with_probe_interval(Duration::from_millis(self.probe_interval_ms))
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default()
            .with_sync_interval(Duration::from_millis(self.sync_interval_ms))
            .with_max_retries(self.max_retries)
            .with_retry_backoff(Duration::from_millis(self.retry_backoff_ms))
            .with_confirmation_timeout(Duration::from_millis(self.confirmation_timeout_ms))
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::default()
            .with_confirmation_timeout(Duration::from_millis(self.confirmation_timeout_ms))
    }

    pub fn admin_config(&self) -> AdminServerConfig {
        AdminServerConfig {
            http_addr: self.http_addr.clone(),
            ws_addr: self.ws_addr.clone(),
        }
    }

    /// Gateway client settings; requires `ledger_url`
    pub fn rpc_ledger_config(&self) -> anyhow::Result<RpcLedgerConfig> {
        let url = self
            .ledger_url
            .as_deref()
            .context("ledger_url is required for the rpc ledger")?;

        let mut config = RpcLedgerConfig::new(url);
        if let Some(ws_url) = &self.ledger_ws_url {
            config = config.with_ws_url(ws_url);
        }
        config.request_timeout = Duration::from_millis(self.request_timeout_ms);
        Ok(config)
    }
}
