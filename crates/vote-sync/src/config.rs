//! Sync and orchestrator configuration

use crate::{CONFIRMATION_TIMEOUT_MS, MAX_RETRIES, RETRY_BACKOFF_MS, SYNC_INTERVAL_MS};
use std::time::Duration;

/// Sync manager configuration
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Time between sync cycles (idle cycles are skipped)
    pub sync_interval: Duration,
    /// Retries per vote within one cycle
    pub max_retries: u32,
    /// Fixed pause between retries
    pub retry_backoff: Duration,
    /// Upper bound on waiting for finality
    pub confirmation_timeout: Duration,
}

impl SyncConfig {
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_millis(SYNC_INTERVAL_MS),
            max_retries: MAX_RETRIES,
            retry_backoff: Duration::from_millis(RETRY_BACKOFF_MS),
            confirmation_timeout: Duration::from_millis(CONFIRMATION_TIMEOUT_MS),
        }
    }
}

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Upper bound on waiting for finality on the request path
    pub confirmation_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_millis(CONFIRMATION_TIMEOUT_MS),
        }
    }
}
