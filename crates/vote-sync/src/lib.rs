//! Vote Sync - Pending vote queue, retry engine and submission orchestration
//!
//! This crate keeps the local vote store consistent with the ledger:
//! - Local vote records (in-memory or sled-backed)
//! - The pending queue and the periodic sync loop that drains it
//! - The per-request decision procedure for casting a vote

pub mod config;
pub mod error;
pub mod observer;
pub mod orchestrator;
pub mod persistence;
pub mod queue;
pub mod store;
pub mod sync_manager;

#[cfg(test)]
mod tests;

pub use config::{OrchestratorConfig, SyncConfig};
pub use error::{CastError, StoreError, SyncError};
pub use observer::{CycleSummary, SyncObserver, TracingObserver};
pub use orchestrator::{CastOutcome, VoteOrchestrator};
pub use persistence::SledVoteStore;
pub use queue::{PendingQueue, PendingVote};
pub use store::{LocalVoteRecord, MemoryVoteStore, VoteStatus, VoteStore};
pub use sync_manager::{SyncManager, SyncStats};

/// Default sync loop interval in milliseconds
pub const SYNC_INTERVAL_MS: u64 = 30_000;

/// Default retries per vote per cycle (attempts = retries + 1)
pub const MAX_RETRIES: u32 = 3;

/// Default pause between retries in milliseconds
pub const RETRY_BACKOFF_MS: u64 = 5_000;

/// Default upper bound on waiting for finality in milliseconds
pub const CONFIRMATION_TIMEOUT_MS: u64 = 300_000;
