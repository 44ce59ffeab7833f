//! Sync progress observers

use ledger_bridge::ConnectionObserver;
use serde::Serialize;
use vote_types::{LedgerError, SyncedTx, VoteSubmission};

/// Counts for one sync cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    /// Votes now on the ledger, including duplicates short-circuited
    pub synced: usize,
    /// Votes that failed this cycle
    pub failed: usize,
    /// Subset of `synced` the ledger already held
    pub already_recorded: usize,
    /// Queue length after the cycle
    pub remaining: usize,
    pub duration_ms: u64,
}

/// Receives per-vote and per-cycle sync outcomes.
///
/// Called synchronously on the sync task. A slow observer stalls the loop.
pub trait SyncObserver: Send + Sync {
    fn on_vote_synced(&self, _vote: &VoteSubmission, _tx: &SyncedTx) {}

    fn on_vote_failed(&self, _vote: &VoteSubmission, _error: &LedgerError) {}

    fn on_cycle_complete(&self, _summary: &CycleSummary) {}
}

/// Logs every sync and connectivity event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_vote_synced(&self, vote: &VoteSubmission, tx: &SyncedTx) {
        match tx {
            SyncedTx::Confirmed(receipt) => tracing::info!(
                "Vote {} synced in tx {} (block {})",
                vote.verification_hash,
                receipt.tx_hash,
                receipt.block_number
            ),
            SyncedTx::AlreadyRecorded => tracing::info!(
                "Vote {} already on ledger, marked synced",
                vote.verification_hash
            ),
        }
    }

    fn on_vote_failed(&self, vote: &VoteSubmission, error: &LedgerError) {
        tracing::warn!("Vote {} failed to sync: {}", vote.verification_hash, error);
    }

    fn on_cycle_complete(&self, summary: &CycleSummary) {
        tracing::info!(
            "Sync cycle: {} synced, {} failed, {} still pending ({}ms)",
            summary.synced,
            summary.failed,
            summary.remaining,
            summary.duration_ms
        );
    }
}

impl ConnectionObserver for TracingObserver {
    fn on_disconnected(&self) {
        tracing::warn!("Ledger offline: new votes go to the pending queue");
    }

    fn on_reconnected(&self) {
        tracing::info!("Ledger back online");
    }
}
