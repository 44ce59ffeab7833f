//! Event Feed - Fans sync, connectivity and vote-cast events out to clients
//!
//! Every event goes to every current subscriber. Nobody listening is fine.

use ledger_bridge::ConnectionObserver;
use serde::Serialize;
use tokio::sync::broadcast;
use vote_sync::{CycleSummary, SyncObserver};
use vote_types::{LedgerError, SyncedTx, TxHash, VerificationHash, VoteCastEvent, VoteSubmission};

/// Default buffered events per subscriber
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// Feed notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FeedEvent {
    VoteSynced {
        verification_hash: VerificationHash,
        /// Absent when the ledger already held the vote
        tx_hash: Option<TxHash>,
        block_number: Option<u64>,
    },
    VoteFailed {
        verification_hash: VerificationHash,
        error: String,
    },
    CycleComplete {
        synced: usize,
        failed: usize,
        remaining: usize,
    },
    ConnectionLost,
    ConnectionRestored,
    VoteCast(VoteCastEvent),
}

/// Broadcast hub for feed events
pub struct EventFeed {
    sender: broadcast::Sender<FeedEvent>,
}

impl EventFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, event: FeedEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Forward a ledger vote-cast notification
    pub fn on_vote_cast(&self, event: &VoteCastEvent) {
        self.publish(FeedEvent::VoteCast(event.clone()));
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl SyncObserver for EventFeed {
    fn on_vote_synced(&self, vote: &VoteSubmission, tx: &SyncedTx) {
        self.publish(FeedEvent::VoteSynced {
            verification_hash: vote.verification_hash.clone(),
            tx_hash: tx.tx_hash().cloned(),
            block_number: tx.block_number(),
        });
    }

    fn on_vote_failed(&self, vote: &VoteSubmission, error: &LedgerError) {
        self.publish(FeedEvent::VoteFailed {
            verification_hash: vote.verification_hash.clone(),
            error: error.to_string(),
        });
    }

    fn on_cycle_complete(&self, summary: &CycleSummary) {
        self.publish(FeedEvent::CycleComplete {
            synced: summary.synced,
            failed: summary.failed,
            remaining: summary.remaining,
        });
    }
}

impl ConnectionObserver for EventFeed {
    fn on_disconnected(&self) {
        self.publish(FeedEvent::ConnectionLost);
    }

    fn on_reconnected(&self) {
        self.publish(FeedEvent::ConnectionRestored);
    }
}
