//! Vote Submission Orchestrator
//!
//! Per-request decision procedure for casting a vote. The local record is
//! written before any ledger I/O, so a vote accepted here is never lost: it is
//! either confirmed on the spot or handed to the sync manager.

use crate::{
    config::OrchestratorConfig,
    error::{CastError, StoreError},
    store::{LocalVoteRecord, VoteStatus, VoteStore},
    sync_manager::SyncManager,
};
use ledger_bridge::{await_finality, ConnectionMonitor, LedgerClient};
use serde::Serialize;
use std::sync::Arc;
use vote_types::{LedgerError, Receipt, SyncedTx, TxHash, VoteSubmission};

/// Failure reason stored when the ledger already held the hash
const ALREADY_VOTED: &str = "already voted";

/// What the voter is told
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CastOutcome {
    /// Confirmed on the ledger
    Synced { tx_hash: TxHash, block_number: u64 },
    /// Accepted locally, will be committed by the sync loop.
    /// `degraded` is set when the ledger was reachable but the attempt failed.
    Queued { position: usize, degraded: bool },
    /// The verification hash has already voted
    AlreadyVoted,
    /// The ledger refused the vote for good
    Rejected { reason: String },
}

/// Casts votes against the ledger, falling back to the pending queue
pub struct VoteOrchestrator {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn VoteStore>,
    sync: Arc<SyncManager>,
    monitor: Arc<ConnectionMonitor>,
    config: OrchestratorConfig,
}

impl VoteOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn VoteStore>,
        sync: Arc<SyncManager>,
        monitor: Arc<ConnectionMonitor>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            sync,
            monitor,
            config,
        }
    }

    /// Cast one vote.
    ///
    /// Only a local storage failure is an error. Every ledger condition maps
    /// to a `CastOutcome`.
    pub async fn cast_vote(&self, record_id: u64, vote: VoteSubmission) -> Result<CastOutcome, CastError> {
        let hash = vote.verification_hash.clone();

        // Record first, exactly once
        let resumed = match self.store.create(LocalVoteRecord::pending(record_id, vote.clone())) {
            Ok(()) => false,
            Err(StoreError::AlreadyExists(_)) => {
                let existing = self
                    .store
                    .get(&hash)?
                    .ok_or_else(|| StoreError::NotFound(hash.clone()))?;
                match existing.status {
                    VoteStatus::Synced => return Ok(CastOutcome::AlreadyVoted),
                    VoteStatus::Failed => {
                        return Ok(match existing.failure_reason {
                            Some(reason) if reason == ALREADY_VOTED => CastOutcome::AlreadyVoted,
                            Some(reason) => CastOutcome::Rejected { reason },
                            None => CastOutcome::Rejected {
                                reason: "vote previously rejected".to_string(),
                            },
                        })
                    }
                    VoteStatus::Pending => true,
                }
            }
            Err(e) => return Err(e.into()),
        };

        if !self.monitor.is_connected().await {
            let position = self.sync.enqueue(vote);
            tracing::info!("Ledger offline, vote {} queued at position {}", hash, position);
            return Ok(CastOutcome::Queued {
                position,
                degraded: false,
            });
        }

        match self.submit(&vote).await {
            Ok(receipt) => {
                let tx = SyncedTx::Confirmed(receipt.clone());
                if let Err(e) = self.store.mark_synced(&hash, &tx) {
                    // The ledger has it; let the sync loop reconcile the record
                    tracing::error!("Vote {} confirmed but local update failed: {}", hash, e);
                    self.sync.enqueue(vote);
                }
                tracing::info!("Vote {} synced in tx {}", hash, receipt.tx_hash);
                Ok(CastOutcome::Synced {
                    tx_hash: receipt.tx_hash,
                    block_number: receipt.block_number,
                })
            }
            Err(LedgerError::AlreadyVoted) => {
                if resumed {
                    // Possibly our own earlier submission; the sync loop
                    // reconciles the record against the ledger
                    self.sync.enqueue(vote);
                } else {
                    self.store.mark_failed(&hash, ALREADY_VOTED)?;
                }
                Ok(CastOutcome::AlreadyVoted)
            }
            Err(e) if e.is_retryable() => {
                let position = self.sync.enqueue(vote);
                tracing::warn!("Vote {} submission failed ({}), queued at position {}", hash, e, position);
                Ok(CastOutcome::Queued {
                    position,
                    degraded: true,
                })
            }
            Err(e) => {
                let reason = e.to_string();
                self.store.mark_failed(&hash, &reason)?;
                tracing::warn!("Vote {} rejected: {}", hash, reason);
                Ok(CastOutcome::Rejected { reason })
            }
        }
    }

    /// Duplicate check, submit, confirm
    async fn submit(&self, vote: &VoteSubmission) -> Result<Receipt, LedgerError> {
        if self.ledger.has_voted(&vote.verification_hash).await? {
            return Err(LedgerError::AlreadyVoted);
        }
        let handle = self.ledger.submit_vote(vote).await?;
        await_finality(self.ledger.as_ref(), &handle, self.config.confirmation_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SyncConfig, store::MemoryVoteStore};
    use ledger_bridge::{MemoryLedger, MonitorConfig};
    use std::time::Duration;

    struct Harness {
        ledger: Arc<MemoryLedger>,
        store: Arc<MemoryVoteStore>,
        sync: Arc<SyncManager>,
        orchestrator: VoteOrchestrator,
    }

    fn harness() -> Harness {
        let ledger = Arc::new(MemoryLedger::new());
        let store = Arc::new(MemoryVoteStore::new());
        let sync = Arc::new(SyncManager::new(
            ledger.clone(),
            store.clone(),
            SyncConfig::default().with_retry_backoff(Duration::from_millis(1)),
        ));
        let monitor = Arc::new(ConnectionMonitor::new(ledger.clone(), MonitorConfig::default()));
        let orchestrator = VoteOrchestrator::new(
            ledger.clone(),
            store.clone(),
            sync.clone(),
            monitor,
            OrchestratorConfig::default().with_confirmation_timeout(Duration::from_secs(2)),
        );
        Harness {
            ledger,
            store,
            sync,
            orchestrator,
        }
    }

    fn vote(hash: &str) -> VoteSubmission {
        VoteSubmission::new(hash, "ballot", 12, 3)
    }

    #[tokio::test]
    async fn test_reachable_vote_is_synced() {
        let h = harness();
        let outcome = h.orchestrator.cast_vote(1, vote("0xa")).await.unwrap();

        let receipt = h.ledger.receipt_for(&"0xa".into()).unwrap();
        assert_eq!(
            outcome,
            CastOutcome::Synced {
                tx_hash: receipt.tx_hash.clone(),
                block_number: receipt.block_number
            }
        );

        let record = h.store.get(&"0xa".into()).unwrap().unwrap();
        assert_eq!(record.status, VoteStatus::Synced);
        assert_eq!(record.tx_hash, Some(receipt.tx_hash));
        assert_eq!(h.sync.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_vote_is_queued() {
        let h = harness();
        h.ledger.set_reachable(false);

        let outcome = h.orchestrator.cast_vote(1, vote("0xa")).await.unwrap();
        assert_eq!(
            outcome,
            CastOutcome::Queued {
                position: 1,
                degraded: false
            }
        );
        assert_eq!(h.ledger.submission_attempts(), 0);
        assert_eq!(
            h.store.get(&"0xa".into()).unwrap().unwrap().status,
            VoteStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_failed_submission_is_queued_degraded() {
        let h = harness();
        h.ledger.fail_next_submissions(1);

        let outcome = h.orchestrator.cast_vote(1, vote("0xa")).await.unwrap();
        assert_eq!(
            outcome,
            CastOutcome::Queued {
                position: 1,
                degraded: true
            }
        );

        // The sync loop finishes the job
        let summary = h.sync.sync_now().await.unwrap();
        assert_eq!(summary.synced, 1);
        assert_eq!(
            h.store.get(&"0xa".into()).unwrap().unwrap().status,
            VoteStatus::Synced
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout_is_queued_degraded() {
        let h = harness();
        h.ledger.set_withhold_confirmations(true);

        let outcome = h.orchestrator.cast_vote(1, vote("0xa")).await.unwrap();
        assert!(matches!(outcome, CastOutcome::Queued { degraded: true, .. }));

        // The vote did land; the next cycle must not submit it again
        h.ledger.set_withhold_confirmations(false);
        let summary = h.sync.sync_now().await.unwrap();
        assert_eq!(summary.already_recorded, 1);
        assert_eq!(h.ledger.submission_attempts(), 1);
        assert_eq!(h.ledger.vote_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_on_ledger_is_already_voted() {
        let h = harness();
        h.ledger.submit_vote(&vote("0xa")).await.unwrap();

        let outcome = h.orchestrator.cast_vote(1, vote("0xa")).await.unwrap();
        assert_eq!(outcome, CastOutcome::AlreadyVoted);
        assert_eq!(h.ledger.submission_attempts(), 1);
        assert_eq!(
            h.store.get(&"0xa".into()).unwrap().unwrap().status,
            VoteStatus::Failed
        );

        // Asking again gives the same answer without touching the ledger
        let calls = h.ledger.has_voted_calls();
        let again = h.orchestrator.cast_vote(1, vote("0xa")).await.unwrap();
        assert_eq!(again, CastOutcome::AlreadyVoted);
        assert_eq!(h.ledger.has_voted_calls(), calls);
    }

    #[tokio::test]
    async fn test_repeat_cast_does_no_ledger_io() {
        let h = harness();
        h.orchestrator.cast_vote(1, vote("0xa")).await.unwrap();
        let calls = h.ledger.has_voted_calls();

        let outcome = h.orchestrator.cast_vote(2, vote("0xa")).await.unwrap();
        assert_eq!(outcome, CastOutcome::AlreadyVoted);
        assert_eq!(h.ledger.has_voted_calls(), calls);
        // Original record untouched
        assert_eq!(h.store.get(&"0xa".into()).unwrap().unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_rejected_vote_is_terminal() {
        let h = harness();
        h.ledger.reject_candidate(3);

        let outcome = h.orchestrator.cast_vote(1, vote("0xa")).await.unwrap();
        assert!(matches!(outcome, CastOutcome::Rejected { .. }));
        assert_eq!(h.sync.pending_count(), 0);

        let again = h.orchestrator.cast_vote(1, vote("0xa")).await.unwrap();
        assert_eq!(again, outcome);
    }

    #[tokio::test]
    async fn test_resumed_pending_record_is_not_duplicated() {
        let h = harness();
        h.ledger.set_reachable(false);
        h.orchestrator.cast_vote(1, vote("0xa")).await.unwrap();

        h.ledger.set_reachable(true);
        let outcome = h.orchestrator.cast_vote(1, vote("0xa")).await.unwrap();
        assert!(matches!(outcome, CastOutcome::Synced { .. }));
        assert_eq!(h.ledger.vote_count(), 1);

        // Leftover queue entry reconciles as already recorded
        let summary = h.sync.sync_now().await.unwrap();
        assert_eq!(summary.already_recorded, 1);
        assert_eq!(h.ledger.submission_attempts(), 1);
    }

    #[test]
    fn test_outcome_wire_format() {
        let json = serde_json::to_value(CastOutcome::Queued {
            position: 4,
            degraded: true,
        })
        .unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["position"], 4);

        let json = serde_json::to_value(CastOutcome::Synced {
            tx_hash: TxHash::new("0x1"),
            block_number: 9,
        })
        .unwrap();
        assert_eq!(json["txHash"], "0x1");
        assert_eq!(json["blockNumber"], 9);
    }
}
