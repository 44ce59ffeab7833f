//! In-memory ledger
//!
//! A deterministic stand-in for the real chain. It enforces one vote per
//! verification hash and lets callers inject outages, failed submissions and
//! stalled confirmations. Used by tests and by the node's dev mode.

use crate::client::{LedgerClient, VoteCastStream};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::broadcast;
use vote_types::{
    LedgerError, Receipt, TxHandle, TxHash, VerificationHash, VoteCastEvent, VoteSubmission,
};

#[derive(Default)]
struct LedgerState {
    /// Simulated reachability
    reachable: bool,
    /// Chain height, one block per accepted vote
    height: u64,
    /// Durable votes by verification hash
    votes: HashMap<VerificationHash, Receipt>,
    /// Receipts by transaction hash
    receipts: HashMap<TxHash, Receipt>,
    /// Fail this many upcoming submissions of any vote
    fail_next: u32,
    /// Per-hash submission failures still to inject
    fail_for: HashMap<VerificationHash, u32>,
    /// Fail every submission
    fail_all: bool,
    /// Confirmations never arrive
    withhold_confirmations: bool,
    /// Finalize this many upcoming confirmations as reverted
    revert_next: u32,
    /// Candidates the contract rejects outright
    rejected_candidates: HashSet<u64>,
    /// Submission attempts, including injected failures
    submit_calls: u64,
    /// Duplicate checks served
    has_voted_calls: u64,
}

/// Deterministic in-memory ledger
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    events: broadcast::Sender<Result<VoteCastEvent, LedgerError>>,
}

impl MemoryLedger {
    /// Create a reachable, empty ledger
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(LedgerState {
                reachable: true,
                ..Default::default()
            }),
            events,
        }
    }

    /// Toggle simulated reachability
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    /// Fail the next `count` submissions regardless of vote
    pub fn fail_next_submissions(&self, count: u32) {
        self.state.lock().fail_next = count;
    }

    /// Fail the next `count` submissions of one specific vote
    pub fn fail_submissions_for(&self, hash: &VerificationHash, count: u32) {
        self.state.lock().fail_for.insert(hash.clone(), count);
    }

    /// Fail every submission until turned off
    pub fn set_fail_all_submissions(&self, fail: bool) {
        self.state.lock().fail_all = fail;
    }

    /// Accept submissions but never confirm them
    pub fn set_withhold_confirmations(&self, withhold: bool) {
        self.state.lock().withhold_confirmations = withhold;
    }

    /// Revert the next `count` confirmed transactions. A reverted vote is
    /// dropped from the ledger and can be submitted again.
    pub fn revert_next_confirmations(&self, count: u32) {
        self.state.lock().revert_next = count;
    }

    /// Make the contract reject votes for a candidate
    pub fn reject_candidate(&self, candidate_id: u64) {
        self.state.lock().rejected_candidates.insert(candidate_id);
    }

    /// Terminate every open vote-cast subscription with an error
    pub fn break_subscriptions(&self, reason: &str) {
        let _ = self
            .events
            .send(Err(LedgerError::Subscription(reason.to_string())));
    }

    /// Number of submission attempts seen so far
    pub fn submission_attempts(&self) -> u64 {
        self.state.lock().submit_calls
    }

    /// Number of duplicate checks seen so far
    pub fn has_voted_calls(&self) -> u64 {
        self.state.lock().has_voted_calls
    }

    /// Number of durable votes
    pub fn vote_count(&self) -> usize {
        self.state.lock().votes.len()
    }

    /// Receipt of the durable vote for a hash, if any
    pub fn receipt_for(&self, hash: &VerificationHash) -> Option<Receipt> {
        self.state.lock().votes.get(hash).cloned()
    }

    fn check_reachable(state: &LedgerState) -> Result<(), LedgerError> {
        if state.reachable {
            Ok(())
        } else {
            Err(LedgerError::Unreachable("memory ledger offline".to_string()))
        }
    }

    fn tx_hash_for(vote: &VoteSubmission, height: u64) -> TxHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(vote.verification_hash.as_str().as_bytes());
        hasher.update(&vote.candidate_id.to_le_bytes());
        hasher.update(&vote.polling_unit_id.to_le_bytes());
        hasher.update(&height.to_le_bytes());
        TxHash::new(format!("0x{}", hasher.finalize().to_hex()))
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn submit_vote(&self, vote: &VoteSubmission) -> Result<TxHandle, LedgerError> {
        let (handle, event) = {
            let mut state = self.state.lock();
            Self::check_reachable(&state)?;
            state.submit_calls += 1;

            if state.fail_all {
                return Err(LedgerError::Submission("injected failure".to_string()));
            }
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(LedgerError::Submission("injected failure".to_string()));
            }
            if let Some(remaining) = state.fail_for.get_mut(&vote.verification_hash) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(LedgerError::Submission("injected failure".to_string()));
                }
            }
            if state.rejected_candidates.contains(&vote.candidate_id) {
                return Err(LedgerError::Rejected(format!(
                    "invalid candidate {}",
                    vote.candidate_id
                )));
            }
            if state.votes.contains_key(&vote.verification_hash) {
                return Err(LedgerError::AlreadyVoted);
            }

            let submitted_at_height = state.height;
            state.height += 1;
            let receipt = Receipt {
                tx_hash: Self::tx_hash_for(vote, state.height),
                block_number: state.height,
            };
            state
                .votes
                .insert(vote.verification_hash.clone(), receipt.clone());
            state
                .receipts
                .insert(receipt.tx_hash.clone(), receipt.clone());

            let event = VoteCastEvent {
                verification_hash: vote.verification_hash.clone(),
                polling_unit_id: vote.polling_unit_id,
                candidate_id: vote.candidate_id,
                tx_hash: receipt.tx_hash.clone(),
                block_number: receipt.block_number,
            };
            let handle = TxHandle {
                tx_hash: receipt.tx_hash,
                submitted_at_height,
            };
            (handle, event)
        };

        // No subscribers is fine
        let _ = self.events.send(Ok(event));
        Ok(handle)
    }

    async fn has_voted(&self, verification_hash: &VerificationHash) -> Result<bool, LedgerError> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        state.has_voted_calls += 1;
        Ok(state.votes.contains_key(verification_hash))
    }

    async fn await_confirmation(
        &self,
        handle: &TxHandle,
        timeout: Duration,
    ) -> Result<Receipt, LedgerError> {
        let (withhold, receipt) = {
            let mut state = self.state.lock();
            Self::check_reachable(&state)?;

            if state.revert_next > 0 && state.receipts.contains_key(&handle.tx_hash) {
                state.revert_next -= 1;
                state.receipts.remove(&handle.tx_hash);
                state.votes.retain(|_, r| r.tx_hash != handle.tx_hash);
                return Err(LedgerError::Reverted(handle.tx_hash.clone()));
            }

            (
                state.withhold_confirmations,
                state.receipts.get(&handle.tx_hash).cloned(),
            )
        };

        if withhold {
            tokio::time::sleep(timeout).await;
            return Err(LedgerError::ConfirmationTimeout(timeout));
        }

        receipt.ok_or_else(|| LedgerError::NotFinalized(handle.tx_hash.clone()))
    }

    async fn current_height(&self) -> Result<u64, LedgerError> {
        let state = self.state.lock();
        Self::check_reachable(&state)?;
        Ok(state.height)
    }

    async fn subscribe_vote_cast(&self) -> Result<VoteCastStream, LedgerError> {
        Self::check_reachable(&self.state.lock())?;

        let rx = self.events.subscribe();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(item) => return Some((item, rx)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Vote-cast subscriber lagged {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
