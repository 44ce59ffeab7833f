//! Sync Manager - Drains the pending queue onto the ledger
//!
//! Every queued vote is eventually committed, and none is committed twice.
//! Each attempt re-checks the ledger for the verification hash before
//! submitting, because a vote may have landed before a crash or a caller-side
//! confirmation timeout. Local bookkeeping alone is never trusted for that.

use crate::{
    config::SyncConfig,
    error::SyncError,
    observer::{CycleSummary, SyncObserver},
    queue::{PendingQueue, PendingVote},
    store::{VoteStatus, VoteStore},
};
use ledger_bridge::{await_finality, BackgroundTask, LedgerClient, StopSignal, TaskSlot};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::{sync::Arc, time::Instant};
use vote_types::{LedgerError, SyncedTx, VoteSubmission};

const NAME: &str = "sync manager";

/// Lifetime counters
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub cycles: u64,
    pub total_synced: u64,
    pub total_failed: u64,
    pub last_cycle: Option<CycleSummary>,
}

/// Outcome of one vote within a cycle
enum VoteOutcome {
    Synced(SyncedTx),
    /// Retries exhausted, stays queued
    Retry(LedgerError),
    /// Ledger refused it for good
    Rejected(LedgerError),
}

/// Pending queue plus the retry engine that drains it
pub struct SyncManager {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn VoteStore>,
    queue: PendingQueue,
    config: SyncConfig,
    observers: RwLock<Vec<Arc<dyn SyncObserver>>>,
    stats: Mutex<SyncStats>,
    task: TaskSlot,
}

impl SyncManager {
    /// Create a new sync manager (loop not started)
    pub fn new(ledger: Arc<dyn LedgerClient>, store: Arc<dyn VoteStore>, config: SyncConfig) -> Self {
        Self {
            ledger,
            store,
            queue: PendingQueue::new(),
            config,
            observers: RwLock::new(Vec::new()),
            stats: Mutex::new(SyncStats::default()),
            task: TaskSlot::new(),
        }
    }

    /// Register a progress observer
    pub fn add_observer(&self, observer: Arc<dyn SyncObserver>) {
        self.observers.write().push(observer);
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Queue a vote for the next cycle and return its 1-based position
    pub fn enqueue(&self, vote: VoteSubmission) -> usize {
        let hash = vote.verification_hash.clone();
        let position = self.queue.push(vote);
        tracing::debug!("Queued vote {} at position {}", hash, position);
        position
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Point-in-time copy of the queue
    pub fn snapshot_pending(&self) -> Vec<PendingVote> {
        self.queue.snapshot()
    }

    /// Discard every queued vote without committing it.
    ///
    /// Destructive. For operational recovery only: the local records stay
    /// `pending` and will be re-queued by the next `recover_from_store`.
    ///
    /// Entries claimed by a running cycle are dropped too, but that cycle
    /// still finishes them. A hash enqueued again meanwhile can then be
    /// committed on two paths at once. Both check `has_voted` first and the
    /// ledger refuses a second vote for the same hash, so at most one lands
    /// and the other settles as already recorded.
    pub fn clear_pending(&self) -> usize {
        let cleared = self.queue.clear();
        tracing::warn!("Cleared {} votes from the pending queue", cleared);
        cleared
    }

    /// Re-queue every `pending` record in the local store.
    ///
    /// Run at startup so votes accepted before a crash are reconciled.
    pub fn recover_from_store(&self) -> Result<usize, SyncError> {
        let records = self.store.list_by_status(VoteStatus::Pending)?;
        let count = records.len();
        for record in records {
            self.queue.push(record.submission);
        }
        if count > 0 {
            tracing::info!("Recovered {} pending votes from the local store", count);
        }
        Ok(count)
    }

    /// Lifetime counters
    pub fn stats(&self) -> SyncStats {
        self.stats.lock().clone()
    }

    /// Start the periodic sync loop
    pub fn start(self: &Arc<Self>) -> Result<(), SyncError> {
        let manager = Arc::clone(self);
        self.task.start_with(NAME, move || {
            BackgroundTask::spawn(NAME, move |stop| manager.run(stop))
        })?;
        Ok(())
    }

    /// Stop the loop. A cycle in progress finishes its current ledger
    /// attempt, skips any remaining retries and leaves the rest queued.
    /// Idempotent.
    pub async fn stop(&self) {
        self.task.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Drain the queue now
    pub async fn sync_now(&self) -> Result<CycleSummary, SyncError> {
        self.run_cycle(None).await
    }

    /// Commit one vote, retrying transient failures up to `max_retries` times
    /// with a fixed backoff.
    pub async fn attempt_commit(&self, vote: &VoteSubmission) -> Result<SyncedTx, LedgerError> {
        self.commit_with_retries(vote, None).await
    }

    /// Retry loop behind `attempt_commit`. A stop request cuts the backoff
    /// short and starts no further attempt; the last error is returned.
    async fn commit_with_retries(
        &self,
        vote: &VoteSubmission,
        stop: Option<&StopSignal>,
    ) -> Result<SyncedTx, LedgerError> {
        let mut stop = stop.cloned();
        let mut attempt = 0;
        loop {
            let err = match self.commit_once(vote).await {
                Ok(tx) => return Ok(tx),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => e,
                Err(e) => return Err(e),
            };

            attempt += 1;
            tracing::debug!(
                "Vote {} attempt {} failed: {} (retrying in {}ms)",
                vote.verification_hash,
                attempt,
                err,
                self.config.retry_backoff.as_millis()
            );

            match stop.as_mut() {
                Some(stop) => {
                    tokio::select! {
                        biased;
                        _ = stop.stopped() => return Err(err),
                        _ = tokio::time::sleep(self.config.retry_backoff) => {}
                    }
                    if stop.is_stopped() {
                        return Err(err);
                    }
                }
                None => tokio::time::sleep(self.config.retry_backoff).await,
            }
        }
    }

    /// Duplicate check, submit, confirm. Strictly in that order.
    async fn commit_once(&self, vote: &VoteSubmission) -> Result<SyncedTx, LedgerError> {
        if self.ledger.has_voted(&vote.verification_hash).await? {
            return Ok(SyncedTx::AlreadyRecorded);
        }

        let handle = match self.ledger.submit_vote(vote).await {
            Ok(handle) => handle,
            // Another path got it on the ledger between the check and the submit
            Err(LedgerError::AlreadyVoted) => return Ok(SyncedTx::AlreadyRecorded),
            Err(e) => return Err(e),
        };

        let receipt =
            await_finality(self.ledger.as_ref(), &handle, self.config.confirmation_timeout).await?;
        Ok(SyncedTx::Confirmed(receipt))
    }

    async fn run(self: Arc<Self>, mut stop: StopSignal) {
        let mut interval = tokio::time::interval(self.config.sync_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            "Sync manager started ({}ms interval, {} retries, {}ms backoff)",
            self.config.sync_interval.as_millis(),
            self.config.max_retries,
            self.config.retry_backoff.as_millis()
        );

        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = interval.tick() => {}
            }

            // Idle: don't poll the ledger
            if self.queue.is_empty() {
                continue;
            }

            if let Err(e) = self.run_cycle(Some(&stop)).await {
                tracing::warn!("Sync cycle skipped: {}", e);
            }
        }

        tracing::info!("Sync manager stopped with {} votes pending", self.pending_count());
    }

    async fn run_cycle(&self, stop: Option<&StopSignal>) -> Result<CycleSummary, SyncError> {
        let started = Instant::now();
        let mut summary = CycleSummary::default();

        if self.queue.is_empty() {
            return Ok(summary);
        }

        self.ledger
            .current_height()
            .await
            .map_err(SyncError::LedgerUnavailable)?;

        let claimed = self.queue.claim_all();
        let mut votes = claimed.into_iter();

        while let Some(vote) = votes.next() {
            if stop.is_some_and(StopSignal::is_stopped) {
                self.queue.release(&vote.verification_hash);
                for rest in votes.by_ref() {
                    self.queue.release(&rest.verification_hash);
                }
                break;
            }

            let outcome = match self.commit_with_retries(&vote, stop).await {
                Ok(tx) => VoteOutcome::Synced(tx),
                Err(e) if e.is_retryable() => VoteOutcome::Retry(e),
                Err(e) => VoteOutcome::Rejected(e),
            };
            self.settle(&vote, outcome, &mut summary);
        }

        summary.remaining = self.queue.len();
        summary.duration_ms = started.elapsed().as_millis() as u64;

        {
            let mut stats = self.stats.lock();
            stats.cycles += 1;
            stats.total_synced += summary.synced as u64;
            stats.total_failed += summary.failed as u64;
            stats.last_cycle = Some(summary);
        }

        for observer in self.observers() {
            observer.on_cycle_complete(&summary);
        }

        Ok(summary)
    }

    /// Apply one vote's outcome to the store, the queue and the observers
    fn settle(&self, vote: &VoteSubmission, outcome: VoteOutcome, summary: &mut CycleSummary) {
        let hash = &vote.verification_hash;

        match outcome {
            VoteOutcome::Synced(tx) => {
                // The ledger is authoritative. If this write fails the record
                // stays pending and the next recovery reconciles it.
                if let Err(e) = self.store.mark_synced(hash, &tx) {
                    tracing::error!("Vote {} synced but local update failed: {}", hash, e);
                }
                self.queue.complete(hash);

                summary.synced += 1;
                if tx.is_already_recorded() {
                    summary.already_recorded += 1;
                }
                for observer in self.observers() {
                    observer.on_vote_synced(vote, &tx);
                }
            }
            VoteOutcome::Retry(e) => {
                self.queue.requeue(hash);
                summary.failed += 1;
                for observer in self.observers() {
                    observer.on_vote_failed(vote, &e);
                }
            }
            VoteOutcome::Rejected(e) => {
                if let Err(store_err) = self.store.mark_failed(hash, &e.to_string()) {
                    tracing::error!("Vote {} rejected but local update failed: {}", hash, store_err);
                }
                self.queue.complete(hash);
                summary.failed += 1;
                for observer in self.observers() {
                    observer.on_vote_failed(vote, &e);
                }
            }
        }
    }

    fn observers(&self) -> Vec<Arc<dyn SyncObserver>> {
        self.observers.read().clone()
    }
}
