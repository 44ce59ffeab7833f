//! Sync Flow Integration Tests
//!
//! Exercises the store, queue, sync manager and orchestrator together against
//! the in-memory ledger:
//! - Crash recovery without double submission
//! - No vote loss across a disconnection
//! - Bounded retries per cycle
//! - Mixed success and failure within one cycle
//! - Reverted finality keeps the vote queued
//! - No submission after stop

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use ledger_bridge::{ConnectionMonitor, LedgerClient, MemoryLedger, MonitorConfig};
use parking_lot::Mutex;
use tempfile::tempdir;
use vote_types::{LedgerError, SyncedTx, VerificationHash, VoteSubmission};

use crate::{
    config::{OrchestratorConfig, SyncConfig},
    observer::{CycleSummary, SyncObserver},
    orchestrator::{CastOutcome, VoteOrchestrator},
    persistence::SledVoteStore,
    store::{LocalVoteRecord, MemoryVoteStore, VoteStatus, VoteStore},
    sync_manager::SyncManager,
};

/// Records everything the sync manager reports
#[derive(Default)]
struct RecordingObserver {
    synced: Mutex<Vec<(VerificationHash, SyncedTx)>>,
    failed: Mutex<Vec<(VerificationHash, LedgerError)>>,
    cycles: AtomicUsize,
}

impl SyncObserver for RecordingObserver {
    fn on_vote_synced(&self, vote: &VoteSubmission, tx: &SyncedTx) {
        self.synced
            .lock()
            .push((vote.verification_hash.clone(), tx.clone()));
    }

    fn on_vote_failed(&self, vote: &VoteSubmission, error: &LedgerError) {
        self.failed
            .lock()
            .push((vote.verification_hash.clone(), error.clone()));
    }

    fn on_cycle_complete(&self, _summary: &CycleSummary) {
        self.cycles.fetch_add(1, Ordering::SeqCst);
    }
}

fn test_config() -> SyncConfig {
    SyncConfig::default()
        .with_sync_interval(Duration::from_millis(100))
        .with_max_retries(3)
        .with_retry_backoff(Duration::from_millis(5))
        .with_confirmation_timeout(Duration::from_secs(1))
}

fn vote(hash: &str, candidate_id: u64) -> VoteSubmission {
    VoteSubmission::new(hash, format!("enc:{}", hash), 7, candidate_id)
}

fn record_and_enqueue(store: &dyn VoteStore, manager: &SyncManager, id: u64, v: VoteSubmission) {
    store.create(LocalVoteRecord::pending(id, v.clone())).unwrap();
    manager.enqueue(v);
}

#[tokio::test]
async fn test_abc_scenario_with_transient_rejections() {
    let ledger = Arc::new(MemoryLedger::new());
    let store = Arc::new(MemoryVoteStore::new());
    let manager = SyncManager::new(ledger.clone(), store.clone(), test_config());
    let observer = Arc::new(RecordingObserver::default());
    manager.add_observer(observer.clone());

    for (id, hash) in [(1, "A"), (2, "B"), (3, "C")] {
        record_and_enqueue(store.as_ref(), &manager, id, vote(hash, 1));
    }
    ledger.fail_submissions_for(&"B".into(), 2);

    let summary = manager.sync_now().await.unwrap();
    assert_eq!(summary.synced, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.remaining, 0);
    assert_eq!(manager.pending_count(), 0);

    // B needed three submissions and carries a real transaction
    assert_eq!(ledger.submission_attempts(), 5);
    let b = store.get(&"B".into()).unwrap().unwrap();
    assert_eq!(b.status, VoteStatus::Synced);
    assert_eq!(b.tx_hash, ledger.receipt_for(&"B".into()).map(|r| r.tx_hash));

    let synced = observer.synced.lock();
    assert_eq!(synced.len(), 3);
    assert!(synced
        .iter()
        .all(|(_, tx)| matches!(tx, SyncedTx::Confirmed(_))));
    assert!(observer.failed.lock().is_empty());
    assert_eq!(observer.cycles.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bounded_retry_per_cycle() {
    let ledger = Arc::new(MemoryLedger::new());
    let store = Arc::new(MemoryVoteStore::new());
    let manager = SyncManager::new(ledger.clone(), store.clone(), test_config());
    let observer = Arc::new(RecordingObserver::default());
    manager.add_observer(observer.clone());

    record_and_enqueue(store.as_ref(), &manager, 1, vote("X", 1));
    ledger.set_fail_all_submissions(true);

    let summary = manager.sync_now().await.unwrap();
    assert_eq!(summary.synced, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(ledger.submission_attempts(), 4);

    // Still queued, still pending, one failure reported
    let pending = manager.snapshot_pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].failed_cycles, 1);
    assert_eq!(
        store.get(&"X".into()).unwrap().unwrap().status,
        VoteStatus::Pending
    );
    assert_eq!(observer.failed.lock().len(), 1);

    // A second cycle makes another bounded round
    manager.sync_now().await.unwrap();
    assert_eq!(ledger.submission_attempts(), 8);

    ledger.set_fail_all_submissions(false);
    let summary = manager.sync_now().await.unwrap();
    assert_eq!(summary.synced, 1);
    assert_eq!(manager.pending_count(), 0);
}

#[tokio::test]
async fn test_counts_do_not_depend_on_order() {
    let hashes = ["p", "q", "r", "s", "t"];

    for reversed in [false, true] {
        let ledger = Arc::new(MemoryLedger::new());
        let store = Arc::new(MemoryVoteStore::new());
        let manager = SyncManager::new(ledger.clone(), store.clone(), test_config());

        // q and s never get through this cycle
        ledger.fail_submissions_for(&"q".into(), 100);
        ledger.fail_submissions_for(&"s".into(), 100);

        let mut order: Vec<_> = hashes.iter().enumerate().collect();
        if reversed {
            order.reverse();
        }
        for (id, hash) in order {
            record_and_enqueue(store.as_ref(), &manager, id as u64, vote(hash, 1));
        }

        let summary = manager.sync_now().await.unwrap();
        assert_eq!(summary.synced, 3, "reversed = {}", reversed);
        assert_eq!(summary.failed, 2, "reversed = {}", reversed);
        assert_eq!(manager.pending_count(), 2);
        assert_eq!(store.count_by_status(VoteStatus::Synced).unwrap(), 3);
    }
}

#[tokio::test]
async fn test_crash_after_submit_is_not_resubmitted() {
    let dir = tempdir().unwrap();
    let ledger = Arc::new(MemoryLedger::new());
    let v = vote("0xcrash", 2);

    // First run: record written, vote reached the ledger, process died
    // before the record was updated
    {
        let store = SledVoteStore::open(dir.path()).unwrap();
        store.create(LocalVoteRecord::pending(42, v.clone())).unwrap();
        store.flush().unwrap();
    }
    ledger.submit_vote(&v).await.unwrap();
    assert_eq!(ledger.submission_attempts(), 1);

    // Second run
    let store = Arc::new(SledVoteStore::open(dir.path()).unwrap());
    let manager = SyncManager::new(ledger.clone(), store.clone(), test_config());
    assert_eq!(manager.recover_from_store().unwrap(), 1);

    let summary = manager.sync_now().await.unwrap();
    assert_eq!(summary.synced, 1);
    assert_eq!(summary.already_recorded, 1);
    assert_eq!(ledger.submission_attempts(), 1);
    assert_eq!(ledger.vote_count(), 1);

    let record = store.get(&v.verification_hash).unwrap().unwrap();
    assert_eq!(record.status, VoteStatus::Synced);
    assert!(record.tx_hash.is_none());
}

#[tokio::test]
async fn test_crash_before_submit_is_recovered() {
    let dir = tempdir().unwrap();
    let ledger = Arc::new(MemoryLedger::new());

    {
        let store = SledVoteStore::open(dir.path()).unwrap();
        store.create(LocalVoteRecord::pending(1, vote("0x1", 1))).unwrap();
        store.create(LocalVoteRecord::pending(2, vote("0x2", 1))).unwrap();
        store.flush().unwrap();
    }

    let store = Arc::new(SledVoteStore::open(dir.path()).unwrap());
    let manager = SyncManager::new(ledger.clone(), store.clone(), test_config());
    manager.recover_from_store().unwrap();

    let summary = manager.sync_now().await.unwrap();
    assert_eq!(summary.synced, 2);
    assert_eq!(summary.already_recorded, 0);
    assert_eq!(ledger.vote_count(), 2);
    assert_eq!(store.count_by_status(VoteStatus::Pending).unwrap(), 0);
}

#[tokio::test]
async fn test_no_loss_across_disconnection() {
    let ledger = Arc::new(MemoryLedger::new());
    let store = Arc::new(MemoryVoteStore::new());
    let sync = Arc::new(SyncManager::new(ledger.clone(), store.clone(), test_config()));
    let monitor = Arc::new(ConnectionMonitor::new(ledger.clone(), MonitorConfig::default()));
    let orchestrator = VoteOrchestrator::new(
        ledger.clone(),
        store.clone(),
        sync.clone(),
        monitor,
        OrchestratorConfig::default(),
    );

    ledger.set_reachable(false);
    for i in 0..10u64 {
        let outcome = orchestrator
            .cast_vote(i, vote(&format!("0x{:02}", i), 1))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CastOutcome::Queued {
                position: i as usize + 1,
                degraded: false
            }
        );
    }

    // Sync while offline changes nothing
    assert!(sync.sync_now().await.is_err());
    assert_eq!(sync.pending_count(), 10);

    ledger.set_reachable(true);
    let summary = sync.sync_now().await.unwrap();
    assert_eq!(summary.synced, 10);
    assert_eq!(ledger.vote_count(), 10);
    assert_eq!(store.count_by_status(VoteStatus::Synced).unwrap(), 10);
}

#[tokio::test]
async fn test_concurrent_sync_does_not_double_submit() {
    let ledger = Arc::new(MemoryLedger::new());
    let store = Arc::new(MemoryVoteStore::new());
    let manager = Arc::new(SyncManager::new(ledger.clone(), store.clone(), test_config()));

    for i in 0..20u64 {
        record_and_enqueue(store.as_ref(), &manager, i, vote(&format!("c{}", i), 1));
    }

    let (first, second) = tokio::join!(manager.sync_now(), manager.sync_now());
    let total = first.unwrap().synced + second.unwrap().synced;

    assert_eq!(total, 20);
    assert_eq!(ledger.submission_attempts(), 20);
    assert_eq!(manager.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_loop_drains_after_reconnect() {
    let ledger = Arc::new(MemoryLedger::new());
    let store = Arc::new(MemoryVoteStore::new());
    let manager = Arc::new(SyncManager::new(ledger.clone(), store.clone(), test_config()));
    manager.start().unwrap();

    ledger.set_reachable(false);
    record_and_enqueue(store.as_ref(), &manager, 1, vote("late", 1));
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(manager.pending_count(), 1);
    assert_eq!(ledger.submission_attempts(), 0);

    ledger.set_reachable(true);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(manager.pending_count(), 0);
    assert_eq!(ledger.vote_count(), 1);

    manager.stop().await;
}

#[tokio::test]
async fn test_reverted_finality_stays_queued() {
    let ledger = Arc::new(MemoryLedger::new());
    let store = Arc::new(MemoryVoteStore::new());
    let manager = SyncManager::new(ledger.clone(), store.clone(), test_config());
    let observer = Arc::new(RecordingObserver::default());
    manager.add_observer(observer.clone());

    record_and_enqueue(store.as_ref(), &manager, 1, vote("R", 1));
    // Every attempt this cycle is accepted, then reverted at finality
    ledger.revert_next_confirmations(4);

    let summary = manager.sync_now().await.unwrap();
    assert_eq!(summary.synced, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(ledger.submission_attempts(), 4);

    let pending = manager.snapshot_pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].failed_cycles, 1);
    assert_eq!(
        store.get(&"R".into()).unwrap().unwrap().status,
        VoteStatus::Pending
    );
    {
        let failed = observer.failed.lock();
        assert_eq!(failed.len(), 1);
        assert!(matches!(failed[0].1, LedgerError::Reverted(_)));
    }

    let summary = manager.sync_now().await.unwrap();
    assert_eq!(summary.synced, 1);
    assert_eq!(ledger.vote_count(), 1);
    assert_eq!(
        store.get(&"R".into()).unwrap().unwrap().status,
        VoteStatus::Synced
    );
}

#[tokio::test(start_paused = true)]
async fn test_no_submission_starts_after_stop() {
    let ledger = Arc::new(MemoryLedger::new());
    let store = Arc::new(MemoryVoteStore::new());
    let config = test_config().with_retry_backoff(Duration::from_secs(5));
    let manager = Arc::new(SyncManager::new(ledger.clone(), store.clone(), config));

    ledger.set_fail_all_submissions(true);
    for (id, hash) in [(1, "s1"), (2, "s2"), (3, "s3")] {
        record_and_enqueue(store.as_ref(), &manager, id, vote(hash, 1));
    }

    manager.start().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let at_stop = ledger.submission_attempts();
    assert_eq!(at_stop, 1);

    let requested = tokio::time::Instant::now();
    manager.stop().await;
    assert!(requested.elapsed() < Duration::from_secs(1));
    assert!(!manager.is_running());

    // Nothing else reaches the ledger once stopped, even after the backoff
    ledger.set_fail_all_submissions(false);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(ledger.submission_attempts(), at_stop);
    assert_eq!(ledger.vote_count(), 0);
    assert_eq!(manager.pending_count(), 3);
    assert_eq!(store.count_by_status(VoteStatus::Pending).unwrap(), 3);
}
