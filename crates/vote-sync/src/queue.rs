//! Pending vote queue
//!
//! FIFO of votes waiting for the ledger. Producers append, the sync loop
//! claims entries, then either completes them or sends them to the back.
//! A claimed entry is invisible to other claimers, so concurrent drains never
//! process the same vote twice.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use vote_types::{VerificationHash, VoteSubmission};

/// Read-only view of a queued vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingVote {
    pub submission: VoteSubmission,
    /// Unix millis
    pub enqueued_at: i64,
    /// Sync cycles this vote has failed so far
    pub failed_cycles: u32,
}

struct Entry {
    vote: PendingVote,
    in_flight: bool,
}

/// Thread-safe pending vote queue
#[derive(Default)]
pub struct PendingQueue {
    entries: Mutex<VecDeque<Entry>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a vote and return its 1-based position.
    ///
    /// A hash already in the queue is not added twice; its current position
    /// is returned instead.
    pub fn push(&self, submission: VoteSubmission) -> usize {
        let mut entries = self.entries.lock();
        if let Some(index) = Self::index_of(&entries, &submission.verification_hash) {
            return index + 1;
        }

        entries.push_back(Entry {
            vote: PendingVote {
                submission,
                enqueued_at: chrono::Utc::now().timestamp_millis(),
                failed_cycles: 0,
            },
            in_flight: false,
        });
        entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// 1-based position of a queued vote
    pub fn position(&self, hash: &VerificationHash) -> Option<usize> {
        Self::index_of(&self.entries.lock(), hash).map(|i| i + 1)
    }

    pub fn contains(&self, hash: &VerificationHash) -> bool {
        self.position(hash).is_some()
    }

    /// Point-in-time copy of the queue, in order
    pub fn snapshot(&self) -> Vec<PendingVote> {
        self.entries.lock().iter().map(|e| e.vote.clone()).collect()
    }

    /// Drop every entry, claimed or not. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Claim every unclaimed entry for processing
    pub(crate) fn claim_all(&self) -> Vec<VoteSubmission> {
        let mut entries = self.entries.lock();
        entries
            .iter_mut()
            .filter(|e| !e.in_flight)
            .map(|e| {
                e.in_flight = true;
                e.vote.submission.clone()
            })
            .collect()
    }

    /// Remove a claimed entry after it was committed or given up on
    pub(crate) fn complete(&self, hash: &VerificationHash) {
        let mut entries = self.entries.lock();
        if let Some(index) = Self::index_of(&entries, hash) {
            entries.remove(index);
        }
    }

    /// Unclaim a failed entry and move it to the back
    pub(crate) fn requeue(&self, hash: &VerificationHash) {
        let mut entries = self.entries.lock();
        if let Some(mut entry) = Self::index_of(&entries, hash).and_then(|i| entries.remove(i)) {
            entry.in_flight = false;
            entry.vote.failed_cycles += 1;
            entries.push_back(entry);
        }
    }

    /// Unclaim an entry that was never attempted, keeping its place
    pub(crate) fn release(&self, hash: &VerificationHash) {
        let mut entries = self.entries.lock();
        if let Some(index) = Self::index_of(&entries, hash) {
            entries[index].in_flight = false;
        }
    }

    fn index_of(entries: &VecDeque<Entry>, hash: &VerificationHash) -> Option<usize> {
        entries
            .iter()
            .position(|e| &e.vote.submission.verification_hash == hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(hash: &str) -> VoteSubmission {
        VoteSubmission::new(hash, "ballot", 1, 1)
    }

    #[test]
    fn test_push_positions_and_dedup() {
        let queue = PendingQueue::new();
        assert_eq!(queue.push(vote("a")), 1);
        assert_eq!(queue.push(vote("b")), 2);
        assert_eq!(queue.push(vote("a")), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.position(&"b".into()), Some(2));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let queue = PendingQueue::new();
        queue.push(vote("a"));
        let snapshot = queue.snapshot();

        queue.push(vote("b"));
        queue.clear();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].submission.verification_hash, "a".into());
    }

    #[test]
    fn test_claims_are_exclusive() {
        let queue = PendingQueue::new();
        queue.push(vote("a"));
        queue.push(vote("b"));

        let first = queue.claim_all();
        queue.push(vote("c"));
        let second = queue.claim_all();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].verification_hash, "c".into());
        assert!(queue.claim_all().is_empty());
    }

    #[test]
    fn test_requeue_moves_to_back() {
        let queue = PendingQueue::new();
        queue.push(vote("a"));
        queue.push(vote("b"));
        queue.claim_all();

        queue.requeue(&"a".into());
        queue.complete(&"b".into());

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].failed_cycles, 1);

        // Unclaimed again
        assert_eq!(queue.claim_all().len(), 1);
    }

    #[test]
    fn test_release_keeps_position() {
        let queue = PendingQueue::new();
        queue.push(vote("a"));
        queue.push(vote("b"));
        queue.claim_all();
        queue.release(&"a".into());

        assert_eq!(queue.position(&"a".into()), Some(1));
        assert_eq!(queue.snapshot()[0].failed_cycles, 0);
        assert_eq!(queue.claim_all().len(), 1);
    }
}
