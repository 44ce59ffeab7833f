//! Local vote records
//!
//! The relational store of the wider backend sits behind `VoteStore`. Records
//! are keyed by verification hash and are never deleted by this crate.

use crate::error::StoreError;
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vote_types::{SyncedTx, TxHash, VerificationHash, VoteSubmission};

/// Local record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteStatus {
    /// Accepted, not yet confirmed on the ledger
    Pending,
    /// Confirmed on the ledger (terminal)
    Synced,
    /// Rejected by the ledger, will not be retried
    Failed,
}

/// A vote as recorded locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalVoteRecord {
    /// Caller-assigned record id
    pub id: u64,
    pub submission: VoteSubmission,
    pub status: VoteStatus,
    /// Ledger transaction, absent when the ledger already held the vote
    pub tx_hash: Option<TxHash>,
    pub block_number: Option<u64>,
    pub failure_reason: Option<String>,
    /// Unix millis
    pub created_at: i64,
    /// Unix millis
    pub updated_at: i64,
}

impl LocalVoteRecord {
    /// New record in the initial `pending` state
    pub fn pending(id: u64, submission: VoteSubmission) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id,
            submission,
            status: VoteStatus::Pending,
            tx_hash: None,
            block_number: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn verification_hash(&self) -> &VerificationHash {
        &self.submission.verification_hash
    }
}

/// Local persistence capability
pub trait VoteStore: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` if the hash is taken.
    fn create(&self, record: LocalVoteRecord) -> Result<(), StoreError>;

    /// Read a record
    fn get(&self, hash: &VerificationHash) -> Result<Option<LocalVoteRecord>, StoreError>;

    /// Apply `change` to a record and return the updated copy.
    ///
    /// `change` may run more than once under contention.
    fn update(
        &self,
        hash: &VerificationHash,
        change: &mut dyn FnMut(&mut LocalVoteRecord),
    ) -> Result<LocalVoteRecord, StoreError>;

    /// All records with the given status
    fn list_by_status(&self, status: VoteStatus) -> Result<Vec<LocalVoteRecord>, StoreError>;

    /// Number of records with the given status
    fn count_by_status(&self, status: VoteStatus) -> Result<usize, StoreError> {
        Ok(self.list_by_status(status)?.len())
    }

    /// Highest record id in the store, 0 when empty
    fn max_record_id(&self) -> Result<u64, StoreError> {
        let mut max = 0;
        for status in [VoteStatus::Pending, VoteStatus::Synced, VoteStatus::Failed] {
            for record in self.list_by_status(status)? {
                max = max.max(record.id);
            }
        }
        Ok(max)
    }

    /// Mark a record synced with its ledger transaction
    fn mark_synced(&self, hash: &VerificationHash, tx: &SyncedTx) -> Result<(), StoreError> {
        self.update(hash, &mut |record| {
            record.status = VoteStatus::Synced;
            if let SyncedTx::Confirmed(receipt) = tx {
                record.tx_hash = Some(receipt.tx_hash.clone());
                record.block_number = Some(receipt.block_number);
            }
            record.failure_reason = None;
            record.updated_at = chrono::Utc::now().timestamp_millis();
        })?;
        Ok(())
    }

    /// Mark a record failed. A synced record is never downgraded.
    fn mark_failed(&self, hash: &VerificationHash, reason: &str) -> Result<(), StoreError> {
        self.update(hash, &mut |record| {
            if record.status != VoteStatus::Synced {
                record.status = VoteStatus::Failed;
                record.failure_reason = Some(reason.to_string());
                record.updated_at = chrono::Utc::now().timestamp_millis();
            }
        })?;
        Ok(())
    }
}

/// In-memory vote store
#[derive(Clone, Default)]
pub struct MemoryVoteStore {
    records: Arc<DashMap<VerificationHash, LocalVoteRecord>>,
}

impl MemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl VoteStore for MemoryVoteStore {
    fn create(&self, record: LocalVoteRecord) -> Result<(), StoreError> {
        match self.records.entry(record.verification_hash().clone()) {
            Entry::Occupied(entry) => Err(StoreError::AlreadyExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }

    fn get(&self, hash: &VerificationHash) -> Result<Option<LocalVoteRecord>, StoreError> {
        Ok(self.records.get(hash).map(|r| r.value().clone()))
    }

    fn update(
        &self,
        hash: &VerificationHash,
        change: &mut dyn FnMut(&mut LocalVoteRecord),
    ) -> Result<LocalVoteRecord, StoreError> {
        let mut record = self
            .records
            .get_mut(hash)
            .ok_or_else(|| StoreError::NotFound(hash.clone()))?;
        change(record.value_mut());
        Ok(record.value().clone())
    }

    fn list_by_status(&self, status: VoteStatus) -> Result<Vec<LocalVoteRecord>, StoreError> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.value().status == status)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }
}
