//! Persistence Layer for local vote records
//!
//! Uses sled embedded database so pending votes survive restarts.
//! Records are bincode-encoded and keyed by verification hash.

use crate::{
    error::StoreError,
    store::{LocalVoteRecord, VoteStatus, VoteStore},
};
use sled::Db;
use std::path::Path;
use vote_types::VerificationHash;

/// Sled-backed vote store
pub struct SledVoteStore {
    /// Sled database instance
    db: Db,
    /// Vote records tree
    votes: sled::Tree,
}

impl SledVoteStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(&path)?;
        let votes = db.open_tree("votes")?;

        tracing::info!("Opened vote store at {:?} ({} records)", path.as_ref(), votes.len());

        Ok(Self { db, votes })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    fn decode(bytes: &[u8]) -> Result<LocalVoteRecord, StoreError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl VoteStore for SledVoteStore {
    fn create(&self, record: LocalVoteRecord) -> Result<(), StoreError> {
        let key = record.verification_hash().as_str().as_bytes().to_vec();
        let bytes = bincode::serialize(&record)?;

        match self.votes.compare_and_swap(key, None::<&[u8]>, Some(bytes))? {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::AlreadyExists(record.verification_hash().clone())),
        }
    }

    fn get(&self, hash: &VerificationHash) -> Result<Option<LocalVoteRecord>, StoreError> {
        match self.votes.get(hash.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn update(
        &self,
        hash: &VerificationHash,
        change: &mut dyn FnMut(&mut LocalVoteRecord),
    ) -> Result<LocalVoteRecord, StoreError> {
        let key = hash.as_str().as_bytes();

        // Optimistic read-modify-write; retry if another writer got there first
        loop {
            let current = self
                .votes
                .get(key)?
                .ok_or_else(|| StoreError::NotFound(hash.clone()))?;

            let mut record = Self::decode(&current)?;
            change(&mut record);
            let bytes = bincode::serialize(&record)?;

            if self
                .votes
                .compare_and_swap(key, Some(current), Some(bytes))?
                .is_ok()
            {
                return Ok(record);
            }
        }
    }

    fn list_by_status(&self, status: VoteStatus) -> Result<Vec<LocalVoteRecord>, StoreError> {
        let mut records = Vec::new();

        for result in self.votes.iter() {
            let (_, value) = result?;
            let record = Self::decode(&value)?;
            if record.status == status {
                records.push(record);
            }
        }

        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }
}
