//! Shared types for vote submission and ledger synchronization
//!
//! These mirror what the ledger gateway sends and receives, so they are
//! serialized with camelCase field names on the wire.

pub mod error;

pub use error::LedgerError;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Idempotency key for a vote, derived from voter credentials.
///
/// Globally unique across elections. The ledger enforces one vote per hash,
/// and that rule is the source of truth for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationHash(String);

impl VerificationHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerificationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VerificationHash {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for VerificationHash {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Ledger transaction identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single vote moving between local storage, the pending queue and the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSubmission {
    /// Idempotency key
    pub verification_hash: VerificationHash,
    /// Opaque encrypted payload, never interpreted here
    pub encrypted_ballot: String,
    /// Polling unit the vote was cast in
    pub polling_unit_id: u64,
    /// Candidate voted for
    pub candidate_id: u64,
}

impl VoteSubmission {
    pub fn new(
        verification_hash: impl Into<VerificationHash>,
        encrypted_ballot: impl Into<String>,
        polling_unit_id: u64,
        candidate_id: u64,
    ) -> Self {
        Self {
            verification_hash: verification_hash.into(),
            encrypted_ballot: encrypted_ballot.into(),
            polling_unit_id,
            candidate_id,
        }
    }
}

/// Handle for a submitted, not yet finalized, transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHandle {
    pub tx_hash: TxHash,
    /// Chain height observed when the transaction was accepted
    pub submitted_at_height: u64,
}

/// Proof that a transaction reached finality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// Outcome of committing a vote to the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SyncedTx {
    /// Submitted by us and confirmed
    Confirmed(Receipt),
    /// The ledger already held a vote for this hash, nothing was submitted
    AlreadyRecorded,
}

impl SyncedTx {
    pub fn tx_hash(&self) -> Option<&TxHash> {
        match self {
            SyncedTx::Confirmed(receipt) => Some(&receipt.tx_hash),
            SyncedTx::AlreadyRecorded => None,
        }
    }

    pub fn block_number(&self) -> Option<u64> {
        match self {
            SyncedTx::Confirmed(receipt) => Some(receipt.block_number),
            SyncedTx::AlreadyRecorded => None,
        }
    }

    pub fn is_already_recorded(&self) -> bool {
        matches!(self, SyncedTx::AlreadyRecorded)
    }
}

/// Vote-cast notification emitted by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteCastEvent {
    pub verification_hash: VerificationHash,
    pub polling_unit_id: u64,
    pub candidate_id: u64,
    pub tx_hash: TxHash,
    pub block_number: u64,
}
