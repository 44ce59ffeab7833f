//! Vote sync errors

use ledger_bridge::AlreadyRunning;
use thiserror::Error;
use vote_types::{LedgerError, VerificationHash};

/// Local vote store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("vote record {0} already exists")]
    AlreadyExists(VerificationHash),

    #[error("vote record {0} not found")]
    NotFound(VerificationHash),

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Sync manager errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    AlreadyRunning(#[from] AlreadyRunning),

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(#[source] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors that stop a vote from being accepted at all
#[derive(Error, Debug)]
pub enum CastError {
    #[error("failed to record vote locally: {0}")]
    Store(#[from] StoreError),
}
