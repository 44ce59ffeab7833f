//! Ledger errors

use crate::TxHash;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a ledger client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger unreachable: {0}")]
    Unreachable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("submission failed: {0}")]
    Submission(String),

    #[error("confirmation timed out after {0:?}")]
    ConfirmationTimeout(Duration),

    #[error("transaction {0} did not reach finality")]
    NotFinalized(TxHash),

    /// Finalized but reverted; the vote was not recorded
    #[error("transaction {0} reverted")]
    Reverted(TxHash),

    #[error("voter has already voted")]
    AlreadyVoted,

    #[error("rejected by ledger: {0}")]
    Rejected(String),

    #[error("vote-cast subscription failed: {0}")]
    Subscription(String),
}

impl LedgerError {
    /// Whether retrying the same operation later can succeed.
    ///
    /// Duplicate votes and contract rejections are terminal.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LedgerError::AlreadyVoted | LedgerError::Rejected(_))
    }
}
