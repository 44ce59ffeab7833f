//! Ledger client capability
//!
//! The whole ledger surface is a single trait so callers can swap the RPC
//! gateway client for the in-memory ledger.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;
use vote_types::{LedgerError, Receipt, TxHandle, VerificationHash, VoteCastEvent, VoteSubmission};

/// Stream of ledger vote-cast notifications
pub type VoteCastStream = BoxStream<'static, Result<VoteCastEvent, LedgerError>>;

/// Remote, fallible access to the vote ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a vote transaction
    async fn submit_vote(&self, vote: &VoteSubmission) -> Result<TxHandle, LedgerError>;

    /// Check whether a verification hash has already voted
    async fn has_voted(&self, verification_hash: &VerificationHash) -> Result<bool, LedgerError>;

    /// Wait until a submitted transaction is final
    async fn await_confirmation(
        &self,
        handle: &TxHandle,
        timeout: Duration,
    ) -> Result<Receipt, LedgerError>;

    /// Current chain height
    async fn current_height(&self) -> Result<u64, LedgerError>;

    /// Subscribe to vote-cast notifications
    async fn subscribe_vote_cast(&self) -> Result<VoteCastStream, LedgerError>;
}

/// Wait for finality with a hard upper bound.
///
/// The bound is enforced here as well as by the client, so a client that
/// ignores its timeout argument still cannot stall the caller.
pub async fn await_finality(
    ledger: &dyn LedgerClient,
    handle: &TxHandle,
    timeout: Duration,
) -> Result<Receipt, LedgerError> {
    match tokio::time::timeout(timeout, ledger.await_confirmation(handle, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::ConfirmationTimeout(timeout)),
    }
}
