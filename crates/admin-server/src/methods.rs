//! Admin Methods - JSON-RPC method handlers
//!
//! Vote intake plus the operational surface of the sync subsystem.

use crate::feed::EventFeed;
use ledger_bridge::{ConnectionMonitor, ConnectivityStatus};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use vote_sync::{
    CastError, CastOutcome, CycleSummary, LocalVoteRecord, PendingVote, StoreError, SyncError,
    SyncManager, VoteOrchestrator, VoteStore,
};
use vote_types::{VerificationHash, VoteSubmission};

/// Context shared across handlers
pub struct AdminContext {
    pub orchestrator: Arc<VoteOrchestrator>,
    pub sync: Arc<SyncManager>,
    pub monitor: Arc<ConnectionMonitor>,
    pub store: Arc<dyn VoteStore>,
    pub feed: Arc<EventFeed>,
    /// Next id for votes cast without one. Always above every id seen so
    /// far, whether allocated here or supplied by a caller.
    next_record_id: AtomicU64,
}

impl AdminContext {
    pub fn new(
        orchestrator: Arc<VoteOrchestrator>,
        sync: Arc<SyncManager>,
        monitor: Arc<ConnectionMonitor>,
        store: Arc<dyn VoteStore>,
        feed: Arc<EventFeed>,
    ) -> Result<Self, StoreError> {
        let next_record_id = store.max_record_id()? + 1;

        Ok(Self {
            orchestrator,
            sync,
            monitor,
            store,
            feed,
            next_record_id: AtomicU64::new(next_record_id),
        })
    }

    fn allocate_record_id(&self) -> u64 {
        self.next_record_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Keep allocation clear of an id chosen by the caller
    fn observe_record_id(&self, id: u64) {
        self.next_record_id
            .fetch_max(id.saturating_add(1), Ordering::SeqCst);
    }
}

// ============ Request/Response Types ============

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    /// Id of the caller's own record, allocated here when absent
    #[serde(default)]
    pub record_id: Option<u64>,
    #[serde(flatten)]
    pub vote: VoteSubmission,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// "ok" while the ledger is reachable, "degraded" otherwise
    pub status: String,
    pub connected: bool,
    pub pending: usize,
    pub sync_running: bool,
}

// ============ Admin Handlers ============

/// Handle castVote
pub async fn handle_cast_vote(
    ctx: &AdminContext,
    request: CastVoteRequest,
) -> Result<CastOutcome, RpcError> {
    if request.vote.verification_hash.as_str().is_empty() {
        return Err(RpcError::InvalidParams("Empty verification hash".to_string()));
    }

    let record_id = match request.record_id {
        Some(id) => {
            ctx.observe_record_id(id);
            id
        }
        None => ctx.allocate_record_id(),
    };

    Ok(ctx.orchestrator.cast_vote(record_id, request.vote).await?)
}

/// Handle syncNow
pub async fn handle_sync_now(ctx: &AdminContext) -> Result<CycleSummary, RpcError> {
    Ok(ctx.sync.sync_now().await?)
}

/// Handle getPendingCount
pub fn handle_get_pending_count(ctx: &AdminContext) -> usize {
    ctx.sync.pending_count()
}

/// Handle getPendingVotes
pub fn handle_get_pending_votes(ctx: &AdminContext) -> Vec<PendingVote> {
    ctx.sync.snapshot_pending()
}

/// Handle clearPendingQueue
pub fn handle_clear_pending_queue(ctx: &AdminContext) -> usize {
    ctx.sync.clear_pending()
}

/// Handle getConnectivity. Cached; never probes.
pub fn handle_get_connectivity(ctx: &AdminContext) -> ConnectivityStatus {
    ctx.monitor.status()
}

/// Handle getVoteStatus
pub fn handle_get_vote_status(
    ctx: &AdminContext,
    hash: &VerificationHash,
) -> Result<Option<LocalVoteRecord>, RpcError> {
    ctx.store
        .get(hash)
        .map_err(|e| RpcError::InternalError(e.to_string()))
}

/// Handle getHealth
pub fn handle_get_health(ctx: &AdminContext) -> HealthReport {
    let connected = ctx.monitor.last_known();
    HealthReport {
        status: if connected { "ok" } else { "degraded" }.to_string(),
        connected,
        pending: ctx.sync.pending_count(),
        sync_running: ctx.sync.is_running(),
    }
}

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),
    #[error("Sync already running")]
    Busy,
}

impl From<CastError> for RpcError {
    fn from(e: CastError) -> Self {
        RpcError::InternalError(e.to_string())
    }
}

impl From<SyncError> for RpcError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::LedgerUnavailable(inner) => RpcError::LedgerUnavailable(inner.to_string()),
            SyncError::AlreadyRunning(_) => RpcError::Busy,
            SyncError::Store(inner) => RpcError::InternalError(inner.to_string()),
        }
    }
}
