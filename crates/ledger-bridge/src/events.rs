//! Event Monitor - Forwards ledger vote-cast notifications
//!
//! Single handler, no fan-out. A subscription error ends the delivery loop
//! instead of reconnecting, so a persistent contract mismatch stays visible.

use crate::{
    client::{LedgerClient, VoteCastStream},
    error::{AlreadyRunning, MonitorError},
    task::{BackgroundTask, StopSignal, TaskSlot},
};
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use vote_types::VoteCastEvent;

/// Handler for vote-cast events
pub type VoteCastCallback = Arc<dyn Fn(&VoteCastEvent) + Send + Sync>;

const NAME: &str = "event monitor";

/// Delivers ledger vote-cast events to one registered handler
pub struct EventMonitor {
    ledger: Arc<dyn LedgerClient>,
    callback: RwLock<Option<VoteCastCallback>>,
    delivered: AtomicU64,
    task: TaskSlot,
}

impl EventMonitor {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            ledger,
            callback: RwLock::new(None),
            delivered: AtomicU64::new(0),
            task: TaskSlot::new(),
        }
    }

    /// Replace the registered handler
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&VoteCastEvent) + Send + Sync + 'static,
    {
        *self.callback.write() = Some(Arc::new(callback));
    }

    /// Open the subscription and start delivering
    pub async fn start(self: &Arc<Self>) -> Result<(), MonitorError> {
        if self.task.is_running() {
            return Err(AlreadyRunning(NAME).into());
        }

        let stream = self
            .ledger
            .subscribe_vote_cast()
            .await
            .map_err(MonitorError::Subscribe)?;

        let monitor = Arc::clone(self);
        self.task.start_with(NAME, move || {
            BackgroundTask::spawn(NAME, move |stop| monitor.deliver(stream, stop))
        })?;

        tracing::info!("Subscribed to ledger vote-cast events");
        Ok(())
    }

    /// Cancel the subscription. Idempotent.
    pub async fn stop(&self) {
        self.task.stop().await;
    }

    /// Whether the delivery loop is alive
    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Events handed to the callback so far
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    async fn deliver(self: Arc<Self>, mut stream: VoteCastStream, mut stop: StopSignal) {
        loop {
            let item = tokio::select! {
                biased;
                _ = stop.stopped() => break,
                item = stream.next() => item,
            };

            match item {
                Some(Ok(event)) => {
                    tracing::debug!(
                        "Vote cast on ledger: {} in block {}",
                        event.verification_hash,
                        event.block_number
                    );
                    let callback = self.callback.read().clone();
                    if let Some(callback) = callback {
                        callback(&event);
                    }
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Some(Err(e)) => {
                    tracing::error!("Vote-cast subscription failed, delivery stopped: {}", e);
                    break;
                }
                None => {
                    tracing::warn!("Vote-cast subscription closed by ledger");
                    break;
                }
            }
        }
    }
}
