//! Connection Monitor - Ledger reachability with edge-triggered notifications
//!
//! Probes the ledger's chain height on a fixed interval. Observers are told
//! about transitions only, never about every probe.

use crate::{
    client::LedgerClient,
    error::MonitorError,
    task::{BackgroundTask, StopSignal, TaskSlot},
    DEFAULT_PROBE_INTERVAL_MS,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::{sync::Arc, time::Duration};

/// Receives connectivity transitions.
///
/// Invoked synchronously on the probing task; implementations must not block.
pub trait ConnectionObserver: Send + Sync {
    /// Ledger went from reachable to unreachable
    fn on_disconnected(&self) {}

    /// Ledger went from unreachable to reachable
    fn on_reconnected(&self) {}
}

/// Connection monitor configuration
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Time between reachability probes
    pub probe_interval: Duration,
}

impl MonitorConfig {
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_millis(DEFAULT_PROBE_INTERVAL_MS),
        }
    }
}

/// Cached connectivity view (no probe performed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityStatus {
    pub connected: bool,
    /// Height seen on the last successful probe
    pub last_height: Option<u64>,
    /// Unix millis of the last probe
    pub last_probe_at: Option<i64>,
    pub disconnects: u64,
    pub reconnects: u64,
}

struct ConnectivityState {
    connected: bool,
    last_height: Option<u64>,
    last_probe_at: Option<i64>,
    disconnects: u64,
    reconnects: u64,
}

/// Periodic ledger reachability probe
pub struct ConnectionMonitor {
    ledger: Arc<dyn LedgerClient>,
    config: MonitorConfig,
    /// Last known state. Starts as connected, so an unreachable ledger at
    /// startup produces exactly one disconnect notification.
    state: Mutex<ConnectivityState>,
    observers: RwLock<Vec<Arc<dyn ConnectionObserver>>>,
    task: TaskSlot,
}

impl ConnectionMonitor {
    /// Create a new monitor (not started)
    pub fn new(ledger: Arc<dyn LedgerClient>, config: MonitorConfig) -> Self {
        Self {
            ledger,
            config,
            state: Mutex::new(ConnectivityState {
                connected: true,
                last_height: None,
                last_probe_at: None,
                disconnects: 0,
                reconnects: 0,
            }),
            observers: RwLock::new(Vec::new()),
            task: TaskSlot::new(),
        }
    }

    /// Register an observer for connectivity transitions
    pub fn add_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.write().push(observer);
    }

    /// Start probing on a background task
    pub fn start(self: &Arc<Self>) -> Result<(), MonitorError> {
        let monitor = Arc::clone(self);
        self.task.start_with("connection monitor", move || {
            BackgroundTask::spawn("connection monitor", move |stop| monitor.run(stop))
        })?;
        Ok(())
    }

    /// Stop probing. No probe starts after this returns.
    pub async fn stop(&self) {
        self.task.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Probe now and return the result.
    ///
    /// This performs a ledger round-trip and may fire a transition
    /// notification, so it is not free.
    pub async fn is_connected(&self) -> bool {
        self.probe().await
    }

    /// Last observed state, without probing
    pub fn last_known(&self) -> bool {
        self.state.lock().connected
    }

    /// Cached status snapshot
    pub fn status(&self) -> ConnectivityStatus {
        let state = self.state.lock();
        ConnectivityStatus {
            connected: state.connected,
            last_height: state.last_height,
            last_probe_at: state.last_probe_at,
            disconnects: state.disconnects,
            reconnects: state.reconnects,
        }
    }

    async fn run(self: Arc<Self>, mut stop: StopSignal) {
        let mut interval = tokio::time::interval(self.config.probe_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            "Connection monitor started ({}ms probe interval)",
            self.config.probe_interval.as_millis()
        );

        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = interval.tick() => {}
            }
            self.probe().await;
        }

        tracing::info!("Connection monitor stopped");
    }

    /// Any error means unreachable. The error itself is not propagated.
    async fn probe(&self) -> bool {
        let result = self.ledger.current_height().await;
        let reachable = result.is_ok();

        let transition = {
            let mut state = self.state.lock();
            state.last_probe_at = Some(chrono::Utc::now().timestamp_millis());
            if let Ok(height) = result {
                state.last_height = Some(height);
            }

            if state.connected == reachable {
                None
            } else {
                state.connected = reachable;
                if reachable {
                    state.reconnects += 1;
                } else {
                    state.disconnects += 1;
                }
                Some(reachable)
            }
        };

        if let Some(reconnected) = transition {
            let observers = self.observers.read().clone();
            if reconnected {
                tracing::debug!("Ledger connection restored");
                observers.iter().for_each(|o| o.on_reconnected());
            } else {
                tracing::debug!("Ledger connection lost");
                observers.iter().for_each(|o| o.on_disconnected());
            }
        }

        reachable
    }
}
