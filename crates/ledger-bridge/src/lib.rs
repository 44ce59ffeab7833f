//! Ledger Bridge - Ledger access and connection resilience
//!
//! Handles everything that talks to the external vote ledger:
//! - The `LedgerClient` capability and its implementations
//! - Reachability probing with edge-triggered notifications
//! - Forwarding ledger vote-cast events to an observer

pub mod client;
pub mod connection;
pub mod error;
pub mod events;
pub mod memory;
pub mod rpc;
pub mod task;

pub use client::{await_finality, LedgerClient, VoteCastStream};
pub use connection::{ConnectionMonitor, ConnectionObserver, ConnectivityStatus, MonitorConfig};
pub use error::{AlreadyRunning, MonitorError};
pub use events::{EventMonitor, VoteCastCallback};
pub use memory::MemoryLedger;
pub use rpc::{RpcLedgerClient, RpcLedgerConfig};
pub use task::{BackgroundTask, StopSignal, TaskSlot};

/// Default interval between reachability probes in milliseconds
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 10_000;
