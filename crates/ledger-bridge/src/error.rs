//! Monitor lifecycle errors

use thiserror::Error;
use vote_types::LedgerError;

/// A background component was started twice without an intervening stop
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{0} is already running")]
pub struct AlreadyRunning(pub &'static str);

/// Errors from ConnectionMonitor and EventMonitor
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    AlreadyRunning(#[from] AlreadyRunning),

    #[error("failed to open vote-cast subscription: {0}")]
    Subscribe(#[source] LedgerError),
}
