//! Admin Server - JSON-RPC and WebSocket surface for the sync node
//!
//! Provides:
//! - HTTP JSON-RPC: castVote, syncNow, getPendingCount, clearPendingQueue, getConnectivity, etc.
//! - WebSocket: feedSubscribe, feedUnsubscribe

pub mod feed;
pub mod http_server;
pub mod methods;
pub mod ws_server;

pub use feed::{EventFeed, FeedEvent};
pub use http_server::HttpAdminServer;
pub use methods::{AdminContext, RpcError};
pub use ws_server::WebSocketServer;

/// Admin server configuration
#[derive(Clone, Debug)]
pub struct AdminServerConfig {
    /// HTTP RPC bind address
    pub http_addr: String,
    /// WebSocket bind address
    pub ws_addr: String,
}

impl Default for AdminServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:7545".to_string(),
            ws_addr: "127.0.0.1:7546".to_string(),
        }
    }
}
