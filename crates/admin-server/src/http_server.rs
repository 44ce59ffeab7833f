//! HTTP JSON-RPC Server
//!
//! Provides HTTP endpoint for the admin methods.

use crate::methods::{
    handle_cast_vote, handle_clear_pending_queue, handle_get_connectivity, handle_get_health,
    handle_get_pending_count, handle_get_pending_votes, handle_get_vote_status, handle_sync_now,
    AdminContext, CastVoteRequest, RpcError,
};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use vote_types::VerificationHash;

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// HTTP admin server
pub struct HttpAdminServer {
    context: Arc<AdminContext>,
}

impl HttpAdminServer {
    pub fn new(context: Arc<AdminContext>) -> Self {
        Self { context }
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

        Router::new()
            .route("/", post(handle_rpc))
            .layer(cors)
            .with_state(self.context)
    }

    /// Bind and run the server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Run on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!("HTTP admin server listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Handle JSON-RPC request
async fn handle_rpc(
    State(context): State<Arc<AdminContext>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let response = match dispatch_method(&context, &request.method, request.params).await {
        Ok(value) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: Some(value),
            error: None,
        },
        Err(e) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: None,
            error: Some(JsonRpcError {
                code: error_code(&e),
                message: e.to_string(),
            }),
        },
    };

    (StatusCode::OK, Json(response))
}

/// Dispatch to appropriate method handler
pub async fn dispatch_method(
    ctx: &AdminContext,
    method: &str,
    params: Value,
) -> Result<Value, RpcError> {
    tracing::debug!("Admin method called: {}", method);
    match method {
        "castVote" => {
            let request: CastVoteRequest = first_param(params)
                .ok_or_else(|| RpcError::InvalidParams("Missing vote".to_string()))
                .and_then(|v| {
                    serde_json::from_value(v)
                        .map_err(|e| RpcError::InvalidParams(format!("Invalid vote: {}", e)))
                })?;
            to_json(handle_cast_vote(ctx, request).await?)
        }

        "syncNow" => to_json(handle_sync_now(ctx).await?),

        "getPendingCount" => Ok(json!(handle_get_pending_count(ctx))),

        "getPendingVotes" => to_json(handle_get_pending_votes(ctx)),

        "clearPendingQueue" => Ok(json!(handle_clear_pending_queue(ctx))),

        "getConnectivity" => to_json(handle_get_connectivity(ctx)),

        "getVoteStatus" => {
            let hash = first_param(params)
                .as_ref()
                .and_then(|v| v.as_str())
                .map(VerificationHash::new)
                .ok_or_else(|| RpcError::InvalidParams("Missing verification hash".to_string()))?;
            to_json(handle_get_vote_status(ctx, &hash)?)
        }

        "getHealth" => to_json(handle_get_health(ctx)),

        "getVersion" => Ok(json!({
            "ballot-sync": env!("CARGO_PKG_VERSION"),
        })),

        _ => Err(RpcError::MethodNotFound(method.to_string())),
    }
}

/// First positional param
fn first_param(params: Value) -> Option<Value> {
    let params: Vec<Value> = serde_json::from_value(params).unwrap_or_default();
    params.into_iter().next()
}

fn to_json<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::InternalError(e.to_string()))
}

/// Map error to JSON-RPC error code
fn error_code(error: &RpcError) -> i32 {
    match error {
        RpcError::InvalidParams(_) => -32602,
        RpcError::MethodNotFound(_) => -32601,
        RpcError::InternalError(_) => -32603,
        RpcError::LedgerUnavailable(_) => -32001,
        RpcError::Busy => -32002,
    }
}
