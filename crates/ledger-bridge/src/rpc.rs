//! RPC Ledger Client - Talks to the ledger gateway over JSON-RPC
//!
//! Request/response calls go over HTTP. The vote-cast feed uses a WebSocket
//! subscription, opened on demand.

use crate::client::{LedgerClient, VoteCastStream};
use async_trait::async_trait;
use futures::StreamExt;
use jsonrpsee::{
    core::client::{ClientT, Error as ClientError, SubscriptionClientT},
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
    ws_client::WsClientBuilder,
};
use serde::Deserialize;
use std::time::{Duration, Instant};
use vote_types::{
    LedgerError, Receipt, TxHandle, TxHash, VerificationHash, VoteCastEvent, VoteSubmission,
};

/// Gateway error code for a hash that already voted
const ALREADY_VOTED_CODE: i32 = -32010;
/// Gateway error code for a vote the contract refuses
const REJECTED_CODE: i32 = -32011;

/// RPC ledger client configuration
#[derive(Clone, Debug)]
pub struct RpcLedgerConfig {
    /// Gateway HTTP endpoint
    pub http_url: String,
    /// Gateway WebSocket endpoint for subscriptions
    pub ws_url: Option<String>,
    /// Timeout for a single request
    pub request_timeout: Duration,
    /// Delay between receipt polls while waiting for finality
    pub receipt_poll_interval: Duration,
}

impl RpcLedgerConfig {
    pub fn new(http_url: &str) -> Self {
        Self {
            http_url: http_url.to_string(),
            ws_url: None,
            request_timeout: Duration::from_secs(10),
            receipt_poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_ws_url(mut self, ws_url: &str) -> Self {
        self.ws_url = Some(ws_url.to_string());
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptResponse {
    tx_hash: TxHash,
    block_number: u64,
    finalized: bool,
    #[serde(default)]
    reverted: bool,
}

/// Ledger client backed by the JSON-RPC gateway
pub struct RpcLedgerClient {
    http: HttpClient,
    config: RpcLedgerConfig,
}

impl RpcLedgerClient {
    /// Build the HTTP client. No connection is made until the first call.
    pub fn connect(config: RpcLedgerConfig) -> Result<Self, LedgerError> {
        let http = HttpClientBuilder::default()
            .request_timeout(config.request_timeout)
            .build(&config.http_url)
            .map_err(map_client_error)?;

        tracing::info!("Ledger gateway client configured for {}", config.http_url);

        Ok(Self { http, config })
    }

    /// Gateway HTTP endpoint
    pub fn http_url(&self) -> &str {
        &self.config.http_url
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn submit_vote(&self, vote: &VoteSubmission) -> Result<TxHandle, LedgerError> {
        self.http
            .request("ledger_submitVote", rpc_params![vote])
            .await
            .map_err(map_client_error)
    }

    async fn has_voted(&self, verification_hash: &VerificationHash) -> Result<bool, LedgerError> {
        self.http
            .request("ledger_hasVoted", rpc_params![verification_hash])
            .await
            .map_err(map_client_error)
    }

    async fn await_confirmation(
        &self,
        handle: &TxHandle,
        timeout: Duration,
    ) -> Result<Receipt, LedgerError> {
        let deadline = Instant::now() + timeout;

        loop {
            let receipt: Option<ReceiptResponse> = self
                .http
                .request("ledger_getReceipt", rpc_params![&handle.tx_hash])
                .await
                .map_err(map_client_error)?;

            if let Some(receipt) = receipt.filter(|r| r.finalized) {
                // Gas or nonce trouble; the vote can be submitted again
                if receipt.reverted {
                    return Err(LedgerError::Reverted(receipt.tx_hash));
                }
                return Ok(Receipt {
                    tx_hash: receipt.tx_hash,
                    block_number: receipt.block_number,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LedgerError::ConfirmationTimeout(timeout));
            }
            let wait = self.config.receipt_poll_interval.min(deadline - now);
            tokio::time::sleep(wait).await;
        }
    }

    async fn current_height(&self) -> Result<u64, LedgerError> {
        self.http
            .request("ledger_blockNumber", rpc_params![])
            .await
            .map_err(map_client_error)
    }

    async fn subscribe_vote_cast(&self) -> Result<VoteCastStream, LedgerError> {
        let ws_url = self.config.ws_url.as_deref().ok_or_else(|| {
            LedgerError::Subscription("no WebSocket endpoint configured".to_string())
        })?;

        let client = WsClientBuilder::default()
            .request_timeout(self.config.request_timeout)
            .build(ws_url)
            .await
            .map_err(map_client_error)?;

        let subscription = client
            .subscribe::<VoteCastEvent, _>(
                "ledger_subscribeVoteCast",
                rpc_params![],
                "ledger_unsubscribeVoteCast",
            )
            .await
            .map_err(|e| LedgerError::Subscription(e.to_string()))?;

        // The client travels with the stream so the connection lives as long as it
        let stream = futures::stream::unfold(
            (client, subscription),
            |(client, mut subscription)| async move {
                let item = subscription.next().await?;
                let item = item.map_err(|e| LedgerError::Subscription(e.to_string()));
                Some((item, (client, subscription)))
            },
        );

        Ok(Box::pin(stream))
    }
}

fn map_client_error(error: ClientError) -> LedgerError {
    match error {
        ClientError::Call(err) => match err.code() {
            ALREADY_VOTED_CODE => LedgerError::AlreadyVoted,
            REJECTED_CODE => LedgerError::Rejected(err.message().to_string()),
            _ => LedgerError::Submission(err.message().to_string()),
        },
        ClientError::RequestTimeout => {
            LedgerError::Unreachable("gateway request timed out".to_string())
        }
        ClientError::Transport(e) => LedgerError::Unreachable(e.to_string()),
        ClientError::RestartNeeded(e) => LedgerError::Unreachable(e.to_string()),
        other => LedgerError::Transport(other.to_string()),
    }
}
