//! WebSocket Server
//!
//! Streams the event feed to clients that call `feedSubscribe`.

use crate::feed::{EventFeed, FeedEvent};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// WebSocket JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct WsJsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Subscription ID
pub type SubscriptionId = u64;

/// A connection's live subscription
struct Subscription {
    id: SubscriptionId,
    receiver: broadcast::Receiver<FeedEvent>,
}

/// WebSocket feed server
pub struct WebSocketServer {
    feed: Arc<EventFeed>,
    next_id: Arc<AtomicU64>,
}

impl WebSocketServer {
    pub fn new(feed: Arc<EventFeed>) -> Self {
        Self {
            feed,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Bind and run the server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Run on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!("WebSocket feed listening on {}", listener.local_addr()?);

        while let Ok((stream, peer_addr)) = listener.accept().await {
            let feed = self.feed.clone();
            let next_id = self.next_id.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, feed, next_id).await {
                    tracing::warn!("WebSocket connection error from {}: {}", peer_addr, e);
                }
            });
        }

        Ok(())
    }
}

/// Handle a single WebSocket connection
async fn handle_connection(
    stream: TcpStream,
    feed: Arc<EventFeed>,
    next_id: Arc<AtomicU64>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let mut subscription: Option<Subscription> = None;

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                let msg = match msg {
                    Some(msg) => msg?,
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        let request: WsJsonRpcRequest = match serde_json::from_str(&text) {
                            Ok(req) => req,
                            Err(_) => continue,
                        };
                        let response = handle_ws_method(&feed, &next_id, &request, &mut subscription);
                        ws_sender.send(Message::Text(serde_json::to_string(&response)?)).await?;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }

            event = next_event(&mut subscription) => {
                match (event, subscription.as_ref().map(|sub| sub.id)) {
                    (Some(event), Some(id)) => {
                        let notification = format_feed_notification(id, &event);
                        ws_sender.send(Message::Text(serde_json::to_string(&notification)?)).await?;
                    }
                    _ => subscription = None,
                }
            }
        }
    }

    Ok(())
}

/// Next event for the connection's subscription; pends forever without one
async fn next_event(subscription: &mut Option<Subscription>) -> Option<FeedEvent> {
    let Some(sub) = subscription.as_mut() else {
        return std::future::pending().await;
    };

    loop {
        match sub.receiver.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Feed subscription {} lagged {} events", sub.id, n);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Handle WebSocket JSON-RPC method
fn handle_ws_method(
    feed: &EventFeed,
    next_id: &AtomicU64,
    request: &WsJsonRpcRequest,
    subscription: &mut Option<Subscription>,
) -> Value {
    match request.method.as_str() {
        "feedSubscribe" => {
            // One subscription per connection; resubscribing returns the same id
            let id = match subscription {
                Some(sub) => sub.id,
                None => {
                    let id = next_id.fetch_add(1, Ordering::SeqCst);
                    *subscription = Some(Subscription {
                        id,
                        receiver: feed.subscribe(),
                    });
                    tracing::debug!("Created feed subscription {}", id);
                    id
                }
            };
            json!({
                "jsonrpc": "2.0",
                "id": request.id,
                "result": id
            })
        }

        "feedUnsubscribe" => {
            let params: Vec<Value> = serde_json::from_value(request.params.clone()).unwrap_or_default();
            match params.first().and_then(|v| v.as_u64()) {
                Some(id) => {
                    let success = subscription.as_ref().is_some_and(|sub| sub.id == id);
                    if success {
                        *subscription = None;
                        tracing::debug!("Removed feed subscription {}", id);
                    }
                    json!({
                        "jsonrpc": "2.0",
                        "id": request.id,
                        "result": success
                    })
                }
                None => error_response(&request.id, -32602, "Missing subscription ID"),
            }
        }

        _ => error_response(&request.id, -32601, &format!("Method not found: {}", request.method)),
    }
}

/// Create error response
fn error_response(id: &Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// Format feed notification for WebSocket
pub fn format_feed_notification(subscription_id: SubscriptionId, event: &FeedEvent) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "feedNotification",
        "params": {
            "result": event,
            "subscription": subscription_id
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;

    async fn next_json<S>(ws: &mut S) -> Value
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_receive() {
        let feed = Arc::new(EventFeed::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(WebSocketServer::new(feed.clone()).serve(listener));

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "feedSubscribe"});
        ws.send(Message::Text(request.to_string())).await.unwrap();

        let response = next_json(&mut ws).await;
        let sub_id = response["result"].as_u64().unwrap();

        feed.publish(FeedEvent::ConnectionRestored);
        let notification = next_json(&mut ws).await;
        assert_eq!(notification["method"], "feedNotification");
        assert_eq!(notification["params"]["subscription"], sub_id);
        assert_eq!(notification["params"]["result"]["event"], "connectionRestored");

        let request = json!({"jsonrpc": "2.0", "id": 2, "method": "feedUnsubscribe", "params": [sub_id]});
        ws.send(Message::Text(request.to_string())).await.unwrap();
        let response = next_json(&mut ws).await;
        assert_eq!(response["result"], true);
    }

    #[test]
    fn test_unknown_method() {
        let feed = EventFeed::default();
        let next_id = AtomicU64::new(1);
        let mut subscription = None;
        let request = WsJsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!(7),
            method: "accountSubscribe".to_string(),
            params: Value::Null,
        };

        let response = handle_ws_method(&feed, &next_id, &request, &mut subscription);
        assert_eq!(response["error"]["code"], -32601);
        assert!(subscription.is_none());
    }
}
