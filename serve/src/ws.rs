//! WebSocket hub: best-effort fan-out of `{type, data}` frames.
//!
//! Order is preserved to any single subscriber but not across subscribers.
//! A failed or lagging subscriber is disconnected alone; the hub and other
//! subscribers are unaffected.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::app::AppState;

/// Broadcast capacity; slower subscribers than this get dropped.
const HUB_CAPACITY: usize = 256;

/// Fan-out hub shared by all request handlers.
#[derive(Clone)]
pub struct Hub {
    tx: broadcast::Sender<String>,
}

impl Hub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    /// Broadcasts one frame. No subscribers is not an error.
    pub fn send(&self, frame_type: &str, data: Value) {
        let frame = json!({ "type": frame_type, "data": data }).to_string();
        let _ = self.tx.send(frame);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(mut socket: WebSocket, hub: Hub) {
    let mut frames = hub.subscribe();
    hub.send("status", json!({ "state": "subscriber_connected" }));

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(text) => {
                    if socket.send(WsMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged; disconnecting it");
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Err(e) = answer_client_frame(&mut socket, &text).await {
                        debug!(error = %e, "ws reply failed");
                        break;
                    }
                }
                Some(Ok(WsMessage::Ping(payload))) => {
                    if socket.send(WsMessage::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "ws read error (client closed?)");
                    break;
                }
            },
        }
    }
    let _ = socket.close().await;
}

/// Answers client JSON frames; only pings are expected.
async fn answer_client_frame(
    socket: &mut WebSocket,
    text: &str,
) -> Result<(), axum::Error> {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        return Ok(());
    };
    if frame["type"] == "ping" {
        let pong = json!({ "type": "pong", "data": frame["data"].clone() }).to_string();
        socket.send(WsMessage::Text(pong)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_reach_subscribers_in_order() {
        let hub = Hub::new();
        let mut rx = hub.subscribe();
        hub.send("status", json!({"n": 1}));
        hub.send("status", json!({"n": 2}));
        let first: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        let second: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["data"]["n"], 1);
        assert_eq!(second["data"]["n"], 2);
    }

    #[tokio::test]
    async fn sending_without_subscribers_is_fine() {
        let hub = Hub::new();
        hub.send("system_metrics", json!({}));
        assert_eq!(hub.subscriber_count(), 0);
    }
}
