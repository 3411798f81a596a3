//! WebSocket upgrade handler and message dispatch.
//!
//! Clients send frames of the form
//!
//! ```json
//! {"id": 42, "request": {"kind": "getSummaries"}}
//! ```
//!
//! and receive exactly one `{"type": "reply", "id": 42, "response": ...}`
//! per frame. Replies may arrive in any order; match them by `id`. A frame
//! whose request kind is not recognized is logged and never answered.
//!
//! Every client also receives `{"type": "summaries_changed"}` after any store
//! mutation, whichever context made it.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use explainx::coordinator::CoordinatorHandle;
use explainx::protocol::Request;
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::broadcast::WsMessage;

/// Replies waiting to be written to one client.
const REPLY_QUEUE_CAPACITY: usize = 32;

/// Shared state for WebSocket handlers.
#[derive(Clone)]
pub struct WsState {
    pub handle: CoordinatorHandle,
    pub broadcast_tx: broadcast::Sender<WsMessage>,
}

/// A client frame before its request has been validated.
#[derive(Deserialize)]
struct ClientFrame {
    #[serde(default)]
    id: serde_json::Value,
    request: serde_json::Value,
}

/// GET /ws: WebSocket upgrade handler.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(ws_state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ws_state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, ws_state: WsState) {
    let (mut sink, mut stream) = socket.split();
    debug!("WebSocket client connected");

    let mut broadcast_rx = ws_state.broadcast_tx.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::channel::<WsMessage>(REPLY_QUEUE_CAPACITY);

    // One writer per connection: replies and broadcasts share the sink.
    let forward_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(msg) => msg,
                    None => break,
                },
                event = broadcast_rx.recv() => match event {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged by {n} messages");
                        WsMessage::SummariesChanged
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if ws_send(&mut sink, &msg).await.is_err() {
                break; // Client disconnected.
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                let Some((id, request)) = parse_client_frame(&text) else {
                    continue;
                };
                let handle = ws_state.handle.clone();
                let reply_tx = reply_tx.clone();
                // Each request is awaited on its own task so a slow summary
                // does not hold up this client's other requests.
                tokio::spawn(async move {
                    let response = handle.request(request).await;
                    let _ = reply_tx.send(WsMessage::Reply { id, response }).await;
                });
            }
            Message::Close(_) => break,
            _ => {} // Ignore binary, ping, pong.
        }
    }

    debug!("WebSocket client disconnected");
    forward_task.abort();
}

/// Parse a client frame into its correlation id and request.
///
/// Returns `None` for malformed frames and unknown request kinds; neither
/// gets a reply.
fn parse_client_frame(text: &str) -> Option<(serde_json::Value, Request)> {
    let Ok(frame) = serde_json::from_str::<ClientFrame>(text) else {
        debug!("Ignoring malformed WebSocket message");
        return None;
    };
    match serde_json::from_value::<Request>(frame.request) {
        Ok(request) => Some((frame.id, request)),
        Err(e) => {
            debug!("Ignoring unrecognized request (id {}): {e}", frame.id);
            None
        }
    }
}

/// Serialize a `WsMessage` and send it over the WebSocket sink.
async fn ws_send(sink: &mut SplitSink<WebSocket, Message>, msg: &WsMessage) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}
