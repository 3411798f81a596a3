//! Server-to-client WebSocket messages and the store-event forwarder.
//!
//! [`forward_store_events`] subscribes to the coordinator's
//! [`StoreEvent`] channel and re-broadcasts each event as a [`WsMessage`] to
//! every connected client, so open history viewers can re-read after a save,
//! delete, or clear made from another context.

use explainx::coordinator::{CoordinatorHandle, StoreEvent};
use explainx::protocol::Response;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A message sent from the server to WebSocket clients.
///
/// Discriminated on the `type` field when serialized to JSON.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// The single answer to a client frame, echoing the client's `id`.
    Reply {
        id: serde_json::Value,
        response: Response,
    },
    /// The summary history changed; re-read it.
    SummariesChanged,
}

impl From<StoreEvent> for WsMessage {
    fn from(event: StoreEvent) -> Self {
        match event {
            StoreEvent::SummariesChanged => WsMessage::SummariesChanged,
        }
    }
}

/// Spawn a task that relays coordinator store events to `sender`.
///
/// The task ends when the coordinator shuts down.
pub fn forward_store_events(
    handle: &CoordinatorHandle,
    sender: broadcast::Sender<WsMessage>,
) -> JoinHandle<()> {
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    // No subscribers is fine.
                    let _ = sender.send(event.into());
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Missed events all mean "re-read"; one notice covers them.
                    warn!("Store event relay lagged by {n} events");
                    let _ = sender.send(WsMessage::SummariesChanged);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Store event relay stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use explainx::error::Failure;
    use explainx::protocol::Reply;

    #[test]
    fn summaries_changed_wire_shape() {
        let json = serde_json::to_value(WsMessage::SummariesChanged).unwrap();
        assert_eq!(json, serde_json::json!({"type": "summaries_changed"}));
    }

    #[test]
    fn reply_wire_shape() {
        let msg = WsMessage::Reply {
            id: serde_json::json!(7),
            response: Response::Failure(Failure::CredentialMissing),
        };
        let json = serde_json::to_value(msg).unwrap();
        assert_eq!(json["type"], "reply");
        assert_eq!(json["id"], 7);
        assert_eq!(json["response"]["status"], "failure");
        assert_eq!(json["response"]["body"]["code"], "credentialMissing");

        let msg = WsMessage::Reply {
            id: serde_json::json!("abc"),
            response: Response::Success(Reply::Ack),
        };
        let json = serde_json::to_value(msg).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["response"]["status"], "success");
    }
}
