//! Phoenix-channel websocket client for the backend's change feed.
//!
//! One channel task per subscription: joins the table topic, heartbeats,
//! decodes row-change frames into [`FeedEvent`]s, and reports any socket or
//! channel failure as a terminal `Closed` event. Re-subscription policy
//! lives with the controllers, not here.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

use crate::domain::events::{ChangeEvent, FeedEvent};
use crate::domain::message::MessageId;
use crate::sync::contracts::{RemoteStoreError, SubscribeScope, SyncSubscription};

use super::types::{MessageRow, PhoenixIn, PhoenixOut, RealtimeChange};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const HEARTBEAT_TOPIC: &str = "phoenix";
const EVENT_CAPACITY: usize = 64;

const CHANNEL_STARTED: &str = "REALTIME_CHANNEL_STARTED";
const CHANNEL_STOPPED: &str = "REALTIME_CHANNEL_STOPPED";
const FRAME_DECODE_FAILED: &str = "REALTIME_FRAME_DECODE_FAILED";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(super) fn websocket_url(base_url: &str, anon_key: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_owned()
    };

    format!(
        "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        urlencoding::encode(anon_key)
    )
}

pub(super) fn topic_for(scope: &SubscribeScope) -> String {
    match scope {
        SubscribeScope::Conversations => "realtime:public:conversations".to_owned(),
        SubscribeScope::ConversationMessages { conversation_id } => {
            format!("realtime:public:messages:conversation_id=eq.{conversation_id}")
        }
    }
}

fn join_frame(topic: &str) -> String {
    serde_json::to_string(&PhoenixOut {
        topic,
        event: "phx_join",
        payload: serde_json::json!({}),
        reference: "1".to_owned(),
    })
    .unwrap_or_default()
}

fn heartbeat_frame(reference: u64) -> String {
    serde_json::to_string(&PhoenixOut {
        topic: HEARTBEAT_TOPIC,
        event: "heartbeat",
        payload: serde_json::json!({}),
        reference: reference.to_string(),
    })
    .unwrap_or_default()
}

/// Maps an inbound frame to a feed event. `None` means the frame carries
/// nothing the subscriber cares about (heartbeat replies, presence, or a
/// row payload that failed to decode).
pub(super) fn feed_event_for(scope: &SubscribeScope, frame: PhoenixIn) -> Option<FeedEvent> {
    match frame.event.as_str() {
        "INSERT" | "UPDATE" | "DELETE" => match scope {
            SubscribeScope::Conversations => Some(FeedEvent::ConversationsTouched),
            SubscribeScope::ConversationMessages { .. } => {
                decode_message_change(&frame.event, frame.payload)
            }
        },
        "phx_reply" => {
            let status = frame.payload.get("status").and_then(|value| value.as_str());
            if status == Some("error") {
                Some(FeedEvent::Closed {
                    reason: format!("join rejected on {}: {}", frame.topic, frame.payload),
                })
            } else {
                None
            }
        }
        "phx_error" => Some(FeedEvent::Closed {
            reason: "channel errored".to_owned(),
        }),
        _ => None,
    }
}

fn decode_message_change(kind: &str, payload: serde_json::Value) -> Option<FeedEvent> {
    let change: RealtimeChange = match serde_json::from_value(payload) {
        Ok(change) => change,
        Err(error) => {
            tracing::debug!(code = FRAME_DECODE_FAILED, error = %error, "change frame skipped");
            return None;
        }
    };

    match kind {
        "DELETE" => {
            let id = change
                .old_record
                .as_ref()
                .and_then(|record| record.get("id"))
                .map(json_id)?;
            Some(FeedEvent::Message(ChangeEvent::Deleted(
                MessageId::Confirmed(id),
            )))
        }
        _ => {
            let row: MessageRow = match serde_json::from_value(change.record?) {
                Ok(row) => row,
                Err(error) => {
                    tracing::debug!(code = FRAME_DECODE_FAILED, error = %error, "row skipped");
                    return None;
                }
            };
            let message = match row.into_message() {
                Ok(message) => message,
                Err(error) => {
                    tracing::debug!(code = FRAME_DECODE_FAILED, error = %error, "row skipped");
                    return None;
                }
            };
            let change = if kind == "INSERT" {
                ChangeEvent::Inserted(message)
            } else {
                ChangeEvent::Updated(message)
            };
            Some(FeedEvent::Message(change))
        }
    }
}

fn json_id(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(id) => id.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct RealtimeClient {
    ws_url: String,
}

impl RealtimeClient {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            ws_url: websocket_url(base_url, anon_key),
        }
    }

    /// Connects, joins the scope's topic, and spawns the channel task.
    /// Dropping the returned handle (or `unsubscribe`) stops the task.
    pub async fn open_channel(
        &self,
        scope: SubscribeScope,
    ) -> Result<(SyncSubscription, mpsc::Receiver<FeedEvent>), RemoteStoreError> {
        let (socket, _) = connect_async(&self.ws_url)
            .await
            .map_err(|error| RemoteStoreError::Unavailable(error.to_string()))?;

        let topic = topic_for(&scope);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);

        tracing::info!(code = CHANNEL_STARTED, topic = %topic, "realtime channel started");
        tokio::spawn(run_channel(socket, topic, scope, event_tx, stop_rx));

        Ok((SyncSubscription::new(stop_tx), event_rx))
    }
}

async fn run_channel(
    mut socket: Socket,
    topic: String,
    scope: SubscribeScope,
    event_tx: mpsc::Sender<FeedEvent>,
    mut stop_rx: watch::Receiver<bool>,
) {
    if socket
        .send(WsMessage::Text(join_frame(&topic).into()))
        .await
        .is_err()
    {
        let _ = event_tx
            .send(FeedEvent::Closed {
                reason: "join send failed".to_owned(),
            })
            .await;
        return;
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    let mut reference: u64 = 1;

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    tracing::info!(code = CHANNEL_STOPPED, topic = %topic, "realtime channel stopped");
                    let _ = socket.close(None).await;
                    return;
                }
            }
            _ = heartbeat.tick() => {
                reference += 1;
                if socket
                    .send(WsMessage::Text(heartbeat_frame(reference).into()))
                    .await
                    .is_err()
                {
                    let _ = event_tx
                        .send(FeedEvent::Closed {
                            reason: "heartbeat send failed".to_owned(),
                        })
                        .await;
                    return;
                }
            }
            frame = socket.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        let inbound: PhoenixIn = match serde_json::from_str(&text) {
                            Ok(inbound) => inbound,
                            Err(error) => {
                                tracing::debug!(
                                    code = FRAME_DECODE_FAILED,
                                    error = %error,
                                    "frame skipped"
                                );
                                continue;
                            }
                        };

                        if let Some(event) = feed_event_for(&scope, inbound) {
                            let closing = matches!(event, FeedEvent::Closed { .. });
                            if event_tx.send(event).await.is_err() {
                                // Subscriber went away; nothing left to feed.
                                return;
                            }
                            if closing {
                                return;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        let _ = event_tx
                            .send(FeedEvent::Closed {
                                reason: "socket closed by peer".to_owned(),
                            })
                            .await;
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        let _ = event_tx
                            .send(FeedEvent::Closed {
                                reason: error.to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::SendStatus;

    fn frame(event: &str, payload: serde_json::Value) -> PhoenixIn {
        PhoenixIn {
            topic: "realtime:public:messages:conversation_id=eq.c-1".to_owned(),
            event: event.to_owned(),
            payload,
        }
    }

    fn message_scope() -> SubscribeScope {
        SubscribeScope::ConversationMessages {
            conversation_id: "c-1".to_owned(),
        }
    }

    #[test]
    fn https_base_becomes_wss_endpoint() {
        let url = websocket_url("https://example.supabase.co/", "anon-key");

        assert_eq!(
            url,
            "wss://example.supabase.co/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
        );
    }

    #[test]
    fn http_base_becomes_ws_endpoint() {
        let url = websocket_url("http://127.0.0.1:54321", "k");

        assert!(url.starts_with("ws://127.0.0.1:54321/realtime/v1/websocket"));
    }

    #[test]
    fn message_topic_carries_conversation_filter() {
        assert_eq!(
            topic_for(&message_scope()),
            "realtime:public:messages:conversation_id=eq.c-1"
        );
        assert_eq!(
            topic_for(&SubscribeScope::Conversations),
            "realtime:public:conversations"
        );
    }

    #[test]
    fn insert_frame_decodes_to_inserted_message() {
        let payload = serde_json::json!({
            "record": {
                "id": "m-1",
                "conversation_id": "c-1",
                "sender_id": "u-1",
                "content": "hello",
                "created_at": "2026-08-08T10:15:30+00:00"
            }
        });

        let event = feed_event_for(&message_scope(), frame("INSERT", payload))
            .expect("insert frame should decode");

        let FeedEvent::Message(ChangeEvent::Inserted(message)) = event else {
            panic!("expected inserted message, got {event:?}");
        };
        assert_eq!(message.content, "hello");
        assert_eq!(message.status, SendStatus::Sent);
    }

    #[test]
    fn delete_frame_decodes_to_deleted_id() {
        let payload = serde_json::json!({ "old_record": { "id": 42 } });

        let event = feed_event_for(&message_scope(), frame("DELETE", payload))
            .expect("delete frame should decode");

        assert_eq!(
            event,
            FeedEvent::Message(ChangeEvent::Deleted(MessageId::Confirmed("42".to_owned())))
        );
    }

    #[test]
    fn conversation_scope_collapses_changes_to_touched() {
        let payload = serde_json::json!({ "record": { "id": "c-9" } });

        let event = feed_event_for(&SubscribeScope::Conversations, frame("UPDATE", payload))
            .expect("update frame should decode");

        assert_eq!(event, FeedEvent::ConversationsTouched);
    }

    #[test]
    fn error_reply_closes_the_feed() {
        let payload = serde_json::json!({ "status": "error", "response": {} });

        let event = feed_event_for(&message_scope(), frame("phx_reply", payload))
            .expect("error reply should close");

        assert!(matches!(event, FeedEvent::Closed { .. }));
    }

    #[test]
    fn ok_reply_is_ignored() {
        let payload = serde_json::json!({ "status": "ok", "response": {} });

        assert!(feed_event_for(&message_scope(), frame("phx_reply", payload)).is_none());
    }

    #[test]
    fn malformed_record_is_skipped_not_fatal() {
        let payload = serde_json::json!({ "record": { "id": "m-1" } });

        assert!(feed_event_for(&message_scope(), frame("INSERT", payload)).is_none());
    }
}
