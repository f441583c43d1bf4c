//! Incoming Phoenix message handler.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::types::{PhoenixMessage, RealtimeEvent};

/// Extract the short topic name from a Phoenix topic (strip "realtime:" prefix).
fn strip_topic_prefix(topic: &str) -> &str {
    topic.strip_prefix("realtime:").unwrap_or(topic)
}

/// Translate one incoming Phoenix message into at most one `RealtimeEvent`.
pub(crate) fn translate(msg: &PhoenixMessage) -> Option<RealtimeEvent> {
    let topic = strip_topic_prefix(&msg.topic).to_string();

    match msg.event.as_str() {
        "phx_reply" => {
            let status = msg.payload.get("status").and_then(|s| s.as_str())?;
            if status == "ok" {
                Some(RealtimeEvent::ChannelJoined { topic })
            } else {
                let message = msg
                    .payload
                    .get("response")
                    .and_then(|r| r.get("reason"))
                    .and_then(|r| r.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                Some(RealtimeEvent::ChannelError { topic, message })
            }
        }
        "phx_error" => Some(RealtimeEvent::ChannelError {
            topic,
            message: "Channel error".to_string(),
        }),
        "phx_close" => Some(RealtimeEvent::ChannelError {
            topic,
            message: "Channel closed".to_string(),
        }),
        "broadcast" => {
            let event = msg
                .payload
                .get("event")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown")
                .to_string();
            let payload = msg
                .payload
                .get("payload")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            Some(RealtimeEvent::Broadcast {
                topic,
                event,
                payload,
            })
        }
        "postgres_changes" => {
            // Supabase nests the change under `data`.
            let data = msg.payload.get("data")?;
            let table = data.get("table").and_then(|t| t.as_str())?.to_string();
            let change = data
                .get("type")
                .or_else(|| data.get("eventType"))
                .and_then(|t| t.as_str())
                .unwrap_or("UNKNOWN")
                .to_string();
            let record = data
                .get("record")
                .or_else(|| data.get("new"))
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            Some(RealtimeEvent::PostgresChange {
                topic,
                table,
                change,
                record,
            })
        }
        _ => None,
    }
}

/// Handle a single incoming Phoenix message.
pub(crate) async fn handle_phoenix_message(
    msg: &PhoenixMessage,
    event_tx: &mpsc::Sender<RealtimeEvent>,
) {
    let Some(event) = translate(msg) else {
        debug!(topic = %msg.topic, event = %msg.event, "Unhandled Phoenix event");
        return;
    };

    match &event {
        RealtimeEvent::ChannelJoined { topic } => debug!(topic = %topic, "Channel reply: ok"),
        RealtimeEvent::ChannelError { topic, message } if message == "Channel closed" => {
            info!(topic = %topic, "Channel closed");
        }
        RealtimeEvent::ChannelError { topic, message } => {
            warn!(topic = %topic, message = %message, "Channel error");
        }
        RealtimeEvent::Broadcast { topic, event, .. } => {
            debug!(topic = %topic, event = %event, "Broadcast received");
        }
        RealtimeEvent::PostgresChange { topic, table, change, .. } => {
            debug!(topic = %topic, table = %table, change = %change, "Row change received");
        }
        _ => {}
    }

    let _ = event_tx.send(event).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(topic: &str, event: &str, payload: serde_json::Value) -> PhoenixMessage {
        PhoenixMessage {
            topic: topic.into(),
            event: event.into(),
            payload,
            msg_ref: None,
        }
    }

    #[test]
    fn translates_broadcast() {
        let m = msg(
            "realtime:chat-typing",
            "broadcast",
            json!({"type": "broadcast", "event": "typing", "payload": {"user_id": "u1"}}),
        );
        match translate(&m) {
            Some(RealtimeEvent::Broadcast {
                topic,
                event,
                payload,
            }) => {
                assert_eq!(topic, "chat-typing");
                assert_eq!(event, "typing");
                assert_eq!(payload["user_id"], "u1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn translates_postgres_insert() {
        let m = msg(
            "realtime:db-inserts:messages",
            "postgres_changes",
            json!({
                "ids": [1],
                "data": {
                    "type": "INSERT",
                    "schema": "public",
                    "table": "messages",
                    "record": {"id": 9, "content": "hi"},
                    "commit_timestamp": "2024-01-01T00:00:00Z"
                }
            }),
        );
        match translate(&m) {
            Some(RealtimeEvent::PostgresChange {
                topic,
                table,
                change,
                record,
            }) => {
                assert_eq!(topic, "db-inserts:messages");
                assert_eq!(table, "messages");
                assert_eq!(change, "INSERT");
                assert_eq!(record["content"], "hi");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn translates_join_replies() {
        let ok = msg("realtime:t", "phx_reply", json!({"status": "ok", "response": {}}));
        assert!(matches!(
            translate(&ok),
            Some(RealtimeEvent::ChannelJoined { ref topic }) if topic == "t"
        ));

        let err = msg(
            "realtime:t",
            "phx_reply",
            json!({"status": "error", "response": {"reason": "unauthorized"}}),
        );
        assert!(matches!(
            translate(&err),
            Some(RealtimeEvent::ChannelError { ref message, .. }) if message == "unauthorized"
        ));
    }

    #[test]
    fn ignores_unknown_events() {
        let m = msg("phoenix", "presence_state", json!({}));
        assert!(translate(&m).is_none());
    }
}
