//! History loading, live inserts, and writes for the message table.

use std::future::Future;
use std::sync::Arc;

use potluck_backend::{AuthProvider, Backend, ChangeFeed, Query, Row, RowStore};
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::message::{columns, new_message_row, Message};
use crate::pump::SubscriptionTask;

/// Map rows to messages, logging and skipping any that fail to parse.
fn map_rows(rows: Vec<Row>) -> Vec<Message> {
    rows.iter()
        .filter_map(|row| match Message::from_row(row) {
            Ok(msg) => Some(msg),
            Err(e) => {
                warn!(error = %e, "Skipping malformed message row");
                None
            }
        })
        .collect()
}

/// Reject bodies that are empty after trimming.
pub fn validate_body(body: &str) -> Result<(), ChatError> {
    if body.trim().is_empty() {
        return Err(ChatError::Validation("message is empty"));
    }
    Ok(())
}

/// Message-table operations against the backend interfaces.
#[derive(Clone)]
pub struct MessageStream {
    store: Arc<dyn RowStore>,
    auth: Arc<dyn AuthProvider>,
    feed: Arc<dyn ChangeFeed>,
    table: String,
}

impl MessageStream {
    pub fn new(backend: &Backend, table: impl Into<String>) -> Self {
        Self {
            store: Arc::clone(&backend.store),
            auth: Arc::clone(&backend.auth),
            feed: Arc::clone(&backend.feed),
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The newest `limit` messages, returned oldest first.
    pub async fn try_load_history(&self, limit: usize) -> Result<Vec<Message>, ChatError> {
        let query = Query::new()
            .order_by(columns::CREATED_AT, false)
            .limit(limit);
        let rows = self.store.select(&self.table, &query).await?;
        let mut messages = map_rows(rows);
        messages.reverse();
        debug!(table = %self.table, count = messages.len(), "Loaded message history");
        Ok(messages)
    }

    /// Like [`try_load_history`](Self::try_load_history), but a failed load
    /// is logged and reads as an empty history.
    pub async fn load_history(&self, limit: usize) -> Vec<Message> {
        match self.try_load_history(limit).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(table = %self.table, error = %e, "Failed to load message history");
                Vec::new()
            }
        }
    }

    /// Invoke `on_message` for every row inserted from now on, in feed order.
    ///
    /// Rows that cannot be mapped are skipped. The feed may redeliver a row
    /// or echo one that history already returned; callers merge through a
    /// [`MessageTimeline`](crate::MessageTimeline).
    pub fn subscribe_to_inserts<F, Fut>(&self, mut on_message: F) -> SubscriptionTask
    where
        F: FnMut(Message) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let feed = Arc::clone(&self.feed);
        let table = self.table.clone();
        SubscriptionTask::spawn(
            "message inserts",
            async move { feed.subscribe_inserts(&table).await },
            move |row: Row| {
                let msg = match Message::from_row(&row) {
                    Ok(msg) => Some(msg),
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed inserted row");
                        None
                    }
                };
                let delivery = msg.map(&mut on_message);
                async move {
                    if let Some(delivery) = delivery {
                        delivery.await;
                    }
                }
            },
        )
    }

    /// Insert a message as the signed-in user.
    ///
    /// Blank bodies are rejected without any I/O. Without a session nothing
    /// is written. The body is stored as given, untrimmed.
    pub async fn send(&self, body: &str) -> Result<(), ChatError> {
        validate_body(body)?;
        let identity = self
            .auth
            .current_identity()
            .await
            .ok_or(ChatError::Authentication)?;

        self.store
            .insert(&self.table, new_message_row(body, &identity.user_id))
            .await?;
        info!(table = %self.table, user_id = %identity.user_id, "Message sent");
        Ok(())
    }

    /// Delete by id. Authorization is enforced by the store.
    pub async fn delete(&self, id: &str) -> Result<(), ChatError> {
        self.store.delete(&self.table, id).await?;
        info!(table = %self.table, id, "Message deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use potluck_backend::MemoryBackend;
    use potluck_common::Identity;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const TABLE: &str = "messages";

    fn row(id: &str, minute: u32) -> Row {
        json!({
            "id": id,
            "content": format!("body {id}"),
            "user_id": "u1",
            "user_email": "a@x.io",
            "user_role": "user",
            "created_at": format!("2024-05-01T12:{minute:02}:00Z"),
        })
    }

    fn stream(memory: &Arc<MemoryBackend>) -> MessageStream {
        MessageStream::new(&Backend::memory(Arc::clone(memory)), TABLE)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test]
    async fn history_is_newest_window_oldest_first() {
        let memory = Arc::new(MemoryBackend::new());
        memory.seed(TABLE, [row("a", 1), row("c", 3), row("b", 2), row("d", 4)]);
        let history = stream(&memory).load_history(3).await;
        let ids: Vec<_> = history.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "d"]);
    }

    #[tokio::test]
    async fn history_skips_malformed_rows() {
        let memory = Arc::new(MemoryBackend::new());
        memory.seed(
            TABLE,
            [row("a", 1), json!({"id": "x", "created_at": "2024-05-01T12:02:00Z"})],
        );
        let history = stream(&memory).load_history(10).await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn failed_history_reads_as_empty() {
        let memory = Arc::new(MemoryBackend::new());
        memory.seed(TABLE, [row("a", 1)]);
        memory.fail_store(true);
        let stream = stream(&memory);
        assert!(stream.load_history(10).await.is_empty());
        assert!(matches!(
            stream.try_load_history(10).await,
            Err(ChatError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn blank_send_is_rejected_without_io() {
        let memory = Arc::new(MemoryBackend::with_identity(Identity::new("u1", None)));
        let stream = stream(&memory);
        for body in ["", "   ", "\n\t"] {
            assert!(matches!(
                stream.send(body).await,
                Err(ChatError::Validation(_))
            ));
        }
        assert_eq!(memory.insert_count(), 0);
    }

    #[tokio::test]
    async fn send_requires_identity() {
        let memory = Arc::new(MemoryBackend::new());
        let result = stream(&memory).send("hello").await;
        assert!(matches!(result, Err(ChatError::Authentication)));
        assert_eq!(memory.insert_count(), 0);
    }

    #[tokio::test]
    async fn send_stores_body_untrimmed() {
        let memory = Arc::new(MemoryBackend::with_identity(Identity::new("u1", None)));
        stream(&memory).send("  hi there ").await.unwrap();
        let rows = memory.rows(TABLE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["content"], "  hi there ");
        assert_eq!(rows[0]["user_id"], "u1");
    }

    #[tokio::test(start_paused = true)]
    async fn inserts_are_delivered_and_malformed_skipped() {
        let memory = Arc::new(MemoryBackend::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = stream(&memory).subscribe_to_inserts(move |msg| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(msg.id);
            }
        });
        settle().await;

        memory.emit_insert(TABLE, json!({"id": "bad"})).await;
        memory.emit_insert(TABLE, row("a", 1)).await;
        memory.emit_insert("other", row("z", 1)).await;
        settle().await;

        assert_eq!(rx.try_recv().ok().as_deref(), Some("a"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn closing_stops_delivery_and_is_idempotent() {
        let memory = Arc::new(MemoryBackend::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = stream(&memory).subscribe_to_inserts(move |msg| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(msg.id);
            }
        });
        settle().await;

        sub.close();
        sub.close();
        settle().await;
        assert_eq!(memory.subscriber_count(), 0);

        memory.emit_insert(TABLE, row("a", 1)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let memory = Arc::new(MemoryBackend::new());
        memory.seed(TABLE, [row("a", 1), row("b", 2)]);
        stream(&memory).delete("a").await.unwrap();
        assert_eq!(memory.rows(TABLE).len(), 1);
    }
}
