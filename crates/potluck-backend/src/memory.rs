//! In-process backend implementing every interface.
//!
//! Rows live in per-table vectors, inserts fan out to change-feed
//! subscribers, and broadcasts go to every subscriber of the channel and
//! event (including the publisher, unlike the hosted channel). Insert
//! triggers stand in for server-side denormalization.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use potluck_common::{new_id, now_timestamp, BackendError, Identity};
use tokio::sync::mpsc;
use tracing::debug;

use crate::query::Query;
use crate::subscription::{Subscription, SubscriptionGuard};
use crate::{row_id, AuthProvider, BroadcastChannel, ChangeFeed, ObjectStorage, Row, RowStore};

const SUBSCRIBER_BUFFER: usize = 256;

type Trigger = Box<dyn Fn(&mut Row) + Send + Sync>;

/// One recorded broadcast publish.
#[derive(Debug, Clone)]
pub struct Published {
    pub channel: String,
    pub event: String,
    pub payload: serde_json::Value,
    pub at: tokio::time::Instant,
}

struct Subscriber<T> {
    id: u64,
    key: String,
    tx: mpsc::Sender<T>,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Vec<Row>>,
    triggers: HashMap<String, Vec<Trigger>>,
    objects: HashMap<String, (Vec<u8>, String)>,
    insert_subs: Vec<Subscriber<Row>>,
    broadcast_subs: Vec<Subscriber<serde_json::Value>>,
    published: Vec<Published>,
    next_sub: u64,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    identity: Mutex<Option<Identity>>,
    fail_store: AtomicBool,
    fail_broadcast: AtomicBool,
    inserts: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn broadcast_key(channel: &str, event: &str) -> String {
    format!("{channel}/{event}")
}

fn created_at(row: &Row) -> &str {
    row.get("created_at").and_then(|v| v.as_str()).unwrap_or("")
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(identity: Identity) -> Self {
        let backend = Self::default();
        backend.sign_in(identity);
        backend
    }

    pub fn sign_in(&self, identity: Identity) {
        *lock(&self.identity) = Some(identity);
    }

    pub fn sign_out(&self) {
        *lock(&self.identity) = None;
    }

    /// Run `trigger` on every row inserted into `table`, before it is stored.
    pub fn on_insert(&self, table: &str, trigger: impl Fn(&mut Row) + Send + Sync + 'static) {
        lock(&self.state)
            .triggers
            .entry(table.to_string())
            .or_default()
            .push(Box::new(trigger));
    }

    /// Make every row store call fail until turned off again.
    pub fn fail_store(&self, fail: bool) {
        self.fail_store.store(fail, Ordering::SeqCst);
    }

    /// Make every broadcast publish fail until turned off again.
    pub fn fail_broadcast(&self, fail: bool) {
        self.fail_broadcast.store(fail, Ordering::SeqCst);
    }

    /// Store rows as-is, bypassing triggers and change-feed delivery.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        lock(&self.state)
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Push `row` to change-feed subscribers without storing it, as a
    /// redelivered or out-of-band event would arrive.
    pub async fn emit_insert(&self, table: &str, row: Row) {
        let senders: Vec<_> = lock(&self.state)
            .insert_subs
            .iter()
            .filter(|s| s.key == table)
            .map(|s| s.tx.clone())
            .collect();
        for tx in senders {
            let _ = tx.send(row.clone()).await;
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.state).tables.get(table).cloned().unwrap_or_default()
    }

    /// Number of successful inserts across all tables.
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<Published> {
        lock(&self.state).published.clone()
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<(Vec<u8>, String)> {
        lock(&self.state).objects.get(&format!("{bucket}/{path}")).cloned()
    }

    /// Live change-feed plus broadcast subscribers.
    pub fn subscriber_count(&self) -> usize {
        let state = lock(&self.state);
        state.insert_subs.len() + state.broadcast_subs.len()
    }

    fn check_store(&self) -> Result<(), BackendError> {
        if self.fail_store.load(Ordering::SeqCst) {
            return Err(BackendError::Http("injected store failure".into()));
        }
        Ok(())
    }

    fn guard_for(&self, id: u64) -> SubscriptionGuard {
        let state = Arc::clone(&self.state);
        SubscriptionGuard::new(move || {
            let mut state = lock(&state);
            state.insert_subs.retain(|s| s.id != id);
            state.broadcast_subs.retain(|s| s.id != id);
        })
    }
}

#[async_trait]
impl RowStore for MemoryBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, BackendError> {
        self.check_store()?;
        let mut rows: Vec<Row> = lock(&self.state)
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let key = |r: &Row| r.get(&order.column).map(|v| v.to_string()).unwrap_or_default();
                let ord = match order.column.as_str() {
                    "created_at" => created_at(a).cmp(created_at(b)),
                    _ => key(a).cmp(&key(b)),
                };
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row, BackendError> {
        self.check_store()?;
        if !row.is_object() {
            return Err(BackendError::Decode("row must be a JSON object".into()));
        }
        if row.get("id").map_or(true, |v| v.is_null()) {
            row["id"] = serde_json::json!(new_id());
        }
        if row.get("created_at").map_or(true, |v| v.is_null()) {
            row["created_at"] = serde_json::json!(now_timestamp());
        }

        let senders: Vec<_> = {
            let mut state = lock(&self.state);
            if let Some(triggers) = state.triggers.get(table) {
                for trigger in triggers {
                    trigger(&mut row);
                }
            }
            state
                .tables
                .entry(table.to_string())
                .or_default()
                .push(row.clone());
            state
                .insert_subs
                .iter()
                .filter(|s| s.key == table)
                .map(|s| s.tx.clone())
                .collect()
        };
        self.inserts.fetch_add(1, Ordering::SeqCst);
        debug!(table = %table, subscribers = senders.len(), "Memory insert");

        for tx in senders {
            let _ = tx.send(row.clone()).await;
        }
        Ok(row)
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> Result<Row, BackendError> {
        self.check_store()?;
        let mut state = lock(&self.state);
        let row = state
            .tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| row_id(r).as_deref() == Some(id)))
            .ok_or_else(|| BackendError::NotFound(format!("{table}/{id}")))?;
        if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
            for (k, v) in fields {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(row.clone())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), BackendError> {
        self.check_store()?;
        if let Some(rows) = lock(&self.state).tables.get_mut(table) {
            rows.retain(|r| row_id(r).as_deref() != Some(id));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn current_identity(&self) -> Option<Identity> {
        lock(&self.identity).clone()
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe_inserts(&self, table: &str) -> Result<Subscription<Row>, BackendError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = {
            let mut state = lock(&self.state);
            state.next_sub += 1;
            let id = state.next_sub;
            state.insert_subs.push(Subscriber {
                id,
                key: table.to_string(),
                tx,
            });
            id
        };
        Ok(Subscription::new(rx, self.guard_for(id)))
    }
}

#[async_trait]
impl BroadcastChannel for MemoryBackend {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), BackendError> {
        if self.fail_broadcast.load(Ordering::SeqCst) {
            return Err(BackendError::Realtime("injected broadcast failure".into()));
        }
        let key = broadcast_key(channel, event);
        let senders: Vec<_> = {
            let mut state = lock(&self.state);
            state.published.push(Published {
                channel: channel.to_string(),
                event: event.to_string(),
                payload: payload.clone(),
                at: tokio::time::Instant::now(),
            });
            state
                .broadcast_subs
                .iter()
                .filter(|s| s.key == key)
                .map(|s| s.tx.clone())
                .collect()
        };
        for tx in senders {
            let _ = tx.try_send(payload.clone());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        event: &str,
    ) -> Result<Subscription<serde_json::Value>, BackendError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = {
            let mut state = lock(&self.state);
            state.next_sub += 1;
            let id = state.next_sub;
            state.broadcast_subs.push(Subscriber {
                id,
                key: broadcast_key(channel, event),
                tx,
            });
            id
        };
        Ok(Subscription::new(rx, self.guard_for(id)))
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError> {
        self.check_store()?;
        lock(&self.state)
            .objects
            .insert(format!("{bucket}/{path}"), (bytes, content_type.to_string()));
        Ok(format!("memory://{bucket}/{path}"))
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<(), BackendError> {
        self.check_store()?;
        lock(&self.state).objects.remove(&format!("{bucket}/{path}"));
        Ok(())
    }

    fn object_path(&self, bucket: &str, public_url: &str) -> Option<String> {
        public_url
            .strip_prefix(&format!("memory://{bucket}/"))
            .filter(|p| !p.is_empty())
            .map(str::to_string)
    }
}
