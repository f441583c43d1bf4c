//! Interfaces to the hosted backend and their implementations.
//!
//! The chat and recipe layers only ever see the traits defined here:
//! a row store, an auth session, a row change-feed, a broadcast channel,
//! and object storage. Two implementations exist:
//!
//! - Supabase adapters: PostgREST over `reqwest`, Storage over `reqwest`,
//!   and Realtime over Phoenix Channels (`tokio-tungstenite`).
//! - [`MemoryBackend`], an in-process stand-in for tests and offline use.

pub mod auth;
pub mod memory;
pub mod query;
pub mod realtime;
pub mod rest;
pub mod storage;
pub mod subscription;

use std::sync::Arc;

use async_trait::async_trait;
use potluck_common::{BackendError, Identity};
use potluck_config::BackendConfig;

pub use auth::SessionAuth;
pub use memory::MemoryBackend;
pub use query::{Order, Query};
pub use realtime::{RealtimeClient, RealtimeConfig, RealtimeHub};
pub use rest::SupabaseRest;
pub use storage::SupabaseStorage;
pub use subscription::{Subscription, SubscriptionGuard};

/// A raw row as the store returns it (a JSON object).
pub type Row = serde_json::Value;

/// Read a row's `id` column as a string. Numeric ids are stringified.
pub fn row_id(row: &Row) -> Option<String> {
    match row.get("id")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, BackendError>;

    /// Insert a row and return it as stored, including server-filled columns.
    async fn insert(&self, table: &str, row: Row) -> Result<Row, BackendError>;

    async fn update(&self, table: &str, id: &str, patch: Row) -> Result<Row, BackendError>;

    async fn delete(&self, table: &str, id: &str) -> Result<(), BackendError>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The signed-in user, if any.
    async fn current_identity(&self) -> Option<Identity>;
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Stream rows inserted into `table` from now on.
    async fn subscribe_inserts(&self, table: &str) -> Result<Subscription<Row>, BackendError>;
}

/// Fire-and-forget pub/sub with no persistence, ordering, or delivery
/// guarantee.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), BackendError>;

    async fn subscribe(
        &self,
        channel: &str,
        event: &str,
    ) -> Result<Subscription<serde_json::Value>, BackendError>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload an object and return its public URL.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError>;

    async fn remove(&self, bucket: &str, path: &str) -> Result<(), BackendError>;

    /// Map a public URL produced by [`ObjectStorage::upload`] back to its
    /// object path, if it belongs to `bucket`.
    fn object_path(&self, bucket: &str, public_url: &str) -> Option<String>;
}

/// Every collaborator the feature layers need, behind trait objects.
#[derive(Clone)]
pub struct Backend {
    pub store: Arc<dyn RowStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub feed: Arc<dyn ChangeFeed>,
    pub broadcast: Arc<dyn BroadcastChannel>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl Backend {
    /// Wire up the Supabase adapters. Must be called inside a tokio runtime
    /// since the realtime connection starts immediately.
    pub fn supabase(config: &BackendConfig) -> Result<Self, BackendError> {
        let auth = Arc::new(SessionAuth::from_config(config));
        let rest = Arc::new(SupabaseRest::new(config, Arc::clone(&auth))?);
        let storage = Arc::new(SupabaseStorage::new(config, Arc::clone(&auth))?);
        let hub = Arc::new(RealtimeHub::connect(RealtimeConfig::from_backend(config)));
        Ok(Self {
            store: rest,
            auth,
            feed: Arc::clone(&hub) as Arc<dyn ChangeFeed>,
            broadcast: hub,
            storage,
        })
    }

    /// Back every interface with one shared in-memory instance.
    pub fn memory(backend: Arc<MemoryBackend>) -> Self {
        Self {
            store: Arc::clone(&backend) as Arc<dyn RowStore>,
            auth: Arc::clone(&backend) as Arc<dyn AuthProvider>,
            feed: Arc::clone(&backend) as Arc<dyn ChangeFeed>,
            broadcast: Arc::clone(&backend) as Arc<dyn BroadcastChannel>,
            storage: backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_id_reads_strings_and_numbers() {
        assert_eq!(row_id(&json!({"id": "abc"})), Some("abc".into()));
        assert_eq!(row_id(&json!({"id": 42})), Some("42".into()));
        assert_eq!(row_id(&json!({"id": null})), None);
        assert_eq!(row_id(&json!({})), None);
    }
}
