//! Configuration, protocol types, and event/command enums for the realtime client.

use potluck_config::BackendConfig;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to Supabase Realtime.
#[derive(Clone)]
pub struct RealtimeConfig {
    /// Project base URL (`https://<ref>.supabase.co`).
    pub url: String,
    /// Supabase anon key (publishable).
    pub api_key: String,
    /// Optional access token (JWT) sent with every channel join.
    pub access_token: Option<String>,
    pub heartbeat_interval_secs: u64,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u64,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .finish()
    }
}

impl RealtimeConfig {
    pub fn from_backend(config: &BackendConfig) -> Self {
        Self {
            url: config.url.trim_end_matches('/').to_string(),
            api_key: config.anon_key.clone(),
            access_token: config.access_token.clone(),
            heartbeat_interval_secs: config.heartbeat_interval_secs,
            reconnect_delay_secs: config.reconnect_delay_secs,
            max_reconnect_delay_secs: config.max_reconnect_delay_secs,
        }
    }

    /// Build the WebSocket URL for Supabase Realtime.
    pub(crate) fn ws_url(&self) -> String {
        let host = self
            .url
            .strip_prefix("https://")
            .map(|h| format!("wss://{h}"))
            .or_else(|| self.url.strip_prefix("http://").map(|h| format!("ws://{h}")))
            .unwrap_or_else(|| self.url.clone());
        format!(
            "{host}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.api_key
        )
    }
}

// ---------------------------------------------------------------------------
// Phoenix Protocol Types
// ---------------------------------------------------------------------------

/// A Phoenix protocol message envelope (v1 JSON format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
}

impl PhoenixMessage {
    pub(crate) fn for_topic(topic: &str, event: &str, payload: serde_json::Value) -> Self {
        Self {
            topic: format!("realtime:{topic}"),
            event: event.to_string(),
            payload,
            msg_ref: Some(super::connection::next_ref()),
        }
    }
}

// ---------------------------------------------------------------------------
// Channel Configuration
// ---------------------------------------------------------------------------

/// Configuration for a Supabase Realtime channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    pub broadcast: BroadcastConfig,
    pub postgres_changes: Vec<PostgresChangeFilter>,
}

/// Broadcast configuration for a channel.
#[derive(Debug, Clone, Default)]
pub struct BroadcastConfig {
    /// Whether to receive your own broadcasts (Supabase "self" key).
    pub self_send: bool,
    /// Whether broadcasts are acknowledged by the server.
    pub ack: bool,
}

/// A row change subscription carried in the join payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostgresChangeFilter {
    /// `INSERT`, `UPDATE`, `DELETE`, or `*`.
    pub event: String,
    pub schema: String,
    pub table: String,
}

impl PostgresChangeFilter {
    pub fn inserts(table: &str) -> Self {
        Self {
            event: "INSERT".into(),
            schema: "public".into(),
            table: table.into(),
        }
    }
}

impl ChannelConfig {
    /// Serialize to the JSON payload expected by Supabase phx_join.
    pub(crate) fn to_join_payload(&self, access_token: Option<&str>) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "config": {
                "broadcast": {
                    "self": self.broadcast.self_send,
                    "ack": self.broadcast.ack
                },
                "presence": { "key": "" },
                "postgres_changes": self.postgres_changes
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = serde_json::json!(token);
        }
        payload
    }
}

// ---------------------------------------------------------------------------
// Events & Commands
// ---------------------------------------------------------------------------

/// Events emitted by the realtime client.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// WebSocket connection established.
    Connected,
    /// WebSocket connection lost.
    Disconnected,
    /// Successfully joined a channel.
    ChannelJoined { topic: String },
    /// Channel closed or errored.
    ChannelError { topic: String, message: String },
    /// A broadcast event received on a channel.
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    /// A row change delivered through `postgres_changes`.
    PostgresChange {
        topic: String,
        table: String,
        change: String,
        record: serde_json::Value,
    },
    Error(String),
}

/// Commands sent to the realtime client from the application layer.
#[derive(Debug)]
pub(crate) enum RealtimeCommand {
    JoinChannel {
        topic: String,
        config: ChannelConfig,
    },
    LeaveChannel {
        topic: String,
    },
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    Disconnect,
}
