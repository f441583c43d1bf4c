//! Supabase Realtime over the Phoenix Channels v1 protocol.
//!
//! `RealtimeClient` owns the websocket: heartbeats, channel join/leave,
//! broadcast, and reconnect with backoff. `RealtimeHub` sits on top and
//! implements [`crate::ChangeFeed`] and [`crate::BroadcastChannel`] by
//! routing incoming events to per-subscription streams.

mod client;
mod connection;
mod handler;
mod hub;
mod types;

pub use client::RealtimeClient;
pub use hub::RealtimeHub;
pub use types::{
    BroadcastConfig, ChannelConfig, PhoenixMessage, PostgresChangeFilter, RealtimeConfig,
    RealtimeEvent,
};
