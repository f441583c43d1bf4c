//! Public handle for interacting with the Supabase Realtime connection.

use std::sync::Arc;

use potluck_common::BackendError;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use super::connection::connection_loop;
use super::types::{ChannelConfig, RealtimeCommand, RealtimeConfig, RealtimeEvent};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle for interacting with the Supabase Realtime connection.
///
/// Methods only enqueue commands for the background connection task;
/// commands issued while disconnected are sent once the socket is up.
#[derive(Clone)]
pub struct RealtimeClient {
    command_tx: mpsc::Sender<RealtimeCommand>,
    connected: Arc<RwLock<bool>>,
    shutdown: CancellationToken,
}

impl RealtimeClient {
    /// Create a new client and start the background connection.
    /// Returns `(client, event_receiver)`.
    pub fn connect(config: RealtimeConfig) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let connected = Arc::new(RwLock::new(false));
        let shutdown = CancellationToken::new();

        let client = Self {
            command_tx,
            connected: Arc::clone(&connected),
            shutdown: shutdown.clone(),
        };

        tokio::spawn(connection_loop(
            config, connected, event_tx, command_rx, shutdown,
        ));

        (client, event_rx)
    }

    /// A client with no connection task behind it; commands pile up in
    /// `command_tx` for the test to inspect.
    #[cfg(test)]
    pub(crate) fn detached(command_tx: mpsc::Sender<RealtimeCommand>) -> Self {
        Self {
            command_tx,
            connected: Arc::new(RwLock::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    async fn send(&self, command: RealtimeCommand) -> Result<(), BackendError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| BackendError::Closed)
    }

    pub async fn join_channel(&self, topic: &str, config: ChannelConfig) -> Result<(), BackendError> {
        self.send(RealtimeCommand::JoinChannel {
            topic: topic.to_string(),
            config,
        })
        .await
    }

    pub async fn leave_channel(&self, topic: &str) -> Result<(), BackendError> {
        self.send(RealtimeCommand::LeaveChannel {
            topic: topic.to_string(),
        })
        .await
    }

    /// Queue a leave without awaiting, for use from synchronous drop paths.
    /// Dropped silently if the command queue is full or gone.
    pub fn request_leave(&self, topic: &str) {
        let _ = self.command_tx.try_send(RealtimeCommand::LeaveChannel {
            topic: topic.to_string(),
        });
    }

    /// Send a broadcast event on a channel.
    pub async fn broadcast(
        &self,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), BackendError> {
        self.send(RealtimeCommand::Broadcast {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
        })
        .await
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Leave every channel, close the socket, and stop reconnecting.
    pub async fn disconnect(&self) {
        let _ = self.command_tx.send(RealtimeCommand::Disconnect).await;
        self.shutdown.cancel();
    }
}
