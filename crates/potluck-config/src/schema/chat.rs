//! Chat configuration types.

use serde::{Deserialize, Serialize};

/// Chat table, typing channel, and timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Row store table holding chat messages.
    pub table: String,
    /// How many recent messages to load on open and reload.
    pub history_limit: usize,
    /// Broadcast channel carrying typing signals.
    pub typing_channel: String,
    /// Broadcast event name for typing signals.
    pub typing_event: String,
    /// A remote typist disappears this long after their last signal.
    pub typing_timeout_ms: u64,
    /// Local quiet period before "stopped typing" is published.
    pub typing_debounce_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            table: "messages".into(),
            history_limit: 50,
            typing_channel: "chat-typing".into(),
            typing_event: "typing".into(),
            typing_timeout_ms: 3000,
            typing_debounce_ms: 1500,
        }
    }
}
