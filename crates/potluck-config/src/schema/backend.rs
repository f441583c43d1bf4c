//! Hosted backend connection settings.

use serde::{Deserialize, Serialize};

/// Where the hosted backend lives and how to talk to it.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://abcd.supabase.co`.
    pub url: String,
    /// Publishable anon key.
    pub anon_key: String,
    /// JWT of an already established auth session.
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            access_token: None,
            request_timeout_secs: 30,
            heartbeat_interval_secs: 25,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}

impl BackendConfig {
    /// True when enough is set to reach a real backend.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.anon_key.is_empty()
    }
}
