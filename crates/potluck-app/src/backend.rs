//! Backend selection: hosted Supabase or the in-process offline store.

use std::sync::Arc;

use potluck_backend::{Backend, MemoryBackend};
use potluck_common::{Identity, PotluckError};
use potluck_config::PotluckConfig;
use tracing::info;

pub const OFFLINE_USER_ID: &str = "offline-cook";
pub const OFFLINE_EMAIL: &str = "cook@potluck.local";

/// Offline store, signed in as a local user, with the sender fields that
/// the hosted database fills in by trigger.
pub fn offline(config: &PotluckConfig) -> Backend {
    let memory = Arc::new(MemoryBackend::with_identity(Identity::new(
        OFFLINE_USER_ID,
        Some(OFFLINE_EMAIL.into()),
    )));
    memory.on_insert(&config.chat.table, |row| {
        if row["user_id"] == OFFLINE_USER_ID {
            row["user_email"] = OFFLINE_EMAIL.into();
            row["user_role"] = "user".into();
        }
    });
    info!("Using offline backend");
    Backend::memory(memory)
}

pub fn connect(config: &PotluckConfig, offline_mode: bool) -> Result<Backend, PotluckError> {
    if offline_mode {
        return Ok(offline(config));
    }
    if !config.backend.is_configured() {
        return Err(PotluckError::Other(
            "backend.url and backend.anon_key must be set (or pass --offline)".into(),
        ));
    }
    info!(url = %config.backend.url, "Connecting to backend");
    Ok(Backend::supabase(&config.backend)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use potluck_chat::MessageStream;

    #[tokio::test]
    async fn offline_backend_denormalizes_sender() {
        let config = PotluckConfig::default();
        let backend = offline(&config);
        let stream = MessageStream::new(&backend, config.chat.table.clone());
        stream.send("hello").await.unwrap();

        let history = stream.load_history(10).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_email, OFFLINE_EMAIL);
    }

    #[test]
    fn unconfigured_backend_is_an_error() {
        let err = connect(&PotluckConfig::default(), false).err().unwrap();
        assert!(err.to_string().contains("--offline"));
    }
}
