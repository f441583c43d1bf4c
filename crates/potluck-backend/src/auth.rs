//! Holds the identity of an auth session established elsewhere.
//!
//! Signing in is not this crate's job; a front end hands over the session
//! it obtained and the adapters read it from here.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use potluck_common::Identity;
use potluck_config::BackendConfig;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::AuthProvider;

pub struct SessionAuth {
    anon_key: String,
    identity: RwLock<Option<Identity>>,
}

impl SessionAuth {
    pub fn new(anon_key: impl Into<String>, identity: Option<Identity>) -> Self {
        Self {
            anon_key: anon_key.into(),
            identity: RwLock::new(identity),
        }
    }

    /// Build from config, decoding the identity out of `access_token` when
    /// one is configured.
    pub fn from_config(config: &BackendConfig) -> Self {
        let identity = config.access_token.as_ref().and_then(|token| {
            let identity = identity_from_jwt(token);
            if identity.is_none() {
                warn!("backend.access_token is not a decodable JWT; running signed out");
            }
            identity
        });
        Self::new(config.anon_key.clone(), identity)
    }

    pub async fn set_session(&self, identity: Identity) {
        debug!(user_id = %identity.user_id, "Auth session set");
        *self.identity.write().await = Some(identity);
    }

    pub async fn clear_session(&self) {
        *self.identity.write().await = None;
    }

    /// Token for the `Authorization: Bearer` header: the session JWT when
    /// signed in, otherwise the anon key.
    pub async fn bearer_token(&self) -> String {
        self.identity
            .read()
            .await
            .as_ref()
            .and_then(|id| id.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }
}

#[async_trait]
impl AuthProvider for SessionAuth {
    async fn current_identity(&self) -> Option<Identity> {
        self.identity.read().await.clone()
    }
}

/// Read `sub` and `email` from a JWT's claims. The signature is not
/// checked; the backend does that on every request.
pub fn identity_from_jwt(token: &str) -> Option<Identity> {
    let claims_b64 = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(claims_b64.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let user_id = claims.get("sub")?.as_str()?.to_string();
    let email = claims
        .get("email")
        .and_then(|e| e.as_str())
        .filter(|e| !e.is_empty())
        .map(str::to_string);
    Some(Identity::from_session(user_id, email, token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // {"sub":"user-1","email":"cook@example.com"}
    const TOKEN: &str =
        "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJ1c2VyLTEiLCJlbWFpbCI6ImNvb2tAZXhhbXBsZS5jb20ifQ.sig";

    #[test]
    fn decodes_identity_from_jwt() {
        let id = identity_from_jwt(TOKEN).unwrap();
        assert_eq!(id.user_id, "user-1");
        assert_eq!(id.email.as_deref(), Some("cook@example.com"));
        assert_eq!(id.access_token.as_deref(), Some(TOKEN));
    }

    #[test]
    fn rejects_garbage_tokens() {
        assert!(identity_from_jwt("not-a-jwt").is_none());
        assert!(identity_from_jwt("a.!!!.c").is_none());
    }

    #[tokio::test]
    async fn bearer_falls_back_to_anon_key() {
        let auth = SessionAuth::new("anon", None);
        assert_eq!(auth.bearer_token().await, "anon");
        assert!(auth.current_identity().await.is_none());

        auth.set_session(Identity::from_session("u".into(), None, "jwt".into()))
            .await;
        assert_eq!(auth.bearer_token().await, "jwt");

        auth.clear_session().await;
        assert_eq!(auth.bearer_token().await, "anon");
    }

    #[test]
    fn from_config_without_token_is_signed_out() {
        let auth = SessionAuth::from_config(&BackendConfig::default());
        assert!(auth.identity.try_read().unwrap().is_none());
    }
}
