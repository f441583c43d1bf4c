use serde::{Deserialize, Serialize};

/// The authenticated user as seen by the client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    /// JWT of the backend session, forwarded as the bearer token.
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Identity {
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email,
            access_token: None,
        }
    }

    /// Identity of an established backend auth session.
    pub fn from_session(user_id: String, email: Option<String>, access_token: String) -> Self {
        Self {
            user_id,
            email,
            access_token: Some(access_token),
        }
    }
}
