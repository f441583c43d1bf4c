use serde::{Deserialize, Serialize};

/// Wire payload of a typing broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingEvent {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub is_typing: bool,
}

impl TypingEvent {
    pub fn new(user_id: impl Into<String>, email: Option<String>, is_typing: bool) -> Self {
        Self {
            user_id: user_id.into(),
            email,
            is_typing,
        }
    }

    /// Decode a broadcast payload. Malformed payloads yield `None`.
    pub fn from_payload(payload: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }

    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "user_id": self.user_id,
            "email": self.email,
            "is_typing": self.is_typing,
        })
    }
}

/// A remote user currently shown as typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypingUser {
    pub user_id: String,
    pub email: Option<String>,
}

impl TypingUser {
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.user_id)
    }
}

impl From<&TypingEvent> for TypingUser {
    fn from(event: &TypingEvent) -> Self {
        Self {
            user_id: event.user_id.clone(),
            email: event.email.clone(),
        }
    }
}

/// "a is typing...", "a and b are typing...", "a, b, and 2 others are typing..."
pub fn typing_summary(users: &[TypingUser]) -> Option<String> {
    match users {
        [] => None,
        [one] => Some(format!("{} is typing...", one.display_name())),
        [a, b] => Some(format!(
            "{} and {} are typing...",
            a.display_name(),
            b.display_name()
        )),
        [a, b, rest @ ..] => Some(format!(
            "{}, {}, and {} others are typing...",
            a.display_name(),
            b.display_name(),
            rest.len()
        )),
    }
}
