//! Chat messages and their mapping from store rows.
//!
//! The store denormalizes the sender's email and role onto each row when
//! it is written. Either may be missing (older rows, a trigger that did not
//! run), so both fall back to display defaults here.

use chrono::{DateTime, NaiveDateTime, Utc};
use potluck_backend::{row_id, Row};
use serde::{Deserialize, Serialize};

/// Shown when a row carries no sender email.
pub const UNKNOWN_EMAIL: &str = "Unknown";
pub const DEFAULT_ROLE: &str = "user";

/// Column names of the message table.
pub mod columns {
    pub const ID: &str = "id";
    pub const CONTENT: &str = "content";
    pub const USER_ID: &str = "user_id";
    pub const USER_EMAIL: &str = "user_email";
    pub const USER_ROLE: &str = "user_role";
    pub const CREATED_AT: &str = "created_at";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub user_id: String,
    pub user_email: String,
    pub user_role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("row is missing `{0}`")]
    MissingField(&'static str),

    #[error("unparseable timestamp {0:?}")]
    BadTimestamp(String),
}

fn text<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(|v| v.as_str())
}

fn non_empty_or(row: &Row, column: &str, default: &str) -> String {
    text(row, column)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Parse the timestamp shapes the store emits: RFC 3339 from the REST
/// endpoint, and offset-less ISO strings from some change-feed payloads.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

impl Message {
    /// Build a message from a raw row. Row fields take precedence; only
    /// the denormalized sender fields have defaults.
    pub fn from_row(row: &Row) -> Result<Self, RowError> {
        let id = row_id(row).ok_or(RowError::MissingField(columns::ID))?;
        let content = text(row, columns::CONTENT)
            .ok_or(RowError::MissingField(columns::CONTENT))?
            .to_string();
        let user_id = text(row, columns::USER_ID)
            .ok_or(RowError::MissingField(columns::USER_ID))?
            .to_string();
        let raw_created = text(row, columns::CREATED_AT)
            .ok_or(RowError::MissingField(columns::CREATED_AT))?;
        let created_at =
            parse_timestamp(raw_created).ok_or_else(|| RowError::BadTimestamp(raw_created.into()))?;

        Ok(Self {
            id,
            content,
            user_id,
            user_email: non_empty_or(row, columns::USER_EMAIL, UNKNOWN_EMAIL),
            user_role: non_empty_or(row, columns::USER_ROLE, DEFAULT_ROLE),
            created_at,
        })
    }
}

/// Row written on send. Only the sender and body are set; the store fills
/// in id, timestamp, and the denormalized sender fields.
pub fn new_message_row(content: &str, user_id: &str) -> Row {
    serde_json::json!({
        columns::CONTENT: content,
        columns::USER_ID: user_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn maps_full_row() {
        let row = json!({
            "id": 12,
            "content": "dinner at 7?",
            "user_id": "u1",
            "user_email": "cook@example.com",
            "user_role": "admin",
            "created_at": "2024-05-01T18:00:00.250+00:00"
        });
        let msg = Message::from_row(&row).unwrap();
        assert_eq!(msg.id, "12");
        assert_eq!(msg.content, "dinner at 7?");
        assert_eq!(msg.user_email, "cook@example.com");
        assert_eq!(msg.user_role, "admin");
        assert_eq!(
            msg.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap()
                + chrono::Duration::milliseconds(250)
        );
    }

    #[test]
    fn denormalized_fields_default() {
        let row = json!({
            "id": "m1",
            "content": "hi",
            "user_id": "u1",
            "user_email": null,
            "user_role": "",
            "created_at": "2024-05-01T18:00:00Z"
        });
        let msg = Message::from_row(&row).unwrap();
        assert_eq!(msg.user_email, UNKNOWN_EMAIL);
        assert_eq!(msg.user_role, DEFAULT_ROLE);
    }

    #[test]
    fn missing_required_fields() {
        let row = json!({"content": "hi", "user_id": "u1", "created_at": "2024-05-01T18:00:00Z"});
        assert_eq!(Message::from_row(&row), Err(RowError::MissingField("id")));

        let row = json!({"id": "m1", "content": "hi", "created_at": "2024-05-01T18:00:00Z"});
        assert_eq!(Message::from_row(&row), Err(RowError::MissingField("user_id")));

        let row = json!({"id": "m1", "content": "hi", "user_id": "u1", "created_at": "yesterday"});
        assert_eq!(
            Message::from_row(&row),
            Err(RowError::BadTimestamp("yesterday".into()))
        );
    }

    #[test]
    fn parses_offsetless_timestamps_as_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T18:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 18:00:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T20:00:00+02:00"), Some(expected));
    }

    #[test]
    fn new_row_carries_only_sender_and_body() {
        let row = new_message_row("hello", "u9");
        assert_eq!(row, json!({"content": "hello", "user_id": "u9"}));
    }
}
