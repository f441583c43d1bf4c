use chrono::{DateTime, SecondsFormat, Utc};

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time as an RFC 3339 string with millisecond precision, the
/// format the row store uses for `created_at` columns.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
