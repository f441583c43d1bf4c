//! Tests for the full validation pipeline.

use super::*;

#[test]
fn default_config_validates() {
    assert!(validate(&PotluckConfig::default()).is_ok());
}

#[test]
fn catches_zero_history_limit() {
    let mut config = PotluckConfig::default();
    config.chat.history_limit = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("chat.history_limit"));
}

#[test]
fn catches_debounce_longer_than_timeout() {
    let mut config = PotluckConfig::default();
    config.chat.typing_debounce_ms = 4000;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("exceeds chat.typing_timeout_ms"));
}

#[test]
fn catches_non_http_url() {
    let mut config = PotluckConfig::default();
    config.backend.url = "ftp://example.com".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("backend.url"));
}

#[test]
fn catches_empty_table_names() {
    let mut config = PotluckConfig::default();
    config.chat.table = " ".into();
    config.recipes.image_bucket = String::new();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("chat.table"));
    assert!(err.contains("recipes.image_bucket"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = PotluckConfig::default();
    config.backend.reconnect_delay_secs = 10;
    config.backend.max_reconnect_delay_secs = 5;
    config.chat.typing_timeout_ms = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("max_reconnect_delay_secs"));
    assert!(err.contains("chat.typing_timeout_ms"));
}
