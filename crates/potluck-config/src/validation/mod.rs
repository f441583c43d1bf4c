//! Full configuration validation.
//!
//! Collects every problem into a single `ConfigError` rather than stopping
//! at the first one.

mod helpers;

#[cfg(test)]
mod tests;

use crate::schema::PotluckConfig;
use potluck_common::ConfigError;

use helpers::{validate_non_empty, validate_range};

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &PotluckConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_backend(&mut errors, config);
    validate_chat(&mut errors, config);
    validate_recipes(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_backend(errors: &mut Vec<String>, config: &PotluckConfig) {
    let b = &config.backend;
    if !b.url.is_empty() && !(b.url.starts_with("https://") || b.url.starts_with("http://")) {
        errors.push(format!("backend.url = {:?} must be an http(s) URL", b.url));
    }
    validate_range(errors, "backend.request_timeout_secs", b.request_timeout_secs, 1, 600);
    validate_range(errors, "backend.heartbeat_interval_secs", b.heartbeat_interval_secs, 1, 300);
    validate_range(errors, "backend.reconnect_delay_secs", b.reconnect_delay_secs, 1, 300);
    if b.max_reconnect_delay_secs < b.reconnect_delay_secs {
        errors.push("backend.max_reconnect_delay_secs must be >= reconnect_delay_secs".into());
    }
}

fn validate_chat(errors: &mut Vec<String>, config: &PotluckConfig) {
    let c = &config.chat;
    validate_non_empty(errors, "chat.table", &c.table);
    validate_non_empty(errors, "chat.typing_channel", &c.typing_channel);
    validate_non_empty(errors, "chat.typing_event", &c.typing_event);
    validate_range(errors, "chat.history_limit", c.history_limit as u64, 1, 1000);
    validate_range(errors, "chat.typing_timeout_ms", c.typing_timeout_ms, 100, 60_000);
    validate_range(errors, "chat.typing_debounce_ms", c.typing_debounce_ms, 100, 60_000);
    if c.typing_debounce_ms > c.typing_timeout_ms {
        errors.push(format!(
            "chat.typing_debounce_ms = {} exceeds chat.typing_timeout_ms = {}",
            c.typing_debounce_ms, c.typing_timeout_ms
        ));
    }
}

fn validate_recipes(errors: &mut Vec<String>, config: &PotluckConfig) {
    validate_non_empty(errors, "recipes.table", &config.recipes.table);
    validate_non_empty(errors, "recipes.image_bucket", &config.recipes.image_bucket);
}
