//! Potluck configuration system.
//!
//! TOML-based configuration with environment overrides and validation.
//! Every section uses serde defaults so partial configs work out of the
//! box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use potluck_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    BackendConfig, ChatConfig, LogLevel, LoggingConfig, PotluckConfig, RecipesConfig,
    CONFIG_SCHEMA_VERSION,
};

use std::path::Path;

use potluck_common::ConfigError;

/// Load config from the platform default path, apply environment
/// overrides, and validate the result.
pub fn load_config() -> Result<PotluckConfig, ConfigError> {
    let mut config = toml_loader::load_default()?;
    toml_loader::apply_env_overrides(&mut config);
    validation::validate(&config)?;
    Ok(config)
}

/// Like [`load_config`], but from an explicit file, which must exist.
pub fn load_config_from(path: &Path) -> Result<PotluckConfig, ConfigError> {
    let mut config = toml_loader::load_from_path(path)?;
    toml_loader::apply_env_overrides(&mut config);
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to pretty-printed JSON with secrets redacted.
pub fn config_to_json(config: &PotluckConfig) -> String {
    let mut redacted = config.clone();
    if !redacted.backend.anon_key.is_empty() {
        redacted.backend.anon_key = "[REDACTED]".into();
    }
    if redacted.backend.access_token.is_some() {
        redacted.backend.access_token = Some("[REDACTED]".into());
    }
    serde_json::to_string_pretty(&redacted)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
