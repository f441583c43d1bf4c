//! Logging configuration types.

use serde::{Deserialize, Serialize};

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

impl LoggingConfig {
    /// `EnvFilter` directive covering every potluck crate.
    pub fn directive(&self) -> String {
        format!("potluck={}", self.level.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_uses_level() {
        let cfg = LoggingConfig {
            level: LogLevel::Debug,
        };
        assert_eq!(cfg.directive(), "potluck=debug");
        assert_eq!(LoggingConfig::default().directive(), "potluck=info");
    }

    #[test]
    fn level_deserializes_lowercase() {
        let cfg: LoggingConfig = toml::from_str("level = \"warn\"").unwrap();
        assert_eq!(cfg.level, LogLevel::Warn);
    }
}
