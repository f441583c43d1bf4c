use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures reported by any backend collaborator (row store, storage,
/// realtime transport).
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("http error: {0}")]
    Http(String),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("realtime error: {0}")]
    Realtime(String),

    #[error("row not found: {0}")]
    NotFound(String),

    #[error("connection closed")]
    Closed,
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Decode(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PotluckError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("chat error: {0}")]
    Chat(String),

    #[error("recipe error: {0}")]
    Recipe(String),

    #[error("{0}")]
    Other(String),
}
