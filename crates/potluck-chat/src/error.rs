use potluck_common::{BackendError, PotluckError};

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Rejected before any I/O.
    #[error("invalid message: {0}")]
    Validation(&'static str),

    #[error("not signed in")]
    Authentication,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<ChatError> for PotluckError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Backend(inner) => PotluckError::Backend(inner),
            other => PotluckError::Chat(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            ChatError::Validation("message is empty").to_string(),
            "invalid message: message is empty"
        );
        assert_eq!(ChatError::Authentication.to_string(), "not signed in");
        let err: ChatError = BackendError::Closed.into();
        assert_eq!(err.to_string(), "connection closed");
    }

    #[test]
    fn converts_into_potluck_error() {
        let err: PotluckError = ChatError::Authentication.into();
        assert!(matches!(err, PotluckError::Chat(_)));

        let err: PotluckError = ChatError::Backend(BackendError::Closed).into();
        assert!(matches!(err, PotluckError::Backend(BackendError::Closed)));
    }
}
