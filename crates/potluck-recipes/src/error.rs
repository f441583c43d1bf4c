use potluck_common::{BackendError, PotluckError};

#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error("invalid recipe: {0}")]
    Validation(String),

    #[error("not signed in")]
    Authentication,

    #[error("recipe not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Backend(BackendError),
}

impl From<BackendError> for RecipeError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotFound(what) => RecipeError::NotFound(what),
            other => RecipeError::Backend(other),
        }
    }
}

impl From<serde_json::Error> for RecipeError {
    fn from(e: serde_json::Error) -> Self {
        RecipeError::Backend(e.into())
    }
}

impl From<RecipeError> for PotluckError {
    fn from(e: RecipeError) -> Self {
        match e {
            RecipeError::Backend(inner) => PotluckError::Backend(inner),
            other => PotluckError::Recipe(other.to_string()),
        }
    }
}
