use serde::{Deserialize, Serialize};

/// Recipe catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipesConfig {
    pub table: String,
    pub image_bucket: String,
}

impl Default for RecipesConfig {
    fn default() -> Self {
        Self {
            table: "recipes".into(),
            image_bucket: "recipe-images".into(),
        }
    }
}
