//! Recipe rows and the write payloads built from user input.

use chrono::{DateTime, Utc};
use potluck_backend::{row_id, Row};
use serde::{Deserialize, Serialize};

use crate::error::RecipeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(skip_deserializing)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub prep_minutes: Option<u32>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Recipe {
    pub fn from_row(row: &Row) -> Result<Self, RecipeError> {
        let id = row_id(row).ok_or_else(|| RecipeError::Validation("row has no id".into()))?;
        let mut recipe: Recipe = serde_json::from_value(row.clone())?;
        recipe.id = id;
        Ok(recipe)
    }
}

/// A recipe to create. The author is filled in from the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewRecipe {
    pub title: String,
    pub description: Option<String>,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
    pub prep_minutes: Option<u32>,
    pub image_url: Option<String>,
}

impl NewRecipe {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Trim the title and drop blank list entries.
    pub(crate) fn normalized(mut self) -> Result<Self, RecipeError> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(RecipeError::Validation("title is required".into()));
        }
        self.ingredients = non_blank(self.ingredients);
        self.steps = non_blank(self.steps);
        Ok(self)
    }
}

/// A partial update. Only fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecipePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prep_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl RecipePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn normalized(mut self) -> Result<Self, RecipeError> {
        if let Some(title) = self.title.take() {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(RecipeError::Validation("title cannot be blank".into()));
            }
            self.title = Some(title);
        }
        self.ingredients = self.ingredients.map(non_blank);
        self.steps = self.steps.map(non_blank);
        Ok(self)
    }
}

fn non_blank(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
