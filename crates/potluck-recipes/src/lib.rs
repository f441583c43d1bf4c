//! Shared recipe catalog: CRUD over the recipe table plus image uploads.

pub mod catalog;
pub mod error;
pub mod recipe;

pub use catalog::RecipeCatalog;
pub use error::RecipeError;
pub use recipe::{NewRecipe, Recipe, RecipePatch};
