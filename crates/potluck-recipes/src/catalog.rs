use std::path::Path;
use std::sync::Arc;

use potluck_backend::{AuthProvider, Backend, ObjectStorage, Query, RowStore};
use potluck_common::{new_id, Identity};
use potluck_config::RecipesConfig;
use tracing::{debug, info, warn};

use crate::error::RecipeError;
use crate::recipe::{NewRecipe, Recipe, RecipePatch};

/// Recipe CRUD against the row store, with images in object storage.
#[derive(Clone)]
pub struct RecipeCatalog {
    store: Arc<dyn RowStore>,
    auth: Arc<dyn AuthProvider>,
    storage: Arc<dyn ObjectStorage>,
    table: String,
    bucket: String,
}

impl RecipeCatalog {
    pub fn new(backend: &Backend, config: &RecipesConfig) -> Self {
        Self {
            store: Arc::clone(&backend.store),
            auth: Arc::clone(&backend.auth),
            storage: Arc::clone(&backend.storage),
            table: config.table.clone(),
            bucket: config.image_bucket.clone(),
        }
    }

    async fn identity(&self) -> Result<Identity, RecipeError> {
        self.auth
            .current_identity()
            .await
            .ok_or(RecipeError::Authentication)
    }

    /// All recipes, newest first. Rows that fail to map are skipped.
    pub async fn list(&self) -> Result<Vec<Recipe>, RecipeError> {
        let query = Query::new().order_by("created_at", false);
        let rows = self.store.select(&self.table, &query).await?;
        let recipes = rows
            .iter()
            .filter_map(|row| match Recipe::from_row(row) {
                Ok(recipe) => Some(recipe),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed recipe row");
                    None
                }
            })
            .collect::<Vec<_>>();
        debug!(count = recipes.len(), "Listed recipes");
        Ok(recipes)
    }

    pub async fn get(&self, id: &str) -> Result<Recipe, RecipeError> {
        let query = Query::new().eq("id", id).limit(1);
        let rows = self.store.select(&self.table, &query).await?;
        let row = rows
            .first()
            .ok_or_else(|| RecipeError::NotFound(id.to_string()))?;
        Recipe::from_row(row)
    }

    /// Create a recipe authored by the signed-in user.
    pub async fn create(&self, recipe: NewRecipe) -> Result<Recipe, RecipeError> {
        let recipe = recipe.normalized()?;
        let identity = self.identity().await?;

        let mut row = serde_json::to_value(&recipe)?;
        row["created_by"] = identity.user_id.clone().into();
        let stored = self.store.insert(&self.table, row).await?;
        let created = Recipe::from_row(&stored)?;
        info!(id = %created.id, title = %created.title, "Recipe created");
        Ok(created)
    }

    /// Apply a partial update. An empty patch is a read.
    pub async fn update(&self, id: &str, patch: RecipePatch) -> Result<Recipe, RecipeError> {
        let patch = patch.normalized()?;
        if patch.is_empty() {
            return self.get(id).await;
        }
        self.identity().await?;

        let stored = self
            .store
            .update(&self.table, id, serde_json::to_value(&patch)?)
            .await?;
        info!(id, "Recipe updated");
        Recipe::from_row(&stored)
    }

    /// Delete a recipe and, best effort, its uploaded image.
    pub async fn delete(&self, id: &str) -> Result<(), RecipeError> {
        self.identity().await?;
        let recipe = self.get(id).await?;
        self.store.delete(&self.table, id).await?;
        info!(id, "Recipe deleted");

        let Some(url) = recipe.image_url else {
            return Ok(());
        };
        match self.storage.object_path(&self.bucket, &url) {
            Some(path) => {
                if let Err(e) = self.storage.remove(&self.bucket, &path).await {
                    warn!(id, path = %path, error = %e, "Failed to remove recipe image");
                }
            }
            None => debug!(id, url = %url, "Image is not in the recipe bucket, leaving it"),
        }
        Ok(())
    }

    /// Store an image under the user's folder and return its public URL.
    pub async fn upload_image(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, RecipeError> {
        if bytes.is_empty() {
            return Err(RecipeError::Validation("image is empty".into()));
        }
        if !content_type.starts_with("image/") {
            return Err(RecipeError::Validation(format!(
                "unsupported content type {content_type:?}"
            )));
        }
        let identity = self.identity().await?;

        let path = format!("{}/{}.{}", identity.user_id, new_id(), extension(file_name));
        let size = bytes.len();
        let url = self
            .storage
            .upload(&self.bucket, &path, bytes, content_type)
            .await?;
        info!(path = %path, size, "Recipe image uploaded");
        Ok(url)
    }
}

/// Lowercased extension of `file_name`, or `bin` if it has none.
fn extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use potluck_backend::MemoryBackend;
    use serde_json::json;

    const TABLE: &str = "recipes";
    const BUCKET: &str = "recipe-images";

    fn catalog(memory: &Arc<MemoryBackend>) -> RecipeCatalog {
        RecipeCatalog::new(&Backend::memory(Arc::clone(memory)), &RecipesConfig::default())
    }

    fn signed_in() -> Arc<MemoryBackend> {
        Arc::new(MemoryBackend::with_identity(Identity::new(
            "cook",
            Some("cook@example.com".into()),
        )))
    }

    fn row(id: &str, title: &str, minute: u32) -> serde_json::Value {
        json!({
            "id": id,
            "title": title,
            "created_by": "someone",
            "created_at": format!("2024-05-01T12:{minute:02}:00Z"),
        })
    }

    #[test]
    fn extension_from_file_name() {
        assert_eq!(extension("dish.JPG"), "jpg");
        assert_eq!(extension("photo.final.png"), "png");
        assert_eq!(extension("noext"), "bin");
        assert_eq!(extension(".hidden"), "bin");
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let memory = signed_in();
        memory.seed(TABLE, [row("a", "Soup", 1), row("b", "Bread", 3), row("c", "Salad", 2)]);
        let titles: Vec<_> = catalog(&memory)
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, ["Bread", "Salad", "Soup"]);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let memory = signed_in();
        let err = catalog(&memory).get("nope").await.unwrap_err();
        assert!(matches!(err, RecipeError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn create_sets_author() {
        let memory = signed_in();
        let created = catalog(&memory)
            .create(NewRecipe {
                steps: vec!["Boil".into(), "".into()],
                prep_minutes: Some(15),
                ..NewRecipe::new("Pasta")
            })
            .await
            .unwrap();
        assert_eq!(created.created_by, "cook");
        assert_eq!(created.steps, ["Boil"]);
        assert_eq!(memory.rows(TABLE).len(), 1);
    }

    #[tokio::test]
    async fn create_requires_session_and_title() {
        let memory = Arc::new(MemoryBackend::new());
        let catalog = catalog(&memory);
        assert!(matches!(
            catalog.create(NewRecipe::new("Pasta")).await,
            Err(RecipeError::Authentication)
        ));
        assert!(matches!(
            catalog.create(NewRecipe::new("")).await,
            Err(RecipeError::Validation(_))
        ));
        assert_eq!(memory.insert_count(), 0);
    }

    #[tokio::test]
    async fn update_writes_only_patched_fields() {
        let memory = signed_in();
        memory.seed(TABLE, [row("a", "Soup", 1)]);
        let updated = catalog(&memory)
            .update(
                "a",
                RecipePatch {
                    prep_minutes: Some(40),
                    ..RecipePatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Soup");
        assert_eq!(updated.prep_minutes, Some(40));
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let memory = signed_in();
        let err = catalog(&memory)
            .update(
                "ghost",
                RecipePatch {
                    title: Some("New".into()),
                    ..RecipePatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RecipeError::NotFound(_)));
    }

    #[tokio::test]
    async fn upload_then_delete_removes_image() {
        let memory = signed_in();
        let catalog = catalog(&memory);
        let url = catalog
            .upload_image("Dish.PNG", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        let path = url
            .strip_prefix(&format!("memory://{BUCKET}/"))
            .unwrap()
            .to_string();
        assert!(path.starts_with("cook/"));
        assert!(path.ends_with(".png"));
        assert!(memory.object(BUCKET, &path).is_some());

        let recipe = catalog
            .create(NewRecipe {
                image_url: Some(url),
                ..NewRecipe::new("Pie")
            })
            .await
            .unwrap();
        catalog.delete(&recipe.id).await.unwrap();
        assert!(memory.rows(TABLE).is_empty());
        assert!(memory.object(BUCKET, &path).is_none());
    }

    #[tokio::test]
    async fn foreign_image_url_is_left_alone() {
        let memory = signed_in();
        memory.seed(
            TABLE,
            [json!({
                "id": "a",
                "title": "Soup",
                "image_url": "https://elsewhere.example/soup.jpg",
                "created_by": "cook",
                "created_at": "2024-05-01T12:00:00Z",
            })],
        );
        catalog(&memory).delete("a").await.unwrap();
        assert!(memory.rows(TABLE).is_empty());
    }

    #[tokio::test]
    async fn upload_rejects_bad_input() {
        let memory = signed_in();
        let catalog = catalog(&memory);
        assert!(matches!(
            catalog.upload_image("a.png", Vec::new(), "image/png").await,
            Err(RecipeError::Validation(_))
        ));
        assert!(matches!(
            catalog.upload_image("a.txt", vec![1], "text/plain").await,
            Err(RecipeError::Validation(_))
        ));
    }
}
