//! Object storage over the Supabase Storage API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use potluck_common::BackendError;
use potluck_config::BackendConfig;
use tracing::debug;

use crate::auth::SessionAuth;
use crate::rest::check_status;
use crate::ObjectStorage;

pub struct SupabaseStorage {
    base_url: String,
    anon_key: String,
    auth: Arc<SessionAuth>,
    http: reqwest::Client,
}

impl SupabaseStorage {
    pub fn new(config: &BackendConfig, auth: Arc<SessionAuth>) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BackendError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            auth,
            http,
        })
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{bucket}/{path}", self.base_url)
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError> {
        debug!(bucket = %bucket, path = %path, size = bytes.len(), "Storage upload");
        let result = self
            .http
            .post(self.object_url(bucket, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.auth.bearer_token().await)
            .header("content-type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await;
        check_status(result).await?;
        Ok(self.public_url(bucket, path))
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<(), BackendError> {
        debug!(bucket = %bucket, path = %path, "Storage remove");
        let result = self
            .http
            .delete(self.object_url(bucket, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.auth.bearer_token().await)
            .send()
            .await;
        check_status(result).await?;
        Ok(())
    }

    fn object_path(&self, bucket: &str, public_url: &str) -> Option<String> {
        let prefix = self.public_url(bucket, "");
        public_url
            .strip_prefix(&prefix)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> SupabaseStorage {
        let config = BackendConfig {
            url: "https://demo.supabase.co".into(),
            anon_key: "anon".into(),
            ..BackendConfig::default()
        };
        let auth = Arc::new(SessionAuth::from_config(&config));
        SupabaseStorage::new(&config, auth).unwrap()
    }

    #[test]
    fn public_url_round_trips_to_path() {
        let s = storage();
        let url = s.public_url("recipe-images", "u1/abc.jpg");
        assert_eq!(
            url,
            "https://demo.supabase.co/storage/v1/object/public/recipe-images/u1/abc.jpg"
        );
        assert_eq!(
            s.object_path("recipe-images", &url).as_deref(),
            Some("u1/abc.jpg")
        );
    }

    #[test]
    fn object_path_rejects_foreign_urls() {
        let s = storage();
        assert!(s
            .object_path("recipe-images", "https://cdn.example.com/x.jpg")
            .is_none());
        assert!(s
            .object_path(
                "avatars",
                "https://demo.supabase.co/storage/v1/object/public/recipe-images/a.jpg"
            )
            .is_none());
    }
}
