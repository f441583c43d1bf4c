//! Row store over Supabase's PostgREST endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use potluck_common::BackendError;
use potluck_config::BackendConfig;
use tracing::debug;

use crate::auth::SessionAuth;
use crate::query::Query;
use crate::{Row, RowStore};

pub struct SupabaseRest {
    base_url: String,
    anon_key: String,
    auth: Arc<SessionAuth>,
    http: reqwest::Client,
}

impl SupabaseRest {
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

    pub(crate) fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    async fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.table_url(table))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.auth.bearer_token().await)
    }
}

/// Turn a response into JSON, mapping transport and status failures.
pub(crate) async fn read_json(
    result: Result<reqwest::Response, reqwest::Error>,
) -> Result<serde_json::Value, BackendError> {
    let response = check_status(result).await?;
    let text = response
        .text()
        .await
        .map_err(|e| BackendError::Http(e.to_string()))?;
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

pub(crate) async fn check_status(
    result: Result<reqwest::Response, reqwest::Error>,
) -> Result<reqwest::Response, BackendError> {
    let response = result.map_err(|e| BackendError::Http(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = text.chars().take(200).collect::<String>();
        return Err(BackendError::Status {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

/// PostgREST returns written rows as an array; take the first.
fn first_row(value: serde_json::Value, what: &str) -> Result<Row, BackendError> {
    match value {
        serde_json::Value::Array(mut rows) if !rows.is_empty() => Ok(rows.swap_remove(0)),
        serde_json::Value::Array(_) => Err(BackendError::NotFound(what.to_string())),
        row @ serde_json::Value::Object(_) => Ok(row),
        other => Err(BackendError::Decode(format!(
            "expected row array, got {other}"
        ))),
    }
}

#[async_trait]
impl RowStore for SupabaseRest {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, BackendError> {
        debug!(table = %table, ?query, "REST select");
        let result = self
            .request(reqwest::Method::GET, table)
            .await
            .query(&query.to_postgrest_params())
            .send()
            .await;
        match read_json(result).await? {
            serde_json::Value::Array(rows) => Ok(rows),
            serde_json::Value::Null => Ok(Vec::new()),
            other => Err(BackendError::Decode(format!(
                "expected row array, got {other}"
            ))),
        }
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, BackendError> {
        debug!(table = %table, "REST insert");
        let result = self
            .request(reqwest::Method::POST, table)
            .await
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await;
        first_row(read_json(result).await?, table)
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> Result<Row, BackendError> {
        debug!(table = %table, id = %id, "REST update");
        let result = self
            .request(reqwest::Method::PATCH, table)
            .await
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await;
        first_row(read_json(result).await?, &format!("{table}/{id}"))
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), BackendError> {
        debug!(table = %table, id = %id, "REST delete");
        let result = self
            .request(reqwest::Method::DELETE, table)
            .await
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await;
        check_status(result).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rest() -> SupabaseRest {
        let config = BackendConfig {
            url: "https://demo.supabase.co/".into(),
            anon_key: "anon".into(),
            ..BackendConfig::default()
        };
        let auth = Arc::new(SessionAuth::from_config(&config));
        SupabaseRest::new(&config, auth).unwrap()
    }

    #[test]
    fn table_url_strips_trailing_slash() {
        assert_eq!(
            rest().table_url("messages"),
            "https://demo.supabase.co/rest/v1/messages"
        );
    }

    #[test]
    fn first_row_variants() {
        let row = first_row(json!([{"id": 1}, {"id": 2}]), "t").unwrap();
        assert_eq!(row["id"], 1);

        let row = first_row(json!({"id": 3}), "t").unwrap();
        assert_eq!(row["id"], 3);

        assert!(matches!(
            first_row(json!([]), "t/9"),
            Err(BackendError::NotFound(ref what)) if what == "t/9"
        ));
        assert!(matches!(first_row(json!(5), "t"), Err(BackendError::Decode(_))));
    }
}
