use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Value, json};
use thiserror::Error;

use odoo_mcp_core::error::codes;
use odoo_mcp_core::{ConfigBundle, SearchCredentials};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search index responded with HTTP status {status}: {message}")]
    Transport { status: u16, message: String },
    #[error("Failed to reach search index: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Search index response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

impl SearchError {
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::Transport { .. } | SearchError::Network(_) => codes::TRANSPORT_ERROR,
            SearchError::Parse(_) => codes::REMOTE_ERROR,
        }
    }
}

/// Query client for the Algolia product index named in the bundle.
#[derive(Debug, Clone)]
pub struct SearchIndexClient {
    base_url: String,
    api_key: String,
    app_id: String,
    index_name: String,
    http: reqwest::Client,
}

impl SearchIndexClient {
    /// `None` unless api key, app id and index name are all configured.
    pub fn from_bundle(bundle: &ConfigBundle) -> Option<Self> {
        let SearchCredentials {
            api_key,
            app_id,
            index_name,
        } = bundle.search_credentials()?;
        let http = reqwest::Client::builder()
            .timeout(bundle.timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Some(Self {
            base_url: format!("https://{}-dsn.algolia.net", app_id.to_ascii_lowercase()),
            api_key: api_key.to_string(),
            app_id: app_id.to_string(),
            index_name: index_name.to_string(),
            http,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn query(&self, text: &str, limit: u64) -> Result<Value, SearchError> {
        let url = format!(
            "{}/1/indexes/{}/query",
            self.base_url.trim_end_matches('/'),
            utf8_percent_encode(&self.index_name, NON_ALPHANUMERIC)
        );
        tracing::debug!(
            event = "search_index_query",
            index = %self.index_name,
            limit = limit,
            "Querying search index"
        );
        let response = self
            .http
            .post(url)
            .header("X-Algolia-API-Key", &self.api_key)
            .header("X-Algolia-Application-Id", &self.app_id)
            .json(&json!({ "query": text, "hitsPerPage": limit }))
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .and_then(|body| body.get("message").and_then(Value::as_str).map(ToOwned::to_owned))
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).to_string());
            return Err(SearchError::Transport {
                status: status.as_u16(),
                message,
            });
        }
        let body: Value = serde_json::from_slice(&bytes)?;
        Ok(json!({
            "query": text,
            "index": self.index_name,
            "hits": body.get("hits").cloned().unwrap_or_else(|| json!([])),
            "total": body.get("nbHits").cloned().unwrap_or(Value::Null),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;
    use crate::testing::bundle_for;

    type Seen = Arc<Mutex<Vec<(String, Option<String>, Value)>>>;

    async fn query(
        State(seen): State<Seen>,
        Path(index): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let key = headers
            .get("x-algolia-api-key")
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        seen.lock().unwrap().push((index, key.clone(), body));
        if key.as_deref() == Some("good-key") {
            (
                StatusCode::OK,
                Json(json!({"hits": [{"objectID": "1", "name": "Drill"}], "nbHits": 1})),
            )
        } else {
            (
                StatusCode::FORBIDDEN,
                Json(json!({"message": "Invalid Application-ID or API key", "status": 403})),
            )
        }
    }

    async fn start_fake_index() -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/1/indexes/{index}/query", post(query))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}"), seen)
    }

    fn bundle_with_search(api_key: &str) -> ConfigBundle {
        let mut bundle = bundle_for("http://127.0.0.1:9");
        bundle.search_api_key = Some(api_key.to_string());
        bundle.search_app_id = Some("APPID".to_string());
        bundle.search_index_name = Some("products".to_string());
        bundle
    }

    #[test]
    fn requires_all_credentials() {
        let mut bundle = bundle_with_search("good-key");
        assert!(SearchIndexClient::from_bundle(&bundle).is_some());
        bundle.search_app_id = None;
        assert!(SearchIndexClient::from_bundle(&bundle).is_none());
    }

    #[tokio::test]
    async fn query_posts_to_the_configured_index() {
        let (base_url, seen) = start_fake_index().await;
        let client = SearchIndexClient::from_bundle(&bundle_with_search("good-key"))
            .unwrap()
            .with_base_url(base_url);

        let result = client.query("drill", 5).await.unwrap();
        assert_eq!(result["total"], 1);
        assert_eq!(result["hits"][0]["name"], "Drill");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "products");
        assert_eq!(seen[0].1.as_deref(), Some("good-key"));
        assert_eq!(seen[0].2, json!({"query": "drill", "hitsPerPage": 5}));
    }

    #[tokio::test]
    async fn rejected_key_reports_index_message() {
        let (base_url, _seen) = start_fake_index().await;
        let client = SearchIndexClient::from_bundle(&bundle_with_search("bad-key"))
            .unwrap()
            .with_base_url(base_url);

        let err = client.query("drill", 5).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::Transport { status: 403, ref message } if message.contains("Invalid Application-ID")
        ));
        assert_eq!(err.code(), codes::TRANSPORT_ERROR);
    }
}
