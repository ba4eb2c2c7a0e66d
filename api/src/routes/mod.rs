pub mod health;
pub mod mcp_http;

use axum::Router;
use axum::extract::OriginalUri;

use crate::error::AppError;
use crate::state::AppState;

/// Every route the host serves; anything else is a structured 404.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(mcp_http::router())
        .fallback(not_found)
}

async fn not_found(OriginalUri(uri): OriginalUri) -> AppError {
    AppError::NotFound {
        path: uri.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use odoo_mcp_core::DefaultSettings;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    async fn get(path: &str) -> (StatusCode, Value) {
        let app = router().with_state(AppState::new(DefaultSettings::default()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri(path)
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        (status, serde_json::from_slice(&bytes).expect("body should be json"))
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (status, body) = get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn unknown_paths_are_structured_not_found() {
        let (status, body) = get("/v1/events").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
        assert!(body["message"].as_str().is_some_and(|m| m.contains("/v1/events")));
        assert!(body["request_id"].as_str().is_some_and(|id| !id.is_empty()));
    }
}
