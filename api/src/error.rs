use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use odoo_mcp_core::error::{ApiError, codes};

/// Host-level failures, rendered as a structured [`ApiError`] body.
#[derive(Debug)]
pub enum AppError {
    /// No route for this path (404)
    NotFound { path: String },
    /// Route exists but not for this method (405)
    MethodNotAllowed { method: String, path: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::NotFound { path } => {
                tracing::debug!(event = "route_not_found", path = %path, "No route for path");
                (
                    StatusCode::NOT_FOUND,
                    ApiError::new(
                        codes::NOT_FOUND,
                        format!("No route for '{path}'"),
                        request_id,
                    )
                    .with_docs_hint("MCP clients POST JSON-RPC to /mcp; GET /health reports liveness."),
                )
            }
            AppError::MethodNotAllowed { method, path } => (
                StatusCode::METHOD_NOT_ALLOWED,
                ApiError::new(
                    codes::METHOD_NOT_ALLOWED,
                    format!("{method} is not supported on '{path}'"),
                    request_id,
                )
                .with_docs_hint("Send JSON-RPC requests with POST; this server does not open SSE streams."),
            ),
        };

        (status, Json(api_error)).into_response()
    }
}
