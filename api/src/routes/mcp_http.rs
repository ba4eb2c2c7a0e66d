use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;

use odoo_mcp_core::config::headers;
use odoo_mcp_core::{RequestHeaders, resolve_request_config};

use crate::error::AppError;
use crate::state::AppState;

const MCP_PATH: &str = "/mcp";

pub fn router() -> Router<AppState> {
    Router::new().route(MCP_PATH, post(mcp_post).get(mcp_get))
}

async fn mcp_get(method: Method, OriginalUri(uri): OriginalUri) -> AppError {
    AppError::MethodNotAllowed {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}

async fn mcp_post(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let incoming: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::debug!(event = "mcp_http_parse_error", error = %err, "Rejected non-JSON body");
            return (
                StatusCode::OK,
                Json(odoo_mcp_runtime::parse_error_response("Parse error")),
            )
                .into_response();
        }
    };

    let bundle = resolve_request_config(&request_headers(&headers), &state.defaults);
    tracing::info!(
        event = "mcp_http_request",
        config_source = bundle.source.as_str(),
        batch = incoming.is_array(),
        "Handling MCP request"
    );

    let mut responses = odoo_mcp_runtime::handle_http_jsonrpc(bundle, incoming).await;

    match responses.len() {
        0 => StatusCode::ACCEPTED.into_response(),
        1 => (StatusCode::OK, Json(responses.remove(0))).into_response(),
        _ => (StatusCode::OK, Json(Value::Array(responses))).into_response(),
    }
}

/// The configuration headers present on this request; everything else is
/// ignored.
fn request_headers(map: &HeaderMap) -> RequestHeaders {
    headers::ALL
        .iter()
        .filter_map(|name| header_value(map, name).map(|value| (*name, value)))
        .collect()
}

/// Header values are decoded as UTF-8 (credentials such as `contraseña` are
/// legitimate). Bytes that are not UTF-8 drop the header with a warning.
fn header_value(headers: &HeaderMap, key: &str) -> Option<String> {
    let value = headers.get(key)?;
    match std::str::from_utf8(value.as_bytes()) {
        Ok(decoded) => Some(decoded.to_owned()),
        Err(err) => {
            tracing::warn!(
                event = "config_header_undecodable",
                header = key,
                error = %err,
                "Ignoring configuration header that is not valid UTF-8"
            );
            None
        }
    }
}
