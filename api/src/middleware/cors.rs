use axum::http::{HeaderName, HeaderValue, Method};
use odoo_mcp_core::config::headers;
use tower_http::cors::CorsLayer;

const DEFAULT_ORIGINS: &str = "http://localhost:3000";

/// Build a CORS layer from the `ODOO_MCP_CORS_ORIGINS` env var.
///
/// Browser clients send their Odoo configuration as request headers, so every
/// configuration header is allowed alongside `content-type`.
pub fn build_cors_layer() -> CorsLayer {
    let raw = std::env::var("ODOO_MCP_CORS_ORIGINS").unwrap_or_else(|_| DEFAULT_ORIGINS.to_string());
    cors_layer_for(&raw)
}

fn cors_layer_for(raw_origins: &str) -> CorsLayer {
    let allowed_headers: Vec<HeaderName> = headers::ALL
        .iter()
        .chain(["content-type", "authorization"].iter())
        .copied()
        .map(HeaderName::from_static)
        .collect();

    CorsLayer::new()
        .allow_origin(parse_origins(raw_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(allowed_headers)
        .max_age(std::time::Duration::from_secs(3600))
}

fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(event = "cors_origin_rejected", origin = %origin, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect()
}
