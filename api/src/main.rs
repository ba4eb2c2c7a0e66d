use std::net::SocketAddr;

use axum::Router;
use odoo_mcp_core::DefaultSettings;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod error;
mod middleware;
mod routes;
mod state;

fn build_app(state: state::AppState) -> Router {
    routes::router()
        .layer(axum::middleware::from_fn(middleware::security_headers::apply))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::cors::build_cors_layer()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "odoo_mcp_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let defaults = DefaultSettings::from_env();
    tracing::info!(
        event = "default_settings_loaded",
        backend_configured = defaults.backend.is_complete(),
        open_allow_list = defaults.enabled_operations.is_open(),
        "Loaded process-wide Odoo settings"
    );

    let app = build_app(state::AppState::new(defaults));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(event = "bind_failed", %addr, error = %err, "Could not bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!("Odoo MCP API listening on {}", addr);

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(event = "server_stopped", error = %err, "HTTP server failed");
        std::process::exit(1);
    }
}
