//! Shared building blocks for the Odoo MCP services: per-request
//! configuration resolution, the operation allow-list gate, and the
//! structured error body used by the HTTP host.

pub mod config;
pub mod error;
pub mod gate;

pub use config::{
    BackendConfig, ConfigBundle, ConfigSource, DEFAULT_TIMEOUT_MS, DefaultSettings,
    RequestHeaders, SearchCredentials, resolve_request_config,
};
pub use gate::{AllowListError, EnabledOperations};
