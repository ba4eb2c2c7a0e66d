use std::sync::Arc;

use odoo_mcp_core::DefaultSettings;

#[derive(Clone)]
pub struct AppState {
    /// Fallback tenant for requests without Odoo headers. Read once at start-up.
    pub defaults: Arc<DefaultSettings>,
}

impl AppState {
    pub fn new(defaults: DefaultSettings) -> Self {
        Self {
            defaults: Arc::new(defaults),
        }
    }
}
