use serde::Serialize;

/// Structured error body for the HTTP host, shaped for agents rather than
/// humans: a machine-readable code plus enough context to recover.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Machine-readable error code (see [`codes`])
    pub error: String,
    /// Human/agent-readable description of what went wrong
    pub message: String,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

impl ApiError {
    pub fn new(
        error: impl Into<String>,
        message: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            request_id: request_id.into(),
            docs_hint: None,
        }
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }
}

/// Error codes used across the HTTP host and tool payloads
pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const METHOD_NOT_ALLOWED: &str = "method_not_allowed";
    pub const INVALID_ARGUMENTS: &str = "invalid_arguments";
    pub const AUTHENTICATION_FAILED: &str = "authentication_failed";
    pub const TRANSPORT_ERROR: &str = "transport_error";
    pub const REMOTE_ERROR: &str = "remote_error";
    pub const SEARCH_NOT_CONFIGURED: &str = "search_not_configured";
}
