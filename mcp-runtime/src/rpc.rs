use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::sync::OnceCell;
use uuid::Uuid;

use odoo_mcp_core::error::codes;
use odoo_mcp_core::{BackendConfig, ConfigBundle};

const JSONRPC_VERSION: &str = "2.0";
const GENERIC_REMOTE_ERROR: &str = "Odoo returned an error without a message";

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Odoo responded with HTTP status {status}")]
    Transport { status: u16 },
    #[error("{message}")]
    Remote {
        message: String,
        exception: Option<String>,
    },
    #[error("Odoo authentication failed: {0}")]
    Authentication(String),
    #[error("Failed to reach Odoo: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Odoo response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RpcError {
    /// Machine-readable code used in tool failure payloads.
    pub fn code(&self) -> &'static str {
        match self {
            RpcError::Transport { .. } | RpcError::Network(_) => codes::TRANSPORT_ERROR,
            RpcError::Remote { .. } | RpcError::Parse(_) => codes::REMOTE_ERROR,
            RpcError::Authentication(_) => codes::AUTHENTICATION_FAILED,
        }
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'static str,
    params: EnvelopeParams<'a>,
}

#[derive(Debug, Serialize)]
struct EnvelopeParams<'a> {
    service: &'a str,
    method: &'a str,
    args: Vec<Value>,
}

/// JSON-RPC client for one Odoo backend.
///
/// Logs in lazily on the first call and keeps the returned uid for the rest
/// of its lifetime. A failed login leaves the session unset so the next call
/// tries again. Sessions are never shared: build a new client per
/// configuration bundle.
pub struct OdooClient {
    backend: BackendConfig,
    endpoint: String,
    http: reqwest::Client,
    uid: OnceCell<i64>,
}

impl OdooClient {
    pub fn new(bundle: &ConfigBundle) -> Self {
        let http = reqwest::Client::builder()
            .timeout(bundle.timeout())
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(
                    event = "odoo_http_client_fallback",
                    error = %err,
                    "Falling back to an HTTP client without timeout"
                );
                reqwest::Client::new()
            });
        Self {
            endpoint: bundle.backend.jsonrpc_endpoint(),
            backend: bundle.backend.clone(),
            http,
            uid: OnceCell::new(),
        }
    }

    /// The cached session uid, if a login has succeeded.
    pub fn session_uid(&self) -> Option<i64> {
        self.uid.get().copied()
    }

    pub fn database(&self) -> &str {
        &self.backend.database
    }

    /// `object.execute_kw(db, uid, password, model, method, args, kwargs)`;
    /// returns the `result` field of the response.
    pub async fn call(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, RpcError> {
        let uid = self.ensure_session().await?;
        tracing::debug!(
            event = "odoo_execute_kw",
            database = %self.backend.database,
            model = model,
            method = method,
            "Calling Odoo"
        );
        self.send(
            "object",
            "execute_kw",
            vec![
                json!(self.backend.database),
                json!(uid),
                json!(self.backend.password),
                json!(model),
                json!(method),
                Value::Array(args),
                Value::Object(kwargs),
            ],
        )
        .await
    }

    /// Log in if no session exists yet and return the session uid.
    pub async fn ensure_session(&self) -> Result<i64, RpcError> {
        self.uid.get_or_try_init(|| self.login()).await.copied()
    }

    async fn login(&self) -> Result<i64, RpcError> {
        if !self.backend.is_complete() {
            return Err(RpcError::Authentication(
                "backend url, database, username and password must all be configured".to_string(),
            ));
        }

        let result = self
            .send(
                "common",
                "login",
                vec![
                    json!(self.backend.database),
                    json!(self.backend.username),
                    json!(self.backend.password),
                ],
            )
            .await
            .map_err(|err| RpcError::Authentication(err.to_string()))?;

        match result.as_i64() {
            Some(uid) if uid > 0 => {
                tracing::info!(
                    event = "odoo_login",
                    database = %self.backend.database,
                    username = %self.backend.username,
                    uid = uid,
                    "Authenticated against Odoo"
                );
                Ok(uid)
            }
            _ => Err(RpcError::Authentication(format!(
                "Odoo returned no identity for user '{}' on database '{}'",
                self.backend.username, self.backend.database
            ))),
        }
    }

    /// POST one envelope to `<url>/jsonrpc` and unwrap its result.
    async fn send(&self, service: &str, method: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        let envelope = Envelope {
            jsonrpc: JSONRPC_VERSION,
            id: Uuid::now_v7().to_string(),
            method: "call",
            params: EnvelopeParams {
                service,
                method,
                args,
            },
        };

        let response = self.http.post(&self.endpoint).json(&envelope).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Transport {
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;
        let mut body: Value = serde_json::from_slice(&bytes)?;

        if let Some(error) = body.get("error").filter(|error| !error.is_null()) {
            return Err(remote_error(error));
        }
        Ok(body
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}

fn remote_error(error: &Value) -> RpcError {
    let message = error
        .pointer("/data/message")
        .and_then(Value::as_str)
        .or_else(|| error.get("message").and_then(Value::as_str))
        .or_else(|| error.as_str())
        .filter(|message| !message.trim().is_empty())
        .unwrap_or(GENERIC_REMOTE_ERROR)
        .to_string();
    let exception = error
        .pointer("/data/name")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);
    RpcError::Remote { message, exception }
}
