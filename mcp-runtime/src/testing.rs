//! In-process stand-in for an Odoo `/jsonrpc` endpoint, recording every
//! envelope it receives.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use odoo_mcp_core::{BackendConfig, ConfigBundle, ConfigSource, EnabledOperations};

type Responder = Arc<dyn Fn(&Value) -> (u16, Value) + Send + Sync>;

/// One decoded `object.execute_kw` call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExecuteKw {
    pub model: String,
    pub method: String,
    pub args: Value,
    pub kwargs: Value,
}

impl ExecuteKw {
    fn from_envelope(body: &Value) -> Option<Self> {
        if body.pointer("/params/service")? != "object" {
            return None;
        }
        let args = body.pointer("/params/args")?.as_array()?;
        Some(Self {
            model: args.get(3)?.as_str()?.to_string(),
            method: args.get(4)?.as_str()?.to_string(),
            args: args.get(5).cloned().unwrap_or(Value::Null),
            kwargs: args.get(6).cloned().unwrap_or(Value::Null),
        })
    }
}

#[derive(Clone)]
struct FakeState {
    requests: Arc<Mutex<Vec<Value>>>,
    responder: Responder,
    execute_delay: Duration,
}

pub(crate) struct FakeOdoo {
    url: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl FakeOdoo {
    pub const UID: i64 = 7;
    pub const DATABASE: &'static str = "test_db";
    pub const USERNAME: &'static str = "admin";
    pub const PASSWORD: &'static str = "secret";

    /// Accepts `admin`/`secret` on `test_db`; every `execute_kw` is answered
    /// by `execute` (`Err` becomes an Odoo error payload).
    pub async fn start<F>(execute: F) -> Self
    where
        F: Fn(&ExecuteKw) -> Result<Value, Value> + Send + Sync + 'static,
    {
        Self::start_slow(Duration::ZERO, execute).await
    }

    /// Like [`FakeOdoo::start`], but every `execute_kw` answer is held back
    /// for `execute_delay`; logins stay immediate.
    pub async fn start_slow<F>(execute_delay: Duration, execute: F) -> Self
    where
        F: Fn(&ExecuteKw) -> Result<Value, Value> + Send + Sync + 'static,
    {
        Self::serve(execute_delay, move |body| {
            let id = body.get("id").cloned().unwrap_or(Value::Null);
            let outcome = match body.pointer("/params/service").and_then(Value::as_str) {
                Some("common") => {
                    let expected = json!([Self::DATABASE, Self::USERNAME, Self::PASSWORD]);
                    if body.pointer("/params/args") == Some(&expected) {
                        Ok(json!(Self::UID))
                    } else {
                        Ok(json!(false))
                    }
                }
                _ => match ExecuteKw::from_envelope(body) {
                    Some(call) => execute(&call),
                    None => Err(odoo_error("ValueError", "malformed envelope")),
                },
            };
            let payload = match outcome {
                Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                Err(error) => json!({"jsonrpc": "2.0", "id": id, "error": error}),
            };
            (200, payload)
        })
        .await
    }

    /// Full control over status code and body.
    pub async fn start_raw<F>(responder: F) -> Self
    where
        F: Fn(&Value) -> (u16, Value) + Send + Sync + 'static,
    {
        Self::serve(Duration::ZERO, responder).await
    }

    async fn serve<F>(execute_delay: Duration, responder: F) -> Self
    where
        F: Fn(&Value) -> (u16, Value) + Send + Sync + 'static,
    {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = FakeState {
            requests: requests.clone(),
            responder: Arc::new(responder),
            execute_delay,
        };
        let app = Router::new()
            .route("/jsonrpc", post(jsonrpc))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("fake odoo should bind");
        let addr = listener.local_addr().expect("fake odoo should have an address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            url: format!("http://{addr}"),
            requests,
        }
    }

    /// A complete header-sourced bundle pointing at this backend.
    pub fn bundle(&self) -> ConfigBundle {
        bundle_for(&self.url)
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn login_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|body| body.pointer("/params/service").and_then(Value::as_str) == Some("common"))
            .count()
    }

    pub fn executions(&self) -> Vec<ExecuteKw> {
        self.requests()
            .iter()
            .filter_map(ExecuteKw::from_envelope)
            .collect()
    }
}

/// Open allow-list bundle with the fake backend's credentials.
pub(crate) fn bundle_for(url: &str) -> ConfigBundle {
    ConfigBundle {
        backend: BackendConfig {
            url: url.to_string(),
            database: FakeOdoo::DATABASE.to_string(),
            username: FakeOdoo::USERNAME.to_string(),
            password: FakeOdoo::PASSWORD.to_string(),
        },
        timeout_ms: 5_000,
        search_api_key: None,
        search_app_id: None,
        search_index_name: None,
        enabled_operations: EnabledOperations::open(),
        external_api_key: None,
        source: ConfigSource::RequestHeaders,
    }
}

/// Error object shaped like Odoo's server exceptions.
pub(crate) fn odoo_error(name: &str, message: &str) -> Value {
    json!({
        "code": 200,
        "message": "Odoo Server Error",
        "data": {
            "name": name,
            "message": message,
            "arguments": [message]
        }
    })
}

async fn jsonrpc(State(state): State<FakeState>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    state
        .requests
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(body.clone());
    if body.pointer("/params/service").and_then(Value::as_str) == Some("object") {
        tokio::time::sleep(state.execute_delay).await;
    }
    let (status, payload) = (state.responder)(&body);
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(payload),
    )
}
