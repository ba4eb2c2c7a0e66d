use percent_encoding::percent_decode_str;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::rpc::{OdooClient, RpcError};

const SCHEME: &str = "odoo://";

pub const LIST_MODELS_URI: &str = "odoo://models";
pub const MODEL_SCHEMA_TEMPLATE: &str = "odoo://model/{model}";
pub const RECORD_TEMPLATE: &str = "odoo://record/{model}/{id}";
pub const SEARCH_TEMPLATE: &str = "odoo://search/{model}/{domain}";

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Unknown resource uri '{0}'")]
    UnknownAddress(String),
    #[error("Record id '{0}' is not an integer")]
    InvalidRecordId(String),
    #[error("Search domain could not be decoded: {0}")]
    InvalidDomain(String),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// A parsed `odoo://` resource uri.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceAddress {
    ListModels,
    ModelSchema { model: String },
    Record { model: String, id: i64 },
    Search { model: String, domain: Value },
}

impl ResourceAddress {
    pub fn parse(uri: &str) -> Result<Self, ResourceError> {
        let unknown = || ResourceError::UnknownAddress(uri.to_string());
        let rest = uri.strip_prefix(SCHEME).ok_or_else(unknown)?;
        let mut parts = rest.splitn(3, '/');
        let kind = parts.next().unwrap_or_default();
        let model = parts
            .next()
            .filter(|model| !model.is_empty())
            .map(ToOwned::to_owned);
        let tail = parts.next();

        match (kind, model, tail) {
            ("models", None, None) => Ok(Self::ListModels),
            ("model", Some(model), None) => Ok(Self::ModelSchema { model }),
            ("record", Some(model), Some(id)) => {
                let id = id
                    .parse::<i64>()
                    .map_err(|_| ResourceError::InvalidRecordId(id.to_string()))?;
                Ok(Self::Record { model, id })
            }
            ("search", Some(model), Some(domain)) => Ok(Self::Search {
                model,
                domain: decode_domain(domain)?,
            }),
            _ => Err(unknown()),
        }
    }

    pub async fn resolve(&self, client: &OdooClient) -> Result<Value, ResourceError> {
        let value = match self {
            Self::ListModels => list_models(client).await?,
            Self::ModelSchema { model } => model_schema(client, model).await?,
            Self::Record { model, id } => record(client, model, *id).await?,
            Self::Search { model, domain } => search(client, model, domain.clone()).await?,
        };
        Ok(value)
    }
}

pub async fn list_models(client: &OdooClient) -> Result<Value, RpcError> {
    client
        .call(
            "ir.model",
            "search_read",
            vec![json!([]), json!(["model", "name"])],
            Map::new(),
        )
        .await
}

pub async fn model_schema(client: &OdooClient, model: &str) -> Result<Value, RpcError> {
    client
        .call(
            model,
            "fields_get",
            vec![json!([]), json!(["string", "type", "required"])],
            Map::new(),
        )
        .await
}

/// Read one record; a missing id yields an empty object, not an error.
pub async fn record(client: &OdooClient, model: &str, id: i64) -> Result<Value, RpcError> {
    let rows = client
        .call(model, "read", vec![json!([id])], Map::new())
        .await?;
    Ok(first_or_empty(rows))
}

pub async fn search(client: &OdooClient, model: &str, domain: Value) -> Result<Value, RpcError> {
    client
        .call(model, "search_read", vec![domain], Map::new())
        .await
}

/// Decode a url-encoded, JSON-encoded Odoo domain such as
/// `%5B%5B%22vat%22%2C%22%3D%22%2C%22X%22%5D%5D`.
pub fn decode_domain(raw: &str) -> Result<Value, ResourceError> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|e| ResourceError::InvalidDomain(e.to_string()))?;
    let domain: Value =
        serde_json::from_str(&decoded).map_err(|e| ResourceError::InvalidDomain(e.to_string()))?;
    if !domain.is_array() {
        return Err(ResourceError::InvalidDomain(
            "domain must be a JSON array".to_string(),
        ));
    }
    Ok(domain)
}

pub(crate) fn first_or_empty(rows: Value) -> Value {
    match rows {
        Value::Array(rows) => rows
            .into_iter()
            .next()
            .unwrap_or_else(|| Value::Object(Map::new())),
        _ => Value::Object(Map::new()),
    }
}
