use serde_json::{Map, Value, json};

use odoo_mcp_core::ConfigBundle;
use odoo_mcp_core::error::codes;

use crate::resources::{self, first_or_empty};
use crate::rpc::{OdooClient, RpcError};
use crate::search_index::{SearchError, SearchIndexClient};

const PRODUCT_FIELDS: [&str; 6] = [
    "id",
    "name",
    "default_code",
    "list_price",
    "qty_available",
    "uom_id",
];
const PARTNER_FIELDS: [&str; 6] = ["id", "name", "vat", "email", "phone", "is_company"];
const DEFAULT_LOOKUP_LIMIT: u64 = 10;
const MAX_CATALOG_LIMIT: u64 = 100;

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

#[derive(Debug, Clone)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
    pub details: Option<Value>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
            details: None,
        }
    }

    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_ARGUMENTS, message).with_field(field)
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn to_value(&self) -> Value {
        let mut payload = json!({
            "error": self.code,
            "message": self.message
        });
        if let Some(field) = &self.field {
            payload["field"] = Value::String(field.clone());
        }
        if let Some(details) = &self.details {
            payload["details"] = details.clone();
        }
        payload
    }
}

impl From<RpcError> for ToolError {
    fn from(err: RpcError) -> Self {
        let mut tool_error = ToolError::new(err.code(), err.to_string());
        match &err {
            RpcError::Transport { status } => {
                tool_error = tool_error.with_details(json!({ "status": status }));
            }
            RpcError::Remote {
                exception: Some(exception),
                ..
            } => {
                tool_error = tool_error.with_details(json!({ "exception": exception }));
            }
            _ => {}
        }
        tool_error
    }
}

impl From<SearchError> for ToolError {
    fn from(err: SearchError) -> Self {
        ToolError::new(err.code(), err.to_string())
    }
}

/// Everything a handler may touch while serving one call.
pub struct ToolContext<'a> {
    pub client: &'a OdooClient,
    pub search: Option<&'a SearchIndexClient>,
}

/// Every operation this server knows about, before allow-list gating.
pub fn catalogue() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "list_models",
            description: "List the Odoo models (technical name and label) available to the configured user.",
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_model_fields",
            description: "Describe the fields of an Odoo model (label, type, required).",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": { "type": "string", "description": "Technical model name, e.g. res.partner" }
                },
                "required": ["model"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "search_records",
            description: "Search records of a model with an Odoo domain and return the matching rows.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": { "type": "string" },
                    "domain": { "type": "array", "description": "Odoo domain, e.g. [[\"name\", \"ilike\", \"acme\"]]", "default": [] },
                    "fields": { "type": "array", "items": { "type": "string" } },
                    "limit": { "type": "integer", "minimum": 0 },
                    "offset": { "type": "integer", "minimum": 0 },
                    "order": { "type": "string", "description": "e.g. \"name asc\"" }
                },
                "required": ["model"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "read_record",
            description: "Read one record by id. Returns an empty object when the record does not exist.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": { "type": "string" },
                    "id": { "type": "integer" },
                    "fields": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["model", "id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "create_record",
            description: "Create a record and return its id.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": { "type": "string" },
                    "values": { "type": "object", "description": "Field values for the new record" }
                },
                "required": ["model", "values"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "update_record",
            description: "Write field values on one or more existing records.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": { "type": "string" },
                    "ids": {
                        "oneOf": [
                            { "type": "integer" },
                            { "type": "array", "items": { "type": "integer" }, "minItems": 1 }
                        ]
                    },
                    "values": { "type": "object" }
                },
                "required": ["model", "ids", "values"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "delete_record",
            description: "Delete one or more records.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": { "type": "string" },
                    "ids": {
                        "oneOf": [
                            { "type": "integer" },
                            { "type": "array", "items": { "type": "integer" }, "minItems": 1 }
                        ]
                    }
                },
                "required": ["model", "ids"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "search_product_by_reference_code",
            description: "Find products whose internal reference (default_code) matches exactly.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "reference_code": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "default": DEFAULT_LOOKUP_LIMIT }
                },
                "required": ["reference_code"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "search_partner_by_vat",
            description: "Find customers/suppliers by tax id (VAT).",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "vat": { "type": "string" }
                },
                "required": ["vat"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "create_sale_order",
            description: "Create a quotation for a customer, then add its lines one by one. Lines already created are kept if a later line fails.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "partner_id": { "type": "integer" },
                    "lines": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "product_id": { "type": "integer" },
                                "quantity": { "type": "number", "exclusiveMinimum": 0 },
                                "price_unit": { "type": "number", "minimum": 0 }
                            },
                            "required": ["product_id", "quantity"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["partner_id", "lines"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "search_products_catalog",
            description: "Full-text product search against the configured catalogue index.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "maximum": MAX_CATALOG_LIMIT, "default": DEFAULT_LOOKUP_LIMIT }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        },
    ]
}

/// The operations registered for `bundle`: the catalogue filtered through
/// the allow-list gate, evaluated once per server instance.
pub fn registered(bundle: &ConfigBundle) -> Vec<ToolDefinition> {
    bundle
        .enabled_operations
        .admitted(catalogue(), |tool| tool.name)
}

pub async fn execute(
    name: &str,
    args: &Map<String, Value>,
    ctx: &ToolContext<'_>,
) -> Result<Value, ToolError> {
    match name {
        "list_models" => Ok(json!({ "models": resources::list_models(ctx.client).await? })),
        "get_model_fields" => {
            let model = required_string(args, "model")?;
            let fields = resources::model_schema(ctx.client, &model).await?;
            Ok(json!({ "model": model, "fields": fields }))
        }
        "search_records" => search_records(args, ctx).await,
        "read_record" => read_record(args, ctx).await,
        "create_record" => create_record(args, ctx).await,
        "update_record" => update_record(args, ctx).await,
        "delete_record" => delete_record(args, ctx).await,
        "search_product_by_reference_code" => search_product_by_reference_code(args, ctx).await,
        "search_partner_by_vat" => search_partner_by_vat(args, ctx).await,
        "create_sale_order" => create_sale_order(args, ctx).await,
        "search_products_catalog" => search_products_catalog(args, ctx).await,
        _ => Err(ToolError::new(
            "unknown_tool",
            format!("Unknown tool '{name}'"),
        )),
    }
}

async fn search_records(args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
    let model = required_string(args, "model")?;
    let domain = arg_domain(args, "domain")?;
    let mut kwargs = Map::new();
    if let Some(fields) = arg_optional_string_array(args, "fields")? {
        kwargs.insert("fields".to_string(), json!(fields));
    }
    if let Some(limit) = arg_optional_u64(args, "limit")? {
        kwargs.insert("limit".to_string(), json!(limit));
    }
    if let Some(offset) = arg_optional_u64(args, "offset")? {
        kwargs.insert("offset".to_string(), json!(offset));
    }
    if let Some(order) = arg_optional_string(args, "order")? {
        kwargs.insert("order".to_string(), json!(order));
    }

    let records = ctx
        .client
        .call(&model, "search_read", vec![domain], kwargs)
        .await?;
    let count = records.as_array().map_or(0, Vec::len);
    Ok(json!({ "model": model, "count": count, "records": records }))
}

async fn read_record(args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
    let model = required_string(args, "model")?;
    let id = required_i64(args, "id")?;
    let record = match arg_optional_string_array(args, "fields")? {
        Some(fields) => {
            let mut kwargs = Map::new();
            kwargs.insert("fields".to_string(), json!(fields));
            let rows = ctx
                .client
                .call(&model, "read", vec![json!([id])], kwargs)
                .await?;
            first_or_empty(rows)
        }
        None => resources::record(ctx.client, &model, id).await?,
    };
    let found = record.as_object().is_some_and(|row| !row.is_empty());
    Ok(json!({ "model": model, "id": id, "found": found, "record": record }))
}

async fn create_record(args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
    let model = required_string(args, "model")?;
    let values = required_object(args, "values")?;
    let id = ctx
        .client
        .call(&model, "create", vec![Value::Object(values)], Map::new())
        .await?;
    Ok(json!({ "model": model, "id": id }))
}

async fn update_record(args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
    let model = required_string(args, "model")?;
    let ids = required_ids(args, "ids")?;
    let values = required_object(args, "values")?;
    let updated = ctx
        .client
        .call(
            &model,
            "write",
            vec![json!(ids), Value::Object(values)],
            Map::new(),
        )
        .await?;
    Ok(json!({ "model": model, "ids": ids, "updated": updated }))
}

async fn delete_record(args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
    let model = required_string(args, "model")?;
    let ids = required_ids(args, "ids")?;
    let deleted = ctx
        .client
        .call(&model, "unlink", vec![json!(ids)], Map::new())
        .await?;
    Ok(json!({ "model": model, "ids": ids, "deleted": deleted }))
}

async fn search_product_by_reference_code(
    args: &Map<String, Value>,
    ctx: &ToolContext<'_>,
) -> Result<Value, ToolError> {
    let reference_code = required_string(args, "reference_code")?;
    let limit = arg_optional_u64(args, "limit")?.unwrap_or(DEFAULT_LOOKUP_LIMIT);
    let mut kwargs = Map::new();
    kwargs.insert("fields".to_string(), json!(PRODUCT_FIELDS));
    kwargs.insert("limit".to_string(), json!(limit));

    let products = ctx
        .client
        .call(
            "product.product",
            "search_read",
            vec![json!([["default_code", "=", reference_code]])],
            kwargs,
        )
        .await?;
    let count = products.as_array().map_or(0, Vec::len);
    Ok(json!({
        "reference_code": reference_code,
        "count": count,
        "products": products
    }))
}

async fn search_partner_by_vat(args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
    let vat = required_string(args, "vat")?;
    let mut kwargs = Map::new();
    kwargs.insert("fields".to_string(), json!(PARTNER_FIELDS));
    kwargs.insert("limit".to_string(), json!(DEFAULT_LOOKUP_LIMIT));

    let partners = ctx
        .client
        .call(
            "res.partner",
            "search_read",
            vec![json!([["vat", "=", vat]])],
            kwargs,
        )
        .await?;
    let count = partners.as_array().map_or(0, Vec::len);
    Ok(json!({ "vat": vat, "count": count, "partners": partners }))
}

#[derive(Debug)]
struct OrderLine {
    product_id: i64,
    quantity: f64,
    price_unit: Option<f64>,
}

fn parse_order_lines(args: &Map<String, Value>) -> Result<Vec<OrderLine>, ToolError> {
    let items = args
        .get("lines")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
        .ok_or_else(|| ToolError::invalid("lines", "'lines' must be a non-empty array"))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let field = format!("lines[{index}]");
            let line = item
                .as_object()
                .ok_or_else(|| ToolError::invalid(&field, format!("'{field}' must be an object")))?;
            let product_id = required_i64(line, "product_id")
                .map_err(|err| err.with_field(format!("{field}.product_id")))?;
            let quantity = line
                .get("quantity")
                .and_then(Value::as_f64)
                .filter(|quantity| *quantity > 0.0)
                .ok_or_else(|| {
                    ToolError::invalid(
                        &format!("{field}.quantity"),
                        "'quantity' must be a positive number",
                    )
                })?;
            let price_unit = match line.get("price_unit") {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.as_f64().filter(|price| *price >= 0.0).ok_or_else(
                    || {
                        ToolError::invalid(
                            &format!("{field}.price_unit"),
                            "'price_unit' must be a non-negative number",
                        )
                    },
                )?),
            };
            Ok(OrderLine {
                product_id,
                quantity,
                price_unit,
            })
        })
        .collect()
}

/// Header first, then each line in order. No rollback: a failing line
/// leaves the order and earlier lines in place and reports them.
async fn create_sale_order(args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
    let partner_id = required_i64(args, "partner_id")?;
    let lines = parse_order_lines(args)?;

    let order_id = ctx
        .client
        .call(
            "sale.order",
            "create",
            vec![json!({ "partner_id": partner_id })],
            Map::new(),
        )
        .await?;

    let mut line_ids = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        let mut values = json!({
            "order_id": order_id,
            "product_id": line.product_id,
            "product_uom_qty": line.quantity,
        });
        if let Some(price_unit) = line.price_unit {
            values["price_unit"] = json!(price_unit);
        }
        match ctx
            .client
            .call("sale.order.line", "create", vec![values], Map::new())
            .await
        {
            Ok(line_id) => line_ids.push(line_id),
            Err(err) => {
                tracing::warn!(
                    event = "sale_order_partial",
                    order_id = %order_id,
                    failed_line = index,
                    created_lines = line_ids.len(),
                    error = %err,
                    "Sale order line failed; earlier records are kept"
                );
                let tool_error = ToolError::from(err);
                return Err(ToolError::new(
                    tool_error.code,
                    format!(
                        "Sale order {order_id} was created but line {index} failed: {}",
                        tool_error.message
                    ),
                )
                .with_details(json!({
                    "order_id": order_id,
                    "created_line_ids": line_ids,
                    "failed_line_index": index,
                    "rolled_back": false,
                    "cause": tool_error.details
                })));
            }
        }
    }

    Ok(json!({
        "order_id": order_id,
        "partner_id": partner_id,
        "line_ids": line_ids
    }))
}

async fn search_products_catalog(
    args: &Map<String, Value>,
    ctx: &ToolContext<'_>,
) -> Result<Value, ToolError> {
    let query = required_string(args, "query")?;
    let limit = arg_optional_u64(args, "limit")?
        .unwrap_or(DEFAULT_LOOKUP_LIMIT)
        .clamp(1, MAX_CATALOG_LIMIT);
    let search = ctx.search.ok_or_else(|| {
        ToolError::new(
            codes::SEARCH_NOT_CONFIGURED,
            "Catalogue search needs algolia-api-key, algolia-app-id and algolia-index-name (or the ALGOLIA_* settings).",
        )
    })?;
    Ok(search.query(&query, limit).await?)
}

fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let value = args
        .get(key)
        .ok_or_else(|| ToolError::invalid(key, format!("Missing required field '{key}'")))?;
    match value {
        Value::String(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Value::String(_) => Err(ToolError::invalid(key, format!("'{key}' must not be empty"))),
        _ => Err(ToolError::invalid(key, format!("'{key}' must be a string"))),
    }
}

fn required_i64(args: &Map<String, Value>, key: &str) -> Result<i64, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Err(ToolError::invalid(
            key,
            format!("Missing required field '{key}'"),
        )),
        Some(value) => value
            .as_i64()
            .ok_or_else(|| ToolError::invalid(key, format!("'{key}' must be an integer"))),
    }
}

fn required_object(args: &Map<String, Value>, key: &str) -> Result<Map<String, Value>, ToolError> {
    match args.get(key) {
        Some(Value::Object(map)) => Ok(map.clone()),
        None => Err(ToolError::invalid(
            key,
            format!("Missing required field '{key}'"),
        )),
        Some(_) => Err(ToolError::invalid(key, format!("'{key}' must be an object"))),
    }
}

/// A single id or a non-empty array of ids.
fn required_ids(args: &Map<String, Value>, key: &str) -> Result<Vec<i64>, ToolError> {
    let invalid = || ToolError::invalid(key, format!("'{key}' must be an integer or a non-empty array of integers"));
    match args.get(key) {
        None => Err(ToolError::invalid(
            key,
            format!("Missing required field '{key}'"),
        )),
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|item| item.as_i64().ok_or_else(invalid))
            .collect(),
        Some(value) => value.as_i64().map(|id| vec![id]).ok_or_else(invalid),
    }
}

fn arg_domain(args: &Map<String, Value>, key: &str) -> Result<Value, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(json!([])),
        Some(Value::Array(items)) => Ok(Value::Array(items.clone())),
        Some(_) => Err(ToolError::invalid(key, format!("'{key}' must be an Odoo domain array"))),
    }
}

fn arg_optional_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(ToolError::invalid(key, format!("'{key}' must be a string"))),
    }
}

fn arg_optional_u64(args: &Map<String, Value>, key: &str) -> Result<Option<u64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| ToolError::invalid(key, format!("'{key}' must be an unsigned integer"))),
    }
}

fn arg_optional_string_array(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<String>>, ToolError> {
    let Some(value) = args.get(key) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let items = value
        .as_array()
        .ok_or_else(|| ToolError::invalid(key, format!("'{key}' must be an array of strings")))?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let text = item
            .as_str()
            .ok_or_else(|| ToolError::invalid(key, format!("'{key}' items must be strings")))?;
        let normalized = text.trim();
        if !normalized.is_empty() {
            out.push(normalized.to_string());
        }
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use odoo_mcp_core::EnabledOperations;
    use serde_json::json;

    use super::*;
    use crate::testing::{FakeOdoo, odoo_error};

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn catalogue_names_are_unique() {
        let names: Vec<&str> = catalogue().iter().map(|tool| tool.name).collect();
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(names.len(), unique.len());
        assert!(names.contains(&"search_product_by_reference_code"));
    }

    #[test]
    fn registration_follows_the_allow_list() {
        let mut bundle = crate::testing::bundle_for("http://127.0.0.1:9");
        assert_eq!(registered(&bundle).len(), catalogue().len());

        bundle.enabled_operations = EnabledOperations::only(["search_product_by_reference_code"]);
        let names: Vec<&str> = registered(&bundle).iter().map(|tool| tool.name).collect();
        assert_eq!(names, vec!["search_product_by_reference_code"]);

        bundle.enabled_operations = EnabledOperations::only(["not_a_tool"]);
        assert!(registered(&bundle).is_empty());
    }

    #[tokio::test]
    async fn reference_code_lookup_filters_on_default_code() {
        let fake = FakeOdoo::start(|_| Ok(json!([{"id": 9, "default_code": "REF-1"}]))).await;
        let bundle = fake.bundle();
        let client = OdooClient::new(&bundle);
        let ctx = ToolContext {
            client: &client,
            search: None,
        };

        let result = execute(
            "search_product_by_reference_code",
            &args(json!({"reference_code": " REF-1 "})),
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["reference_code"], "REF-1");

        let call = &fake.executions()[0];
        assert_eq!(call.model, "product.product");
        assert_eq!(call.method, "search_read");
        assert_eq!(call.args, json!([[["default_code", "=", "REF-1"]]]));
        assert_eq!(call.kwargs["limit"], DEFAULT_LOOKUP_LIMIT);
    }

    #[tokio::test]
    async fn read_record_reports_missing_rows_as_empty() {
        let fake = FakeOdoo::start(|_| Ok(json!([]))).await;
        let bundle = fake.bundle();
        let client = OdooClient::new(&bundle);
        let ctx = ToolContext {
            client: &client,
            search: None,
        };

        let result = execute(
            "read_record",
            &args(json!({"model": "res.partner", "id": 999999})),
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(result["found"], false);
        assert_eq!(result["record"], json!({}));
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_backend() {
        let fake = FakeOdoo::start(|_| Ok(json!([]))).await;
        let bundle = fake.bundle();
        let client = OdooClient::new(&bundle);
        let ctx = ToolContext {
            client: &client,
            search: None,
        };

        let err = execute("read_record", &args(json!({"model": "res.partner", "id": "x"})), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::INVALID_ARGUMENTS);
        assert_eq!(err.field.as_deref(), Some("id"));

        let err = execute(
            "update_record",
            &args(json!({"model": "res.partner", "ids": [], "values": {}})),
            &ctx,
        )
        .await
        .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("ids"));

        let err = execute(
            "create_sale_order",
            &args(json!({"partner_id": 1, "lines": [{"product_id": 2, "quantity": 0}]})),
            &ctx,
        )
        .await
        .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("lines[0].quantity"));

        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn write_operations_use_odoo_methods() {
        let fake = FakeOdoo::start(|call| match call.method.as_str() {
            "create" => Ok(json!(31)),
            _ => Ok(json!(true)),
        })
        .await;
        let bundle = fake.bundle();
        let client = OdooClient::new(&bundle);
        let ctx = ToolContext {
            client: &client,
            search: None,
        };

        let created = execute(
            "create_record",
            &args(json!({"model": "res.partner", "values": {"name": "Azure"}})),
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(created["id"], 31);

        execute(
            "update_record",
            &args(json!({"model": "res.partner", "ids": 31, "values": {"phone": "123"}})),
            &ctx,
        )
        .await
        .unwrap();
        let deleted = execute(
            "delete_record",
            &args(json!({"model": "res.partner", "ids": [31]})),
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(deleted["deleted"], true);

        let calls = fake.executions();
        assert_eq!(calls[0].args, json!([{"name": "Azure"}]));
        assert_eq!(calls[1].method, "write");
        assert_eq!(calls[1].args, json!([[31], {"phone": "123"}]));
        assert_eq!(calls[2].method, "unlink");
        assert_eq!(calls[2].args, json!([[31]]));
        assert_eq!(fake.login_count(), 1);
    }

    #[tokio::test]
    async fn sale_order_lines_are_created_in_order() {
        let fake = FakeOdoo::start(|call| match call.model.as_str() {
            "sale.order" => Ok(json!(100)),
            _ => Ok(json!(200 + call.args[0]["product_id"].as_i64().unwrap_or_default())),
        })
        .await;
        let bundle = fake.bundle();
        let client = OdooClient::new(&bundle);
        let ctx = ToolContext {
            client: &client,
            search: None,
        };

        let result = execute(
            "create_sale_order",
            &args(json!({
                "partner_id": 5,
                "lines": [
                    {"product_id": 1, "quantity": 2},
                    {"product_id": 2, "quantity": 1.5, "price_unit": 10.0}
                ]
            })),
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(result["order_id"], 100);
        assert_eq!(result["line_ids"], json!([201, 202]));

        let calls = fake.executions();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].model, "sale.order");
        assert_eq!(calls[0].args, json!([{"partner_id": 5}]));
        assert_eq!(calls[1].args[0]["order_id"], 100);
        assert_eq!(calls[1].args[0]["product_id"], 1);
        assert!(calls[1].args[0].get("price_unit").is_none());
        assert_eq!(calls[2].args[0]["price_unit"], 10.0);
    }

    #[tokio::test]
    async fn sale_order_partial_failure_keeps_created_records() {
        let fake = FakeOdoo::start(|call| match call.model.as_str() {
            "sale.order" => Ok(json!(100)),
            _ if call.args[0]["product_id"] == 3 => Err(odoo_error(
                "odoo.exceptions.ValidationError",
                "Product is archived",
            )),
            _ => Ok(json!(201)),
        })
        .await;
        let bundle = fake.bundle();
        let client = OdooClient::new(&bundle);
        let ctx = ToolContext {
            client: &client,
            search: None,
        };

        let err = execute(
            "create_sale_order",
            &args(json!({
                "partner_id": 5,
                "lines": [
                    {"product_id": 1, "quantity": 1},
                    {"product_id": 3, "quantity": 1},
                    {"product_id": 4, "quantity": 1}
                ]
            })),
            &ctx,
        )
        .await
        .unwrap_err();

        assert_eq!(err.code, codes::REMOTE_ERROR);
        assert!(err.message.contains("Product is archived"));
        let details = err.details.expect("partial failure details");
        assert_eq!(details["order_id"], 100);
        assert_eq!(details["created_line_ids"], json!([201]));
        assert_eq!(details["failed_line_index"], 1);
        assert_eq!(
            details["cause"],
            json!({"exception": "odoo.exceptions.ValidationError"})
        );
        // The third line is never attempted and nothing is unlinked.
        let calls = fake.executions();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|call| call.method == "create"));
    }

    #[tokio::test]
    async fn catalogue_search_requires_credentials() {
        let fake = FakeOdoo::start(|_| Ok(json!([]))).await;
        let bundle = fake.bundle();
        let client = OdooClient::new(&bundle);
        let ctx = ToolContext {
            client: &client,
            search: None,
        };

        let err = execute("search_products_catalog", &args(json!({"query": "drill"})), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::SEARCH_NOT_CONFIGURED);
    }

    #[test]
    fn rpc_errors_map_to_tool_codes() {
        let err = ToolError::from(RpcError::Transport { status: 502 });
        assert_eq!(err.code, codes::TRANSPORT_ERROR);
        assert_eq!(err.details, Some(json!({"status": 502})));

        let err = ToolError::from(RpcError::Authentication("denied".to_string()));
        assert_eq!(err.code, codes::AUTHENTICATION_FAILED);
        assert_eq!(err.to_value()["message"], "Odoo authentication failed: denied");
    }
}
