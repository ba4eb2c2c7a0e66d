//! MCP runtime for Odoo: JSON-RPC dispatch, the operation catalogue, resource
//! addresses and the Odoo remote procedure client.
//!
//! One [`McpServer`] owns one [`rpc::OdooClient`], so every configuration
//! bundle gets its own session. The HTTP host builds a server per request via
//! [`handle_http_jsonrpc`]; the stdio binary builds one for the process via
//! [`run`].

use clap::Subcommand;
use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use odoo_mcp_core::{ConfigBundle, DefaultSettings};

pub mod resources;
pub mod rpc;
pub mod search_index;
pub mod tools;

#[cfg(test)]
mod testing;

use resources::{
    LIST_MODELS_URI, MODEL_SCHEMA_TEMPLATE, RECORD_TEMPLATE, ResourceAddress, ResourceError,
    SEARCH_TEMPLATE,
};
use rpc::OdooClient;
use search_index::SearchIndexClient;
use tools::{ToolContext, ToolDefinition};

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "odoo-mcp";
const JSON_MIME: &str = "application/json";

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpCommands {
    /// Run the Odoo MCP server over stdio with the process-wide settings
    Serve,
    /// Log in once with the process-wide settings and report the session
    Check,
}

pub async fn run(settings: &DefaultSettings, command: McpCommands) -> i32 {
    let bundle = settings.to_bundle();
    match command {
        McpCommands::Serve => {
            if !bundle.backend.is_complete() {
                tracing::warn!(
                    event = "odoo_settings_incomplete",
                    "ODOO_URL, ODOO_DB, ODOO_USER and ODOO_PASS are not all set; tool calls will fail to authenticate"
                );
            }
            let server = McpServer::new(bundle);
            let mut stdout = io::stdout();
            match server.serve(BufReader::new(io::stdin()), &mut stdout).await {
                Ok(()) => 0,
                Err(err) => {
                    let payload = json!({
                        "error": "mcp_server_error",
                        "message": err.to_string(),
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
        McpCommands::Check => {
            let client = OdooClient::new(&bundle);
            match client.ensure_session().await {
                Ok(uid) => {
                    let report = json!({
                        "status": "ok",
                        "url": bundle.backend.url,
                        "database": client.database(),
                        "uid": uid,
                        "enabled_operations": tools::registered(&bundle)
                            .iter()
                            .map(|tool| tool.name)
                            .collect::<Vec<_>>(),
                    });
                    println!("{}", to_pretty_json(&report));
                    0
                }
                Err(err) => {
                    let payload = json!({
                        "error": err.code(),
                        "message": err.to_string(),
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
    }
}

/// Serve one inbound HTTP JSON-RPC body with a server built for `bundle`.
pub async fn handle_http_jsonrpc(bundle: ConfigBundle, incoming: Value) -> Vec<Value> {
    McpServer::new(bundle).handle_incoming_message(incoming).await
}

/// JSON-RPC `-32700` response for a body that is not JSON at all.
pub fn parse_error_response(message: impl Into<String>) -> Value {
    error_response(Value::Null, ProtocolError::parse_error(message))
}

struct McpServer {
    client: OdooClient,
    search: Option<SearchIndexClient>,
    tools: Vec<ToolDefinition>,
}

impl McpServer {
    fn new(bundle: ConfigBundle) -> Self {
        let tools = tools::registered(&bundle);
        tracing::debug!(
            event = "mcp_server_built",
            source = bundle.source.as_str(),
            registered_tools = tools.len(),
            open_allow_list = bundle.enabled_operations.is_open(),
            "Built MCP server for configuration bundle"
        );
        Self {
            client: OdooClient::new(&bundle),
            search: SearchIndexClient::from_bundle(&bundle),
            tools,
        }
    }

    #[cfg(test)]
    fn with_search_index(mut self, search: SearchIndexClient) -> Self {
        self.search = Some(search);
        self
    }

    async fn serve<R, W>(&self, mut reader: R, writer: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        while let Some((incoming, framing)) = read_message(&mut reader).await? {
            let reply = match incoming {
                Ok(incoming) => {
                    let is_batch = incoming.is_array();
                    let mut responses = self.handle_incoming_message(incoming).await;
                    match responses.len() {
                        0 => None,
                        1 if !is_batch => responses.pop(),
                        _ => Some(Value::Array(responses)),
                    }
                }
                Err(err) => Some(parse_error_response(format!("Invalid JSON payload: {err}"))),
            };
            if let Some(reply) = reply {
                write_message(writer, &reply, framing).await?;
            }
        }
        Ok(())
    }

    async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    ProtocolError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                ProtocolError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                ProtocolError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        // Responses from the client carry no method; nothing is ever awaiting them.
        let method = obj.get("method").and_then(Value::as_str)?;

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        match obj.get("id").cloned() {
            Some(id) => Some(match self.handle_request(method, params).await {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            }),
            None => {
                tracing::debug!(event = "mcp_notification", method = method, "Ignoring notification");
                None
            }
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, ProtocolError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(resources_list_payload()),
            "resources/templates/list" => Ok(resource_templates_payload()),
            "resources/read" => self.handle_resources_read(params).await,
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(ProtocolError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "listChanged": false },
                "prompts": { "listChanged": false }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": format!(
                "Tools operate on the configured Odoo database ({} available). Use list_models and get_model_fields to discover models before searching or writing records. Resources: {LIST_MODELS_URI}, {MODEL_SCHEMA_TEMPLATE}, {RECORD_TEMPLATE}, {SEARCH_TEMPLATE}.",
                self.tools.len()
            )
        })
    }

    fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    fn is_registered(&self, name: &str) -> bool {
        self.tools.iter().any(|tool| tool.name == name)
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, ProtocolError> {
        let params = params
            .as_object()
            .ok_or_else(|| ProtocolError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(ProtocolError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        if !self.is_registered(name) {
            return Err(ProtocolError::invalid_params(format!(
                "Tool not available: {name}"
            )));
        }

        let ctx = ToolContext {
            client: &self.client,
            search: self.search.as_ref(),
        };
        Ok(match tools::execute(name, &args, &ctx).await {
            Ok(payload) => {
                tracing::info!(event = "tool_call_completed", tool = name, "Tool call completed");
                build_tool_call_response(
                    json!({
                        "status": "complete",
                        "tool": name,
                        "data": payload
                    }),
                    false,
                )
            }
            Err(err) => {
                tracing::warn!(
                    event = "tool_call_failed",
                    tool = name,
                    error_code = %err.code,
                    message = %err.message,
                    "Tool call failed"
                );
                build_tool_call_response(
                    json!({
                        "status": "error",
                        "tool": name,
                        "error": err.to_value()
                    }),
                    true,
                )
            }
        })
    }

    async fn handle_resources_read(&self, params: Value) -> Result<Value, ProtocolError> {
        let params = params
            .as_object()
            .ok_or_else(|| ProtocolError::invalid_params("resources/read params must be an object"))?;
        let uri = params.get("uri").and_then(Value::as_str).ok_or_else(|| {
            ProtocolError::invalid_params("resources/read requires string field 'uri'")
        })?;

        let address = ResourceAddress::parse(uri)?;
        let content = address.resolve(&self.client).await?;
        Ok(json!({
            "contents": [{
                "uri": uri,
                "mimeType": JSON_MIME,
                "text": to_pretty_json(&content)
            }]
        }))
    }
}

fn resources_list_payload() -> Value {
    json!({
        "resources": [{
            "uri": LIST_MODELS_URI,
            "name": "Odoo models",
            "description": "Technical name and label of every model visible to the configured user.",
            "mimeType": JSON_MIME
        }]
    })
}

fn resource_templates_payload() -> Value {
    json!({
        "resourceTemplates": [
            {
                "uriTemplate": MODEL_SCHEMA_TEMPLATE,
                "name": "Model fields",
                "description": "Field label, type and required flag for one model.",
                "mimeType": JSON_MIME
            },
            {
                "uriTemplate": RECORD_TEMPLATE,
                "name": "Record",
                "description": "One record by id; an empty object when it does not exist.",
                "mimeType": JSON_MIME
            },
            {
                "uriTemplate": SEARCH_TEMPLATE,
                "name": "Search",
                "description": "Records matching a URL-encoded JSON Odoo domain.",
                "mimeType": JSON_MIME
            }
        ]
    })
}

fn build_tool_call_response(envelope: Value, is_error: bool) -> Value {
    let text = to_pretty_json(&envelope);
    if is_error {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    } else {
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    }
}

#[derive(Debug)]
struct ProtocolError {
    code: i64,
    message: String,
    data: Option<Value>,
}

impl ProtocolError {
    fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
            data: None,
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
            data: None,
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: message.into(),
            data: None,
        }
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<ResourceError> for ProtocolError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::Rpc(rpc) => {
                ProtocolError::internal(rpc.to_string()).with_data(json!({ "error": rpc.code() }))
            }
            other => ProtocolError::invalid_params(other.to_string()),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: ProtocolError) -> Value {
    let mut payload = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    });
    if let Some(data) = error.data {
        payload["error"]["data"] = data;
    }
    payload
}

/// How a stdio message arrived; replies are written back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    ContentLength,
    Line,
}

type Incoming = (Result<Value, serde_json::Error>, Framing);

/// Reads one message, either `Content-Length` framed or a single line of
/// JSON. `Ok(None)` on clean end of input.
async fn read_message<R>(reader: &mut R) -> io::Result<Option<Incoming>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut in_headers = false;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            if !in_headers {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            if in_headers {
                break;
            }
            continue;
        }
        if !in_headers && (trimmed.starts_with('{') || trimmed.starts_with('[')) {
            return Ok(Some((serde_json::from_str(trimmed), Framing::Line)));
        }

        in_headers = true;
        if let Some((name, raw_len)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                let parsed = raw_len.trim().parse::<usize>().map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "Invalid Content-Length header")
                })?;
                content_length = Some(parsed);
            }
        }
    }

    let content_length = content_length.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "Missing Content-Length header")
    })?;
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;
    Ok(Some((
        serde_json::from_slice(&payload),
        Framing::ContentLength,
    )))
}

async fn write_message<W>(writer: &mut W, value: &Value, framing: Framing) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
    }
    writer.flush().await
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
