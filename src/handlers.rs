//! JSON-RPC 2.0 message handling for the MCP protocol.
//!
//! Both transports feed raw messages through [`handle_raw`], so stdio and
//! SSE clients see identical behaviour.

use crate::constants::MCP_PROTOCOL_VERSION;
use crate::error::{codes, RpcError};
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, RequestId, ServerCapabilities, ServerInfo, ToolsCapability, JSONRPC_VERSION,
};
use crate::server::EpicorMcpServer;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

/// Handle one raw message. Returns the serialized response, or `None` for
/// notifications.
pub async fn handle_raw(server: &EpicorMcpServer, raw: &str) -> Option<String> {
    let message: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("Unparseable JSON-RPC message: {}", e);
            let error = RpcError::parse_error(format!("Parse error: {}", e));
            return encode(&JsonRpcResponse::error(Value::Null, error));
        }
    };

    match message {
        Value::Array(batch) if batch.is_empty() => encode(&JsonRpcResponse::error(
            Value::Null,
            RpcError::invalid_request("Empty batch"),
        )),
        Value::Array(batch) => {
            let mut responses = Vec::new();
            for item in batch {
                if let Some(response) = handle_message(server, item).await {
                    responses.push(response);
                }
            }
            if responses.is_empty() {
                None
            } else {
                encode(&responses)
            }
        }
        single => handle_message(server, single)
            .await
            .and_then(|response| encode(&response)),
    }
}

fn encode<T: Serialize>(response: &T) -> Option<String> {
    match serde_json::to_string(response) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Failed to serialize JSON-RPC response: {}", e);
            None
        }
    }
}

/// Handle one decoded message.
pub async fn handle_message(server: &EpicorMcpServer, message: Value) -> Option<JsonRpcResponse> {
    if !message.is_object() {
        return Some(JsonRpcResponse::error(
            Value::Null,
            RpcError::invalid_request("Request must be a JSON object"),
        ));
    }

    let request: JsonRpcRequest = match serde_json::from_value(message.clone()) {
        Ok(request) => request,
        Err(e) => {
            let RequestId { id } = serde_json::from_value(message).unwrap_or_default();
            return Some(JsonRpcResponse::error(
                id,
                RpcError::invalid_request(format!("Invalid request: {}", e)),
            ));
        }
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return Some(JsonRpcResponse::error(
            request.id.unwrap_or(Value::Null),
            RpcError::invalid_request("jsonrpc must be \"2.0\""),
        ));
    }

    let Some(id) = request.id else {
        debug!(method = %request.method, "Notification received");
        return None;
    };

    let outcome = match request.method.as_str() {
        "initialize" => initialize(server, request.params),
        "ping" => Ok(json!({})),
        "tools/list" => to_result(&ListToolsResult {
            tools: server.list_tools(),
        }),
        "tools/call" => call_tool(server, request.params).await,
        other => Err(RpcError::method_not_found(other)),
    };

    Some(match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::error(id, error),
    })
}

fn to_result<T: Serialize>(result: &T) -> Result<Value, RpcError> {
    serde_json::to_value(result).map_err(|e| RpcError::new(codes::INTERNAL_ERROR, e.to_string()))
}

fn initialize(server: &EpicorMcpServer, params: Option<Value>) -> Result<Value, RpcError> {
    let params: InitializeParams = match params {
        None | Some(Value::Null) => InitializeParams::default(),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| RpcError::invalid_params(format!("Invalid initialize params: {}", e)))?,
    };
    let protocol_version = params
        .protocol_version
        .unwrap_or_else(|| MCP_PROTOCOL_VERSION.to_string());
    let client = params
        .client_info
        .map(|info| info.name)
        .unwrap_or_else(|| "unknown".to_string());
    info!(client = %client, protocol_version = %protocol_version, "MCP client initializing");

    to_result(&InitializeResult {
        protocol_version,
        capabilities: ServerCapabilities {
            tools: ToolsCapability {
                list_changed: false,
            },
        },
        server_info: ServerInfo::current(),
        instructions: server.instructions(),
    })
}

async fn call_tool(server: &EpicorMcpServer, params: Option<Value>) -> Result<Value, RpcError> {
    let Some(params @ Value::Object(_)) = params else {
        return Err(RpcError::invalid_params("tools/call requires a params object"));
    };
    let CallToolParams { name, arguments } = serde_json::from_value(params)
        .map_err(|e| RpcError::invalid_params(format!("Invalid tools/call params: {}", e)))?;
    let arguments = match arguments {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(args @ Value::Object(_)) => args,
        Some(_) => return Err(RpcError::invalid_params("'arguments' must be an object")),
    };

    let output = server.call_tool(&name, arguments).await.map_err(|e| {
        warn!(tool = %name, "Tool call rejected: {}", e);
        RpcError::from(e)
    })?;
    to_result(&output)
}
