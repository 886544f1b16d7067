//! MCP protocol types and JSON-RPC envelope codec.
//!
//! Implements the subset of the JSON-RPC based MCP protocol needed to verify
//! a server: `initialize`, `notifications/initialized` and `tools/list`.
//! See: <https://spec.modelcontextprotocol.io/>

use crate::error::{McpError, McpResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol version sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Method names used by the verifier.
pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_TOOLS_LIST: &str = "tools/list";

/// JSON-RPC request (or notification if id is None).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// Request ID. None for notifications (which don't expect a response).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Create a new JSON-RPC notification.
    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.into(),
            params: None,
        }
    }

    /// Check if this is a notification (no response expected).
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    /// Servers may echo the id as a number or a string.
    #[serde(default)]
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Whether this response answers the request with `id`.
    pub fn matches(&self, id: u64) -> bool {
        match &self.id {
            Value::Number(n) => n.as_u64() == Some(id),
            Value::String(s) => s.parse::<u64>().ok() == Some(id),
            _ => false,
        }
    }

    /// Extract the typed `result`, turning a JSON-RPC `error` into a protocol error.
    pub fn into_result<T: DeserializeOwned>(self, method: &str) -> McpResult<T> {
        if let Some(error) = self.error {
            return Err(McpError::protocol(format!(
                "{method} failed ({}): {}",
                error.code, error.message
            )));
        }
        let result = self
            .result
            .ok_or_else(|| McpError::protocol(format!("missing {method} result")))?;
        serde_json::from_value(result)
            .map_err(|e| McpError::protocol(format!("invalid {method} result: {e}")))
    }
}

/// JSON-RPC error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Per-session request id generator.
///
/// Every id handed out by one generator is distinct and increasing.
#[derive(Debug)]
pub struct RequestIds {
    next: u64,
}

impl RequestIds {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// MCP initialization parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Value::Object(Default::default()),
            client_info: ClientInfo::default(),
        }
    }
}

/// Client info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "mcpscout".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// MCP initialization result.
///
/// Capabilities are kept verbatim; the verifier reports them, it does not
/// interpret them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Option<Value>,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

/// Server info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// MCP tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    /// Tool name.
    pub name: String,
    /// Tool description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// List tools result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<McpTool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Build the `initialize` request.
pub fn initialize_request(id: u64) -> JsonRpcRequest {
    let params = serde_json::to_value(InitializeParams::default()).ok();
    JsonRpcRequest::new(id, METHOD_INITIALIZE, params)
}

/// Build the `notifications/initialized` notification.
pub fn initialized_notification() -> JsonRpcRequest {
    JsonRpcRequest::notification(METHOD_INITIALIZED)
}

/// Build a `tools/list` request, optionally continuing from a cursor.
pub fn tools_list_request(id: u64, cursor: Option<&str>) -> JsonRpcRequest {
    let params = cursor.map(|c| serde_json::json!({ "cursor": c }));
    JsonRpcRequest::new(id, METHOD_TOOLS_LIST, params)
}

/// Encode a message as one newline-terminated line.
pub fn encode_line(request: &JsonRpcRequest) -> McpResult<String> {
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    Ok(line)
}

/// Decode `text` as the response to request `id`.
///
/// Returns `None` for malformed JSON, for server-initiated requests and
/// notifications, and for responses to a different id.
pub fn decode_response(text: &str, id: u64) -> Option<JsonRpcResponse> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    decode_value(value, id)
}

/// Like [`decode_response`], for an already parsed message.
pub fn decode_value(value: Value, id: u64) -> Option<JsonRpcResponse> {
    let object = value.as_object()?;
    if object.contains_key("method") {
        return None;
    }
    if !object.contains_key("result") && !object.contains_key("error") {
        return None;
    }
    let response: JsonRpcResponse = serde_json::from_value(value).ok()?;
    response.matches(id).then_some(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = initialize_request(7);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":7"));
        assert!(json.contains("\"method\":\"initialize\""));
        assert!(json.contains("\"protocolVersion\":\"2024-11-05\""));
        assert!(json.contains("\"clientInfo\":{\"name\":\"mcpscout\""));
    }

    #[test]
    fn test_notification_has_no_id() {
        let note = initialized_notification();
        assert!(note.is_notification());
        let json = serde_json::to_string(&note).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(json.contains("notifications/initialized"));
    }

    #[test]
    fn test_tools_list_cursor() {
        let first = tools_list_request(2, None);
        assert!(first.params.is_none());
        let next = tools_list_request(3, Some("page-2"));
        assert_eq!(next.params.unwrap()["cursor"], "page-2");
    }

    #[test]
    fn test_encode_line_is_single_line() {
        let line = encode_line(&initialize_request(1)).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_request_ids_are_distinct() {
        let mut ids = RequestIds::new();
        let a = ids.next_id();
        let b = ids.next_id();
        let c = ids.next_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_decode_matching_response() {
        let text =
            r#"{"jsonrpc":"2.0","id":3,"result":{"serverInfo":{"name":"fs","version":"1.2"}}}"#;
        let response = decode_response(text, 3).expect("response");
        let init: InitializeResult = response.into_result(METHOD_INITIALIZE).unwrap();
        assert_eq!(
            init.server_info,
            Some(ServerInfo {
                name: "fs".to_string(),
                version: Some("1.2".to_string())
            })
        );
    }

    #[test]
    fn test_decode_string_id() {
        let text = r#"{"jsonrpc":"2.0","id":"4","result":{}}"#;
        assert!(decode_response(text, 4).is_some());
    }

    #[test]
    fn test_decode_rejects_mismatch_and_garbage() {
        let text = r#"{"jsonrpc":"2.0","id":9,"result":{}}"#;
        assert!(decode_response(text, 1).is_none());
        assert!(decode_response("Server listening on stdio", 1).is_none());
        assert!(decode_response("{\"jsonrpc\":", 1).is_none());
        assert!(decode_response("[1,2,3]", 1).is_none());
    }

    #[test]
    fn test_decode_ignores_server_requests() {
        let text = r#"{"jsonrpc":"2.0","id":1,"method":"roots/list"}"#;
        assert!(decode_response(text, 1).is_none());
        let note = r#"{"jsonrpc":"2.0","method":"notifications/message","params":{}}"#;
        assert!(decode_response(note, 1).is_none());
    }

    #[test]
    fn test_error_response_becomes_protocol_error() {
        let text = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"nope"}}"#;
        let response = decode_response(text, 1).unwrap();
        let err = response
            .into_result::<InitializeResult>(METHOD_INITIALIZE)
            .unwrap_err();
        assert_eq!(err.to_string(), "protocol error: initialize failed (-32601): nope");
    }

    #[test]
    fn test_list_tools_result_lenient() {
        let result: ListToolsResult = serde_json::from_value(serde_json::json!({
            "tools": [
                {"name": "read_file", "description": "Read", "inputSchema": {"type": "object"}},
                {"name": "bare"}
            ],
            "nextCursor": "abc"
        }))
        .unwrap();
        assert_eq!(result.tools.len(), 2);
        assert!(result.tools[1].description.is_none());
        assert_eq!(result.next_cursor.as_deref(), Some("abc"));
    }
}
