//! Wire types for JSON-RPC 2.0 and the MCP methods the client uses.
//!
//! Messages are exchanged one per line (NDJSON) over the server's stdio.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision requested during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Method names.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const LIST_TOOLS: &str = "tools/list";
    pub const CALL_TOOL: &str = "tools/call";
    pub const PING: &str = "ping";
}

/// Standard JSON-RPC error codes.
pub mod codes {
    pub const METHOD_NOT_FOUND: i64 = -32601;
}

// ============================================================================
// Envelopes
// ============================================================================

/// Request sent to the server.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope<'a> {
    pub jsonrpc: &'static str,
    /// Correlation id, unique and increasing per client.
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> RequestEnvelope<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

/// Notification sent to the server (no id, no response).
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEnvelope<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> NotificationEnvelope<'a> {
    pub fn new(method: &'a str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params: None,
        }
    }
}

/// Response the client sends back to server-initiated requests.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl ResponseEnvelope {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ============================================================================
// Incoming messages
// ============================================================================

/// A message read from the server, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Answer to one of our requests.
    Response {
        id: u64,
        outcome: Result<Value, RpcErrorObject>,
    },
    /// Server-initiated request that expects an answer.
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    /// Server-initiated notification.
    Notification { method: String, params: Value },
}

/// Why a line could not be turned into an [`Incoming`] message.
#[derive(Debug)]
pub enum MessageError {
    /// The line is not JSON at all.
    NotJson(serde_json::Error),
    /// Valid JSON with an invalid JSON-RPC shape. `id` is set when the
    /// message can still be attributed to a pending request.
    Malformed { id: Option<u64>, reason: String },
}

impl Incoming {
    /// Parse and classify one line.
    pub fn parse(line: &str) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_str(line).map_err(MessageError::NotJson)?;
        let Value::Object(mut message) = value else {
            return Err(malformed(None, "message is not a JSON object"));
        };

        let raw_id = message.remove("id").filter(|id| !id.is_null());
        let id = raw_id.as_ref().and_then(correlation_id);

        if message.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(malformed(id, "missing or unsupported jsonrpc version"));
        }

        if let Some(method) = message.remove("method") {
            let Value::String(method) = method else {
                return Err(malformed(id, "method is not a string"));
            };
            let params = message.remove("params").unwrap_or(Value::Null);
            return Ok(match raw_id {
                Some(id) => Incoming::Request { id, method, params },
                None => Incoming::Notification { method, params },
            });
        }

        let Some(id) = id else {
            return Err(malformed(None, "response without a usable id"));
        };

        // A null `error` is absent; so is a null `result` next to a real error.
        let error = message.remove("error").filter(|e| !e.is_null());
        let result = message
            .remove("result")
            .filter(|r| error.is_none() || !r.is_null());

        match (result, error) {
            (Some(result), None) => Ok(Incoming::Response {
                id,
                outcome: Ok(result),
            }),
            (None, Some(error)) => serde_json::from_value::<RpcErrorObject>(error)
                .map(|error| Incoming::Response {
                    id,
                    outcome: Err(error),
                })
                .map_err(|e| malformed(Some(id), format!("invalid error object: {e}"))),
            (Some(_), Some(_)) => Err(malformed(Some(id), "response carries both result and error")),
            (None, None) => Err(malformed(Some(id), "response carries neither result nor error")),
        }
    }
}

fn malformed(id: Option<u64>, reason: impl Into<String>) -> MessageError {
    MessageError::Malformed {
        id,
        reason: reason.into(),
    }
}

/// Our ids are integers; some servers echo them back as strings.
fn correlation_id(id: &Value) -> Option<u64> {
    match id {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// ============================================================================
// MCP payloads
// ============================================================================

/// Name and version of a client or server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Parameters for `initialize`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: Implementation,
}

/// Result of `initialize`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    pub server_info: Implementation,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Parameters for `tools/list`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListToolsParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// One page of `tools/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// A tool advertised by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema of the tool's arguments.
    #[serde(default)]
    pub input_schema: Value,
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Serialize)]
pub struct CallToolParams<'a> {
    pub name: &'a str,
    pub arguments: Value,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub structured_content: Option<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// First text block, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::Other => None,
        })
    }

    /// All text blocks joined by newlines.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A content block in a tool result. Only text is consumed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}
