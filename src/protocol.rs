//! MCP wire types (JSON-RPC 2.0).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, ToolErrorKind};

/// Protocol revision announced during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request ID. Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

impl McpRequest {
    /// Create a request with a numeric id.
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: Some(json!(id)),
            method: method.into(),
            params,
        }
    }

    /// Create a `tools/call` request.
    pub fn tool_call(id: u64, name: &str, arguments: Value) -> Self {
        Self::new(id, "tools/call", json!({ "name": name, "arguments": arguments }))
    }

    /// Whether this is a notification (no response expected).
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// MCP JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request ID (matches request).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Result (on success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl McpResponse {
    /// Create a success response.
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Create an error response for a failed tool operation.
    ///
    /// The failure category rides in `data.kind` so clients can rebuild it.
    pub fn tool_error(id: Option<Value>, tool: &str, err: &Error) -> Self {
        let message = match err {
            Error::ToolOperationFailed { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(McpError {
                code: error_codes::TOOL_ERROR,
                message,
                data: Some(json!({ "tool": tool, "kind": err.tool_kind() })),
            }),
        }
    }
}

/// MCP error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub message: String,
    /// Additional data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    /// Convert a wire error back into the crate error taxonomy.
    pub fn into_error(self, tool: &str) -> Error {
        if self.code != error_codes::TOOL_ERROR {
            return Error::Protocol(format!("{} (code {})", self.message, self.code));
        }
        let kind = self
            .data
            .as_ref()
            .and_then(|d| d.get("kind"))
            .and_then(|k| serde_json::from_value::<ToolErrorKind>(k.clone()).ok())
            .unwrap_or(ToolErrorKind::Internal);
        Error::tool(tool, kind, self.message)
    }
}

/// Standard JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Server-defined: a tool ran and reported an operation failure.
    pub const TOOL_ERROR: i32 = -32000;
}

/// Tool definition for MCP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Tool call result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Content items in the result.
    pub content: Vec<ContentItem>,
    /// Machine-readable result, when the tool has one.
    #[serde(
        rename = "structuredContent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<Value>,
    /// Whether this is an error result.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// A plain text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            structured_content: None,
            is_error: false,
        }
    }

    /// A text result with a structured payload alongside.
    pub fn structured(text: impl Into<String>, data: Value) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            structured_content: Some(data),
            is_error: false,
        }
    }

    /// All text content joined by newlines.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ContentItem::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Content item in tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentItem {
    /// Text content.
    #[serde(rename = "text")]
    Text { text: String },
    /// Any other content type (image, resource, ...). Carried but never read.
    #[serde(other)]
    Unsupported,
}

impl ContentItem {
    /// Create a text content item.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Server capabilities for initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tool capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,
}

/// Tool-related capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCapabilities {
    /// Whether list_changed notifications are supported.
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}

/// Server information for initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl ServerInfo {
    /// Server info carrying this crate's version.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_has_no_id_on_the_wire() {
        let req: McpRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(req.is_notification());
        assert_eq!(req.params, Value::Null);
    }

    #[test]
    fn test_tool_error_survives_the_wire() {
        let err = Error::tool("read_file", ToolErrorKind::FileNotFound, "notes.txt");
        let resp = McpResponse::tool_error(Some(json!(7)), "read_file", &err);
        let text = serde_json::to_string(&resp).unwrap();
        let back: McpResponse = serde_json::from_str(&text).unwrap();

        match back.error.unwrap().into_error("read_file") {
            Error::ToolOperationFailed { kind, message, .. } => {
                assert_eq!(kind, ToolErrorKind::FileNotFound);
                assert_eq!(message, "notes.txt");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_tool_error_is_protocol_error() {
        let resp = McpResponse::error(None, error_codes::METHOD_NOT_FOUND, "nope");
        let err = resp.error.unwrap().into_error("x");
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_structured_result_field_names() {
        let result = ToolCallResult::structured("hi", json!({"a": 1}));
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["structuredContent"]["a"], 1);
        assert_eq!(v["isError"], false);
        assert_eq!(v["content"][0]["type"], "text");
    }

    #[test]
    fn test_foreign_content_is_skipped_in_text() {
        let result: ToolCallResult = serde_json::from_value(json!({
            "content": [
                {"type": "resource", "resource": {"uri": "file:///a.txt", "mimeType": "text/plain"}},
                {"type": "text", "text": "kept"}
            ]
        }))
        .unwrap();
        assert!(matches!(result.content[0], ContentItem::Unsupported));
        assert_eq!(result.joined_text(), "kept");
    }
}
