//! Data models for mcp-probe.
//!
//! JSON-RPC 2.0 message types exchanged with the tool server, and the tool
//! descriptor cached from discovery responses. Field order in the request
//! struct is the order on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method name of the discovery request.
pub const METHOD_TOOLS_LIST: &str = "tools/list";

/// Method name of a tool invocation.
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// JSON-RPC request identifier.
///
/// The protocol allows either a string or a number; the server echoes it back
/// with the same type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    /// Fixed id for the discovery request.
    pub fn discovery() -> Self {
        RequestId::String("1".to_string())
    }

    /// Fixed id for `call <name> <json>`.
    pub fn inline_call() -> Self {
        RequestId::String("2".to_string())
    }

    /// Fixed id for guided `call-<name>` invocations.
    pub fn guided_call() -> Self {
        RequestId::String("3".to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new request with the given method, id and parameters.
    pub fn new(method: &str, id: RequestId, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            id,
            params,
        }
    }

    /// The `tools/list` discovery request. It carries no parameters.
    pub fn discovery() -> Self {
        Self::new(METHOD_TOOLS_LIST, RequestId::discovery(), None)
    }

    /// A `tools/call` request invoking `tool` with `arguments`.
    pub fn tool_call(id: RequestId, tool: &str, arguments: Value) -> Self {
        let params = serde_json::json!({
            "name": tool,
            "arguments": arguments,
        });
        Self::new(METHOD_TOOLS_CALL, id, Some(params))
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC 2.0 response (success or error).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    /// `null` when the server could not determine the request id.
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The discovery payload, if this response carries `result.tools` as an array.
    pub fn discovered_tools(&self) -> Option<&Vec<Value>> {
        self.result.as_ref()?.get("tools")?.as_array()
    }
}

/// Server-initiated message without an id (log lines, progress, list changes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A tool advertised by the server in a discovery response.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// The tool's `inputSchema`; also the root for its `$ref` pointers.
    pub schema: Value,
}
