/// Centralized constants and helpers for MCP protocol
use serde_json::{json, Value};

/// MCP Protocol Version - single source of truth
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

pub const SERVER_NAME: &str = "eda-mcp";

/// JSON-RPC envelope builders for messages written outside a request handler
pub struct JsonRpcEnvelopes;

impl JsonRpcEnvelopes {
    /// Create JSON-RPC error response
    pub fn error_response(code: i32, message: &str, id: Option<Value>) -> Value {
        json!({
            "jsonrpc": "2.0",
            "error": {
                "code": code,
                "message": message
            },
            "id": id
        })
    }
}
