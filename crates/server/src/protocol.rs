//! JSON-RPC 2.0 envelope types
//!
//! One JSON object per line on the wire. Responses carry either `result`
//! or `error`, never both; notifications (absent `id`) get no response.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Protocol version string
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard error codes
pub mod codes {
    /// Message was not valid JSON
    pub const PARSE_ERROR: i64 = -32700;
    /// Envelope was not a valid request object
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown method
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Bad method parameters
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal server error
    pub const INTERNAL: i64 = -32603;
}

/// An incoming request or notification
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0"
    #[serde(default)]
    pub jsonrpc: String,
    /// Method name
    #[serde(default)]
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: Option<Json>,
    /// Request id; absent for notifications
    #[serde(default)]
    pub id: Option<Json>,
}

impl JsonRpcRequest {
    /// Whether this is a notification (no response expected)
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A wire error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
    /// Optional structured detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Json>,
}

/// An outgoing response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Mirrors the request id; null for undecodable requests
    pub id: Json,
    /// Success payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Json>,
    /// Failure payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// A success response
    pub fn success(id: Json, result: Json) -> Self {
        JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// An error response
    pub fn failure(id: Json, code: i64, message: impl Into<String>) -> Self {
        JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// An error response with structured detail
    pub fn failure_with_data(
        id: Json,
        code: i64,
        message: impl Into<String>,
        data: Json,
    ) -> Self {
        JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: Some(data),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_parse() {
        let req: JsonRpcRequest = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"tools/list","id":1}"#,
        )
        .unwrap();
        assert_eq!(req.method, "tools/list");
        assert!(!req.is_notification());
    }

    #[test]
    fn test_notification_has_no_id() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"initialized"}"#).unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn test_response_never_carries_both() {
        let ok = JsonRpcResponse::success(json!(1), json!({"x": 1}));
        let text = serde_json::to_string(&ok).unwrap();
        assert!(text.contains("result"));
        assert!(!text.contains("error"));

        let err = JsonRpcResponse::failure(json!(1), codes::METHOD_NOT_FOUND, "nope");
        let text = serde_json::to_string(&err).unwrap();
        assert!(text.contains("error"));
        assert!(!text.contains("result"));
    }

    #[test]
    fn test_error_data_roundtrip() {
        let resp = JsonRpcResponse::failure_with_data(
            json!(7),
            -32001,
            "not found",
            json!({"key": "ghost"}),
        );
        let text = serde_json::to_string(&resp).unwrap();
        let back: JsonRpcResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(back.error.unwrap().data.unwrap()["key"], "ghost");
    }
}
