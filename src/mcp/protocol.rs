//! JSON-RPC 2.0 envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC 2.0 request or notification (no `id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params: None,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 Response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
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
}

/// JSON-RPC 2.0 Error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    /// Request (with `id`) or notification (without)
    Request(JsonRpcRequest),
    /// A response sent by the client; this server never issues requests, so
    /// these are only logged
    Response(Value),
}

impl JsonRpcMessage {
    /// Validate a parsed JSON value as a single JSON-RPC 2.0 message.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(object) = &value else {
            return Err(ProtocolError::invalid(Value::Null, "message must be a JSON object"));
        };

        let id = object.get("id").cloned().unwrap_or(Value::Null);
        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(ProtocolError::invalid(id, "'jsonrpc' must be \"2.0\""));
        }
        if !matches!(id, Value::Null | Value::String(_) | Value::Number(_)) {
            return Err(ProtocolError::invalid(Value::Null, "'id' must be a string or number"));
        }

        if object.contains_key("method") {
            return serde_json::from_value::<JsonRpcRequest>(value.clone())
                .map(JsonRpcMessage::Request)
                .map_err(|e| ProtocolError::invalid(id, e.to_string()));
        }

        if object.contains_key("result") || object.contains_key("error") {
            return Ok(JsonRpcMessage::Response(value));
        }

        Err(ProtocolError::invalid(
            id,
            "message is neither a request nor a response",
        ))
    }

    /// Method name for requests and notifications
    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request(request) => Some(&request.method),
            JsonRpcMessage::Response(_) => None,
        }
    }
}

/// Violations that terminate a session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid JSON-RPC message: {reason}")]
    InvalidEnvelope { id: Value, reason: String },

    #[error("Expected 'initialize' as the first message, got '{method}'")]
    NotInitialized { id: Value, method: String },
}

impl ProtocolError {
    pub fn invalid(id: Value, reason: impl Into<String>) -> Self {
        ProtocolError::InvalidEnvelope {
            id,
            reason: reason.into(),
        }
    }

    /// Id of the offending message, `null` when unknown
    pub fn id(&self) -> &Value {
        match self {
            ProtocolError::InvalidEnvelope { id, .. } | ProtocolError::NotInitialized { id, .. } => id,
        }
    }

    /// Error response sent to the client before the session closes
    pub fn to_response(&self) -> JsonRpcResponse {
        JsonRpcResponse::error(self.id().clone(), INVALID_REQUEST, self.to_string())
    }
}
