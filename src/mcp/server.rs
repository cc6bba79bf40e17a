//! MCP method dispatch.
//!
//! [`McpServer`] owns the tool, resource and prompt registries and answers
//! one JSON-RPC request at a time. It is cheap to clone and shared by every
//! session; per-session state lives in [`super::session::ProtocolSession`].

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use super::prompts::PromptRegistry;
use super::protocol::{
    JsonRpcRequest, JsonRpcResponse, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND,
};
use super::resources::ResourceRegistry;
use super::tools::ToolRegistry;
use super::types::ToolInfo;
use crate::consul::ConsulBackend;

pub const SERVER_NAME: &str = "consul-mcp-server";

/// Protocol revisions this server speaks, oldest first
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// The MCP server for Consul
#[derive(Debug, Clone)]
pub struct McpServer {
    tools: Arc<ToolRegistry>,
    resources: Arc<ResourceRegistry>,
    prompts: Arc<PromptRegistry>,
}

impl McpServer {
    /// Create a server exposing the Consul tools, resources and prompts
    pub fn new(backend: Arc<dyn ConsulBackend>) -> Self {
        Self {
            tools: Arc::new(ToolRegistry::from_backend(backend.clone())),
            resources: Arc::new(ResourceRegistry::new(backend.clone())),
            prompts: Arc::new(PromptRegistry::new(backend)),
        }
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Tool catalog in declaration order
    pub fn tool_infos(&self) -> Vec<ToolInfo> {
        self.tools.all().iter().map(|t| t.info()).collect()
    }

    /// Answer the handshake, negotiating the protocol version.
    pub fn initialize(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);
        let requested = request
            .params
            .as_ref()
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);

        let version = match requested {
            Some(v) if SUPPORTED_PROTOCOL_VERSIONS.contains(&v) => v,
            other => {
                if let Some(v) = other {
                    tracing::warn!(
                        requested = v,
                        offered = LATEST_PROTOCOL_VERSION,
                        "Unsupported protocol version requested"
                    );
                }
                LATEST_PROTOCOL_VERSION
            }
        };

        let client = request
            .params
            .as_ref()
            .and_then(|p| p.get("clientInfo"))
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::info!(client, protocol_version = version, "Client initialized");

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": version,
                "capabilities": {
                    "tools": {"listChanged": false},
                    "resources": {"subscribe": false, "listChanged": false},
                    "prompts": {"listChanged": false}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": crate::VERSION
                }
            }),
        )
    }

    /// Handle one request on an initialized session.
    ///
    /// Notifications return `None`; every request with an id returns exactly
    /// one response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "Received notification");
            return None;
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        let params = request.params.unwrap_or(Value::Null);
        tracing::debug!(method = %request.method, "Handling request");

        let response = match request.method.as_str() {
            "ping" => JsonRpcResponse::success(id, json!({})),
            "initialize" => {
                JsonRpcResponse::error(id, INVALID_REQUEST, "Session already initialized")
            }
            "tools/list" => respond(id, &json!({ "tools": self.tool_infos() })),
            "tools/call" => match string_param(&params, "name") {
                Ok(name) => {
                    let result = self.tools.call(name, params.get("arguments").cloned()).await;
                    respond(id, &result)
                }
                Err(message) => JsonRpcResponse::error(id, INVALID_PARAMS, message),
            },
            "resources/list" => respond(id, &json!({ "resources": self.resources.all() })),
            "resources/read" => match string_param(&params, "uri") {
                Ok(uri) => {
                    let contents = self.resources.read(uri).await;
                    respond(id, &json!({ "contents": contents }))
                }
                Err(message) => JsonRpcResponse::error(id, INVALID_PARAMS, message),
            },
            "prompts/list" => respond(id, &json!({ "prompts": self.prompts.all() })),
            "prompts/get" => match string_param(&params, "name") {
                Ok(name) => {
                    let result = self.prompts.get(name, params.get("arguments").cloned()).await;
                    respond(id, &result)
                }
                Err(message) => JsonRpcResponse::error(id, INVALID_PARAMS, message),
            },
            other => {
                tracing::warn!(method = other, "Method not found");
                JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", other))
            }
        };

        Some(response)
    }
}

fn string_param<'a>(params: &'a Value, name: &str) -> Result<&'a str, String> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Missing or invalid '{}' parameter", name))
}

fn respond<T: Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Failed to encode result: {}", e)),
    }
}
