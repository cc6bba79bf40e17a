//! Readable `consul://` resources.

use std::sync::Arc;

use serde_json::{json, Value};
use url::Url;

use super::types::{ResourceContents, ResourceInfo};
use crate::consul::ConsulBackend;

pub const RESOURCE_SCHEME: &str = "consul";
const MIME_JSON: &str = "application/json";

/// Snapshot targets addressable by URI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Services,
    Nodes,
}

/// Catalog of resources plus the reader resolving them
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    backend: Arc<dyn ConsulBackend>,
    resources: Vec<ResourceInfo>,
}

impl ResourceRegistry {
    pub fn new(backend: Arc<dyn ConsulBackend>) -> Self {
        let resources = vec![
            ResourceInfo {
                uri: "consul://services".to_string(),
                name: "Consul Services".to_string(),
                description: "All registered services in Consul".to_string(),
                mime_type: MIME_JSON.to_string(),
            },
            ResourceInfo {
                uri: "consul://nodes".to_string(),
                name: "Consul Nodes".to_string(),
                description: "All nodes in Consul cluster".to_string(),
                mime_type: MIME_JSON.to_string(),
            },
        ];
        Self { backend, resources }
    }

    pub fn all(&self) -> &[ResourceInfo] {
        &self.resources
    }

    /// Read a resource. Failures are reported inside the contents.
    pub async fn read(&self, uri: &str) -> Vec<ResourceContents> {
        tracing::info!(uri, "Reading resource");

        let value = match self.snapshot(uri).await {
            Ok(value) => value,
            Err(message) => {
                tracing::error!(uri, error = %message, "Error reading resource");
                json!({ "error": message, "uri": uri })
            }
        };

        let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        vec![ResourceContents {
            uri: uri.to_string(),
            mime_type: MIME_JSON.to_string(),
            text,
        }]
    }

    async fn snapshot(&self, uri: &str) -> Result<Value, String> {
        match parse_target(uri)? {
            Target::Services => {
                let services = self
                    .backend
                    .list_services(None)
                    .await
                    .map_err(|e| e.to_string())?;
                tracing::debug!(count = services.len(), "Retrieved services");
                Ok(json!({ "services": services, "count": services.len() }))
            }
            Target::Nodes => {
                let nodes = self.backend.nodes(None).await.map_err(|e| e.to_string())?;
                tracing::debug!(count = nodes.len(), "Retrieved nodes");
                let count = nodes.len();
                let nodes = serde_json::to_value(nodes).map_err(|e| e.to_string())?;
                Ok(json!({ "nodes": nodes, "count": count }))
            }
        }
    }
}

/// Resolve a URI to its target. Authority and path together name the
/// target, so `consul://services` and `consul:///services` are the same.
fn parse_target(uri: &str) -> Result<Target, String> {
    let parsed = Url::parse(uri).map_err(|e| format!("Invalid resource URI '{}': {}", uri, e))?;
    if parsed.scheme() != RESOURCE_SCHEME {
        return Err(format!("Unknown URI scheme: {}", parsed.scheme()));
    }

    let target = format!("{}{}", parsed.host_str().unwrap_or(""), parsed.path());
    match target.trim_matches('/') {
        "services" => Ok(Target::Services),
        "nodes" => Ok(Target::Nodes),
        other => Err(format!("Unknown resource path: {}", other)),
    }
}
