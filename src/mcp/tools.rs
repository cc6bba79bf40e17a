//! Tool registry for MCP tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use super::consul_tools::{
    DeleteKvHandler, DeleteServiceMetaKeyHandler, DeregisterServiceHandler, GetKvHandler,
    GetMonitoringSummaryHandler, GetNodesHandler, GetServiceHandler, GetServiceHealthHandler,
    GetServiceInstanceCountHandler, GetServiceMetaHandler, GetServiceTagsHandler, ListKvHandler,
    ListServiceMetaKeysHandler, ListServicesHandler, PutKvHandler, RegisterServiceHandler,
    SetServiceMetaBulkHandler, SetServiceMetaKeyHandler, SetServiceTagsHandler,
};
use super::types::{CallToolResult, ToolInfo};
use crate::consul::{ConsulBackend, ServiceInstanceEditor};

/// An MCP tool that can be called by the client
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g., "list_services")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: Value,

    /// Handler function to execute the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

impl Tool {
    pub fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with arguments already checked against its schema
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// Registry for all MCP tools, in declaration order
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
}

fn datacenter_property(action: &str) -> Value {
    json!({
        "type": "string",
        "description": format!("Datacenter to {} (optional)", action)
    })
}

fn service_name_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "service_name": {
                "type": "string",
                "description": "Name of the service"
            },
            "datacenter": datacenter_property("query")
        },
        "required": ["service_name"]
    })
}

fn datacenter_only_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "datacenter": datacenter_property("query")
        }
    })
}

fn service_id_schema(extra: Value, required: &[&str]) -> Value {
    let mut properties = json!({
        "service_id": {"type": "string", "description": "Service instance ID"}
    });
    if let (Some(target), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
        target.extend(extra.clone());
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the registry of Consul tools over a backend
    pub fn from_backend(backend: Arc<dyn ConsulBackend>) -> Self {
        let mut registry = Self::new();
        registry.register_consul_tools(backend);
        registry
    }

    fn register_consul_tools(&mut self, backend: Arc<dyn ConsulBackend>) {
        let editor = Arc::new(ServiceInstanceEditor::new(backend.clone()));

        // Catalog
        self.register(Tool {
            name: "list_services".to_string(),
            description: "List all services registered in Consul".to_string(),
            input_schema: datacenter_only_schema(),
            handler: Arc::new(ListServicesHandler {
                backend: backend.clone(),
            }),
        });

        self.register(Tool {
            name: "get_service".to_string(),
            description: "Get detailed information about a specific service".to_string(),
            input_schema: service_name_schema(),
            handler: Arc::new(GetServiceHandler {
                backend: backend.clone(),
            }),
        });

        self.register(Tool {
            name: "get_service_instance_count".to_string(),
            description: "Get only the number of instances for a service (lightweight; use this for statistics/summary to avoid large responses)".to_string(),
            input_schema: service_name_schema(),
            handler: Arc::new(GetServiceInstanceCountHandler {
                backend: backend.clone(),
            }),
        });

        self.register(Tool {
            name: "get_monitoring_summary".to_string(),
            description: "Get monitoring statistics: per-service instance counts and totals. Use this for counting monitoring entries (e.g. node_exporter, redis_exporter) without loading full instance lists. Returns only counts to avoid context overflow.".to_string(),
            input_schema: datacenter_only_schema(),
            handler: Arc::new(GetMonitoringSummaryHandler {
                backend: backend.clone(),
            }),
        });

        // Agent registration
        self.register(Tool {
            name: "register_service".to_string(),
            description: "Register a new service in Consul".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Service name"},
                    "service_id": {"type": "string", "description": "Unique service ID"},
                    "address": {"type": "string", "description": "Service address"},
                    "port": {"type": "integer", "description": "Service port"},
                    "tags": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Service tags"
                    },
                    "check_http": {
                        "type": "string",
                        "description": "HTTP health check URL (optional)"
                    },
                    "check_interval": {
                        "type": "string",
                        "description": "Health check interval (e.g., '10s')",
                        "default": "10s"
                    }
                },
                "required": ["name", "address", "port"]
            }),
            handler: Arc::new(RegisterServiceHandler {
                backend: backend.clone(),
            }),
        });

        self.register(Tool {
            name: "deregister_service".to_string(),
            description: "Deregister a service from Consul".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "service_id": {"type": "string", "description": "Service ID to deregister"}
                },
                "required": ["service_id"]
            }),
            handler: Arc::new(DeregisterServiceHandler {
                backend: backend.clone(),
            }),
        });

        // KV store
        self.register(Tool {
            name: "get_kv".to_string(),
            description: "Get a key-value pair from Consul KV store".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string", "description": "Key to retrieve"},
                    "datacenter": datacenter_property("query")
                },
                "required": ["key"]
            }),
            handler: Arc::new(GetKvHandler {
                backend: backend.clone(),
            }),
        });

        self.register(Tool {
            name: "put_kv".to_string(),
            description: "Store a key-value pair in Consul KV store".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string", "description": "Key to store"},
                    "value": {"type": "string", "description": "Value to store"},
                    "datacenter": datacenter_property("write to")
                },
                "required": ["key", "value"]
            }),
            handler: Arc::new(PutKvHandler {
                backend: backend.clone(),
            }),
        });

        self.register(Tool {
            name: "list_kv".to_string(),
            description: "List all keys in Consul KV store (optionally with prefix)".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prefix": {"type": "string", "description": "Key prefix to filter (optional)"},
                    "datacenter": datacenter_property("query")
                }
            }),
            handler: Arc::new(ListKvHandler {
                backend: backend.clone(),
            }),
        });

        self.register(Tool {
            name: "delete_kv".to_string(),
            description: "Delete a key from Consul KV store".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string", "description": "Key to delete"},
                    "datacenter": datacenter_property("delete from")
                },
                "required": ["key"]
            }),
            handler: Arc::new(DeleteKvHandler {
                backend: backend.clone(),
            }),
        });

        // Nodes and health
        self.register(Tool {
            name: "get_nodes".to_string(),
            description: "Get list of nodes in Consul cluster".to_string(),
            input_schema: datacenter_only_schema(),
            handler: Arc::new(GetNodesHandler {
                backend: backend.clone(),
            }),
        });

        self.register(Tool {
            name: "get_service_health".to_string(),
            description: "Get health status of a service".to_string(),
            input_schema: service_name_schema(),
            handler: Arc::new(GetServiceHealthHandler { backend }),
        });

        // Instance meta and tags. The agent API is local to one datacenter,
        // so `datacenter` is accepted but has no effect here.
        self.register(Tool {
            name: "get_service_meta".to_string(),
            description: "Get all Meta for a service instance (Services API)".to_string(),
            input_schema: service_id_schema(
                json!({"datacenter": {"type": "string", "description": "Datacenter (optional)"}}),
                &["service_id"],
            ),
            handler: Arc::new(GetServiceMetaHandler {
                editor: editor.clone(),
            }),
        });

        self.register(Tool {
            name: "set_service_meta_key".to_string(),
            description: "Set or update one Meta key for a service instance (Services API)"
                .to_string(),
            input_schema: service_id_schema(
                json!({
                    "key": {"type": "string", "description": "Meta key"},
                    "value": {"type": "string", "description": "Meta value"},
                    "datacenter": {"type": "string", "description": "Datacenter (optional)"}
                }),
                &["service_id", "key", "value"],
            ),
            handler: Arc::new(SetServiceMetaKeyHandler {
                editor: editor.clone(),
            }),
        });

        self.register(Tool {
            name: "delete_service_meta_key".to_string(),
            description: "Delete one Meta key for a service instance (Services API)".to_string(),
            input_schema: service_id_schema(
                json!({
                    "key": {"type": "string", "description": "Meta key"},
                    "datacenter": {"type": "string", "description": "Datacenter (optional)"}
                }),
                &["service_id", "key"],
            ),
            handler: Arc::new(DeleteServiceMetaKeyHandler {
                editor: editor.clone(),
            }),
        });

        self.register(Tool {
            name: "set_service_meta_bulk".to_string(),
            description:
                "Set or update multiple Meta keys for a service instance (Services API)"
                    .to_string(),
            input_schema: service_id_schema(
                json!({
                    "meta": {"type": "object", "description": "Key-value object of meta entries"},
                    "datacenter": {"type": "string", "description": "Datacenter (optional)"}
                }),
                &["service_id", "meta"],
            ),
            handler: Arc::new(SetServiceMetaBulkHandler {
                editor: editor.clone(),
            }),
        });

        self.register(Tool {
            name: "list_service_meta_keys".to_string(),
            description: "List all Meta keys for a service instance (Services API)".to_string(),
            input_schema: service_id_schema(
                json!({"datacenter": {"type": "string", "description": "Datacenter (optional)"}}),
                &["service_id"],
            ),
            handler: Arc::new(ListServiceMetaKeysHandler {
                editor: editor.clone(),
            }),
        });

        self.register(Tool {
            name: "get_service_tags".to_string(),
            description: "Get Tags for a service instance (Services API)".to_string(),
            input_schema: service_id_schema(json!({}), &["service_id"]),
            handler: Arc::new(GetServiceTagsHandler {
                editor: editor.clone(),
            }),
        });

        self.register(Tool {
            name: "set_service_tags".to_string(),
            description: "Overwrite Tags for a service instance (Services API)".to_string(),
            input_schema: service_id_schema(
                json!({
                    "tags": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Tags list"
                    }
                }),
                &["service_id", "tags"],
            ),
            handler: Arc::new(SetServiceTagsHandler { editor }),
        });
    }

    /// Register a tool. A tool with the same name is replaced in place.
    pub fn register(&mut self, tool: Tool) {
        match self.index.get(&tool.name) {
            Some(&position) => self.tools[position] = tool,
            None => {
                self.index.insert(tool.name.clone(), self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Get all tools
    pub fn all(&self) -> &[Tool] {
        &self.tools
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&position| &self.tools[position])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name.
    ///
    /// Never fails: unknown tools, invalid arguments and handler errors all
    /// come back as an error result naming the tool.
    pub async fn call(&self, name: &str, arguments: Option<Value>) -> CallToolResult {
        let Some(tool) = self.get(name) else {
            tracing::warn!(tool = name, "Unknown tool");
            return CallToolResult::error(name, format!("Unknown tool: {}", name));
        };

        let args = match arguments {
            None | Some(Value::Null) => json!({}),
            Some(args) => args,
        };
        if let Err(message) = validate_arguments(&tool.input_schema, &args) {
            tracing::warn!(tool = name, error = %message, "Rejected tool arguments");
            return CallToolResult::error(name, message);
        }

        tracing::info!(tool = name, "Tool call received");
        tracing::debug!(tool = name, arguments = %args, "Tool arguments");

        match tool.handler.execute(args).await {
            Ok(value) => CallToolResult::json(&value, false),
            Err(message) => {
                tracing::error!(tool = name, error = %message, "Error executing tool");
                CallToolResult::error(name, message)
            }
        }
    }
}

/// Check arguments against the subset of JSON Schema used by tool
/// definitions: required properties and declared property types.
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
    let object = args
        .as_object()
        .ok_or_else(|| "Arguments must be an object".to_string())?;

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if object.get(name).map_or(true, Value::is_null) {
                return Err(format!("Missing required parameter '{}'", name));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, value) in object {
            // null on an optional property means "not given"
            if value.is_null() {
                continue;
            }
            if let Some(property) = properties.get(name) {
                check_type(name, property, value)?;
            }
        }
    }

    Ok(())
}

fn check_type(name: &str, property: &Value, value: &Value) -> Result<(), String> {
    let Some(expected) = property.get("type").and_then(Value::as_str) else {
        return Ok(());
    };

    let matches = match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    };
    if !matches {
        return Err(format!("Parameter '{}' must be of type {}", name, expected));
    }

    if let (Some(items), Some(values)) = (property.get("items"), value.as_array()) {
        for (i, item) in values.iter().enumerate() {
            check_type(&format!("{}[{}]", name, i), items, item)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consul::MockConsul;

    fn registry() -> (Arc<MockConsul>, ToolRegistry) {
        let backend = Arc::new(MockConsul::new());
        let registry = ToolRegistry::from_backend(backend.clone());
        (backend, registry)
    }

    #[test]
    fn test_declaration_order() {
        let (_, registry) = registry();
        let names: Vec<&str> = registry.all().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "list_services",
                "get_service",
                "get_service_instance_count",
                "get_monitoring_summary",
                "register_service",
                "deregister_service",
                "get_kv",
                "put_kv",
                "list_kv",
                "delete_kv",
                "get_nodes",
                "get_service_health",
                "get_service_meta",
                "set_service_meta_key",
                "delete_service_meta_key",
                "set_service_meta_bulk",
                "list_service_meta_keys",
                "get_service_tags",
                "set_service_tags",
            ]
        );
    }

    #[test]
    fn test_every_schema_is_an_object_schema() {
        let (_, registry) = registry();
        for tool in registry.all() {
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
            let properties = tool.input_schema["properties"].as_object().unwrap();
            if let Some(required) = tool.input_schema["required"].as_array() {
                for name in required {
                    assert!(
                        properties.contains_key(name.as_str().unwrap()),
                        "{} requires undeclared {}",
                        tool.name,
                        name
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_structured_error() {
        let (backend, registry) = registry();
        let result = registry.call("launch_rockets", None).await;
        assert!(result.is_error);
        assert_eq!(
            result.payload().unwrap(),
            json!({"error": "Unknown tool: launch_rockets", "tool": "launch_rockets"})
        );
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_absent_or_null_arguments_mean_empty_object() {
        let (backend, registry) = registry();
        backend.add_instances("web", 1);

        for arguments in [None, Some(Value::Null), Some(json!({}))] {
            let result = registry.call("list_services", arguments).await;
            assert!(!result.is_error);
            assert_eq!(result.payload().unwrap()["count"], 1);
        }

        let result = registry.call("get_kv", Some(Value::Null)).await;
        assert!(result.is_error);
        assert_eq!(
            result.payload().unwrap()["error"],
            "Missing required parameter 'key'"
        );

        let result = registry.call("list_services", Some(json!(["x"]))).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_backend() {
        let (backend, registry) = registry();

        let result = registry.call("get_kv", Some(json!({}))).await;
        assert!(result.is_error);
        assert_eq!(
            result.payload().unwrap()["error"],
            "Missing required parameter 'key'"
        );

        let result = registry
            .call(
                "register_service",
                Some(json!({"name": "web", "address": "10.0.0.1", "port": "80"})),
            )
            .await;
        assert!(result.is_error);
        assert_eq!(
            result.payload().unwrap()["error"],
            "Parameter 'port' must be of type integer"
        );

        let result = registry
            .call("set_service_tags", Some(json!({"service_id": "x", "tags": ["a", 1]})))
            .await;
        assert!(result.is_error);

        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_is_structured_error() {
        let (backend, registry) = registry();
        backend.set_offline(true);

        let result = registry.call("get_nodes", None).await;
        assert!(result.is_error);
        let payload = result.payload().unwrap();
        assert_eq!(payload["tool"], "get_nodes");
        assert!(payload["error"].as_str().unwrap().contains("get_nodes failed"));
    }

    #[test]
    fn test_validate_arguments() {
        let schema = json!({
            "type": "object",
            "properties": {
                "a": {"type": "string"},
                "n": {"type": "number"},
                "flag": {"type": "boolean"}
            },
            "required": ["a"]
        });

        assert!(validate_arguments(&schema, &json!({"a": "x"})).is_ok());
        assert!(validate_arguments(&schema, &json!({"a": "x", "n": 1.5, "flag": true})).is_ok());
        assert!(validate_arguments(&schema, &json!({"a": "x", "n": null})).is_ok());
        assert!(validate_arguments(&schema, &json!({"a": "x", "unknown": 1})).is_ok());
        assert!(validate_arguments(&schema, &json!({"a": null})).is_err());
        assert!(validate_arguments(&schema, &json!({"a": "x", "flag": "yes"})).is_err());
        assert!(validate_arguments(&schema, &json!(["a"])).is_err());
    }
}
