//! Tool handlers backed by Consul.
//!
//! Each handler maps validated arguments onto one backend operation and
//! shapes the JSON result. List-shaped results always carry `count`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use super::tools::ToolHandler;
use crate::consul::{ConsulBackend, ServiceInstanceEditor};
use crate::models::ServiceRegistration;
use crate::utils::args::{optional_str, required_port, required_str, string_list, string_map};

fn to_json<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("Failed to serialize result: {}", e))
}

/// Handler for listing catalog services
#[derive(Debug)]
pub struct ListServicesHandler {
    pub backend: Arc<dyn ConsulBackend>,
}

#[async_trait::async_trait]
impl ToolHandler for ListServicesHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let dc = optional_str(&args, "datacenter");
        let services = self
            .backend
            .list_services(dc)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "services": services,
            "count": services.len()
        }))
    }
}

/// Handler for listing the instances of one service
#[derive(Debug)]
pub struct GetServiceHandler {
    pub backend: Arc<dyn ConsulBackend>,
}

#[async_trait::async_trait]
impl ToolHandler for GetServiceHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let service_name = required_str(&args, "service_name")?;
        let dc = optional_str(&args, "datacenter");
        let instances = self
            .backend
            .service_instances(service_name, dc)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "service": service_name,
            "instances": to_json(&instances)?,
            "count": instances.len()
        }))
    }
}

/// Handler returning only the instance count of a service
#[derive(Debug)]
pub struct GetServiceInstanceCountHandler {
    pub backend: Arc<dyn ConsulBackend>,
}

#[async_trait::async_trait]
impl ToolHandler for GetServiceInstanceCountHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let service_name = required_str(&args, "service_name")?;
        let dc = optional_str(&args, "datacenter");
        let count = self
            .backend
            .service_instance_count(service_name, dc)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "service": service_name,
            "count": count
        }))
    }
}

/// Handler for per-service counts and totals
#[derive(Debug)]
pub struct GetMonitoringSummaryHandler {
    pub backend: Arc<dyn ConsulBackend>,
}

#[async_trait::async_trait]
impl ToolHandler for GetMonitoringSummaryHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let dc = optional_str(&args, "datacenter");
        let summary = self
            .backend
            .services_summary(dc)
            .await
            .map_err(|e| e.to_string())?;
        to_json(&summary)
    }
}

/// Handler for registering a service on the agent
#[derive(Debug)]
pub struct RegisterServiceHandler {
    pub backend: Arc<dyn ConsulBackend>,
}

#[async_trait::async_trait]
impl ToolHandler for RegisterServiceHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let name = required_str(&args, "name")?;
        let address = required_str(&args, "address")?;
        let port = required_port(&args, "port")?;

        let registration = ServiceRegistration::new(name, address, port)
            .with_id(optional_str(&args, "service_id").map(str::to_string))
            .with_tags(string_list(&args, "tags")?.unwrap_or_default())
            .with_http_check(
                optional_str(&args, "check_http").map(str::to_string),
                optional_str(&args, "check_interval").map(str::to_string),
            );

        self.backend
            .register_service(&registration)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "status": "success",
            "message": format!("Service {} registered successfully", name)
        }))
    }
}

/// Handler for deregistering a service instance
#[derive(Debug)]
pub struct DeregisterServiceHandler {
    pub backend: Arc<dyn ConsulBackend>,
}

#[async_trait::async_trait]
impl ToolHandler for DeregisterServiceHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let service_id = required_str(&args, "service_id")?;
        self.backend
            .deregister_service(service_id)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "status": "success",
            "message": format!("Service {} deregistered successfully", service_id)
        }))
    }
}

/// Handler for reading one KV key
#[derive(Debug)]
pub struct GetKvHandler {
    pub backend: Arc<dyn ConsulBackend>,
}

#[async_trait::async_trait]
impl ToolHandler for GetKvHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let key = required_str(&args, "key")?;
        let dc = optional_str(&args, "datacenter");
        let entry = self
            .backend
            .get_kv(key, dc)
            .await
            .map_err(|e| e.to_string())?;

        match entry {
            Some(entry) => to_json(&entry),
            None => Ok(json!({
                "key": key,
                "value": null,
                "message": "Key not found"
            })),
        }
    }
}

/// Handler for writing one KV key
#[derive(Debug)]
pub struct PutKvHandler {
    pub backend: Arc<dyn ConsulBackend>,
}

#[async_trait::async_trait]
impl ToolHandler for PutKvHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let key = required_str(&args, "key")?;
        let value = required_str(&args, "value")?;
        let dc = optional_str(&args, "datacenter");
        let stored = self
            .backend
            .put_kv(key, value, dc)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "status": if stored { "success" } else { "failed" },
            "key": key,
            "value": value
        }))
    }
}

/// Handler for listing KV keys under a prefix
#[derive(Debug)]
pub struct ListKvHandler {
    pub backend: Arc<dyn ConsulBackend>,
}

#[async_trait::async_trait]
impl ToolHandler for ListKvHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let prefix = args.get("prefix").and_then(Value::as_str).unwrap_or("");
        let dc = optional_str(&args, "datacenter");
        let keys = self
            .backend
            .list_kv(prefix, dc)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "prefix": prefix,
            "keys": keys,
            "count": keys.len()
        }))
    }
}

/// Handler for deleting one KV key
#[derive(Debug)]
pub struct DeleteKvHandler {
    pub backend: Arc<dyn ConsulBackend>,
}

#[async_trait::async_trait]
impl ToolHandler for DeleteKvHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let key = required_str(&args, "key")?;
        let dc = optional_str(&args, "datacenter");
        let deleted = self
            .backend
            .delete_kv(key, dc)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "status": if deleted { "success" } else { "failed" },
            "key": key,
            "message": format!("Key {} deleted", key)
        }))
    }
}

/// Handler for listing catalog nodes
#[derive(Debug)]
pub struct GetNodesHandler {
    pub backend: Arc<dyn ConsulBackend>,
}

#[async_trait::async_trait]
impl ToolHandler for GetNodesHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let dc = optional_str(&args, "datacenter");
        let nodes = self.backend.nodes(dc).await.map_err(|e| e.to_string())?;

        Ok(json!({
            "nodes": to_json(&nodes)?,
            "count": nodes.len()
        }))
    }
}

/// Handler for the health entries of a service
#[derive(Debug)]
pub struct GetServiceHealthHandler {
    pub backend: Arc<dyn ConsulBackend>,
}

#[async_trait::async_trait]
impl ToolHandler for GetServiceHealthHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let service_name = required_str(&args, "service_name")?;
        let dc = optional_str(&args, "datacenter");
        let entries = self
            .backend
            .service_health(service_name, dc)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "service": service_name,
            "health_checks": to_json(&entries)?,
            "count": entries.len()
        }))
    }
}

#[derive(Debug)]
pub struct GetServiceMetaHandler {
    pub editor: Arc<ServiceInstanceEditor>,
}

#[async_trait::async_trait]
impl ToolHandler for GetServiceMetaHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let service_id = required_str(&args, "service_id")?;
        let meta = self
            .editor
            .meta(service_id)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "service_id": service_id,
            "meta": meta,
            "count": meta.len()
        }))
    }
}

#[derive(Debug)]
pub struct SetServiceMetaKeyHandler {
    pub editor: Arc<ServiceInstanceEditor>,
}

#[async_trait::async_trait]
impl ToolHandler for SetServiceMetaKeyHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let service_id = required_str(&args, "service_id")?;
        let key = required_str(&args, "key")?;
        let value = required_str(&args, "value")?;

        let patch = [(key.to_string(), value.to_string())].into_iter().collect();
        let updated = self
            .editor
            .merge_meta(service_id, patch)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "status": "success",
            "service_id": service_id,
            "key": key,
            "updated_meta": updated
        }))
    }
}

#[derive(Debug)]
pub struct DeleteServiceMetaKeyHandler {
    pub editor: Arc<ServiceInstanceEditor>,
}

#[async_trait::async_trait]
impl ToolHandler for DeleteServiceMetaKeyHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let service_id = required_str(&args, "service_id")?;
        let key = required_str(&args, "key")?;
        let updated = self
            .editor
            .remove_meta_keys(service_id, &[key.to_string()])
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "status": "success",
            "service_id": service_id,
            "deleted_key": key,
            "updated_meta": updated
        }))
    }
}

#[derive(Debug)]
pub struct SetServiceMetaBulkHandler {
    pub editor: Arc<ServiceInstanceEditor>,
}

#[async_trait::async_trait]
impl ToolHandler for SetServiceMetaBulkHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let service_id = required_str(&args, "service_id")?;
        let patch = string_map(&args, "meta")?;
        let mut keys_updated: Vec<String> = patch.keys().cloned().collect();
        keys_updated.sort();

        let updated = self
            .editor
            .merge_meta(service_id, patch)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "status": "success",
            "service_id": service_id,
            "updated_meta": updated,
            "count": keys_updated.len(),
            "keys_updated": keys_updated
        }))
    }
}

#[derive(Debug)]
pub struct ListServiceMetaKeysHandler {
    pub editor: Arc<ServiceInstanceEditor>,
}

#[async_trait::async_trait]
impl ToolHandler for ListServiceMetaKeysHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let service_id = required_str(&args, "service_id")?;
        let meta = self
            .editor
            .meta(service_id)
            .await
            .map_err(|e| e.to_string())?;
        let mut keys: Vec<String> = meta.into_keys().collect();
        keys.sort();

        Ok(json!({
            "service_id": service_id,
            "keys": keys,
            "count": keys.len()
        }))
    }
}

#[derive(Debug)]
pub struct GetServiceTagsHandler {
    pub editor: Arc<ServiceInstanceEditor>,
}

#[async_trait::async_trait]
impl ToolHandler for GetServiceTagsHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let service_id = required_str(&args, "service_id")?;
        let tags = self
            .editor
            .tags(service_id)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "service_id": service_id,
            "tags": tags,
            "count": tags.len()
        }))
    }
}

#[derive(Debug)]
pub struct SetServiceTagsHandler {
    pub editor: Arc<ServiceInstanceEditor>,
}

#[async_trait::async_trait]
impl ToolHandler for SetServiceTagsHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let service_id = required_str(&args, "service_id")?;
        let tags = string_list(&args, "tags")?.unwrap_or_default();
        let updated = self
            .editor
            .replace_tags(service_id, tags)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "status": "success",
            "service_id": service_id,
            "count": updated.len(),
            "tags": updated
        }))
    }
}
