//! Consul API payloads.
//!
//! Field names follow the Consul HTTP API (PascalCase). Types that are only
//! ever produced by this crate (`KvEntry`, `ServicesSummary`) use snake_case.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// One instance of a service as listed by the catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogService {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub datacenter: String,
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub service_address: String,
    #[serde(default)]
    pub service_port: u16,
    #[serde(default)]
    pub service_tags: Vec<String>,
    #[serde(default)]
    pub service_meta: HashMap<String, String>,

    /// Fields this crate does not interpret, passed through unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A catalog node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Node {
    #[serde(rename = "ID", default)]
    pub id: String,
    pub node: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub datacenter: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single health check result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheck {
    #[serde(default)]
    pub node: String,
    #[serde(rename = "CheckID", default)]
    pub check_id: String,
    #[serde(default)]
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub output: String,
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HealthCheck {
    pub fn is_passing(&self) -> bool {
        self.status == "passing"
    }
}

/// One entry of `/v1/health/service/{name}`: an instance with its node and checks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceEntry {
    pub node: Node,
    pub service: AgentService,
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
}

impl ServiceEntry {
    /// Aggregated status: `passing` only when every check passes.
    pub fn status(&self) -> &str {
        if self.checks.iter().any(|c| c.status == "critical") {
            "critical"
        } else if self.checks.iter().all(HealthCheck::is_passing) {
            "passing"
        } else {
            "warning"
        }
    }
}

/// A service instance as known by the local agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentService {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub enable_tag_override: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,

    /// Weights, proxy settings, indexes and the like, passed through
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// HTTP health check attached to a registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckDefinition {
    #[serde(rename = "HTTP")]
    pub http: String,
    pub interval: String,
}

/// Body of `PUT /v1/agent/service/register`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, String>,
    #[serde(default)]
    pub enable_tag_override: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckDefinition>,
}

impl ServiceRegistration {
    /// New registration; the ID defaults to the service name.
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            address: address.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            self.id = id;
        }
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Attach an HTTP check; the interval defaults to `10s`.
    pub fn with_http_check(mut self, url: Option<String>, interval: Option<String>) -> Self {
        self.check = url.map(|http| CheckDefinition {
            http,
            interval: interval.unwrap_or_else(|| "10s".to_string()),
        });
        self
    }

    /// Full registration mirroring what the agent currently holds.
    ///
    /// The check definition is not part of the agent listing; Consul keeps
    /// existing checks when a service is re-registered without one.
    pub fn from_agent(service: &AgentService) -> Self {
        let name = if service.service.is_empty() {
            service.id.clone()
        } else {
            service.service.clone()
        };
        Self {
            id: service.id.clone(),
            name,
            address: service.address.clone(),
            port: service.port,
            tags: service.tags.clone(),
            meta: service.meta.clone(),
            enable_tag_override: service.enable_tag_override,
            check: None,
        }
    }
}

/// Raw KV pair as returned by `/v1/kv/{key}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawKvPair {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub flags: u64,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

/// A decoded KV entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvEntry {
    pub key: String,
    pub value: Option<String>,
    pub flags: u64,
    pub create_index: u64,
    pub modify_index: u64,
}

/// Per-service instance counts and totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesSummary {
    pub services: BTreeMap<String, usize>,
    pub total_services: usize,
    pub total_instances: usize,
}

impl ServicesSummary {
    pub fn from_counts(counts: impl IntoIterator<Item = (String, usize)>) -> Self {
        let services: BTreeMap<String, usize> = counts.into_iter().collect();
        Self {
            total_services: services.len(),
            total_instances: services.values().sum(),
            services,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_service_keeps_unknown_fields() {
        let raw = json!({
            "ID": "40e4a748",
            "Node": "node-1",
            "Address": "10.0.0.1",
            "ServiceID": "web-1",
            "ServiceName": "web",
            "ServicePort": 8080,
            "ServiceTags": ["v1"],
            "ServiceEnableTagOverride": false
        });

        let svc: CatalogService = serde_json::from_value(raw).unwrap();
        assert_eq!(svc.service_id, "web-1");
        assert_eq!(svc.service_port, 8080);
        assert_eq!(svc.extra.get("ServiceEnableTagOverride"), Some(&json!(false)));

        let back = serde_json::to_value(&svc).unwrap();
        assert_eq!(back["ServiceEnableTagOverride"], json!(false));
        assert_eq!(back["ServiceName"], json!("web"));
    }

    #[test]
    fn test_health_entry_keeps_unknown_fields() {
        let raw = json!({
            "Node": {"ID": "a1", "Node": "node-1", "Address": "10.0.0.1", "Datacenter": "dc1"},
            "Service": {
                "ID": "web-1",
                "Service": "web",
                "Tags": ["v1"],
                "Port": 8080,
                "Weights": {"Passing": 1, "Warning": 1},
                "TaggedAddresses": {"lan_ipv4": {"Address": "10.0.0.1", "Port": 8080}},
                "CreateIndex": 12
            },
            "Checks": [{
                "Node": "node-1",
                "CheckID": "service:web-1",
                "Status": "passing",
                "ServiceID": "web-1",
                "ServiceName": "web",
                "Type": "http",
                "ServiceTags": ["v1"],
                "Definition": {"HTTP": "http://10.0.0.1:8080/health", "Interval": "10s"},
                "ModifyIndex": 40
            }]
        });

        let entry: ServiceEntry = serde_json::from_value(raw).unwrap();
        assert_eq!(entry.service.port, 8080);
        assert_eq!(entry.status(), "passing");
        assert_eq!(entry.checks[0].extra.get("Type"), Some(&json!("http")));

        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["Service"]["Weights"]["Passing"], 1);
        assert_eq!(back["Service"]["CreateIndex"], 12);
        assert_eq!(back["Checks"][0]["ServiceTags"], json!(["v1"]));
        assert_eq!(back["Checks"][0]["Definition"]["Interval"], "10s");
        assert_eq!(back["Checks"][0]["ModifyIndex"], 40);
    }

    #[test]
    fn test_registration_serialization() {
        let reg = ServiceRegistration::new("web", "10.0.0.1", 80)
            .with_tags(vec!["a".to_string()])
            .with_http_check(Some("http://10.0.0.1/health".to_string()), None);

        let value = serde_json::to_value(&reg).unwrap();
        assert_eq!(value["ID"], "web");
        assert_eq!(value["Name"], "web");
        assert_eq!(value["Check"]["HTTP"], "http://10.0.0.1/health");
        assert_eq!(value["Check"]["Interval"], "10s");
        assert!(value.get("Meta").is_none());
    }

    #[test]
    fn test_registration_from_agent_falls_back_to_id() {
        let svc = AgentService {
            id: "api-7".to_string(),
            port: 9000,
            ..AgentService::default()
        };
        let reg = ServiceRegistration::from_agent(&svc);
        assert_eq!(reg.name, "api-7");
        assert_eq!(reg.port, 9000);
    }

    #[test]
    fn test_entry_status() {
        let mut entry = ServiceEntry::default();
        entry.checks.push(HealthCheck {
            status: "passing".to_string(),
            ..HealthCheck::default()
        });
        assert_eq!(entry.status(), "passing");

        entry.checks.push(HealthCheck {
            status: "warning".to_string(),
            ..HealthCheck::default()
        });
        assert_eq!(entry.status(), "warning");

        entry.checks.push(HealthCheck {
            status: "critical".to_string(),
            ..HealthCheck::default()
        });
        assert_eq!(entry.status(), "critical");
    }

    #[test]
    fn test_summary_totals() {
        let summary = ServicesSummary::from_counts(vec![
            ("web".to_string(), 3),
            ("cache".to_string(), 1),
        ]);
        assert_eq!(summary.total_services, 2);
        assert_eq!(summary.total_instances, 4);
    }
}
