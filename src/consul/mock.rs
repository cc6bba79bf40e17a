//! In-memory backend for testing purposes.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{ConsulBackend, ConsulError};
use crate::models::{
    AgentService, CatalogService, HealthCheck, KvEntry, Node, ServiceEntry, ServiceRegistration,
};

#[derive(Debug, Default)]
struct State {
    catalog: BTreeMap<String, Vec<CatalogService>>,
    agent: HashMap<String, AgentService>,
    kv: BTreeMap<String, KvEntry>,
    nodes: Vec<Node>,
    checks: HashMap<String, Vec<HealthCheck>>,
    failing_services: HashSet<String>,
    latency: HashMap<String, Duration>,
    offline: bool,
    next_index: u64,
}

/// A mock Consul that keeps everything in memory.
///
/// Registrations land both in the agent view and in the catalog. Individual
/// services can be made to fail or respond slowly.
#[derive(Debug, Default)]
pub struct MockConsul {
    state: Mutex<State>,
    calls: AtomicUsize,
}

impl MockConsul {
    /// Create an empty, reachable mock.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of backend calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Add `count` catalog instances of a service.
    pub fn add_instances(&self, name: &str, count: usize) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let instances = state.catalog.entry(name.to_string()).or_default();
        for _ in 0..count {
            let n = instances.len() + 1;
            instances.push(CatalogService {
                id: format!("{}-{}", name, n),
                node: format!("node-{}", n),
                address: format!("10.0.0.{}", n),
                service_id: format!("{}-{}", name, n),
                service_name: name.to_string(),
                service_port: 8000 + n as u16,
                ..CatalogService::default()
            });
        }
    }

    /// Add a node to the catalog.
    pub fn add_node(&self, name: &str, address: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.nodes.push(Node {
            node: name.to_string(),
            address: address.to_string(),
            datacenter: "dc1".to_string(),
            ..Node::default()
        });
    }

    /// Set the checks reported for one instance of a service.
    pub fn set_instance_checks(&self, service: &str, node: &str, statuses: &[&str]) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let checks = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| HealthCheck {
                node: node.to_string(),
                check_id: format!("{}-check-{}", node, i),
                status: status.to_string(),
                service_name: service.to_string(),
                ..HealthCheck::default()
            });
        let key = format!("{}@{}", service, node);
        state.checks.insert(key, checks.collect());
    }

    /// Make every call touching this service fail.
    pub fn fail_service(&self, name: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.failing_services.insert(name.to_string());
    }

    /// Delay calls touching this service.
    pub fn set_latency(&self, name: &str, latency: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.latency.insert(name.to_string(), latency);
    }

    /// Make the whole backend unreachable (or reachable again).
    pub fn set_offline(&self, offline: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.offline = offline;
    }

    fn unavailable(operation: &'static str) -> ConsulError {
        ConsulError::Status {
            operation,
            status: 503,
            body: "mock backend unavailable".to_string(),
        }
    }

    fn check_online(&self, operation: &'static str) -> Result<(), ConsulError> {
        if self.state().offline {
            Err(Self::unavailable(operation))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ConsulBackend for MockConsul {
    async fn is_connected(&self) -> bool {
        !self.state().offline
    }

    async fn list_services(&self, _dc: Option<&str>) -> Result<Vec<String>, ConsulError> {
        self.check_online("list_services")?;
        Ok(self.state().catalog.keys().cloned().collect())
    }

    async fn service_instances(
        &self,
        name: &str,
        _dc: Option<&str>,
    ) -> Result<Vec<CatalogService>, ConsulError> {
        self.check_online("get_service")?;
        let latency = self.state().latency.get(name).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.state();
        if state.failing_services.contains(name) {
            return Err(Self::unavailable("get_service"));
        }
        Ok(state.catalog.get(name).cloned().unwrap_or_default())
    }

    async fn register_service(&self, registration: &ServiceRegistration) -> Result<(), ConsulError> {
        self.check_online("register_service")?;
        let mut state = self.state();

        state.agent.insert(
            registration.id.clone(),
            AgentService {
                id: registration.id.clone(),
                service: registration.name.clone(),
                tags: registration.tags.clone(),
                meta: registration.meta.clone(),
                port: registration.port,
                address: registration.address.clone(),
                enable_tag_override: registration.enable_tag_override,
                datacenter: Some("dc1".to_string()),
                ..AgentService::default()
            },
        );

        let instances = state.catalog.entry(registration.name.clone()).or_default();
        instances.retain(|i| i.service_id != registration.id);
        instances.push(CatalogService {
            id: registration.id.clone(),
            node: "node-1".to_string(),
            address: registration.address.clone(),
            datacenter: "dc1".to_string(),
            service_id: registration.id.clone(),
            service_name: registration.name.clone(),
            service_address: registration.address.clone(),
            service_port: registration.port,
            service_tags: registration.tags.clone(),
            service_meta: registration.meta.clone(),
            ..CatalogService::default()
        });
        Ok(())
    }

    async fn deregister_service(&self, service_id: &str) -> Result<(), ConsulError> {
        self.check_online("deregister_service")?;
        let mut state = self.state();
        state.agent.remove(service_id);
        for instances in state.catalog.values_mut() {
            instances.retain(|i| i.service_id != service_id);
        }
        state.catalog.retain(|_, instances| !instances.is_empty());
        Ok(())
    }

    async fn get_kv(&self, key: &str, _dc: Option<&str>) -> Result<Option<KvEntry>, ConsulError> {
        self.check_online("get_kv")?;
        Ok(self.state().kv.get(key).cloned())
    }

    async fn put_kv(&self, key: &str, value: &str, _dc: Option<&str>) -> Result<bool, ConsulError> {
        self.check_online("put_kv")?;
        let mut state = self.state();
        state.next_index += 1;
        let index = state.next_index;
        let entry = state.kv.entry(key.to_string()).or_insert_with(|| KvEntry {
            key: key.to_string(),
            value: None,
            flags: 0,
            create_index: index,
            modify_index: index,
        });
        entry.value = Some(value.to_string());
        entry.modify_index = index;
        Ok(true)
    }

    async fn delete_kv(&self, key: &str, _dc: Option<&str>) -> Result<bool, ConsulError> {
        self.check_online("delete_kv")?;
        self.state().kv.remove(key);
        Ok(true)
    }

    async fn list_kv(&self, prefix: &str, _dc: Option<&str>) -> Result<Vec<String>, ConsulError> {
        self.check_online("list_kv")?;
        Ok(self
            .state()
            .kv
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn nodes(&self, _dc: Option<&str>) -> Result<Vec<Node>, ConsulError> {
        self.check_online("get_nodes")?;
        Ok(self.state().nodes.clone())
    }

    async fn service_health(
        &self,
        name: &str,
        _dc: Option<&str>,
    ) -> Result<Vec<ServiceEntry>, ConsulError> {
        self.check_online("get_service_health")?;
        let state = self.state();
        if state.failing_services.contains(name) {
            return Err(Self::unavailable("get_service_health"));
        }

        let entries = state
            .catalog
            .get(name)
            .map(|instances| {
                instances
                    .iter()
                    .map(|instance| ServiceEntry {
                        node: Node {
                            node: instance.node.clone(),
                            address: instance.address.clone(),
                            ..Node::default()
                        },
                        service: AgentService {
                            id: instance.service_id.clone(),
                            service: instance.service_name.clone(),
                            port: instance.service_port,
                            ..AgentService::default()
                        },
                        checks: state
                            .checks
                            .get(&format!("{}@{}", name, instance.node))
                            .cloned()
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(entries)
    }

    async fn agent_services(&self) -> Result<HashMap<String, AgentService>, ConsulError> {
        self.check_online("agent_services")?;
        Ok(self.state().agent.clone())
    }
}
