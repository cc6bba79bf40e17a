//! Consul backend access.
//!
//! The [`ConsulBackend`] trait is the seam between the MCP layer and the
//! networked store. [`ConsulClient`] implements it over the Consul HTTP API;
//! [`MockConsul`] implements it in memory for tests.
//!
//! Calls are never retried. Every error coming from a call names the
//! operation that failed and carries the upstream cause.

mod client;
mod instance;
pub mod mock;

pub use client::ConsulClient;
pub use instance::ServiceInstanceEditor;
pub use mock::MockConsul;

use crate::models::{
    AgentService, CatalogService, KvEntry, Node, ServiceEntry, ServiceRegistration,
    ServicesSummary,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Operations offered by the catalog/KV/health/agent API.
///
/// `dc` selects a datacenter for a single call; `None` means the
/// implementation's default.
#[async_trait]
pub trait ConsulBackend: Send + Sync + std::fmt::Debug {
    /// Whether the agent answers at all
    async fn is_connected(&self) -> bool;

    /// Names of all services in the catalog
    async fn list_services(&self, dc: Option<&str>) -> Result<Vec<String>, ConsulError>;

    /// All instances of one service
    async fn service_instances(
        &self,
        name: &str,
        dc: Option<&str>,
    ) -> Result<Vec<CatalogService>, ConsulError>;

    /// Number of instances of one service
    async fn service_instance_count(&self, name: &str, dc: Option<&str>) -> Result<usize, ConsulError> {
        Ok(self.service_instances(name, dc).await?.len())
    }

    /// Instance count for every service, plus totals.
    ///
    /// Fails as a whole if any single count fails. Not atomic across the
    /// backend: services registered mid-call may or may not be counted.
    async fn services_summary(&self, dc: Option<&str>) -> Result<ServicesSummary, ConsulError> {
        let names = self.list_services(dc).await?;
        let mut counts = Vec::with_capacity(names.len());
        for name in names {
            let count = self.service_instance_count(&name, dc).await?;
            counts.push((name, count));
        }
        let summary = ServicesSummary::from_counts(counts);
        tracing::info!(
            services = summary.total_services,
            instances = summary.total_instances,
            "Computed services summary"
        );
        Ok(summary)
    }

    /// Register (or fully re-register) a service on the agent
    async fn register_service(&self, registration: &ServiceRegistration) -> Result<(), ConsulError>;

    async fn deregister_service(&self, service_id: &str) -> Result<(), ConsulError>;

    /// Read one key; `Ok(None)` when it does not exist
    async fn get_kv(&self, key: &str, dc: Option<&str>) -> Result<Option<KvEntry>, ConsulError>;

    async fn put_kv(&self, key: &str, value: &str, dc: Option<&str>) -> Result<bool, ConsulError>;

    async fn delete_kv(&self, key: &str, dc: Option<&str>) -> Result<bool, ConsulError>;

    /// Keys under a prefix; empty when nothing matches
    async fn list_kv(&self, prefix: &str, dc: Option<&str>) -> Result<Vec<String>, ConsulError>;

    async fn nodes(&self, dc: Option<&str>) -> Result<Vec<Node>, ConsulError>;

    /// Instances of a service with their node and checks
    async fn service_health(
        &self,
        name: &str,
        dc: Option<&str>,
    ) -> Result<Vec<ServiceEntry>, ConsulError>;

    /// Services registered on the local agent, keyed by instance ID
    async fn agent_services(&self) -> Result<HashMap<String, AgentService>, ConsulError>;

    /// One agent service instance
    async fn agent_service(&self, service_id: &str) -> Result<AgentService, ConsulError> {
        self.agent_services()
            .await?
            .remove(service_id)
            .ok_or_else(|| ConsulError::ServiceNotFound {
                service_id: service_id.to_string(),
            })
    }
}

/// Errors that can occur when talking to Consul
#[derive(Debug, thiserror::Error)]
pub enum ConsulError {
    /// The request never produced a response
    #[error("{operation} failed: {source}")]
    Request {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Consul answered with a non-success status
    #[error("{operation} failed: Consul returned {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The response body could not be interpreted
    #[error("{operation} failed: invalid response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    /// The agent does not know the service instance
    #[error("Service ID '{service_id}' not found on agent")]
    ServiceNotFound { service_id: String },

    /// The client could not be built from the configuration
    #[error("Invalid Consul configuration: {0}")]
    InvalidConfig(String),
}

impl ConsulError {
    /// The operation that failed, when the error comes from a call
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            ConsulError::Request { operation, .. }
            | ConsulError::Status { operation, .. }
            | ConsulError::Decode { operation, .. } => Some(*operation),
            ConsulError::ServiceNotFound { .. } | ConsulError::InvalidConfig(_) => None,
        }
    }
}
