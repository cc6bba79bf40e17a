//! Data models for the Consul backend.

mod consul;

pub use consul::{
    AgentService, CatalogService, CheckDefinition, HealthCheck, KvEntry, Node, RawKvPair,
    ServiceEntry, ServiceRegistration, ServicesSummary,
};
