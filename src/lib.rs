//! # Consul MCP Server
//!
//! A Model Context Protocol (MCP) server exposing a Consul agent's catalog,
//! health checks, KV store and service instance metadata to MCP clients over
//! an SSE + POST transport.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Consul payloads (services, nodes, health entries, KV entries)
//! - [`consul`]: The backend trait, its HTTP client and an in-memory mock
//! - [`mcp`]: JSON-RPC dispatch, tool/resource/prompt registries, session loop
//! - [`transport`]: Session table and SSE streams
//! - [`api`]: axum router and server lifecycle
//! - [`utils`]: HTTP client construction and argument helpers
//! - [`config`]: Configuration management
//! - [`logging`]: tracing subscriber setup

pub mod api;
pub mod config;
pub mod consul;
pub mod logging;
pub mod mcp;
pub mod models;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use consul::{ConsulBackend, ConsulClient, ConsulError, MockConsul};
pub use mcp::McpServer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
