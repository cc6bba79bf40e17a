//! MCP (Model Context Protocol) implementation.
//!
//! JSON-RPC envelopes, the tool/resource/prompt registries backed by Consul,
//! method dispatch, and the per-session protocol loop. The HTTP transport
//! carrying sessions lives in [`crate::transport`].

mod consul_tools;
pub mod prompts;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod session;
mod tools;
pub mod types;

pub use prompts::PromptRegistry;
pub use protocol::{JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, ProtocolError};
pub use resources::ResourceRegistry;
pub use server::{McpServer, LATEST_PROTOCOL_VERSION, SERVER_NAME, SUPPORTED_PROTOCOL_VERSIONS};
pub use session::{InboundMessage, ProtocolSession, SessionEnd, SessionState};
pub use tools::{validate_arguments, Tool, ToolHandler, ToolRegistry};
pub use types::{CallToolResult, Content, GetPromptResult};
