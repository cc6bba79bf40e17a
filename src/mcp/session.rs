//! Per-session protocol loop.
//!
//! Each session runs `Initializing -> Ready -> Closed`. Inbound messages are
//! handled strictly one after another, so responses leave in the order their
//! requests arrived regardless of backend latency.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use super::protocol::{JsonRpcMessage, JsonRpcResponse, ProtocolError};
use super::server::McpServer;

/// An inbound item: a validated message, or the envelope error found while
/// validating it
pub type InboundMessage = Result<JsonRpcMessage, ProtocolError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Ready,
    Closed,
}

/// Why a session loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The inbound side was dropped (session closed by the transport)
    InboundClosed,
    /// Nobody is reading the outbound side anymore
    OutboundClosed,
    IdleTimeout,
    ProtocolViolation,
}

#[derive(Debug)]
pub struct ProtocolSession {
    server: McpServer,
    session_id: String,
    state: SessionState,
}

impl ProtocolSession {
    pub fn new(server: McpServer, session_id: impl Into<String>) -> Self {
        Self {
            server,
            session_id: session_id.into(),
            state: SessionState::Initializing,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Process one inbound item.
    ///
    /// `Err` is fatal: the caller sends the error response and ends the
    /// session.
    pub async fn handle(
        &mut self,
        inbound: InboundMessage,
    ) -> Result<Option<JsonRpcResponse>, ProtocolError> {
        if self.state == SessionState::Closed {
            return Ok(None);
        }

        let message = inbound.inspect_err(|_| self.state = SessionState::Closed)?;

        match (self.state, message) {
            (SessionState::Initializing, JsonRpcMessage::Request(request))
                if request.method == "initialize" && !request.is_notification() =>
            {
                let response = self.server.initialize(&request);
                self.state = SessionState::Ready;
                Ok(Some(response))
            }
            (SessionState::Initializing, other) => {
                self.state = SessionState::Closed;
                let (id, method) = match other {
                    JsonRpcMessage::Request(request) => {
                        (request.id.unwrap_or(Value::Null), request.method)
                    }
                    JsonRpcMessage::Response(value) => (
                        value.get("id").cloned().unwrap_or(Value::Null),
                        "<response>".to_string(),
                    ),
                };
                Err(ProtocolError::NotInitialized { id, method })
            }
            (_, JsonRpcMessage::Response(value)) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                tracing::debug!(
                    session = %self.session_id,
                    %id,
                    "Ignoring response sent by client"
                );
                Ok(None)
            }
            (_, JsonRpcMessage::Request(request)) => Ok(self.server.handle_request(request).await),
        }
    }

    /// Drive the session until its inbound side closes, the idle timeout
    /// elapses, or the client violates the protocol.
    pub async fn run(
        mut self,
        mut inbound: UnboundedReceiver<InboundMessage>,
        outbound: UnboundedSender<JsonRpcResponse>,
        idle_timeout: Option<Duration>,
    ) -> SessionEnd {
        let end = loop {
            let next = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, inbound.recv()).await {
                    Ok(next) => next,
                    Err(_) => break SessionEnd::IdleTimeout,
                },
                None => inbound.recv().await,
            };

            let Some(message) = next else {
                break SessionEnd::InboundClosed;
            };

            match self.handle(message).await {
                Ok(Some(response)) => {
                    if outbound.send(response).is_err() {
                        break SessionEnd::OutboundClosed;
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(session = %self.session_id, %error, "Protocol violation, closing session");
                    let _ = outbound.send(error.to_response());
                    break SessionEnd::ProtocolViolation;
                }
            }
        };

        self.state = SessionState::Closed;
        tracing::debug!(session = %self.session_id, ?end, "Session loop finished");
        end
    }
}
