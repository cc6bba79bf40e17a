//! Live-session table.
//!
//! The table is a plain `std::sync::Mutex` around a map: critical sections
//! never await, and `close` must be callable from `Drop`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use uuid::Uuid;

use super::TransportError;
use crate::mcp::{InboundMessage, JsonRpcResponse, McpServer, ProtocolSession};

#[derive(Debug)]
struct SessionHandle {
    inbound: UnboundedSender<InboundMessage>,
    created_at: DateTime<Utc>,
    task: AbortHandle,
}

/// A freshly opened session: its token and the outbound side to stream
#[derive(Debug)]
pub struct OpenedSession {
    pub id: Uuid,
    pub outbound: UnboundedReceiver<JsonRpcResponse>,
}

/// Shared registry of open sessions, keyed by token.
///
/// Cloning is cheap; clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<Uuid, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a session and spawn its protocol task.
    ///
    /// The task removes its own entry when it finishes, whatever the reason.
    pub fn open(&self, server: McpServer, idle_timeout: Option<Duration>) -> OpenedSession {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let mut table = self.table();
        let mut id = Uuid::new_v4();
        while table.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let session = ProtocolSession::new(server, id.simple().to_string());
        let registry = self.clone();
        let task = tokio::spawn(async move {
            let end = session.run(inbound_rx, outbound_tx, idle_timeout).await;
            if registry.remove(&id).is_some() {
                tracing::info!(session = %id.simple(), reason = ?end, "Session ended");
            }
        });

        table.insert(
            id,
            SessionHandle {
                inbound: inbound_tx,
                created_at: Utc::now(),
                task: task.abort_handle(),
            },
        );
        let live = table.len();
        drop(table);

        tracing::info!(session = %id.simple(), live, "Session opened");
        OpenedSession {
            id,
            outbound: outbound_rx,
        }
    }

    /// Queue one inbound message for a live session.
    pub fn deliver(&self, id: &Uuid, message: InboundMessage) -> Result<(), TransportError> {
        let table = self.table();
        let handle = table.get(id).ok_or(TransportError::SessionNotFound)?;
        handle
            .inbound
            .send(message)
            .map_err(|_| TransportError::SessionNotFound)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.table().contains_key(id)
    }

    fn remove(&self, id: &Uuid) -> Option<SessionHandle> {
        self.table().remove(id)
    }

    /// Close a session: forget it and cancel its task. Returns whether it was
    /// still open; closing twice is harmless.
    pub fn close(&self, id: &Uuid) -> bool {
        match self.remove(id) {
            Some(handle) => {
                handle.task.abort();
                let lifetime = Utc::now() - handle.created_at;
                tracing::info!(
                    session = %id.simple(),
                    lifetime_secs = lifetime.num_seconds(),
                    "Session closed"
                );
                true
            }
            None => false,
        }
    }

    /// Close every open session. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let handles: Vec<(Uuid, SessionHandle)> = self.table().drain().collect();
        for (id, handle) in &handles {
            handle.task.abort();
            tracing::debug!(session = %id.simple(), "Session closed on shutdown");
        }
        handles.len()
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

/// Parse a session token as handed out in the endpoint event.
pub fn parse_session_id(raw: &str) -> Result<Uuid, TransportError> {
    Uuid::try_parse(raw).map_err(|_| TransportError::InvalidSessionId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consul::MockConsul;
    use crate::mcp::{JsonRpcMessage, JsonRpcRequest};
    use serde_json::json;
    use std::collections::HashSet;

    fn server() -> McpServer {
        McpServer::new(Arc::new(MockConsul::new()))
    }

    fn initialize() -> InboundMessage {
        Ok(JsonRpcMessage::Request(JsonRpcRequest::new(
            1,
            "initialize",
            Some(json!({"protocolVersion": "2025-06-18"})),
        )))
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let registry = SessionRegistry::new();
        let mut ids = HashSet::new();
        let mut opened = Vec::new();
        for _ in 0..64 {
            let session = registry.open(server(), None);
            ids.insert(session.id);
            opened.push(session);
        }
        assert_eq!(ids.len(), 64);
        assert_eq!(registry.len(), 64);
    }

    #[tokio::test]
    async fn test_deliver_and_respond() {
        let registry = SessionRegistry::new();
        let mut session = registry.open(server(), None);

        registry.deliver(&session.id, initialize()).unwrap();
        let response = session.outbound.recv().await.unwrap();
        assert_eq!(response.id, json!(1));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let registry = SessionRegistry::new();
        let mut session = registry.open(server(), None);

        assert!(registry.close(&session.id));
        assert!(!registry.close(&session.id));
        assert!(registry.is_empty());

        // the aborted task drops its outbound sender
        assert!(session.outbound.recv().await.is_none());

        let err = registry.deliver(&session.id, initialize()).unwrap_err();
        assert!(matches!(err, TransportError::SessionNotFound));
        assert!(!registry.contains(&session.id));
    }

    #[tokio::test]
    async fn test_protocol_violation_removes_session() {
        let registry = SessionRegistry::new();
        let mut session = registry.open(server(), None);

        let ping = Ok(JsonRpcMessage::Request(JsonRpcRequest::new(1, "ping", None)));
        registry.deliver(&session.id, ping).unwrap();

        let response = session.outbound.recv().await.unwrap();
        assert!(response.error.is_some());
        assert!(session.outbound.recv().await.is_none());
        assert!(!registry.contains(&session.id));
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = SessionRegistry::new();
        let a = registry.open(server(), None);
        let b = registry.open(server(), None);

        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());
        assert!(!registry.contains(&a.id));
        assert!(!registry.contains(&b.id));
    }

    #[test]
    fn test_parse_session_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_session_id(&id.simple().to_string()).unwrap(), id);
        assert!(matches!(
            parse_session_id("bogus"),
            Err(TransportError::InvalidSessionId)
        ));
    }
}
