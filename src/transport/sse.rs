//! SSE body for one session.

use std::convert::Infallible;

use axum::response::sse::Event;
use futures_util::Stream;
use uuid::Uuid;

use super::session::{OpenedSession, SessionRegistry};

/// Closes the session when the stream body is dropped, which is how a
/// client disconnect surfaces.
struct SessionGuard {
    registry: SessionRegistry,
    id: Uuid,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.registry.close(&self.id) {
            tracing::info!(session = %self.id.simple(), "Client disconnected");
        }
    }
}

/// URL announced in the `endpoint` event
pub fn endpoint_url(messages_endpoint: &str, id: &Uuid) -> String {
    format!("{}?session_id={}", messages_endpoint, id.simple())
}

/// Event stream for an opened session: the `endpoint` event first, then
/// one `message` event per outbound JSON-RPC message, in order.
///
/// The stream ends when the session's protocol task finishes and its queue
/// is drained.
pub fn session_stream(
    registry: SessionRegistry,
    session: OpenedSession,
    messages_endpoint: &str,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let OpenedSession { id, mut outbound } = session;
    let endpoint = endpoint_url(messages_endpoint, &id);
    let guard = SessionGuard { registry, id };

    async_stream::stream! {
        let _guard = guard;
        yield Ok(Event::default().event("endpoint").data(endpoint));

        while let Some(message) = outbound.recv().await {
            match serde_json::to_string(&message) {
                Ok(data) => {
                    tracing::trace!(session = %id.simple(), "Sending message");
                    yield Ok(Event::default().event("message").data(data));
                }
                Err(e) => {
                    tracing::error!(session = %id.simple(), error = %e, "Failed to encode outbound message");
                }
            }
        }

        tracing::debug!(session = %id.simple(), "Outbound queue closed, ending stream");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consul::MockConsul;
    use crate::mcp::McpServer;
    use futures_util::StreamExt;
    use std::sync::Arc;

    #[test]
    fn test_endpoint_url() {
        let id = Uuid::nil();
        assert_eq!(
            endpoint_url("/messages", &id),
            "/messages?session_id=00000000000000000000000000000000"
        );
    }

    #[tokio::test]
    async fn test_dropping_stream_closes_session() {
        let registry = SessionRegistry::new();
        let server = McpServer::new(Arc::new(MockConsul::new()));
        let opened = registry.open(server, None);
        let id = opened.id;

        let stream = session_stream(registry.clone(), opened, "/messages");
        let mut stream = Box::pin(stream);
        assert!(stream.next().await.is_some());
        assert!(registry.contains(&id));

        drop(stream);
        assert!(!registry.contains(&id));
    }
}
