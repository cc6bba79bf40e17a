//! SSE + POST session transport.
//!
//! `GET` on the SSE endpoint opens a session and streams its outbound
//! messages; `POST` on the messages endpoint delivers one inbound message to
//! the session named by `session_id`.

mod session;
mod sse;

pub use session::{parse_session_id, OpenedSession, SessionRegistry};
pub use sse::{endpoint_url, session_stream};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors resolved at the HTTP boundary. They never reach a session.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("session_id query parameter is required")]
    MissingSessionId,

    #[error("session_id is not a valid session token")]
    InvalidSessionId,

    #[error("Could not find session")]
    SessionNotFound,

    #[error("Could not parse message: {0}")]
    MalformedMessage(String),

    #[error("Message exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransportError {
    pub fn status(&self) -> StatusCode {
        match self {
            TransportError::MissingSessionId
            | TransportError::InvalidSessionId
            | TransportError::MalformedMessage(_) => StatusCode::BAD_REQUEST,
            TransportError::SessionNotFound => StatusCode::NOT_FOUND,
            TransportError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            TransportError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::MissingSessionId => "missing_session_id",
            TransportError::InvalidSessionId => "invalid_session_id",
            TransportError::SessionNotFound => "session_not_found",
            TransportError::MalformedMessage(_) => "malformed_message",
            TransportError::PayloadTooLarge { .. } => "payload_too_large",
            TransportError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Transport failure");
        } else {
            tracing::warn!(error = %self, "Rejected message");
        }
        let body = json!({ "error": self.kind(), "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(TransportError::MissingSessionId.status(), StatusCode::BAD_REQUEST);
        assert_eq!(TransportError::InvalidSessionId.status(), StatusCode::BAD_REQUEST);
        assert_eq!(TransportError::SessionNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            TransportError::MalformedMessage("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TransportError::PayloadTooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            TransportError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
