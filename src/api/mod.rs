//! HTTP front door.
//!
//! Routes (paths configurable):
//!
//! - `GET /sse` opens a session and streams its messages
//! - `HEAD /sse` checks availability without opening a session
//! - `POST /messages?session_id=TOKEN` delivers one JSON-RPC message
//! - `GET|HEAD /health` reports backend connectivity, always `200`

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ServerConfig;
use crate::consul::ConsulBackend;
use crate::mcp::{JsonRpcMessage, McpServer};
use crate::transport::{parse_session_id, session_stream, SessionRegistry, TransportError};

/// Largest accepted POST body
const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Shared state of the HTTP layer
#[derive(Debug, Clone)]
pub struct AppState {
    pub server: McpServer,
    pub sessions: SessionRegistry,
    backend: Arc<dyn ConsulBackend>,
    messages_endpoint: String,
    idle_timeout: Option<Duration>,
    keep_alive: Duration,
}

impl AppState {
    pub fn new(config: &ServerConfig, backend: Arc<dyn ConsulBackend>) -> Self {
        Self {
            server: McpServer::new(backend.clone()),
            sessions: SessionRegistry::new(),
            backend,
            messages_endpoint: route_path(&config.messages_endpoint),
            idle_timeout: config.session_idle_timeout(),
            keep_alive: config.keep_alive(),
        }
    }
}

/// Routes must be absolute
fn route_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Build the router over an existing state
pub fn router(config: &ServerConfig, state: AppState) -> Router {
    Router::new()
        .route(
            &route_path(&config.sse_endpoint),
            get(open_sse).head(sse_head),
        )
        .route(&route_path(&config.messages_endpoint), post(post_message))
        .route(&route_path(&config.health_endpoint), get(health))
        .with_state(state)
}

/// Build the router and its state from configuration
pub fn create_app(config: &ServerConfig, backend: Arc<dyn ConsulBackend>) -> (Router, AppState) {
    let state = AppState::new(config, backend);
    (router(config, state.clone()), state)
}

async fn open_sse(State(state): State<AppState>) -> Response {
    let opened = state.sessions.open(state.server.clone(), state.idle_timeout);
    let stream = session_stream(state.sessions.clone(), opened, &state.messages_endpoint);

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(state.keep_alive))
        .into_response()
}

async fn sse_head() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    session_id: Option<String>,
}

async fn post_message(
    State(state): State<AppState>,
    query: Result<Query<MessagesQuery>, QueryRejection>,
    body: Body,
) -> Result<Response, TransportError> {
    let raw_id = query
        .ok()
        .and_then(|Query(q)| q.session_id)
        .filter(|id| !id.is_empty())
        .ok_or(TransportError::MissingSessionId)?;
    let id = parse_session_id(&raw_id)?;
    if !state.sessions.contains(&id) {
        return Err(TransportError::SessionNotFound);
    }

    let bytes: Bytes = axum::body::to_bytes(body, MAX_MESSAGE_BYTES)
        .await
        .map_err(|e| {
            if exceeds_limit(&e) {
                TransportError::PayloadTooLarge {
                    limit: MAX_MESSAGE_BYTES,
                }
            } else {
                TransportError::Internal(format!("failed to read request body: {}", e))
            }
        })?;

    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| TransportError::MalformedMessage(e.to_string()))?;

    match JsonRpcMessage::from_value(value) {
        Ok(message) => {
            tracing::debug!(session = %raw_id, method = ?message.method(), "Message received");
            state.sessions.deliver(&id, Ok(message))?;
            Ok((StatusCode::OK, "Accepted").into_response())
        }
        Err(error) => {
            // The session still sees the violation so it can answer and close.
            let reason = error.to_string();
            state.sessions.deliver(&id, Err(error))?;
            Err(TransportError::MalformedMessage(reason))
        }
    }
}

/// Whether a body read failed on the size limit rather than on I/O
fn exceeds_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        if e.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    if state.backend.is_connected().await {
        Json(json!({"status": "healthy", "consul": "connected"}))
    } else {
        tracing::warn!("Health check: Consul is not reachable");
        Json(json!({"status": "unhealthy", "consul": "not_connected"}))
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Bind and serve until a shutdown signal arrives. Live sessions are closed
/// before the server stops.
pub async fn serve(config: &ServerConfig, backend: Arc<dyn ConsulBackend>) -> std::io::Result<()> {
    let (app, state) = create_app(config, backend);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", listener.local_addr()?);
    tracing::info!(
        sse = %config.sse_endpoint,
        messages = %config.messages_endpoint,
        health = %config.health_endpoint,
        "Endpoints"
    );

    let sessions = state.sessions.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Received shutdown signal, shutting down gracefully...");
            let closed = sessions.close_all();
            tracing::info!(closed, "Closed live sessions");
        })
        .await?;

    tracing::info!("Server shut down");
    Ok(())
}
