//! HTTP/SSE transport.
//!
//! A client opens `GET /sse` and receives an `endpoint` event naming its
//! session's POST URL. Each `POST /message?sessionId=...` is dispatched and
//! the JSON-RPC response is pushed back on that client's event stream.

use crate::config::TransportConfig;
use crate::constants::{SSE_SESSION_CHANNEL_CAPACITY, TOKEN_QUERY_PARAM};
use crate::error::ServerError;
use crate::handlers::handle_raw;
use crate::server::EpicorMcpServer;
use crate::shutdown::ShutdownSignal;
use crate::transport::health_payload;
use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream, StreamExt};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Open SSE sessions, keyed by session id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, mpsc::Sender<String>>>>,
}

impl SessionRegistry {
    /// Register a new session and return its id and outbound queue.
    pub fn open(&self) -> (Uuid, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SSE_SESSION_CHANNEL_CAPACITY);
        let id = Uuid::new_v4();
        self.sessions.write().insert(id, tx);
        (id, rx)
    }

    pub fn sender(&self, id: &Uuid) -> Option<mpsc::Sender<String>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &Uuid) {
        self.sessions.write().remove(id);
    }

    /// Drop every session sender, which ends all open event streams.
    pub fn close_all(&self) {
        self.sessions.write().clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

/// Removes its session when the event stream is dropped.
struct SessionGuard {
    sessions: SessionRegistry,
    id: Uuid,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
        info!(session_id = %self.id, "SSE session closed");
    }
}

#[derive(Clone)]
struct AppState {
    server: EpicorMcpServer,
    sessions: SessionRegistry,
    token: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Build the router. `/health` is open; `/sse` and `/message` require `token`.
pub fn router(server: EpicorMcpServer, sessions: SessionRegistry, token: &str) -> Router {
    let state = AppState {
        server,
        sessions,
        token: Arc::from(token),
    };

    let protected = Router::new()
        .route("/sse", get(open_stream))
        .route("/message", post(post_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the SSE transport until `shutdown` fires.
pub async fn serve_http(
    server: EpicorMcpServer,
    config: &TransportConfig,
    mut shutdown: ShutdownSignal,
) -> Result<(), ServerError> {
    let token = config.access_token.as_deref().ok_or_else(|| {
        ServerError::config("MCP_ACCESS_TOKEN is required when MCP_TRANSPORT is http")
    })?;

    let addr = format!("{}:{}", config.http_host, config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::Http(format!("Failed to bind {}: {}", addr, e)))?;
    info!(address = %addr, "HTTP/SSE transport listening");

    let sessions = SessionRegistry::default();
    let app = router(server, sessions.clone(), token);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await;
            info!(open_sessions = sessions.len(), "Closing SSE sessions");
            sessions.close_all();
        })
        .await
        .map_err(|e| ServerError::Http(e.to_string()))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(health_payload(
        state.server.database_enabled(),
        state.sessions.len(),
    ))
}

async fn open_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, rx) = state.sessions.open();
    info!(session_id = %id, "SSE session opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/message?sessionId={}", id));
    let guard = SessionGuard {
        sessions: state.sessions.clone(),
        id,
    };

    let messages = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let message = rx.recv().await?;
        let event = Event::default().event("message").data(message);
        Some((Ok::<_, Infallible>(event), (rx, guard)))
    });

    Sse::new(stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(messages))
        .keep_alive(KeepAlive::default())
}

async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let session = query
        .session_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok())
        .and_then(|id| state.sessions.sender(&id).map(|tx| (id, tx)));
    let Some((id, sender)) = session else {
        return (StatusCode::NOT_FOUND, "Unknown session").into_response();
    };

    let Ok(raw) = std::str::from_utf8(&body) else {
        return (StatusCode::BAD_REQUEST, "Body must be UTF-8").into_response();
    };

    if let Some(response) = handle_raw(&state.server, raw).await {
        if sender.send(response).await.is_err() {
            debug!(session_id = %id, "Session closed before the response was delivered");
        }
    }

    StatusCode::ACCEPTED.into_response()
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match presented_token(&request) {
        Some(token) if constant_time_eq(token.as_bytes(), state.token.as_bytes()) => {
            next.run(request).await
        }
        presented => {
            warn!(
                path = %request.uri().path(),
                token_present = presented.is_some(),
                "Rejected unauthenticated request"
            );
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized" })),
            )
                .into_response()
        }
    }
}

/// Token from `Authorization: Bearer ...`, falling back to the `token` query parameter.
fn presented_token(request: &Request) -> Option<String> {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string());
    if bearer.is_some() {
        return bearer;
    }

    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == TOKEN_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(uri: &str, auth: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret-longer"));
    }

    #[test]
    fn test_presented_token_sources() {
        let req = request("/sse", Some("Bearer abc"));
        assert_eq!(presented_token(&req).as_deref(), Some("abc"));

        let req = request("/sse?token=a%2Bb&x=1", None);
        assert_eq!(presented_token(&req).as_deref(), Some("a+b"));

        let req = request("/sse?tokenx=abc", Some("Basic abc"));
        assert_eq!(presented_token(&req), None);
    }

    #[test]
    fn test_session_registry() {
        let sessions = SessionRegistry::default();
        let (id, _rx) = sessions.open();
        assert_eq!(sessions.len(), 1);
        assert!(sessions.sender(&id).is_some());

        let guard = SessionGuard {
            sessions: sessions.clone(),
            id,
        };
        drop(guard);
        assert!(sessions.is_empty());
    }
}
