//! Legacy event-stream sub-transport
//!
//! `GET {sse_path}` opens a long-lived stream. The first event is `endpoint`,
//! carrying the URL the client must POST its JSON-RPC messages to; server
//! messages follow as `message` events. Each stream is one session with its
//! own handler, bound at connect time to the credential pair the bearer
//! middleware resolved (or the static pair when authorization is off).
//!
//! Closing the stream cancels the session, which drops its backend client and
//! any in-flight backend call.

use axum::{
    body::to_bytes,
    extract::{Query, Request, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use futures::{channel::mpsc, StreamExt};
use rmcp::{
    model::{ClientJsonRpcMessage, ServerJsonRpcMessage},
    ServiceExt,
};
use rpcbridge_core::CredentialPair;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::BackendError;
use crate::mcp::{BridgeGateway, SessionError};

/// Largest JSON-RPC message accepted on the message endpoint
const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

struct SseSession {
    /// Pair the stream was opened with; posts must carry the same pair
    credentials: CredentialPair,
    sender: mpsc::UnboundedSender<ClientJsonRpcMessage>,
}

/// Live event-stream sessions
pub struct SseSessions {
    gateway: BridgeGateway,
    messages_path: String,
    sessions: DashMap<String, SseSession>,
    shutdown: CancellationToken,
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

impl SseSessions {
    pub fn new(gateway: BridgeGateway, messages_path: String, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            messages_path,
            sessions: DashMap::new(),
            shutdown,
        })
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Routes for the stream and message endpoints
    pub fn router(self: &Arc<Self>, sse_path: &str) -> Router {
        Router::new()
            .route(sse_path, get(sse_connect))
            .route(&self.messages_path, post(sse_message))
            .with_state(self.clone())
    }
}

async fn sse_connect(State(state): State<Arc<SseSessions>>, request: Request) -> Response {
    let bearer_pair = request.extensions().get::<CredentialPair>().cloned();
    let from_bearer = bearer_pair.is_some();

    let handler = match bearer_pair {
        Some(pair) => state.gateway.bound_session(pair),
        None => state.gateway.session(),
    };

    if let Err(e) = handler.connect().await {
        warn!(session = %handler.session_id(), "[SSE] Session rejected: {}", e);
        let status = match e {
            SessionError::Backend(BackendError::Unhealthy) if from_bearer => StatusCode::UNAUTHORIZED,
            SessionError::NoCredentials => StatusCode::UNAUTHORIZED,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };
        return (status, "backend session could not be established").into_response();
    }

    let session_id = uuid::Uuid::new_v4().simple().to_string();
    let Some(credentials) = handler.credentials().cloned() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "backend session could not be established").into_response();
    };
    let login = credentials.short_login().to_string();

    let (to_handler, from_client) = mpsc::unbounded::<ClientJsonRpcMessage>();
    let (to_client, mut client_rx) = mpsc::unbounded::<ServerJsonRpcMessage>();

    state.sessions.insert(
        session_id.clone(),
        SseSession {
            credentials,
            sender: to_handler,
        },
    );

    let ct = state.shutdown.child_token();
    let guard = ct.clone().drop_guard();

    info!(session = %session_id, login = %login, "[SSE] Session opened");

    {
        let state = state.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            match handler.serve_with_ct((to_client, from_client), ct).await {
                Ok(service) => {
                    let reason = service.waiting().await;
                    debug!(session = %session_id, reason = ?reason, "[SSE] Service stopped");
                }
                Err(e) => warn!(session = %session_id, "[SSE] Handshake failed: {}", e),
            }
            state.sessions.remove(&session_id);
            info!(session = %session_id, "[SSE] Session closed");
        });
    }

    let endpoint = format!("{}?sessionId={}", state.messages_path, session_id);
    let stream = async_stream::stream! {
        // Dropped with the stream: cancels the session on client disconnect
        let _guard = guard;
        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));

        while let Some(message) = client_rx.next().await {
            match serde_json::to_string(&message) {
                Ok(json) => yield Ok(Event::default().event("message").data(json)),
                Err(e) => warn!("[SSE] Dropping unserializable message: {}", e),
            }
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE))
        .into_response()
}

async fn sse_message(State(state): State<Arc<SseSessions>>, request: Request) -> Response {
    let Ok(Query(query)) = Query::<MessageQuery>::try_from_uri(request.uri()) else {
        return (StatusCode::BAD_REQUEST, "missing sessionId").into_response();
    };
    let caller = request.extensions().get::<CredentialPair>().cloned();

    let body = match to_bytes(request.into_body(), MAX_MESSAGE_BYTES).await {
        Ok(body) => body,
        Err(_) => return (StatusCode::PAYLOAD_TOO_LARGE, "message too large").into_response(),
    };
    let message: ClientJsonRpcMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            debug!(session = %query.session_id, "[SSE] Invalid message: {}", e);
            return (StatusCode::BAD_REQUEST, "invalid JSON-RPC message").into_response();
        }
    };

    let sender = {
        let Some(session) = state.sessions.get(&query.session_id) else {
            return (StatusCode::NOT_FOUND, "unknown session").into_response();
        };
        if let Some(caller) = caller {
            if !same_pair(&caller, &session.credentials) {
                warn!(session = %query.session_id, "[SSE] Post with different credentials refused");
                return (StatusCode::FORBIDDEN, "session belongs to another login").into_response();
            }
        }
        session.sender.clone()
    };

    if sender.unbounded_send(message).is_err() {
        state.sessions.remove(&query.session_id);
        return (StatusCode::NOT_FOUND, "session closed").into_response();
    }

    StatusCode::ACCEPTED.into_response()
}

fn same_pair(a: &CredentialPair, b: &CredentialPair) -> bool {
    let login = a.login.as_bytes().ct_eq(b.login.as_bytes());
    let secret = a.secret().as_bytes().ct_eq(b.secret().as_bytes());
    (login & secret).into()
}

impl std::fmt::Debug for SseSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseSessions")
            .field("messages_path", &self.messages_path)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
