//! HTTP Request Logging Middleware
//!
//! One entry and one exit line per request, correlated by trace ID. Response
//! bodies are never buffered because protocol responses may be open-ended
//! event streams. Request bodies of protocol posts are peeked for the JSON-RPC
//! method; OAuth endpoint bodies carry credentials and are never logged.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum::http::{HeaderMap, Method, StatusCode};
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

use crate::logging::{RequestSpan, ResolvedLogin, TraceContext};

/// Largest protocol request body we buffer to read its method
const MAX_PEEK_BYTES: usize = 4 * 1024 * 1024;

/// Paths whose bodies contain credentials or tokens
const SENSITIVE_PATHS: &[&str] = &["/token", "/authorize", "/register"];

/// Headers worth showing at DEBUG; Authorization and cookies never are
const LOGGED_HEADERS: &[&str] = &[
    "content-type",
    "accept",
    "user-agent",
    "mcp-session-id",
    "mcp-protocol-version",
];

pub fn is_sensitive_path(path: &str) -> bool {
    SENSITIVE_PATHS.contains(&path)
}

/// Paths the middleware treats as protocol traffic
#[derive(Clone)]
pub struct HttpLogging {
    protocol_paths: Arc<Vec<String>>,
}

impl HttpLogging {
    pub fn new(protocol_paths: Vec<String>) -> Self {
        Self {
            protocol_paths: Arc::new(protocol_paths),
        }
    }

    fn is_protocol(&self, path: &str) -> bool {
        self.protocol_paths.iter().any(|p| p == path)
    }
}

fn compact_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .filter(|(name, _)| LOGGED_HEADERS.contains(&name.as_str()))
        .map(|(name, value)| format!("{}={:?}", name, value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// JSON-RPC method of a request body, if it has one
pub fn extract_rpc_method(bytes: &[u8]) -> Option<String> {
    let json: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    json.get("method")
        .and_then(|m| m.as_str())
        .map(String::from)
}

pub async fn http_logging_middleware(
    State(logging): State<HttpLogging>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let mut ctx = TraceContext::new(request.method().as_str(), &path);
    let span = RequestSpan::enter(&ctx);

    async move {
        debug!(
            trace_id = %ctx.trace_id,
            headers = %compact_headers(request.headers()),
            sensitive = is_sensitive_path(&path),
            "Request headers"
        );

        let mut request = request;
        if logging.is_protocol(&path) && request.method() == Method::POST {
            let (parts, body) = request.into_parts();
            let bytes = match to_bytes(body, MAX_PEEK_BYTES).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(trace_id = %ctx.trace_id, "Failed to read request body: {}", e);
                    return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
                }
            };
            ctx = ctx.with_rpc_method(extract_rpc_method(&bytes));
            request = Request::from_parts(parts, Body::from(bytes));
        }

        RequestSpan::log_entry(&ctx);
        request.extensions_mut().insert(ctx.clone());

        let response = next.run(request).await;
        if let Some(ResolvedLogin(login)) = response.extensions().get::<ResolvedLogin>() {
            ctx = ctx.with_login(login.clone());
        }
        RequestSpan::log_exit(&ctx, response.status().as_u16());
        response
    }
    .instrument(span)
    .await
}
