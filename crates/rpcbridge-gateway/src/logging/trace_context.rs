//! Per-request trace IDs and the entry/exit log lines keyed by them

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, info_span, warn, Span};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Short trace ID: 6 hex characters (e.g. "a1b2c3")
pub fn generate_trace_id() -> String {
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0);

    // Counter in the low bits keeps consecutive ids distinct
    let mixed = (timestamp << 8) ^ counter;
    format!("{:06x}", mixed & 0xFF_FFFF)
}

/// Correlation data for one HTTP request
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
    pub method: String,
    pub path: String,
    /// JSON-RPC method for protocol traffic
    pub rpc_method: Option<String>,
    /// Backend login once the bearer is resolved
    pub login: Option<String>,
    pub started_at: Instant,
}

impl TraceContext {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            trace_id: generate_trace_id(),
            method: method.to_string(),
            path: path.to_string(),
            rpc_method: None,
            login: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_rpc_method(mut self, method: Option<String>) -> Self {
        self.rpc_method = method;
        self
    }

    pub fn with_login(mut self, login: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Login for log lines (at most 12 chars, "anon" when unknown)
    pub fn short_login(&self) -> &str {
        match &self.login {
            Some(login) => {
                let end = login.char_indices().nth(12).map(|(i, _)| i).unwrap_or(login.len());
                &login[..end]
            }
            None => "anon",
        }
    }
}

/// Login the bearer middleware resolved, attached to the response so the
/// outer logging middleware can report it
#[derive(Debug, Clone)]
pub struct ResolvedLogin(pub String);

/// Span and entry/exit lines for a request
pub struct RequestSpan;

impl RequestSpan {
    pub fn enter(ctx: &TraceContext) -> Span {
        info_span!(
            "request",
            trace_id = %ctx.trace_id,
            method = %ctx.method,
            path = %ctx.path,
        )
    }

    pub fn log_entry(ctx: &TraceContext) {
        match &ctx.rpc_method {
            Some(rpc) => info!(trace_id = %ctx.trace_id, "→ {} {} {}", ctx.method, ctx.path, rpc),
            None => info!(trace_id = %ctx.trace_id, "→ {} {}", ctx.method, ctx.path),
        }
    }

    pub fn log_exit(ctx: &TraceContext, status: u16) {
        let elapsed = ctx.elapsed_ms();
        if status >= 500 {
            warn!(trace_id = %ctx.trace_id, login = %ctx.short_login(), "← {} {}ms", status, elapsed);
        } else {
            info!(trace_id = %ctx.trace_id, login = %ctx.short_login(), "← {} {}ms", status, elapsed);
        }
    }
}
