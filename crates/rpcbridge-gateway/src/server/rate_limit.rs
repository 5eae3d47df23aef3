//! Per-path rate limiting for the credential-accepting endpoints.
//!
//! Fixed windows counted in a DashMap keyed by path. Every caller shares the
//! same bucket for a path.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

/// Fixed-window limiter, cheap to clone
#[derive(Clone)]
pub struct RateLimiter {
    /// path → (window start, requests seen in window)
    buckets: Arc<DashMap<String, (Instant, u32)>>,
    rules: Arc<HashMap<String, RateLimitConfig>>,
}

impl RateLimiter {
    pub fn new(rules: impl IntoIterator<Item = (String, RateLimitConfig)>) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            rules: Arc::new(rules.into_iter().collect()),
        }
    }

    /// `true` when the request is within limits
    pub fn check(&self, path: &str) -> bool {
        self.check_at(path, Instant::now())
    }

    fn check_at(&self, path: &str, now: Instant) -> bool {
        let Some(config) = self.rules.get(path) else {
            return true;
        };

        let mut entry = self.buckets.entry(path.to_string()).or_insert((now, 0));
        let (window_start, count) = entry.value_mut();

        if now.duration_since(*window_start) >= config.window {
            *window_start = now;
            *count = 1;
            return true;
        }
        if *count >= config.max_requests {
            return false;
        }
        *count += 1;
        true
    }
}

/// Reads the [`RateLimiter`] from request extensions; absent means unlimited
pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    if let Some(limiter) = request.extensions().get::<RateLimiter>() {
        let path = request.uri().path();
        if !limiter.check(path) {
            warn!(path = %path, "Rate limit exceeded");
            return (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded. Please try again later.",
            )
                .into_response();
        }
    }

    next.run(request).await
}

/// Limits for `/authorize`, `/token` and `/register`
pub fn default_oauth_rate_limiter() -> RateLimiter {
    let minute = Duration::from_secs(60);
    RateLimiter::new([
        (
            "/authorize".to_string(),
            RateLimitConfig {
                max_requests: 30,
                window: minute,
            },
        ),
        (
            "/token".to_string(),
            RateLimitConfig {
                max_requests: 60,
                window: minute,
            },
        ),
        (
            "/register".to_string(),
            RateLimitConfig {
                max_requests: 20,
                window: minute,
            },
        ),
    ])
}
