//! Bearer Middleware for protocol traffic
//!
//! Resolves the bearer value to a backend [`CredentialPair`] and inserts it
//! into the request extensions, where the MCP handler picks it up. A bearer
//! is accepted when it is a live issued access token or, if enabled, a
//! directly-decodable `base64(login:secret)` value. Malformed and absent
//! bearers are treated the same.

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use rpcbridge_core::CredentialPair;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::logging::{ResolvedLogin, TraceContext};
use crate::oauth::OAuthService;

/// State for [`bearer_auth_middleware`]
#[derive(Clone)]
pub struct BearerAuth {
    oauth: Arc<OAuthService>,
    allow_direct_bearer: bool,
    resource_metadata_url: String,
}

impl BearerAuth {
    pub fn new(oauth: Arc<OAuthService>, allow_direct_bearer: bool, resource_metadata_url: String) -> Self {
        Self {
            oauth,
            allow_direct_bearer,
            resource_metadata_url,
        }
    }

    /// Issued token first, then the direct form
    pub fn resolve(&self, bearer: &str) -> Option<CredentialPair> {
        if let Some(pair) = self.oauth.validate_access_token(bearer) {
            return Some(pair);
        }
        if self.allow_direct_bearer {
            return CredentialPair::from_bearer_value(bearer);
        }
        None
    }

    /// Pull the bearer value out of an `Authorization` header
    pub fn bearer_from_headers(headers: &axum::http::HeaderMap) -> Option<&str> {
        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }

    fn unauthorized(&self) -> Response<Body> {
        let challenge = format!(
            r#"Bearer error="invalid_token", resource_metadata="{}""#,
            self.resource_metadata_url
        );
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, challenge)],
            "invalid or missing bearer token",
        )
            .into_response()
    }
}

/// Authorization middleware mounted in front of the protocol routes only
pub async fn bearer_auth_middleware(
    State(auth): State<BearerAuth>,
    mut request: Request<Body>,
    next: Next,
) -> Response<Body> {
    // CORS preflight carries no credentials
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id.clone())
        .unwrap_or_else(|| "??????".to_string());

    let pair = BearerAuth::bearer_from_headers(request.headers()).and_then(|bearer| auth.resolve(bearer));

    let Some(pair) = pair else {
        warn!(trace_id = %trace_id, path = %request.uri().path(), "Rejected request without a valid bearer");
        return auth.unauthorized();
    };

    let login = pair.short_login().to_string();
    debug!(trace_id = %trace_id, login = %login, "Bearer resolved");
    request.extensions_mut().insert(pair);

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ResolvedLogin(login));
    response
}
