//! Credential Context
//!
//! Which credential pair applies to the request being processed. The value is
//! carried explicitly: the bearer middleware inserts a [`CredentialPair`] into
//! the HTTP request extensions, rmcp forwards the request [`http::request::Parts`]
//! into each MCP request's extensions, and the handler reads it from there.
//! Nothing is stored globally, so concurrent sessions never see each other's
//! pair.

use rmcp::{model::Extensions, service::RequestContext, RoleServer};
use rpcbridge_core::CredentialPair;

/// Where the resolved pair came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Bound to the session when it was opened (event-stream, stdio)
    Session,
    /// Attached to this request by the bearer middleware
    Request,
    /// The statically configured pair
    Static,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Session => "session",
            CredentialSource::Request => "request",
            CredentialSource::Static => "static",
        }
    }
}

/// Optional per-request override of the backend credential pair
#[derive(Debug, Clone, Default)]
pub struct CredentialContext {
    pair: Option<CredentialPair>,
}

impl CredentialContext {
    /// No override: callers fall back to the static pair
    pub fn unset() -> Self {
        Self::default()
    }

    pub fn with(pair: CredentialPair) -> Self {
        Self { pair: Some(pair) }
    }

    /// Read the pair the middleware attached to the originating HTTP request.
    ///
    /// Looks in the forwarded request parts first, then directly in the MCP
    /// extensions.
    pub fn from_extensions(extensions: &Extensions) -> Self {
        let pair = extensions
            .get::<http::request::Parts>()
            .and_then(|parts| parts.extensions.get::<CredentialPair>())
            .or_else(|| extensions.get::<CredentialPair>())
            .cloned();
        Self { pair }
    }

    pub fn from_request(context: &RequestContext<RoleServer>) -> Self {
        Self::from_extensions(&context.extensions)
    }

    pub fn is_set(&self) -> bool {
        self.pair.is_some()
    }

    pub fn pair(&self) -> Option<&CredentialPair> {
        self.pair.as_ref()
    }

    /// Resolve against the session binding and the static fallback.
    ///
    /// Precedence: session binding, then this context, then `fallback`.
    pub fn resolve(
        self,
        session: Option<&CredentialPair>,
        fallback: Option<&CredentialPair>,
    ) -> Option<(CredentialPair, CredentialSource)> {
        if let Some(bound) = session {
            return Some((bound.clone(), CredentialSource::Session));
        }
        if let Some(pair) = self.pair {
            return Some((pair, CredentialSource::Request));
        }
        fallback.map(|pair| (pair.clone(), CredentialSource::Static))
    }
}
