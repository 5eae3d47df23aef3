//! OAuth 2.1 authorization subsystem
//!
//! - `store`: in-memory codes, access tokens and refresh tokens with TTLs
//! - `service`: password, authorization-code + PKCE and refresh grants
//! - `pkce`: S256 challenge verification
//! - `error`: RFC 6749 error bodies

mod error;
pub mod pkce;
mod service;
mod store;

pub use error::{OAuthError, TokenErrorResponse, INVALID_GRANT};
pub use pkce::{ChallengeMethod, PkceChallenge};
pub use service::{
    AuthorizeRequest, BackendCredentialValidator, CredentialValidator, IssuedTokens, OAuthService,
    TokenTtls,
};
pub use store::{
    generate_token, AccessTokenRecord, AuthorizationCodeRecord, RefreshTokenRecord, StoreCounts,
    TokenStore,
};
