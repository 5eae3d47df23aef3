//! OAuth error responses (RFC 6749 §5.2)

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Description shared by every single-use grant failure
pub const INVALID_GRANT: &str = "invalid or expired grant";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OAuthError {
    #[error("{0}")]
    InvalidRequest(String),

    /// Unknown, expired, already consumed, or mismatched grant
    #[error("{0}")]
    InvalidGrant(&'static str),

    /// The backend refused the submitted credential pair
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("unsupported grant type '{0}'")]
    UnsupportedGrantType(String),

    #[error("unsupported response type '{0}'")]
    UnsupportedResponseType(String),

    #[error("{0}")]
    ServerError(String),
}

impl OAuthError {
    pub fn invalid_grant() -> Self {
        OAuthError::InvalidGrant(INVALID_GRANT)
    }

    /// Machine-readable `error` value
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidCredentials => "access_denied",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::UnsupportedResponseType(_) => "unsupported_response_type",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// OAuth error response body
#[derive(Debug, Serialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let body = TokenErrorResponse {
            error: self.error_code().to_string(),
            error_description: Some(self.to_string()),
        };
        (
            self.status(),
            [("Cache-Control", "no-store")],
            Json(body),
        )
            .into_response()
    }
}
