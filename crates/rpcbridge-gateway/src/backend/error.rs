//! Backend error taxonomy

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC error object returned by the backend
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Everything that can go wrong talking to the backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection failure, timeout, or body read error
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx reply without a JSON-RPC error body
    #[error("backend returned HTTP {0}")]
    Status(reqwest::StatusCode),

    /// The backend answered with a JSON-RPC error object
    #[error("backend error {}: {}", .0.code, .0.message)]
    Rpc(RpcErrorObject),

    /// Reply was not the JSON shape we expect
    #[error("malformed backend response: {0}")]
    InvalidResponse(String),

    /// Health check failed for this credential pair
    #[error("backend rejected the credentials")]
    Unhealthy,

    /// The caller went away before the backend answered
    #[error("backend call cancelled")]
    Cancelled,
}

impl BackendError {
    /// Whether retrying the same call later could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Transport(e) => e.is_timeout() || e.is_connect(),
            BackendError::Status(status) => status.is_server_error(),
            BackendError::Rpc(_) => true,
            BackendError::InvalidResponse(_) | BackendError::Unhealthy | BackendError::Cancelled => {
                false
            }
        }
    }
}
