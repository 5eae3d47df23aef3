//! Backend RPC Client
//!
//! Translates MCP primitives into the backend's JSON-RPC-over-HTTP dialect:
//! - `client`: one JSON-RPC call per protocol operation, HTTP Basic auth
//! - `content`: text/blob/image reshaping in both directions
//! - `error`: backend failure taxonomy

mod client;
mod content;
mod error;

pub use client::{BackendClient, BackendSettings, ToolOutcome};
pub use content::{ContentItem, ResourceBody, ResourcePayload};
pub use error::{BackendError, RpcErrorObject};
