//! MCP Server Implementation
//!
//! - `handler`: per-session ServerHandler forwarding to the backend
//! - `operation`: the six forwarded operations as a closed set
//! - `context`: per-request credential resolution
//! - `auth_middleware`: bearer validation in front of protocol routes

pub mod auth_middleware;
pub mod context;
pub mod handler;
pub mod operation;

pub use auth_middleware::{bearer_auth_middleware, BearerAuth};
pub use context::{CredentialContext, CredentialSource};
pub use handler::{BridgeGateway, BridgeHandler, SessionError};
pub use operation::{Operation, OperationOutput};
