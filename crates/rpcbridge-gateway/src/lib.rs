//! # RpcBridge Gateway
//!
//! MCP front end for a single JSON-RPC-over-HTTP backend.
//!
//! ## Modules
//!
//! - `backend` - Backend RPC client and content reshaping
//! - `mcp` - Per-session MCP handler, credential context, bearer middleware
//! - `oauth` - Token store, grant logic, PKCE
//! - `transport` - Single-pipe and legacy event-stream transports
//! - `server` - HTTP server, OAuth endpoints, logging and rate limiting
//! - `logging` - Trace context and subscriber setup

pub mod backend;
pub mod logging;
pub mod mcp;
pub mod oauth;
pub mod server;
pub mod transport;

pub use backend::{BackendClient, BackendError, BackendSettings};
pub use mcp::{BridgeGateway, BridgeHandler};
pub use oauth::{OAuthService, TokenStore};
pub use server::GatewayServer;
pub use transport::{serve_pipe, serve_stdio};
