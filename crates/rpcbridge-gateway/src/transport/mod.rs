//! Transports feeding the MCP handler
//!
//! - `stdio`: single-pipe transport, one session per process
//! - `sse`: legacy event-stream sub-transport of the HTTP server
//!
//! The streamable HTTP sub-transport is rmcp's `StreamableHttpService`,
//! mounted in [`crate::server`].

pub mod sse;
pub mod stdio;

pub use sse::SseSessions;
pub use stdio::{serve_pipe, serve_stdio};
