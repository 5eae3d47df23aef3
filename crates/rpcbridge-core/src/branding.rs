//! Centralized branding constants
//!
//! All product naming and fixed path segments come from this module.

/// Human readable product name (authorize page title, WWW-Authenticate realm)
pub const DISPLAY_NAME: &str = "RpcBridge";

/// Implementation name advertised in the MCP `initialize` result
pub const SERVER_NAME: &str = "rpcbridge-gateway";

/// Default HTTP port of the gateway
pub const DEFAULT_GATEWAY_PORT: u16 = 3200;

/// The single client identifier handed out by dynamic registration
pub const REGISTERED_CLIENT_ID: &str = "rpcbridge-client";

/// Scope advertised in discovery documents
pub const DEFAULT_SCOPE: &str = "mcp";

/// Streamable HTTP sub-transport mount (relative to the service prefix)
pub const MCP_SEGMENT: &str = "/mcp";

/// Legacy event-stream sub-transport mount (relative to the service prefix)
pub const SSE_SEGMENT: &str = "/sse";

/// Where event-stream clients POST their messages (relative to the service prefix)
pub const MESSAGES_SEGMENT: &str = "/messages";

/// Backend health endpoint, joined onto the backend base URL
pub const BACKEND_HEALTH_PATH: &str = "health";

/// Backend JSON-RPC endpoint, joined onto the backend base URL
pub const BACKEND_RPC_PATH: &str = "rpc";
