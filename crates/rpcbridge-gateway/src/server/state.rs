//! Shared state for the OAuth HTTP endpoints

use rpcbridge_core::BridgeConfig;
use std::sync::Arc;

use crate::oauth::OAuthService;

#[derive(Clone)]
pub struct AppState {
    /// Externally visible base URL, no trailing slash
    pub base_url: String,
    /// Mount path of the streamable protocol endpoint
    pub mcp_path: String,
    pub oauth: Arc<OAuthService>,
}

impl AppState {
    pub fn new(config: &BridgeConfig, oauth: Arc<OAuthService>) -> Self {
        Self {
            base_url: config.base_url(),
            mcp_path: config.mcp_path(),
            oauth,
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Root protected-resource metadata document
    pub fn resource_metadata_url(&self) -> String {
        self.endpoint("/.well-known/oauth-protected-resource")
    }
}
