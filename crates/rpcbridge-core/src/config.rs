//! Gateway configuration
//!
//! All settings are simple scalars. Loading them (file, environment, CLI) is
//! the embedding binary's business; this module only holds and validates them.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;
use url::Url;

use crate::branding;
use crate::credential::CredentialPair;

/// Upper bound for any token or code lifetime (ten years)
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid backend URL '{0}'")]
    InvalidBackendUrl(String),
    #[error("invalid public URL '{0}'")]
    InvalidPublicUrl(String),
    #[error("invalid bind host '{0}'")]
    InvalidHost(String),
    #[error("port must be non-zero")]
    ZeroPort,
    #[error("service path '{0}' must start with '/' and must not end with '/'")]
    InvalidServicePath(String),
    #[error("{0} TTL must be greater than zero")]
    ZeroTtl(&'static str),
    #[error("{0} TTL must not exceed ten years")]
    TtlTooLong(&'static str),
    #[error("sweep interval must be greater than zero")]
    ZeroSweepInterval,
    #[error("a backend login is required when authorization is disabled")]
    MissingCredentials,
}

/// RpcBridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Backend base URL (`/health` and `/rpc` are joined onto it)
    pub backend_url: String,
    /// Static backend login
    pub login: String,
    /// Static backend secret
    #[serde(skip_serializing)]
    pub secret: String,
    /// Prefix prepended to every protocol mount path (empty or `/something`)
    pub service_path: String,
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Enable the OAuth2 authorization subsystem
    pub auth_enabled: bool,
    /// Externally visible base URL (discovery documents, redirects)
    pub public_url: Option<String>,
    pub code_ttl_secs: u64,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    /// Period of the expired-token sweep
    pub sweep_interval_secs: u64,
    /// Timeout of a single backend HTTP request
    pub backend_timeout_secs: u64,
    /// Accept `base64(login:secret)` bearer values besides issued tokens
    pub allow_direct_bearer: bool,
    /// Enable CORS for browser access
    pub enable_cors: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8000".to_string(),
            login: String::new(),
            secret: String::new(),
            service_path: String::new(),
            host: "127.0.0.1".to_string(),
            port: branding::DEFAULT_GATEWAY_PORT,
            auth_enabled: false,
            public_url: None,
            code_ttl_secs: 300,
            access_ttl_secs: 3600,
            refresh_ttl_secs: 86400,
            sweep_interval_secs: 60,
            backend_timeout_secs: 30,
            allow_direct_bearer: true,
            enable_cors: true,
        }
    }
}

impl BridgeConfig {
    /// Check every setting, returning the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend_base()?;

        if let Some(public) = &self.public_url {
            let parsed =
                Url::parse(public).map_err(|_| ConfigError::InvalidPublicUrl(public.clone()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidPublicUrl(public.clone()));
            }
        }

        self.host
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidHost(self.host.clone()))?;

        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }

        if !self.service_path.is_empty()
            && (!self.service_path.starts_with('/') || self.service_path.ends_with('/'))
        {
            return Err(ConfigError::InvalidServicePath(self.service_path.clone()));
        }

        for (name, ttl) in [
            ("authorization code", self.code_ttl_secs),
            ("access token", self.access_ttl_secs),
            ("refresh token", self.refresh_ttl_secs),
        ] {
            if ttl == 0 {
                return Err(ConfigError::ZeroTtl(name));
            }
            if ttl > MAX_TTL_SECS {
                return Err(ConfigError::TtlTooLong(name));
            }
        }

        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::ZeroSweepInterval);
        }

        if !self.auth_enabled && self.login.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        Ok(())
    }

    /// Parsed backend base URL, normalized to end with `/` so that joins
    /// keep any path prefix the backend is mounted under.
    pub fn backend_base(&self) -> Result<Url, ConfigError> {
        let mut raw = self.backend_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).map_err(|_| ConfigError::InvalidBackendUrl(self.backend_url.clone()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBackendUrl(self.backend_url.clone()));
        }
        Ok(url)
    }

    /// The statically configured credential pair
    pub fn static_credentials(&self) -> CredentialPair {
        CredentialPair::new(self.login.clone(), self.secret.clone())
    }

    /// Socket address to bind.
    ///
    /// Falls back to loopback when `host` is not an IP address; `validate()`
    /// reports that case as an error.
    pub fn socket_addr(&self) -> SocketAddr {
        let ip = self
            .host
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::from([127, 0, 0, 1]));
        SocketAddr::new(ip, self.port)
    }

    /// Externally visible base URL, without a trailing slash
    pub fn base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    pub fn mcp_path(&self) -> String {
        format!("{}{}", self.service_path, branding::MCP_SEGMENT)
    }

    pub fn sse_path(&self) -> String {
        format!("{}{}", self.service_path, branding::SSE_SEGMENT)
    }

    pub fn messages_path(&self) -> String {
        format!("{}{}", self.service_path, branding::MESSAGES_SEGMENT)
    }

    pub fn code_ttl(&self) -> chrono::Duration {
        secs(self.code_ttl_secs)
    }

    pub fn access_ttl(&self) -> chrono::Duration {
        secs(self.access_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        secs(self.refresh_ttl_secs)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn backend_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.backend_timeout_secs)
    }
}

fn secs(value: u64) -> chrono::Duration {
    // Clamped so unvalidated configs still yield a representable duration
    chrono::Duration::seconds(value.min(MAX_TTL_SECS) as i64)
}
