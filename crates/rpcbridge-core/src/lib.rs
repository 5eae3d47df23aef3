//! # RpcBridge Core Library
//!
//! Types shared by every RpcBridge component.
//!
//! ## Modules
//!
//! - `branding` - Product naming and fixed endpoint paths
//! - `config` - Gateway configuration and validation
//! - `credential` - Backend credential pair

pub mod branding;
pub mod config;
pub mod credential;

pub use config::{BridgeConfig, ConfigError, MAX_TTL_SECS};
pub use credential::CredentialPair;
