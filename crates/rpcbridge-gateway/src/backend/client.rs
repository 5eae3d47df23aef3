//! Backend RPC client
//!
//! One instance per session, bound to one credential pair for its whole life.
//! Each protocol operation maps to exactly one `POST {base}/rpc` call.

use rmcp::model::{GetPromptResult, JsonObject, Prompt, Resource, Tool};
use rpcbridge_core::{branding, BridgeConfig, ConfigError, CredentialPair};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::content::{ContentItem, ResourcePayload};
use super::error::{BackendError, RpcErrorObject};

/// Where and how to reach the backend
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Base URL, always ending with `/`
    pub base_url: Url,
    pub timeout: Duration,
}

impl BackendSettings {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        Self { base_url, timeout }
    }

    pub fn from_config(config: &BridgeConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: config.backend_base()?,
            timeout: config.backend_timeout(),
        })
    }
}

/// Outcome of `tools/call`.
///
/// A backend JSON-RPC error is folded into a failed outcome rather than
/// returned as `Err`, so the session keeps running.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub content: Vec<ContentItem>,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(serde::Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// JSON-RPC client for the backend
pub struct BackendClient {
    http: reqwest::Client,
    health_url: Url,
    rpc_url: Url,
    credentials: CredentialPair,
    next_id: AtomicU64,
}

impl BackendClient {
    /// Build a client with its own connection pool
    pub fn new(settings: &BackendSettings, credentials: CredentialPair) -> Result<Self, BackendError> {
        let health_url = settings
            .base_url
            .join(branding::BACKEND_HEALTH_PATH)
            .map_err(|e| BackendError::InvalidResponse(format!("bad health URL: {}", e)))?;
        let rpc_url = settings
            .base_url
            .join(branding::BACKEND_RPC_PATH)
            .map_err(|e| BackendError::InvalidResponse(format!("bad rpc URL: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("rpcbridge-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            health_url,
            rpc_url,
            credentials,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn login(&self) -> &str {
        &self.credentials.login
    }

    pub fn credentials(&self) -> &CredentialPair {
        &self.credentials
    }

    /// Check the backend accepts this client's credential pair.
    ///
    /// Any non-2xx status or connection failure is reported as
    /// [`BackendError::Unhealthy`].
    pub async fn check_health(&self) -> Result<(), BackendError> {
        let response = self
            .http
            .get(self.health_url.clone())
            .basic_auth(&self.credentials.login, Some(self.credentials.secret()))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => {
                debug!(
                    login = %self.credentials.short_login(),
                    status = %resp.status(),
                    "Backend health check rejected"
                );
                Err(BackendError::Unhealthy)
            }
            Err(e) => {
                warn!(
                    login = %self.credentials.short_login(),
                    "Backend health check failed: {}", e
                );
                Err(BackendError::Unhealthy)
            }
        }
    }

    pub async fn health(&self) -> bool {
        self.check_health().await.is_ok()
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>, BackendError> {
        let result = self.call("tools/list", json!({})).await?;
        parse_catalog(result, "tools", |item| {
            if item.get("inputSchema").is_none() {
                item["inputSchema"] = json!({ "type": "object" });
            }
        })
    }

    /// Invoke a tool. Backend JSON-RPC errors come back as a failed outcome.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<ToolOutcome, BackendError> {
        let params = json!({
            "name": name,
            "arguments": arguments.unwrap_or_default(),
        });

        let result = match self.call("tools/call", params).await {
            Ok(result) => result,
            Err(BackendError::Rpc(error)) => {
                debug!(tool = %name, code = error.code, "Backend reported tool failure");
                return Ok(ToolOutcome::failed(error.message));
            }
            Err(e) => return Err(e),
        };

        let is_error = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let content = match result.get("content") {
            Some(Value::Array(items)) => items.iter().cloned().map(ContentItem::from_backend).collect(),
            Some(Value::String(text)) => vec![ContentItem::Text { text: text.clone() }],
            Some(other) => vec![ContentItem::from_backend(other.clone())],
            None => Vec::new(),
        };

        Ok(ToolOutcome { content, is_error })
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>, BackendError> {
        let result = self.call("resources/list", json!({})).await?;
        parse_catalog(result, "resources", |_| {})
    }

    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourcePayload>, BackendError> {
        let result = self.call("resources/read", json!({ "uri": uri })).await?;
        let contents = match result.get("contents") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(BackendError::InvalidResponse(
                    "resources/read result has no contents array".into(),
                ))
            }
        };
        contents.iter().map(ResourcePayload::from_backend).collect()
    }

    pub async fn list_prompts(&self) -> Result<Vec<Prompt>, BackendError> {
        let result = self.call("prompts/list", json!({})).await?;
        parse_catalog(result, "prompts", |_| {})
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<GetPromptResult, BackendError> {
        let params = json!({
            "name": name,
            "arguments": arguments.unwrap_or_default(),
        });
        let result = self.call("prompts/get", params).await?;
        decode(result)
    }

    /// Release the connection pool
    pub fn close(self) {
        debug!(login = %self.credentials.short_login(), "Backend client closed");
    }

    /// Issue one JSON-RPC call and return its `result`
    async fn call(&self, method: &str, params: Value) -> Result<Value, BackendError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!(method, id, "→ backend");

        let response = self
            .http
            .post(self.rpc_url.clone())
            .basic_auth(&self.credentials.login, Some(self.credentials.secret()))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        let parsed = serde_json::from_slice::<RpcResponse>(&body);
        match parsed {
            Ok(RpcResponse {
                error: Some(error), ..
            }) => {
                debug!(method, id, code = error.code, "← backend error");
                Err(BackendError::Rpc(error))
            }
            _ if !status.is_success() => Err(BackendError::Status(status)),
            Ok(RpcResponse {
                result: Some(result),
                ..
            }) => {
                debug!(method, id, "← backend ok");
                Ok(result)
            }
            Ok(_) => Err(BackendError::InvalidResponse(format!(
                "{} reply has neither result nor error",
                method
            ))),
            Err(e) => Err(BackendError::InvalidResponse(format!(
                "{} reply is not JSON-RPC: {}",
                method, e
            ))),
        }
    }
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("rpc_url", &self.rpc_url.as_str())
            .field("login", &self.credentials.login)
            .finish()
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, BackendError> {
    serde_json::from_value(value).map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

/// Extract a catalog list, accepting either `{key: [...]}` or a bare array.
///
/// Any other shape fails the fetch. Entries that still fail to parse after
/// `fixup` are skipped with a warning.
fn parse_catalog<T: DeserializeOwned>(
    result: Value,
    key: &str,
    fixup: impl Fn(&mut Value),
) -> Result<Vec<T>, BackendError> {
    let items = match result {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(BackendError::InvalidResponse(format!(
                    "catalog result has no '{}' array",
                    key
                )))
            }
        },
        _ => {
            return Err(BackendError::InvalidResponse(format!(
                "catalog result for '{}' is not a list",
                key
            )))
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|mut item| {
            fixup(&mut item);
            match serde_json::from_value::<T>(item) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(catalog = key, "Skipping malformed catalog entry: {}", e);
                    None
                }
            }
        })
        .collect())
}
