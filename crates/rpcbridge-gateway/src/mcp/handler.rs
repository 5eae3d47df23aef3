//! RpcBridge MCP Handler
//!
//! Implements the MCP ServerHandler trait by forwarding each operation to the
//! backend through a session-owned [`BackendClient`].
//!
//! One `BridgeHandler` is one session. Its backend client is created on first
//! use (or eagerly through [`BridgeHandler::connect`]), validated with a health
//! check, and closed when the handler is dropped.

use rmcp::{
    model::*,
    service::RequestContext,
    ErrorData as McpError, RoleServer, ServerHandler,
};
use rpcbridge_core::{branding, BridgeConfig, ConfigError, CredentialPair};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::context::CredentialContext;
use super::operation::{Operation, OperationOutput};
use crate::backend::{BackendClient, BackendError, BackendSettings};

/// Why a session could not obtain a backend client
#[derive(Debug, Error)]
pub enum SessionError {
    /// Authorization is enabled and the request carried no credential pair
    #[error("no backend credentials for this session")]
    NoCredentials,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl SessionError {
    fn into_protocol(self, method: &str) -> McpError {
        match self {
            SessionError::NoCredentials => {
                McpError::invalid_request("no backend credentials for this session", None)
            }
            SessionError::Backend(e) => backend_error(method, &e),
        }
    }
}

/// Map a backend failure to a protocol error without exposing transport detail
fn backend_error(method: &str, error: &BackendError) -> McpError {
    let message = match error {
        BackendError::Rpc(rpc) => format!("{} failed (backend code {})", method, rpc.code),
        BackendError::Status(status) => format!("{} failed (backend HTTP {})", method, status.as_u16()),
        BackendError::Transport(_) => format!("{} failed: backend unreachable", method),
        BackendError::InvalidResponse(_) => format!("{} failed: malformed backend response", method),
        BackendError::Unhealthy => "backend rejected the session credentials".to_string(),
        BackendError::Cancelled => format!("{} cancelled", method),
    };
    McpError::internal_error(message, Some(json!({ "retryable": error.is_retryable() })))
}

struct GatewayInner {
    settings: BackendSettings,
    /// Pair used when neither the session nor the request supplies one.
    /// `None` when authorization is enabled.
    fallback: Option<CredentialPair>,
}

/// Shared state from which per-session handlers are created
#[derive(Clone)]
pub struct BridgeGateway {
    inner: Arc<GatewayInner>,
}

impl BridgeGateway {
    pub fn new(settings: BackendSettings, fallback: Option<CredentialPair>) -> Self {
        Self {
            inner: Arc::new(GatewayInner { settings, fallback }),
        }
    }

    /// Static pair is the fallback only while authorization is disabled
    pub fn from_config(config: &BridgeConfig) -> Result<Self, ConfigError> {
        let fallback = (!config.auth_enabled).then(|| config.static_credentials());
        Ok(Self::new(BackendSettings::from_config(config)?, fallback))
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.inner.settings
    }

    /// New session resolving its pair from each request
    pub fn session(&self) -> BridgeHandler {
        BridgeHandler::new(self.clone(), None)
    }

    /// New session bound to `credentials` for its whole life
    pub fn bound_session(&self, credentials: CredentialPair) -> BridgeHandler {
        BridgeHandler::new(self.clone(), Some(credentials))
    }
}

/// Per-session MCP handler
pub struct BridgeHandler {
    gateway: BridgeGateway,
    bound: Option<CredentialPair>,
    client: OnceCell<BackendClient>,
    session_id: String,
}

impl BridgeHandler {
    fn new(gateway: BridgeGateway, bound: Option<CredentialPair>) -> Self {
        let session_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            gateway,
            bound,
            client: OnceCell::new(),
            session_id,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Login of the connected backend client, if any
    pub fn login(&self) -> Option<&str> {
        self.client.get().map(BackendClient::login)
    }

    /// Pair of the connected backend client, if any
    pub fn credentials(&self) -> Option<&CredentialPair> {
        self.client.get().map(BackendClient::credentials)
    }

    /// Open the backend client now and run its health check.
    ///
    /// Transports call this before accepting a session so a rejected pair
    /// never gets as far as protocol traffic.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.open(CredentialContext::unset()).await.map(|_| ())
    }

    async fn open(&self, ctx: CredentialContext) -> Result<&BackendClient, SessionError> {
        self.client
            .get_or_try_init(|| async {
                let (credentials, source) = ctx
                    .resolve(self.bound.as_ref(), self.gateway.inner.fallback.as_ref())
                    .ok_or(SessionError::NoCredentials)?;
                let login = credentials.short_login().to_string();
                let client = BackendClient::new(self.gateway.settings(), credentials)?;

                if let Err(e) = client.check_health().await {
                    info!(
                        session = %self.session_id,
                        login = %login,
                        source = source.as_str(),
                        "[Session] Backend rejected credentials"
                    );
                    client.close();
                    return Err(e.into());
                }

                info!(
                    session = %self.session_id,
                    login = %login,
                    source = source.as_str(),
                    "[Session] Backend client ready"
                );
                Ok(client)
            })
            .await
    }

    /// Resolve the session client and run one operation, racing the request's
    /// cancellation token.
    async fn dispatch(
        &self,
        operation: Operation,
        context: &RequestContext<RoleServer>,
    ) -> Result<OperationOutput, McpError> {
        let method = operation.method();
        let ctx = CredentialContext::from_request(context);

        let work = async {
            let client = self.open(ctx).await?;
            operation.execute(client).await.map_err(SessionError::from)
        };

        let result = tokio::select! {
            _ = context.ct.cancelled() => Err(SessionError::Backend(BackendError::Cancelled)),
            result = work => result,
        };

        result.map_err(|e| {
            warn!(session = %self.session_id, method, "[Session] {}", e);
            e.into_protocol(method)
        })
    }
}

impl Drop for BridgeHandler {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            debug!(session = %self.session_id, "[Session] Closing backend client");
            client.close();
        }
    }
}

fn unexpected(output: OperationOutput) -> McpError {
    McpError::internal_error(format!("unexpected {} output", output.kind()), None)
}

impl ServerHandler for BridgeHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_prompts()
                .build(),
            server_info: Implementation {
                name: branding::SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(format!(
                "{} forwards tools, resources and prompts from its backend service.",
                branding::DISPLAY_NAME
            )),
        }
    }

    async fn initialize(
        &self,
        params: InitializeRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        debug!(
            session = %self.session_id,
            client = %params.client_info.name,
            protocol_version = %params.protocol_version,
            "Client initializing"
        );

        // Session start: a rejected pair fails the handshake
        self.open(CredentialContext::from_request(&context))
            .await
            .map_err(|e| e.into_protocol("initialize"))?;

        Ok(self.get_info())
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        match self.dispatch(Operation::ListTools, &context).await? {
            OperationOutput::Tools(tools) => {
                debug!(session = %self.session_id, count = tools.len(), "list_tools");
                Ok(ListToolsResult::with_all_items(tools))
            }
            other => Err(unexpected(other)),
        }
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        info!(session = %self.session_id, tool = %params.name, "call_tool");

        let operation = Operation::CallTool {
            name: params.name.to_string(),
            arguments: params.arguments,
        };
        match self.dispatch(operation, &context).await? {
            OperationOutput::ToolOutcome(outcome) => {
                let kinds: Vec<&str> = outcome.content.iter().map(|c| c.kind()).collect();
                debug!(
                    session = %self.session_id,
                    tool = %params.name,
                    is_error = outcome.is_error,
                    content = ?kinds,
                    "call_tool result"
                );

                let content: Vec<Content> = outcome
                    .content
                    .into_iter()
                    .map(|item| item.into_protocol())
                    .collect();
                if outcome.is_error {
                    Ok(CallToolResult::error(content))
                } else {
                    Ok(CallToolResult::success(content))
                }
            }
            other => Err(unexpected(other)),
        }
    }

    async fn list_resources(
        &self,
        _params: Option<PaginatedRequestParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        match self.dispatch(Operation::ListResources, &context).await? {
            OperationOutput::Resources(resources) => {
                debug!(session = %self.session_id, count = resources.len(), "list_resources");
                Ok(ListResourcesResult::with_all_items(resources))
            }
            other => Err(unexpected(other)),
        }
    }

    async fn read_resource(
        &self,
        params: ReadResourceRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let operation = Operation::ReadResource {
            uri: params.uri.to_string(),
        };
        let payloads = match self.dispatch(operation, &context).await? {
            OperationOutput::ResourceContents(payloads) => payloads,
            other => return Err(unexpected(other)),
        };

        debug!(
            session = %self.session_id,
            uri = %params.uri,
            parts = payloads.len(),
            bytes = payloads.iter().map(|p| p.len()).sum::<usize>(),
            "read_resource"
        );

        let contents = payloads
            .into_iter()
            .map(|payload| payload.into_protocol())
            .collect::<Result<Vec<ResourceContents>, _>>()
            .map_err(|e| McpError::internal_error(format!("Failed to encode resource: {}", e), None))?;

        Ok(ReadResourceResult { contents })
    }

    async fn list_prompts(
        &self,
        _params: Option<PaginatedRequestParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        match self.dispatch(Operation::ListPrompts, &context).await? {
            OperationOutput::Prompts(prompts) => {
                debug!(session = %self.session_id, count = prompts.len(), "list_prompts");
                Ok(ListPromptsResult::with_all_items(prompts))
            }
            other => Err(unexpected(other)),
        }
    }

    async fn get_prompt(
        &self,
        params: GetPromptRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        let operation = Operation::GetPrompt {
            name: params.name.to_string(),
            arguments: params.arguments,
        };
        match self.dispatch(operation, &context).await? {
            OperationOutput::Prompt(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }
}
