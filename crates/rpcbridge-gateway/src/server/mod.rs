//! Gateway Server
//!
//! HTTP front end exposing MCP over two sub-transports (streamable HTTP and
//! the legacy event stream) plus, when authorization is enabled, the OAuth
//! discovery, registration, authorize and token endpoints.

mod handlers;
pub mod logging_middleware;
pub mod rate_limit;
mod state;

pub use handlers::{
    AuthorizeParams, HealthResponse, OAuthServerMetadata, ProtectedResourceMetadata,
    RegistrationRequest, RegistrationResponse, TokenRequest, TokenResponseBody,
};
pub use state::AppState;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use rpcbridge_core::{BridgeConfig, ConfigError};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::backend::BackendSettings;
use crate::mcp::{bearer_auth_middleware, BearerAuth, BridgeGateway};
use crate::oauth::{BackendCredentialValidator, OAuthService, TokenStore, TokenTtls};
use crate::transport::SseSessions;
use logging_middleware::HttpLogging;

/// RpcBridge HTTP server
///
/// Owns the token store, the shared gateway and the shutdown token. Cancelling
/// the token stops the listener, the sweep task and every open session.
pub struct GatewayServer {
    config: BridgeConfig,
    gateway: BridgeGateway,
    store: Arc<TokenStore>,
    oauth: Arc<OAuthService>,
    sse: Arc<SseSessions>,
    shutdown: CancellationToken,
}

impl GatewayServer {
    pub fn new(config: BridgeConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let settings = BackendSettings::from_config(&config)?;
        let gateway = BridgeGateway::from_config(&config)?;
        let store = Arc::new(TokenStore::new());
        let oauth = Arc::new(OAuthService::new(
            store.clone(),
            Arc::new(BackendCredentialValidator::new(settings)),
            TokenTtls::from_config(&config),
        ));
        let shutdown = CancellationToken::new();
        let sse = SseSessions::new(gateway.clone(), config.messages_path(), shutdown.child_token());

        info!("[Gateway] Initialized (authorization: {})", config.auth_enabled);

        Ok(Self {
            config,
            gateway,
            store,
            oauth,
            sse,
            shutdown,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn token_store(&self) -> Arc<TokenStore> {
        self.store.clone()
    }

    pub fn oauth_service(&self) -> Arc<OAuthService> {
        self.oauth.clone()
    }

    /// Cancel to stop the server gracefully
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        let config = &self.config;
        let app_state = AppState::new(config, self.oauth.clone());

        // Stateless mode: every POST gets a fresh handler, i.e. its own
        // backend client bound to that request's credential pair
        let gateway = self.gateway.clone();
        let mcp_service = StreamableHttpService::new(
            move || {
                debug!("[Gateway] Creating handler instance for MCP request");
                Ok(gateway.session())
            },
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig {
                stateful_mode: false,
                sse_keep_alive: Some(Duration::from_secs(15)),
                sse_retry: Some(Duration::from_secs(3)),
                cancellation_token: self.shutdown.child_token(),
            },
        );

        let mut protocol_routes = Router::new()
            .nest_service(&config.mcp_path(), mcp_service)
            .merge(self.sse.router(&config.sse_path()));

        let mut router = Router::new().route("/health", get(handlers::health));

        if config.auth_enabled {
            let bearer = BearerAuth::new(
                self.oauth.clone(),
                config.allow_direct_bearer,
                app_state.resource_metadata_url(),
            );
            protocol_routes = protocol_routes
                .route_layer(middleware::from_fn_with_state(bearer, bearer_auth_middleware));

            let oauth_routes = Router::new()
                .route(
                    "/.well-known/oauth-authorization-server",
                    get(handlers::oauth_metadata),
                )
                .route(
                    "/.well-known/oauth-protected-resource",
                    get(handlers::resource_metadata),
                )
                // RFC 9728: Resource-specific metadata endpoint
                .route(
                    &format!("/.well-known/oauth-protected-resource{}", config.mcp_path()),
                    get(handlers::resource_metadata),
                )
                .route("/register", post(handlers::oauth_register))
                .route(
                    "/authorize",
                    get(handlers::oauth_authorize).post(handlers::oauth_authorize_submit),
                )
                .route("/token", post(handlers::oauth_token))
                .with_state(app_state);

            router = router.merge(oauth_routes);
        }

        let logging = HttpLogging::new(vec![config.mcp_path(), config.messages_path()]);

        let mut router = router
            .merge(protocol_routes)
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn_with_state(
                logging,
                logging_middleware::http_logging_middleware,
            ))
            .layer(middleware::from_fn(rate_limit::rate_limit_middleware))
            // Outside the rate limiter so it can read the limiter
            .layer(axum::Extension(rate_limit::default_oauth_rate_limiter()));

        if config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any);
            router = router.layer(cors);
        }

        router
    }

    /// Serve on an already bound listener until the shutdown token fires
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        info!("[Gateway] Listening on {}", addr);
        info!(
            "[Gateway] Protocol mounts: streamable {} | event-stream {} (messages {})",
            self.config.mcp_path(),
            self.config.sse_path(),
            self.config.messages_path()
        );

        let sweeper = self.config.auth_enabled.then(|| {
            self.store
                .spawn_sweeper(self.config.sweep_interval(), self.shutdown.child_token())
        });

        let router = self.router();
        let shutdown = self.shutdown.clone();
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled_owned().await })
            .await;

        self.shutdown.cancel();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }
        info!("[Gateway] Stopped");

        result.map_err(Into::into)
    }

    /// Bind the configured address and serve
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.socket_addr()).await?;
        self.serve(listener).await
    }

    /// Start the server in the background
    pub fn spawn(self) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
