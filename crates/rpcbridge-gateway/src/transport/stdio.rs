//! Single-pipe transport
//!
//! One process is one session over one byte stream. Credentials are always
//! the statically configured pair and the authorization subsystem is never
//! involved. Diagnostics go to stderr via [`crate::logging`].

use anyhow::{Context, Result};
use rmcp::ServiceExt;
use rpcbridge_core::{BridgeConfig, CredentialPair};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::mcp::BridgeGateway;

/// Serve one session over an arbitrary reader/writer pair.
///
/// The backend health check runs before the first byte is read; a rejected
/// pair is returned as an error and nothing is served.
pub async fn serve_pipe<R, W>(
    gateway: &BridgeGateway,
    credentials: CredentialPair,
    reader: R,
    writer: W,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let handler = gateway.bound_session(credentials);
    handler
        .connect()
        .await
        .context("backend rejected the configured credentials")?;

    let session_id = handler.session_id().to_string();
    info!(session = %session_id, "[Stdio] Session started");

    let service = handler
        .serve_with_ct((reader, writer), shutdown)
        .await
        .context("MCP handshake failed")?;

    let reason = service.waiting().await.context("session task failed")?;
    info!(session = %session_id, reason = ?reason, "[Stdio] Session ended");
    Ok(())
}

/// Serve the process's stdin/stdout until the client disconnects
pub async fn serve_stdio(config: &BridgeConfig) -> Result<()> {
    config.validate().context("invalid configuration")?;

    // The single pipe always uses the static pair, even with authorization on
    let gateway = BridgeGateway::new(
        crate::backend::BackendSettings::from_config(config)?,
        Some(config.static_credentials()),
    );

    serve_pipe(
        &gateway,
        config.static_credentials(),
        tokio::io::stdin(),
        tokio::io::stdout(),
        CancellationToken::new(),
    )
    .await
}
