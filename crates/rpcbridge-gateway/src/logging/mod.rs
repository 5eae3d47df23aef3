//! Logging Infrastructure
//!
//! Structured `tracing` output with per-request trace IDs. Everything goes to
//! stderr so stdout stays reserved for single-pipe protocol traffic.

mod trace_context;

pub use trace_context::{generate_trace_id, RequestSpan, ResolvedLogin, TraceContext};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directives when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "info,rpcbridge_gateway=debug,rpcbridge_core=debug,rmcp=warn,hyper=warn";

/// Install the global subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}
