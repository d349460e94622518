use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::error::CoreResult;
use crate::telemetry::provider::TracerProvider;

/// Process-wide side effect performed once, when a provider is installed.
pub trait InstrumentationHook: Send + Sync {
    fn name(&self) -> &str;

    fn install(&self, provider: &TracerProvider) -> CoreResult<()>;
}

/// Turns on client spans in [`crate::inference::InstrumentedClient`].
#[derive(Debug, Default, Clone, Copy)]
pub struct GenAiInstrumentation;

impl InstrumentationHook for GenAiInstrumentation {
    fn name(&self) -> &str {
        "gen_ai.inference"
    }

    fn install(&self, provider: &TracerProvider) -> CoreResult<()> {
        provider.enable_genai_instrumentation();
        Ok(())
    }
}

/// Routes this crate's own diagnostics to stderr through a
/// `tracing-subscriber` fmt layer, and errors raised inside the
/// OpenTelemetry pipeline to `warn!`. `RUST_LOG` overrides the default
/// filter.
#[derive(Debug, Clone)]
pub struct LogBridgeHook {
    default_filter: String,
}

impl LogBridgeHook {
    pub fn new(default_filter: impl Into<String>) -> Self {
        Self {
            default_filter: default_filter.into(),
        }
    }
}

impl Default for LogBridgeHook {
    fn default() -> Self {
        Self::new("warn")
    }
}

impl InstrumentationHook for LogBridgeHook {
    fn name(&self) -> &str {
        "log.bridge"
    }

    fn install(&self, _provider: &TracerProvider) -> CoreResult<()> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.default_filter))
            .map_err(|e| crate::error::TraceError::config(format!("invalid log filter: {e}")))?;
        // another global subscriber wins; ours is then redundant
        if let Err(e) = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
        {
            debug!(error = %e, "log subscriber already installed");
        }
        if let Err(e) = opentelemetry::global::set_error_handler(|e| warn!(error = %e, "opentelemetry error")) {
            debug!(error = %e, "opentelemetry error handler not installed");
        }
        Ok(())
    }
}
