//! Tracing façade for chat-completion calls.
//!
//! Nothing is exported until a provider is installed with [`init_tracing`]
//! (or on an explicit [`TracingRegistry`]). Until then [`get_tracer`] hands
//! out no-op tracers, so instrumented code never depends on tracing being
//! configured.

pub mod events;
pub mod exporter;
pub mod hooks;
pub mod keys;
pub mod provider;
pub mod registry;
pub mod span;
pub mod tracer;
#[cfg(test)]
pub mod test_span;

pub use events::{message_event_name, record_choice_event, record_message_event};
pub use hooks::{GenAiInstrumentation, InstrumentationHook, LogBridgeHook};
pub use keys::*;
pub use provider::{TracerProvider, TracerProviderBuilder, build_resource};
pub use registry::TracingRegistry;
pub use span::{ERROR_TYPE_CANCELLED, ERROR_TYPE_PANIC, Span, SpanGuard};
pub use tracer::Tracer;

pub use opentelemetry::trace::{SpanKind, Status};
pub use opentelemetry::{KeyValue, Value};

use std::time::Duration;

use once_cell::sync::Lazy;

use crate::config::TracingConfig;
use crate::error::CoreResult;

static GLOBAL: Lazy<TracingRegistry> = Lazy::new(TracingRegistry::new);

/// The process-wide registry behind the free functions.
pub fn global_registry() -> &'static TracingRegistry {
    &GLOBAL
}

/// Install the process-wide provider. Only the first successful call has
/// any effect; later calls return the installed provider unchanged.
pub fn init_tracing(service_name: &str, config: TracingConfig) -> CoreResult<TracerProvider> {
    GLOBAL.init(service_name, config)
}

/// Tracer from the process-wide provider, or a no-op tracer before init.
pub fn get_tracer(name: &str) -> Tracer {
    GLOBAL.tracer(name)
}

/// Flush and stop the process-wide provider, waiting at most `timeout`.
pub fn shutdown_tracing(timeout: Duration) -> CoreResult<()> {
    GLOBAL.shutdown(timeout)
}
