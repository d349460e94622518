use std::time::Duration;

use thiserror::Error;

/// Core error type for agtrace.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
#[derive(Debug, Error)]
pub enum TraceError {
    /// A required setting is missing or invalid. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Trace backend failure. The export pipeline reports these to the
    /// global error handler; they only reach callers through flush and
    /// shutdown.
    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    #[error("upstream error from {service}: {message}")]
    Upstream { service: String, message: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TraceError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Stable short name used for the `error.type` span attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Export(_) => "export",
            Self::Upstream { .. } => "upstream",
            Self::Timeout(_) => "timeout",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

/// Failure flushing or shutting down the export pipeline.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("trace sdk error: {0}")]
    Sdk(#[from] opentelemetry::trace::TraceError),

    #[error("export timed out after {0:?}")]
    Timeout(Duration),

    #[error("exporter io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("exporter is shut down")]
    Shutdown,
}

pub type CoreResult<T> = std::result::Result<T, TraceError>;
