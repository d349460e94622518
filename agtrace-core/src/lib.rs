pub mod config;
pub mod error;
pub mod inference;
pub mod model;
pub mod normalizer;
pub mod telemetry;

pub use error::{CoreResult, ExportError, TraceError};
pub use telemetry::{get_tracer, init_tracing, shutdown_tracing};
