//! Span exporters for the configured backends.
//!
//! `console` prints spans with `opentelemetry-stdout`; `otlp-http` sends
//! OTLP protobuf over HTTP with `opentelemetry-otlp`, on a reqwest client
//! carrying the configured headers.

use std::collections::BTreeMap;
use std::time::Duration;

use opentelemetry_otlp::WithExportConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::TracingConfig;
use crate::error::{CoreResult, TraceError};

const TRACES_PATH: &str = "/v1/traces";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// `<endpoint>/v1/traces`, unless the endpoint already names that path.
pub fn traces_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with(TRACES_PATH) {
        base.to_string()
    } else {
        format!("{base}{TRACES_PATH}")
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> CoreResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (k, v) in headers {
        let name = HeaderName::from_bytes(k.as_bytes())
            .map_err(|e| TraceError::config(format!("invalid header name '{k}': {e}")))?;
        let value = HeaderValue::from_str(v)
            .map_err(|e| TraceError::config(format!("invalid value for header '{k}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// OTLP/HTTP exporter for `cfg`. Nothing is sent until the first export.
pub fn otlp_exporter(cfg: &TracingConfig) -> CoreResult<opentelemetry_otlp::SpanExporter> {
    let endpoint = cfg
        .endpoint
        .as_deref()
        .ok_or_else(|| TraceError::config("otlp-http exporter requires an endpoint"))?;
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(cfg.export_timeout())
        .default_headers(header_map(&cfg.headers)?)
        .build()
        .map_err(|e| TraceError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
    opentelemetry_otlp::new_exporter()
        .http()
        .with_http_client(client)
        .with_endpoint(traces_url(endpoint))
        .with_timeout(cfg.export_timeout())
        .build_span_exporter()
        .map_err(|e| TraceError::config(format!("otlp exporter: {e}")))
}

pub fn console_exporter() -> opentelemetry_stdout::SpanExporter {
    opentelemetry_stdout::SpanExporter::default()
}
