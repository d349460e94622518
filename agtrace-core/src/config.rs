use std::collections::BTreeMap;
use std::{fs, path::Path, time::Duration};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, TraceError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExporterKind {
    /// Human-readable span dumps on stdout.
    #[default]
    Console,
    /// OTLP protobuf over HTTP to `endpoint`.
    OtlpHttp,
    /// Spans are created but never shipped anywhere.
    None,
}

impl std::str::FromStr for ExporterKind {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "otlp-http" | "otlp_http" | "otlp" => Ok(Self::OtlpHttp),
            "none" | "off" => Ok(Self::None),
            other => Err(TraceError::config(format!("unknown exporter '{other}'"))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ResourceCfg {
    #[serde(default = "default_service_version")]
    pub service_version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ResourceCfg {
    fn default() -> Self {
        Self {
            service_version: default_service_version(),
            environment: default_environment(),
        }
    }
}

fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_environment() -> String {
    "development".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    #[serde(default)]
    pub exporter: ExporterKind,
    /// Collector base URL; required for `otlp-http`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Extra HTTP headers sent with every OTLP request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub batch: bool,
    /// Spans waiting for export; once full, newly closed spans are dropped.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_scheduled_delay_ms")]
    pub scheduled_delay_ms: u64,
    #[serde(default = "default_export_timeout_ms")]
    pub export_timeout_ms: u64,
    #[serde(default)]
    pub content_recording_enabled: bool,
    #[serde(default)]
    pub resource: ResourceCfg,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            exporter: ExporterKind::default(),
            endpoint: None,
            headers: BTreeMap::new(),
            batch: true,
            max_queue_size: default_max_queue_size(),
            max_batch_size: default_max_batch_size(),
            scheduled_delay_ms: default_scheduled_delay_ms(),
            export_timeout_ms: default_export_timeout_ms(),
            content_recording_enabled: false,
            resource: ResourceCfg::default(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_queue_size() -> usize {
    2_048
}
fn default_max_batch_size() -> usize {
    512
}
fn default_scheduled_delay_ms() -> u64 {
    5_000
}
fn default_export_timeout_ms() -> u64 {
    30_000
}

impl TracingConfig {
    /// Reject settings the export pipeline cannot honor.
    pub fn validate(&self) -> CoreResult<()> {
        if self.exporter == ExporterKind::OtlpHttp {
            let endpoint = self
                .endpoint
                .as_deref()
                .filter(|e| !e.trim().is_empty())
                .ok_or_else(|| TraceError::config("otlp-http exporter requires an endpoint"))?;
            let parsed = url::Url::parse(endpoint)
                .map_err(|e| TraceError::config(format!("invalid endpoint '{endpoint}': {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(TraceError::config(format!(
                    "endpoint '{endpoint}' must use http or https"
                )));
            }
        }
        if self.max_queue_size == 0 {
            return Err(TraceError::config("max_queue_size must be at least 1"));
        }
        if self.max_batch_size == 0 {
            return Err(TraceError::config("max_batch_size must be at least 1"));
        }
        if self.export_timeout_ms == 0 {
            return Err(TraceError::config("export_timeout_ms must be at least 1"));
        }
        if self.max_batch_size > self.max_queue_size {
            return Err(TraceError::config(format!(
                "max_batch_size ({}) exceeds max_queue_size ({})",
                self.max_batch_size, self.max_queue_size
            )));
        }
        Ok(())
    }

    pub fn scheduled_delay(&self) -> Duration {
        Duration::from_millis(self.scheduled_delay_ms)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_millis(self.export_timeout_ms)
    }

    /// Overlay settings from the process environment.
    pub fn overlay_env(self) -> CoreResult<Self> {
        self.overlay_lookup(|k| std::env::var(k).ok())
    }

    /// Overlay settings from an arbitrary key lookup. Unset keys keep the
    /// current value; set but unparsable keys are configuration errors.
    pub fn overlay_lookup<F>(mut self, lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_EXPORTER) {
            self.exporter = v.parse()?;
        }
        if let Some(v) = lookup(ENV_OTLP_ENDPOINT) {
            self.endpoint = Some(v);
        }
        if let Some(v) = lookup(ENV_OTLP_HEADERS) {
            self.headers.extend(parse_headers(&v)?);
        }
        if let Some(v) = lookup(ENV_BATCH) {
            self.batch = parse_bool(ENV_BATCH, &v)?;
        }
        if let Some(v) = lookup(ENV_SERVICE_VERSION) {
            self.resource.service_version = v;
        }
        if let Some(v) = lookup(ENV_ENVIRONMENT) {
            self.resource.environment = v;
        }
        if let Some(v) = lookup(ENV_CONTENT_RECORDING) {
            self.content_recording_enabled = parse_bool(ENV_CONTENT_RECORDING, &v)?;
        }
        Ok(self)
    }
}

pub const ENV_EXPORTER: &str = "AGTRACE_EXPORTER";
pub const ENV_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const ENV_OTLP_HEADERS: &str = "OTEL_EXPORTER_OTLP_HEADERS";
pub const ENV_BATCH: &str = "AGTRACE_BATCH";
pub const ENV_SERVICE_VERSION: &str = "OTEL_SERVICE_VERSION";
pub const ENV_ENVIRONMENT: &str = "DEPLOYMENT_ENVIRONMENT";
pub const ENV_CONTENT_RECORDING: &str = "AZURE_TRACING_GEN_AI_CONTENT_RECORDING_ENABLED";

fn parse_bool(key: &str, v: &str) -> CoreResult<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(TraceError::config(format!("{key}: expected a boolean, got '{other}'"))),
    }
}

/// Parse `k=v,k2=v2` header lists (OTLP env var format).
fn parse_headers(v: &str) -> CoreResult<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for pair in v.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (k, val) = pair.split_once('=').ok_or_else(|| {
            TraceError::config(format!("{ENV_OTLP_HEADERS}: malformed entry '{pair}'"))
        })?;
        out.insert(k.trim().to_string(), val.trim().to_string());
    }
    Ok(out)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ModelCfg {
    /// Model identifier sent with every completion request.
    pub name: String,
    /// Name of the environment variable that contains the service endpoint.
    #[serde(default = "default_endpoint_env")]
    pub endpoint_env: String,
    /// Name of the environment variable that contains the API credential.
    #[serde(default = "default_credential_env")]
    pub credential_env: String,
}

impl Default for ModelCfg {
    fn default() -> Self {
        Self {
            name: "gpt-4o-mini".to_string(),
            endpoint_env: default_endpoint_env(),
            credential_env: default_credential_env(),
        }
    }
}

fn default_endpoint_env() -> String {
    "AZURE_AI_CHAT_ENDPOINT".to_string()
}
fn default_credential_env() -> String {
    "AZURE_AI_CHAT_KEY".to_string()
}

pub const ENV_MODEL_NAME: &str = "MODEL_NAME";

/// Endpoint and credential resolved from the environment.
#[derive(Debug)]
pub struct ModelAccess {
    pub model: String,
    pub endpoint: String,
    pub credential: SecretString,
}

impl ModelCfg {
    pub fn resolve(&self) -> CoreResult<ModelAccess> {
        self.resolve_with(|k| std::env::var(k).ok())
    }

    /// Missing variables are startup errors, not recoverable conditions.
    /// A non-empty `MODEL_NAME` replaces the configured model name.
    pub fn resolve_with<F>(&self, lookup: F) -> CoreResult<ModelAccess>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup(&self.endpoint_env)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| TraceError::config(format!("{} is not set", self.endpoint_env)))?;
        let credential = lookup(&self.credential_env)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| TraceError::config(format!("{} is not set", self.credential_env)))?;
        let model = lookup(ENV_MODEL_NAME)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.name.clone());
        Ok(ModelAccess {
            model,
            endpoint,
            credential: SecretString::from(credential),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RunnerCfg {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub inject_bugs: bool,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            inject_bugs: true,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

impl RunnerCfg {
    pub fn validate(&self) -> CoreResult<()> {
        if self.timeout_secs == 0 {
            return Err(TraceError::config("runner.timeout_secs must be at least 1"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Settings {
    #[serde(default)]
    pub tracing: TracingConfig,
    #[serde(default)]
    pub model: ModelCfg,
    #[serde(default)]
    pub runner: RunnerCfg,
}

impl Settings {
    /// Load Settings from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(TraceError::from)?;
        let s = std::str::from_utf8(&bytes).map_err(|e| TraceError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                serde_json::from_str::<Self>(s).map_err(|e| TraceError::Other(e.into()))?
            }
            Some("toml") => toml::from_str::<Self>(s).map_err(|e| TraceError::Other(e.into()))?,
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| TraceError::Other(e.into()))
                .or_else(|_| toml::from_str::<Self>(s).map_err(|e| TraceError::Other(e.into())))?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.tracing.validate()?;
        self.runner.validate()
    }
}
