//! Demo scenarios. Each one wraps chat-completion calls in spans and, when
//! bug injection is on, reproduces a known agent failure so it shows up in
//! the exported trace.

mod add_tracing;
mod hallucination;
mod prompt_injection;
mod slow_reasoning;
mod tool_timeout;
mod truncated;

use agtrace_core::inference::{InstrumentedClient, ScriptedClient};
use agtrace_core::model::{ChatMessage, CompletionRequest};
use agtrace_core::telemetry::{Span, Tracer};
use async_trait::async_trait;
use serde_json::Value;

pub struct ScenarioCtx {
    pub tracer: Tracer,
    pub model: String,
    /// Resolved model endpoint; `None` when running offline.
    pub endpoint: Option<String>,
    pub inject_bugs: bool,
}

impl ScenarioCtx {
    /// Instrumented client answering from `script`.
    pub fn client(&self, script: ScriptedClient) -> InstrumentedClient<ScriptedClient> {
        InstrumentedClient::new(script, self.tracer.clone())
    }

    /// Stamp a scenario's root span.
    pub fn tag(&self, span: &Span, scenario: &str) {
        span.set_attribute("scenario.name", scenario.to_string());
        span.set_attribute("bug.injection", self.inject_bugs);
        if let Some(endpoint) = &self.endpoint {
            span.set_attribute("server.address", endpoint.clone());
        }
    }

    pub fn request(&self, messages: Vec<ChatMessage>) -> CompletionRequest {
        CompletionRequest::new(self.model.clone(), messages)
    }
}

#[async_trait]
pub trait Scenario: Send + Sync {
    fn id(&self) -> &'static str;

    fn about(&self) -> &'static str;

    /// Run once and return the scenario's JSON result.
    async fn run(&self, ctx: &ScenarioCtx) -> anyhow::Result<Value>;
}

/// All scenarios, ordered by id.
pub fn catalog() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(add_tracing::AddTracing),
        Box::new(hallucination::SkipsRetrieval),
        Box::new(slow_reasoning::SlowMultiStep),
        Box::new(truncated::TruncatedResponses),
        Box::new(tool_timeout::ToolTimeoutSwallowed),
        Box::new(prompt_injection::PromptInjectionLeak),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use agtrace_core::config::{ExporterKind, TracingConfig};
    use agtrace_core::telemetry::{Status, TracerProvider, TracingRegistry, Value};
    use opentelemetry::trace::Event;
    use opentelemetry_sdk::export::trace::SpanData;
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;

    use super::ScenarioCtx;

    /// Isolated registry whose spans land in memory.
    pub struct Harness {
        pub registry: TracingRegistry,
        pub spans: InMemorySpanExporter,
    }

    impl Harness {
        pub fn new(content_recording: bool) -> Self {
            let spans = InMemorySpanExporter::default();
            let registry = TracingRegistry::new();
            let exporter = spans.clone();
            registry
                .init_with(move || {
                    TracerProvider::builder("scenario-test")
                        .config(TracingConfig {
                            exporter: ExporterKind::None,
                            batch: false,
                            content_recording_enabled: content_recording,
                            ..Default::default()
                        })
                        .exporter(exporter)
                })
                .unwrap();
            Self { registry, spans }
        }

        pub fn ctx(&self, scope: &str, inject_bugs: bool) -> ScenarioCtx {
            ScenarioCtx {
                tracer: self.registry.tracer(scope),
                model: "gpt-4o-mini".into(),
                endpoint: None,
                inject_bugs,
            }
        }

        pub fn finished(&self) -> Vec<SpanData> {
            self.registry
                .provider()
                .unwrap()
                .force_flush(Duration::from_secs(5))
                .unwrap();
            self.spans.get_finished_spans().unwrap()
        }

        pub fn span(&self, name: &str) -> SpanData {
            self.finished()
                .into_iter()
                .find(|s| s.name == name)
                .unwrap_or_else(|| panic!("no span named {name}"))
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            let _ = self.registry.shutdown(Duration::from_secs(5));
        }
    }

    /// Lookups on exported spans. Attributes read the last write per key.
    pub trait SpanDataExt {
        fn attribute(&self, key: &str) -> Option<&Value>;
        fn has_error(&self) -> bool;
        fn events_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Event> + 'a;
    }

    impl SpanDataExt for SpanData {
        fn attribute(&self, key: &str) -> Option<&Value> {
            self.attributes
                .iter()
                .rev()
                .find(|kv| kv.key.as_str() == key)
                .map(|kv| &kv.value)
        }

        fn has_error(&self) -> bool {
            matches!(self.status, Status::Error { .. })
        }

        fn events_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
            self.events.iter().filter(move |e| e.name == name)
        }
    }

    pub trait EventExt {
        fn attribute(&self, key: &str) -> Option<&Value>;
    }

    impl EventExt for Event {
        fn attribute(&self, key: &str) -> Option<&Value> {
            self.attributes
                .iter()
                .find(|kv| kv.key.as_str() == key)
                .map(|kv| &kv.value)
        }
    }
}
