#![cfg(test)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use opentelemetry::Value;
use opentelemetry::trace::Status;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use tracing::{Event, Level, Subscriber};
use tracing_core::field::{Field, Visit};
use tracing_subscriber::registry;
use tracing_subscriber::{Layer, layer::Context};

/// One diagnostic emitted through the `tracing` macros.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub level: Level,
    pub message: String,
    pub fields: HashMap<String, String>,
}

#[derive(Default, Debug)]
pub struct LogStore {
    pub lines: Mutex<Vec<LogLine>>,
}

impl LogStore {
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.level == level)
            .map(|l| l.message.clone())
            .collect()
    }
}

#[derive(Clone)]
pub struct CaptureLayer {
    pub store: Arc<LogStore>,
}

struct MapVisitor<'a> {
    message: &'a mut String,
    map: &'a mut HashMap<String, String>,
}

impl Visit for MapVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn core::fmt::Debug) {
        if field.name() == "message" {
            *self.message = format!("{value:?}");
        } else {
            self.map.insert(field.name().to_string(), format!("{value:?}"));
        }
    }
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = value.to_string();
        } else {
            self.map.insert(field.name().to_string(), value.to_string());
        }
    }
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.map.insert(field.name().to_string(), value.to_string());
    }
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.map.insert(field.name().to_string(), value.to_string());
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        let mut fields = HashMap::new();
        event.record(&mut MapVisitor {
            message: &mut message,
            map: &mut fields,
        });
        self.store.lines.lock().unwrap().push(LogLine {
            level: *event.metadata().level(),
            message,
            fields,
        });
    }
}

/// Capture diagnostics emitted on the calling thread while the guard lives.
pub fn install_capture() -> (Arc<LogStore>, tracing::subscriber::DefaultGuard) {
    use tracing_subscriber::prelude::*;
    let store = Arc::new(LogStore::default());
    let layer = CaptureLayer { store: store.clone() };
    let subscriber = registry::Registry::default().with(layer);
    let guard = tracing::subscriber::set_default(subscriber);
    (store, guard)
}

pub fn finished(exporter: &InMemorySpanExporter) -> Vec<SpanData> {
    exporter.get_finished_spans().unwrap()
}

/// Most recently finished span called `name`.
pub fn span_named(exporter: &InMemorySpanExporter, name: &str) -> Option<SpanData> {
    finished(exporter).into_iter().rev().find(|s| s.name == name)
}

/// Last value written for `key`.
pub fn attr<'a>(span: &'a SpanData, key: &str) -> Option<&'a Value> {
    span.attributes
        .iter()
        .rev()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| &kv.value)
}

pub fn event_attr<'a>(event: &'a opentelemetry::trace::Event, key: &str) -> Option<&'a Value> {
    event
        .attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| &kv.value)
}

pub fn events_named<'a>(
    span: &'a SpanData,
    name: &'a str,
) -> impl Iterator<Item = &'a opentelemetry::trace::Event> + 'a {
    span.events.iter().filter(move |e| e.name == name)
}

pub fn has_error(span: &SpanData) -> bool {
    matches!(span.status, Status::Error { .. })
}
