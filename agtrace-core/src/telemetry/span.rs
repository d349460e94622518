//! Live span handles.
//!
//! A [`Span`] is a cheap, cloneable handle to one open span: an
//! `opentelemetry::Context` carrying the SDK span. Every mutation takes
//! `&self`, so the same span can be shared with nested closures and async
//! blocks. The span closes on [`Span::end`] or, failing that, when the last
//! handle is dropped.

use std::borrow::Cow;
use std::fmt::Display;

use opentelemetry::trace::{SpanContext, Status, TraceContextExt};
use opentelemetry::{Context, Key, KeyValue, Value};

use crate::telemetry::keys;

/// `error.type` for a span whose future was dropped before it finished.
pub const ERROR_TYPE_CANCELLED: &str = "cancelled";
/// `error.type` for a span closed while its thread was unwinding.
pub const ERROR_TYPE_PANIC: &str = "panic";

/// Handle to an open span. Handles from a no-op tracer accept every call
/// and record nothing.
#[derive(Debug, Clone, Default)]
pub struct Span {
    cx: Context,
}

impl Span {
    pub(crate) fn from_context(cx: Context) -> Self {
        Self { cx }
    }

    /// A span that records nothing.
    pub fn noop() -> Self {
        Self { cx: Context::new() }
    }

    /// Context with this span active; attach it to parent work to it.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn span_context(&self) -> SpanContext {
        self.cx.span().span_context().clone()
    }

    /// True while the span is open and backed by a provider.
    pub fn is_recording(&self) -> bool {
        self.cx.span().is_recording()
    }

    /// Set one attribute; a later write to the same key replaces it.
    pub fn set_attribute(&self, key: impl Into<Key>, value: impl Into<Value>) {
        self.cx.span().set_attribute(KeyValue::new(key, value));
    }

    /// Append an event. Events keep their insertion order.
    pub fn add_event(&self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        self.cx.span().add_event(name, attributes);
    }

    pub fn set_status(&self, status: Status) {
        self.cx.span().set_status(status);
    }

    /// Record `err` as the reason this span failed: error status, `error`,
    /// `error.type`, `error.message` and an `exception` event.
    pub fn record_error<E>(&self, err: &E)
    where
        E: std::error::Error + ?Sized,
    {
        self.record_error_parts(std::any::type_name::<E>(), &err.to_string());
    }

    pub fn record_error_parts(&self, error_type: &str, message: &str) {
        let span = self.cx.span();
        span.set_status(Status::error(message.to_string()));
        span.set_attribute(KeyValue::new(keys::KEY_ERROR, true));
        span.set_attribute(KeyValue::new(keys::KEY_ERROR_TYPE, error_type.to_string()));
        span.set_attribute(KeyValue::new(keys::KEY_ERROR_MESSAGE, message.to_string()));
        span.add_event(
            keys::EVENT_EXCEPTION,
            vec![
                KeyValue::new(keys::KEY_EXCEPTION_TYPE, error_type.to_string()),
                KeyValue::new(keys::KEY_EXCEPTION_MESSAGE, message.to_string()),
            ],
        );
    }

    /// Close the span and hand it to the export pipeline. Later calls are
    /// no-ops.
    pub fn end(&self) {
        self.cx.span().end();
    }
}

/// Ends its span on every exit path.
///
/// A guard dropped without [`SpanGuard::close`] or [`SpanGuard::finish`]
/// means the work never completed: the span is marked with `error.type`
/// `panic` while unwinding, otherwise `cancelled`.
#[derive(Debug)]
pub struct SpanGuard {
    span: Span,
    armed: bool,
}

impl SpanGuard {
    pub fn new(span: Span) -> Self {
        Self { span, armed: true }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Record an `Err` result on the span, then end it.
    pub fn close<T, E: Display>(mut self, result: &Result<T, E>) {
        if let Err(e) = result {
            self.span
                .record_error_parts(std::any::type_name::<E>(), &e.to_string());
        }
        self.armed = false;
        self.span.end();
    }

    /// End the span as it stands.
    pub fn finish(mut self) {
        self.armed = false;
        self.span.end();
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if std::thread::panicking() {
            self.span
                .record_error_parts(ERROR_TYPE_PANIC, "span closed while unwinding");
        } else {
            self.span
                .record_error_parts(ERROR_TYPE_CANCELLED, "span dropped before completion");
        }
        self.span.end();
    }
}
