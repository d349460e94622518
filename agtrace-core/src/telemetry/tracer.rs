use std::borrow::Cow;
use std::fmt::{self, Display};
use std::future::Future;

use opentelemetry::trace::{FutureExt, SpanContext, SpanKind, TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::Tracer as SdkTracer;

use crate::telemetry::provider::TracerProvider;
use crate::telemetry::span::{Span, SpanGuard};

/// Creates spans on behalf of one instrumentation scope.
///
/// A tracer without a provider is a no-op: its spans accept every call and
/// record nothing, so instrumented code runs unchanged when tracing is off.
#[derive(Clone)]
pub struct Tracer {
    name: String,
    inner: Option<(SdkTracer, TracerProvider)>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("name", &self.name)
            .field("provider", &self.inner.as_ref().map(|(_, p)| p))
            .finish()
    }
}

impl Tracer {
    pub(crate) fn new(name: String, sdk: SdkTracer, provider: TracerProvider) -> Self {
        Self {
            name,
            inner: Some((sdk, provider)),
        }
    }

    pub fn noop(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    pub fn provider(&self) -> Option<&TracerProvider> {
        self.inner.as_ref().map(|(_, p)| p)
    }

    /// Span currently active on this thread, if any.
    pub fn current_span_context(&self) -> Option<SpanContext> {
        let cx = Context::current();
        let sc = cx.span().span_context().clone();
        sc.is_valid().then_some(sc)
    }

    fn build(&self, name: Cow<'static, str>, parent: &Context, kind: SpanKind, attributes: Vec<KeyValue>) -> Span {
        let Some((sdk, provider)) = &self.inner else {
            return Span::noop();
        };
        if provider.is_shut_down() {
            return Span::noop();
        }
        let span = sdk
            .span_builder(name)
            .with_kind(kind)
            .with_attributes(attributes)
            .start_with_context(sdk, parent);
        Span::from_context(parent.with_span(span))
    }

    /// Detached span: child of the current span, not made current itself.
    pub fn start_span(&self, name: impl Into<Cow<'static, str>>) -> Span {
        self.start_span_with(name, SpanKind::Internal, Vec::new())
    }

    pub fn start_span_with(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
    ) -> Span {
        self.build(name.into(), &Context::current(), kind, attributes)
    }

    /// Detached span with an explicit parent. A no-op parent starts a new trace.
    pub fn start_child(&self, parent: &Span, name: impl Into<Cow<'static, str>>) -> Span {
        self.build(name.into(), parent.context(), SpanKind::Internal, Vec::new())
    }

    /// Run `f` inside a new span that is current for the closure's duration.
    ///
    /// `Err` results are recorded on the span and returned unchanged; a
    /// panic closes the span with error status.
    pub fn in_span<T, E, F>(&self, name: impl Into<Cow<'static, str>>, f: F) -> Result<T, E>
    where
        E: Display,
        F: FnOnce(&Span) -> Result<T, E>,
    {
        let guard = SpanGuard::new(self.start_span(name));
        let result = {
            let _attached = guard.span().context().clone().attach();
            f(guard.span())
        };
        guard.close(&result);
        result
    }

    /// Async counterpart of [`Tracer::in_span`]. The span is current on
    /// whichever thread polls the future. Dropping the future before it
    /// completes closes the span as cancelled.
    pub async fn in_span_async<T, E, F, Fut>(&self, name: impl Into<Cow<'static, str>>, f: F) -> Result<T, E>
    where
        E: Display,
        F: FnOnce(Span) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let span = self.start_span(name);
        let cx = span.context().clone();
        let guard = SpanGuard::new(span.clone());
        let result = f(span).with_context(cx).await;
        guard.close(&result);
        result
    }
}
