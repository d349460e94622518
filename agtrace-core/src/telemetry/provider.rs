use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{Key, KeyValue};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::export::trace::SpanExporter;
use opentelemetry_sdk::runtime::TokioCurrentThread;
use opentelemetry_sdk::trace::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, Builder as SdkBuilder, Config,
    TracerProvider as SdkTracerProvider,
};
use tracing::{debug, info};

use crate::config::{ExporterKind, ResourceCfg, TracingConfig};
use crate::error::{CoreResult, ExportError};
use crate::telemetry::exporter;
use crate::telemetry::keys;
use crate::telemetry::tracer::Tracer;

const SDK_NAME: &str = "agtrace";
const SDK_LANGUAGE: &str = "rust";

/// Resource attributes attached to every exported span.
pub fn build_resource(service_name: &str, cfg: &ResourceCfg) -> Resource {
    Resource::new(vec![
        KeyValue::new(keys::KEY_SERVICE_NAME, service_name.to_string()),
        KeyValue::new(keys::KEY_SERVICE_VERSION, cfg.service_version.clone()),
        KeyValue::new(keys::KEY_DEPLOYMENT_ENVIRONMENT, cfg.environment.clone()),
        KeyValue::new(keys::KEY_TELEMETRY_SDK_NAME, SDK_NAME),
        KeyValue::new(keys::KEY_TELEMETRY_SDK_LANGUAGE, SDK_LANGUAGE),
    ])
}

fn batch_config(cfg: &TracingConfig) -> BatchConfig {
    BatchConfigBuilder::default()
        .with_max_queue_size(cfg.max_queue_size)
        .with_max_export_batch_size(cfg.max_batch_size)
        .with_scheduled_delay(cfg.scheduled_delay())
        .with_max_export_timeout(cfg.export_timeout())
        .build()
}

/// Route `exporter` through a batch processor on its own runtime thread, or
/// export each span as it closes when batching is off.
fn attach<E>(builder: SdkBuilder, exporter: E, cfg: &TracingConfig) -> SdkBuilder
where
    E: SpanExporter + 'static,
{
    if cfg.batch {
        let processor = BatchSpanProcessor::builder(exporter, TokioCurrentThread)
            .with_batch_config(batch_config(cfg))
            .build();
        builder.with_span_processor(processor)
    } else {
        builder.with_simple_exporter(exporter)
    }
}

/// Run a blocking SDK call on a helper thread and give up after `timeout`.
fn bounded<T, F>(timeout: Duration, f: F) -> Result<T, ExportError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::Builder::new()
        .name("agtrace-flush".into())
        .spawn(move || {
            // receiver gone means the caller already timed out
            let _ = tx.send(f());
        })?;
    rx.recv_timeout(timeout).map_err(|_| ExportError::Timeout(timeout))
}

struct ProviderInner {
    sdk: SdkTracerProvider,
    resource: Resource,
    content_recording: bool,
    genai_instrumentation: AtomicBool,
    shut_down: AtomicBool,
}

/// Owns the export pipeline and the resource. Cloning yields another handle
/// to the same provider.
#[derive(Clone)]
pub struct TracerProvider {
    inner: Arc<ProviderInner>,
}

impl fmt::Debug for TracerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerProvider")
            .field("service", &self.service_name())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl TracerProvider {
    pub fn builder(service_name: impl Into<String>) -> TracerProviderBuilder {
        TracerProviderBuilder {
            service_name: service_name.into(),
            config: TracingConfig::default(),
            exporter: None,
        }
    }

    pub fn tracer(&self, name: impl Into<String>) -> Tracer {
        let name = name.into();
        let sdk = self.inner.sdk.tracer(Cow::Owned(name.clone()));
        Tracer::new(name, sdk, self.clone())
    }

    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    pub fn service_name(&self) -> String {
        self.inner
            .resource
            .get(Key::from_static_str(keys::KEY_SERVICE_NAME))
            .map(|v| v.to_string())
            .unwrap_or_default()
    }

    /// Whether message and choice bodies may be attached to spans.
    pub fn content_recording_enabled(&self) -> bool {
        self.inner.content_recording
    }

    pub fn genai_instrumentation_enabled(&self) -> bool {
        self.inner.genai_instrumentation.load(Ordering::Acquire)
    }

    pub(crate) fn enable_genai_instrumentation(&self) {
        self.inner.genai_instrumentation.store(true, Ordering::Release);
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Export every finished span, waiting at most `timeout`.
    pub fn force_flush(&self, timeout: Duration) -> CoreResult<()> {
        if self.is_shut_down() {
            return Err(ExportError::Shutdown.into());
        }
        let sdk = self.inner.sdk.clone();
        let results = bounded(timeout, move || sdk.force_flush())?;
        for result in results {
            result.map_err(ExportError::from)?;
        }
        Ok(())
    }

    /// Flush and stop exporting. Spans started afterwards record nothing.
    /// Only the first call does any work.
    pub fn shutdown(&self, timeout: Duration) -> CoreResult<()> {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let sdk = self.inner.sdk.clone();
        let result: CoreResult<()> = bounded(timeout, move || sdk.shutdown())
            .and_then(|r| r.map_err(ExportError::from))
            .map_err(Into::into);
        info!(service = %self.service_name(), ok = result.is_ok(), "tracer provider shut down");
        result
    }

    pub fn ptr_eq(&self, other: &TracerProvider) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

type AttachFn = Box<dyn FnOnce(SdkBuilder, &TracingConfig) -> SdkBuilder>;

pub struct TracerProviderBuilder {
    service_name: String,
    config: TracingConfig,
    exporter: Option<AttachFn>,
}

impl TracerProviderBuilder {
    pub fn config(mut self, config: TracingConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `exporter` instead of the one `config.exporter` names.
    pub fn exporter<E>(mut self, exporter: E) -> Self
    where
        E: SpanExporter + 'static,
    {
        self.exporter = Some(Box::new(move |builder: SdkBuilder, cfg: &TracingConfig| {
            attach(builder, exporter, cfg)
        }));
        self
    }

    pub fn build(self) -> CoreResult<TracerProvider> {
        let resource = build_resource(&self.service_name, &self.config.resource);
        let sdk_config = Config::default().with_resource(resource.clone());
        let builder = SdkTracerProvider::builder().with_config(sdk_config);
        let builder = match self.exporter {
            Some(attach_injected) => {
                // an injected exporter makes the endpoint irrelevant
                TracingConfig {
                    exporter: ExporterKind::None,
                    ..self.config.clone()
                }
                .validate()?;
                attach_injected(builder, &self.config)
            }
            None => {
                self.config.validate()?;
                match self.config.exporter {
                    ExporterKind::Console => attach(builder, exporter::console_exporter(), &self.config),
                    ExporterKind::OtlpHttp => attach(builder, exporter::otlp_exporter(&self.config)?, &self.config),
                    ExporterKind::None => builder,
                }
            }
        };
        debug!(
            service = %self.service_name,
            exporter = ?self.config.exporter,
            batch = self.config.batch,
            "tracer provider built"
        );
        Ok(TracerProvider {
            inner: Arc::new(ProviderInner {
                sdk: builder.build(),
                resource,
                content_recording: self.config.content_recording_enabled,
                genai_instrumentation: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
            }),
        })
    }
}

#[cfg(test)]
impl TracerProvider {
    /// Provider whose spans land in `exporter` as soon as they close.
    pub(crate) fn in_memory(
        service_name: &str,
        exporter: &opentelemetry_sdk::testing::trace::InMemorySpanExporter,
        content_recording: bool,
    ) -> Self {
        let config = TracingConfig {
            batch: false,
            content_recording_enabled: content_recording,
            ..Default::default()
        };
        Self::builder(service_name)
            .config(config)
            .exporter(exporter.clone())
            .build()
            .expect("in-memory provider")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TraceError;
    use crate::telemetry::test_span::finished;
    use futures_util::future::BoxFuture;
    use opentelemetry::Value;
    use opentelemetry_sdk::export::trace::{ExportResult, SpanData};
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn build_rejects_invalid_config() {
        let cfg = TracingConfig {
            exporter: ExporterKind::OtlpHttp,
            endpoint: None,
            ..Default::default()
        };
        let err = TracerProvider::builder("svc").config(cfg).build().unwrap_err();
        assert!(matches!(err, TraceError::Configuration(_)));

        let cfg = TracingConfig {
            max_queue_size: 4,
            max_batch_size: 8,
            ..Default::default()
        };
        let err = TracerProvider::builder("svc")
            .config(cfg)
            .exporter(InMemorySpanExporter::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, TraceError::Configuration(_)));
    }

    #[test]
    fn otlp_endpoint_is_not_contacted_at_build() {
        let cfg = TracingConfig {
            exporter: ExporterKind::OtlpHttp,
            endpoint: Some("http://127.0.0.1:9".into()),
            ..Default::default()
        };
        let p = TracerProvider::builder("svc").config(cfg).build().unwrap();
        assert!(p.tracer("t").start_span("built").is_recording());
        p.shutdown(WAIT).ok();
    }

    #[test]
    fn batched_spans_reach_injected_exporter_with_resource() {
        let mem = InMemorySpanExporter::default();
        let cfg = TracingConfig {
            resource: ResourceCfg {
                service_version: "9.9.9".into(),
                environment: "test".into(),
            },
            ..Default::default()
        };
        let p = TracerProvider::builder("provider-test")
            .config(cfg)
            .exporter(mem.clone())
            .build()
            .unwrap();
        assert_eq!(p.service_name(), "provider-test");
        assert_eq!(
            p.resource().get(Key::from_static_str(keys::KEY_SERVICE_VERSION)),
            Some(Value::from("9.9.9"))
        );
        assert_eq!(
            p.resource().get(Key::from_static_str(keys::KEY_DEPLOYMENT_ENVIRONMENT)),
            Some(Value::from("test"))
        );

        p.tracer("t").start_span("one").end();
        p.force_flush(WAIT).unwrap();
        assert_eq!(finished(&mem).len(), 1);
        p.shutdown(WAIT).unwrap();
        // second call is a no-op
        p.shutdown(WAIT).unwrap();
        assert!(p.is_shut_down());
        assert!(matches!(
            p.force_flush(WAIT),
            Err(TraceError::Export(ExportError::Shutdown))
        ));
    }

    /// Blocks inside its first export until released, then counts spans.
    #[derive(Debug)]
    struct GatedExporter {
        started: Option<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
        exported: Arc<AtomicUsize>,
    }

    impl SpanExporter for GatedExporter {
        fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
            if let Some(started) = self.started.take() {
                let _ = started.send(());
                let _ = self.release.lock().unwrap().recv();
            }
            self.exported.fetch_add(batch.len(), Ordering::SeqCst);
            Box::pin(std::future::ready(Ok(())))
        }
    }

    #[test]
    fn full_queue_drops_exactly_the_overflow_without_blocking() {
        const QUEUE: usize = 4;
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let exported = Arc::new(AtomicUsize::new(0));
        let cfg = TracingConfig {
            max_queue_size: QUEUE,
            max_batch_size: 1,
            scheduled_delay_ms: 60_000,
            ..Default::default()
        };
        let p = TracerProvider::builder("queue-test")
            .config(cfg)
            .exporter(GatedExporter {
                started: Some(started_tx),
                release: Mutex::new(release_rx),
                exported: exported.clone(),
            })
            .build()
            .unwrap();
        let tracer = p.tracer("t");

        // the worker takes the first span and stalls inside export
        tracer.start_span("in-flight").end();
        started_rx.recv_timeout(WAIT).unwrap();

        // QUEUE spans fill the queue, one more overflows it
        let began = Instant::now();
        for _ in 0..=QUEUE {
            tracer.start_span("queued").end();
        }
        assert!(began.elapsed() < Duration::from_secs(1));

        release_tx.send(()).unwrap();
        let deadline = Instant::now() + WAIT;
        while exported.load(Ordering::SeqCst) < QUEUE + 1 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        std::thread::sleep(Duration::from_millis(100));
        // the in-flight span plus a full queue; the overflowing span is gone
        assert_eq!(exported.load(Ordering::SeqCst), QUEUE + 1);
        p.shutdown(WAIT).ok();
    }

    #[test]
    fn flush_is_bounded_by_its_timeout() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let cfg = TracingConfig {
            max_queue_size: 4,
            max_batch_size: 1,
            ..Default::default()
        };
        let p = TracerProvider::builder("flush-test")
            .config(cfg)
            .exporter(GatedExporter {
                started: Some(started_tx),
                release: Mutex::new(release_rx),
                exported: Arc::new(AtomicUsize::new(0)),
            })
            .build()
            .unwrap();
        p.tracer("t").start_span("stuck").end();
        started_rx.recv_timeout(WAIT).unwrap();

        let began = Instant::now();
        let err = p.force_flush(Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, TraceError::Export(ExportError::Timeout(_))), "{err:?}");
        assert!(began.elapsed() < WAIT);

        // unblock the worker before the provider is dropped
        drop(release_tx);
        p.shutdown(WAIT).ok();
    }
}
