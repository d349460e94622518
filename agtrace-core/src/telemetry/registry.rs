use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::TracingConfig;
use crate::error::CoreResult;
use crate::telemetry::hooks::{GenAiInstrumentation, InstrumentationHook};
use crate::telemetry::provider::{TracerProvider, TracerProviderBuilder};
use crate::telemetry::tracer::Tracer;

/// Holds at most one [`TracerProvider`].
///
/// The first successful `init*` call installs the provider and runs every
/// registered hook; later calls return that provider and ignore their
/// arguments. A failed init leaves the registry empty.
pub struct TracingRegistry {
    provider: OnceCell<TracerProvider>,
    /// Registered hooks and whether each has run.
    hooks: Mutex<Vec<(Box<dyn InstrumentationHook>, bool)>>,
    hook_installs: AtomicUsize,
}

impl std::fmt::Debug for TracingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingRegistry")
            .field("provider", &self.provider.get())
            .field("hook_installs", &self.hook_installs())
            .finish()
    }
}

impl Default for TracingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TracingRegistry {
    /// Registry with the gen-ai client instrumentation hook.
    pub fn new() -> Self {
        Self::with_hooks(vec![Box::new(GenAiInstrumentation)])
    }

    pub fn with_hooks(hooks: Vec<Box<dyn InstrumentationHook>>) -> Self {
        Self {
            provider: OnceCell::new(),
            hooks: Mutex::new(hooks.into_iter().map(|h| (h, false)).collect()),
            hook_installs: AtomicUsize::new(0),
        }
    }

    fn lock_hooks(&self) -> MutexGuard<'_, Vec<(Box<dyn InstrumentationHook>, bool)>> {
        self.hooks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a hook. If a provider is already installed the hook runs now.
    pub fn add_hook(&self, hook: Box<dyn InstrumentationHook>) {
        let mut hooks = self.lock_hooks();
        hooks.push((hook, false));
        if let Some(provider) = self.provider.get() {
            self.install_pending(&mut hooks, provider);
        }
    }

    pub fn init(&self, service_name: &str, config: TracingConfig) -> CoreResult<TracerProvider> {
        self.init_with(|| TracerProvider::builder(service_name).config(config))
    }

    /// Like [`TracingRegistry::init`], with full control over the builder.
    /// `make` only runs when no provider is installed yet.
    pub fn init_with<F>(&self, make: F) -> CoreResult<TracerProvider>
    where
        F: FnOnce() -> TracerProviderBuilder,
    {
        let mut fresh = false;
        let provider = self.provider.get_or_try_init(|| {
            fresh = true;
            make().build()
        })?;
        if fresh {
            let mut hooks = self.lock_hooks();
            self.install_pending(&mut hooks, provider);
            debug!(service = %provider.service_name(), hooks = hooks.len(), "tracing initialized");
        } else {
            debug!("tracing already initialized; keeping existing provider");
        }
        Ok(provider.clone())
    }

    /// Run every hook that has not run yet. A failing hook is logged and
    /// not retried.
    fn install_pending(&self, hooks: &mut [(Box<dyn InstrumentationHook>, bool)], provider: &TracerProvider) {
        for (hook, done) in hooks.iter_mut().filter(|entry| !entry.1) {
            *done = true;
            match hook.install(provider) {
                Ok(()) => {
                    self.hook_installs.fetch_add(1, Ordering::Relaxed);
                    debug!(hook = hook.name(), "instrumentation hook installed");
                }
                Err(e) => warn!(hook = hook.name(), error = %e, "instrumentation hook failed"),
            }
        }
    }

    pub fn provider(&self) -> Option<&TracerProvider> {
        self.provider.get()
    }

    /// Tracer from the installed provider, or a no-op tracer.
    pub fn tracer(&self, name: &str) -> Tracer {
        match self.provider.get() {
            Some(p) => p.tracer(name),
            None => Tracer::noop(name),
        }
    }

    pub fn hook_installs(&self) -> usize {
        self.hook_installs.load(Ordering::Relaxed)
    }

    /// Shut the installed provider down. Without one this is a no-op.
    pub fn shutdown(&self, timeout: Duration) -> CoreResult<()> {
        match self.provider.get() {
            Some(p) => p.shutdown(timeout),
            None => Ok(()),
        }
    }
}
