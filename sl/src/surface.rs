//! Demo surface used by `sl demo` and the tests
//!
//! Stands in for a real view: it can be closed by the coordinator, runs a
//! teardown hook when it closes (where a real view calls `will_close`) and
//! reports close completion.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, info};

use crate::liveness::{CloseSignal, ClosableSurface, SurfaceRegistry};
use crate::record::SurfaceHandle;

type TeardownHook = Box<dyn FnOnce() + Send>;

/// How a demo surface reports that it finished closing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// Completion is signalled as soon as `close` returns
    #[default]
    Immediate,
    /// Completion is signalled from a background thread after a delay
    After(Duration),
    /// No completion signal; the coordinator falls back to its settle delay
    Unsignalled,
}

/// Builder for [`DemoSurface`]
#[derive(Debug)]
pub struct DemoSurfaceBuilder {
    title: String,
    handle: Option<SurfaceHandle>,
    completion: Completion,
}

impl DemoSurfaceBuilder {
    /// Use a fixed handle instead of allocating one
    pub fn handle(mut self, handle: SurfaceHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Set how close completion is reported
    pub fn completion(mut self, completion: Completion) -> Self {
        self.completion = completion;
        self
    }

    /// Create the surface and register it with `registry`
    pub fn register(self, registry: &Arc<SurfaceRegistry>) -> Arc<DemoSurface> {
        let surface = Arc::new(DemoSurface {
            handle: self.handle.unwrap_or_else(SurfaceHandle::allocate),
            title: self.title,
            completion: self.completion,
            open: AtomicBool::new(true),
            close_count: AtomicUsize::new(0),
            on_close: Mutex::new(None),
            registry: Arc::downgrade(registry),
        });
        registry.register(&surface);
        debug!(handle = %surface.handle, title = %surface.title, "DemoSurface: created");
        surface
    }
}

/// A closable surface with an observable lifecycle
pub struct DemoSurface {
    handle: SurfaceHandle,
    title: String,
    completion: Completion,
    open: AtomicBool,
    close_count: AtomicUsize,
    on_close: Mutex<Option<TeardownHook>>,
    registry: Weak<SurfaceRegistry>,
}

impl std::fmt::Debug for DemoSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemoSurface")
            .field("handle", &self.handle)
            .field("title", &self.title)
            .field("completion", &self.completion)
            .field("open", &self.is_open())
            .field("close_count", &self.close_count())
            .finish()
    }
}

impl DemoSurface {
    /// Start building a surface with the given title
    pub fn builder(title: impl Into<String>) -> DemoSurfaceBuilder {
        DemoSurfaceBuilder {
            title: title.into(),
            handle: None,
            completion: Completion::default(),
        }
    }

    /// Create and register a surface with default settings
    pub fn create(title: impl Into<String>, registry: &Arc<SurfaceRegistry>) -> Arc<Self> {
        Self::builder(title).register(registry)
    }

    /// Install the teardown hook, replacing any previous one
    pub fn on_close(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_close.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// How many times the surface actually went through teardown (0 or 1)
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Close the surface from the user side (same teardown as a commanded close)
    pub fn dismiss(&self) {
        debug!(handle = %self.handle, "DemoSurface::dismiss: called");
        if let Some(signal) = self.teardown() {
            signal.wait(Duration::from_secs(5));
        }
    }

    fn teardown(&self) -> Option<CloseSignal> {
        if !self.open.swap(false, Ordering::SeqCst) {
            debug!(handle = %self.handle, "DemoSurface::teardown: already closed");
            return Some(CloseSignal::completed());
        }

        self.close_count.fetch_add(1, Ordering::SeqCst);
        info!(handle = %self.handle, title = %self.title, "Surface closing");

        let hook = self.on_close.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(hook) = hook {
            hook();
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.retire(self.handle);
        }

        match self.completion {
            Completion::Immediate => Some(CloseSignal::completed()),
            Completion::After(delay) => {
                let (notifier, signal) = CloseSignal::channel();
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    notifier.notify();
                });
                Some(signal)
            }
            Completion::Unsignalled => None,
        }
    }
}

impl ClosableSurface for DemoSurface {
    fn handle(&self) -> SurfaceHandle {
        self.handle
    }

    fn close(&self) -> Option<CloseSignal> {
        self.teardown()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
