//! Liveness oracle and surface registry
//!
//! The coordinator never interprets a surface handle itself. It asks a
//! [`LivenessOracle`] whether the handle still refers to a surface on screen,
//! and for a [`ClosableSurface`] capability when it has to close one.
//!
//! [`SurfaceRegistry`] is the in-process oracle: surfaces are registered on
//! creation as weak references and retired on disposal. The registry never
//! keeps a surface alive.

use std::any::Any;
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::debug;

use crate::record::SurfaceHandle;

/// A UI surface that the coordinator can command to close
pub trait ClosableSurface: Send + Sync {
    /// Handle under which this surface is registered
    fn handle(&self) -> SurfaceHandle;

    /// Close the surface
    ///
    /// Returns a signal that fires once teardown has completed, if the
    /// surface can report that. `None` makes the coordinator fall back to the
    /// settle delay.
    fn close(&self) -> Option<CloseSignal>;

    /// Whether the surface is still on screen
    fn is_open(&self) -> bool {
        true
    }
}

/// Answers whether a surface handle still refers to something on screen
pub trait LivenessOracle: Send + Sync {
    /// Finish any pending teardown before a liveness check
    fn settle(&self) {}

    /// Whether the surface behind `handle` is still alive
    fn is_alive(&self, handle: SurfaceHandle) -> bool;

    /// A close capability for `handle`, if it is alive and closable
    fn as_closable(&self, handle: SurfaceHandle) -> Option<Arc<dyn ClosableSurface>>;
}

/// Receiving side of a close-completion notification
#[derive(Debug)]
pub struct CloseSignal {
    rx: mpsc::Receiver<()>,
}

/// Sending side of a close-completion notification
#[derive(Debug, Clone)]
pub struct CloseNotifier {
    tx: mpsc::Sender<()>,
}

impl CloseSignal {
    /// Create a connected notifier/signal pair
    pub fn channel() -> (CloseNotifier, CloseSignal) {
        let (tx, rx) = mpsc::channel();
        (CloseNotifier { tx }, CloseSignal { rx })
    }

    /// A signal that has already fired
    pub fn completed() -> Self {
        let (notifier, signal) = Self::channel();
        notifier.notify();
        signal
    }

    /// Wait up to `timeout` for teardown to complete
    ///
    /// Returns `false` on timeout. A notifier dropped without notifying counts
    /// as completion: the surface is gone either way.
    pub fn wait(self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

impl CloseNotifier {
    /// Report that teardown has completed
    pub fn notify(&self) {
        // Receiver gone means nobody is waiting any more
        let _ = self.tx.send(());
    }
}

enum Entry {
    Closable(Weak<dyn ClosableSurface>),
    Opaque(Weak<dyn Any + Send + Sync>),
}

/// An entry upgraded under the registry lock, inspected after it is released
enum Resolved {
    Closable(Arc<dyn ClosableSurface>),
    Opaque,
    Gone,
}

impl Entry {
    fn is_dropped(&self) -> bool {
        match self {
            Entry::Closable(weak) => weak.strong_count() == 0,
            Entry::Opaque(weak) => weak.strong_count() == 0,
        }
    }

    fn resolve(&self) -> Resolved {
        match self {
            Entry::Closable(weak) => weak.upgrade().map_or(Resolved::Gone, Resolved::Closable),
            Entry::Opaque(weak) if weak.strong_count() > 0 => Resolved::Opaque,
            Entry::Opaque(_) => Resolved::Gone,
        }
    }

    fn refers_to(&self, surface: &Arc<dyn ClosableSurface>) -> bool {
        match self {
            Entry::Closable(weak) => std::ptr::addr_eq(weak.as_ptr(), Arc::as_ptr(surface)),
            Entry::Opaque(_) => false,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<SurfaceHandle, Entry>,
    retired: Vec<SurfaceHandle>,
}

/// In-process liveness oracle backed by explicit registration
#[derive(Default)]
pub struct SurfaceRegistry {
    inner: Mutex<RegistryInner>,
}

impl std::fmt::Debug for SurfaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("SurfaceRegistry")
            .field("entries", &inner.entries.len())
            .field("retired", &inner.retired.len())
            .finish()
    }
}

impl SurfaceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a closable surface under its own handle
    pub fn register<S: ClosableSurface + 'static>(&self, surface: &Arc<S>) -> SurfaceHandle {
        let handle = surface.handle();
        let weak = Arc::downgrade(surface);
        let weak: Weak<dyn ClosableSurface> = weak;
        let mut inner = self.lock();
        inner.retired.retain(|h| *h != handle);
        inner.entries.insert(handle, Entry::Closable(weak));
        debug!(%handle, "SurfaceRegistry::register: closable surface registered");
        handle
    }

    /// Register an object that is tracked for liveness but cannot be closed
    pub fn register_opaque<T: Any + Send + Sync>(&self, handle: SurfaceHandle, object: &Arc<T>) -> SurfaceHandle {
        let weak = Arc::downgrade(object);
        let weak: Weak<dyn Any + Send + Sync> = weak;
        let mut inner = self.lock();
        inner.retired.retain(|h| *h != handle);
        inner.entries.insert(handle, Entry::Opaque(weak));
        debug!(%handle, "SurfaceRegistry::register_opaque: opaque object registered");
        handle
    }

    /// Mark a surface as disposed; it is dropped from the registry on the next settle
    pub fn retire(&self, handle: SurfaceHandle) {
        debug!(%handle, "SurfaceRegistry::retire: called");
        let mut inner = self.lock();
        if inner.entries.contains_key(&handle) && !inner.retired.contains(&handle) {
            inner.retired.push(handle);
        }
    }

    /// Number of registered entries, including ones not yet settled
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

impl LivenessOracle for SurfaceRegistry {
    fn settle(&self) {
        // Surfaces are only asked `is_open` once the registry lock is released
        let open: Vec<(SurfaceHandle, Arc<dyn ClosableSurface>)> = {
            let mut inner = self.lock();
            let RegistryInner { entries, retired } = &mut *inner;
            for handle in retired.drain(..) {
                entries.remove(&handle);
            }
            entries.retain(|_, entry| !entry.is_dropped());
            entries
                .iter()
                .filter_map(|(handle, entry)| match entry.resolve() {
                    Resolved::Closable(surface) => Some((*handle, surface)),
                    Resolved::Opaque | Resolved::Gone => None,
                })
                .collect()
        };

        let closed: Vec<_> = open.into_iter().filter(|(_, surface)| !surface.is_open()).collect();
        let remaining = {
            let mut inner = self.lock();
            for (handle, surface) in &closed {
                if inner.entries.get(handle).is_some_and(|entry| entry.refers_to(surface)) {
                    inner.entries.remove(handle);
                }
            }
            inner.entries.len()
        };
        debug!(closed = closed.len(), remaining, "SurfaceRegistry::settle: done");
    }

    fn is_alive(&self, handle: SurfaceHandle) -> bool {
        self.settle();
        let resolved = self.lock().entries.get(&handle).map(Entry::resolve);
        let result = match resolved {
            Some(Resolved::Closable(surface)) => surface.is_open(),
            Some(Resolved::Opaque) => true,
            Some(Resolved::Gone) | None => false,
        };
        debug!(%handle, result, "SurfaceRegistry::is_alive: returning");
        result
    }

    fn as_closable(&self, handle: SurfaceHandle) -> Option<Arc<dyn ClosableSurface>> {
        self.settle();
        let resolved = self.lock().entries.get(&handle).map(Entry::resolve);
        let result = match resolved {
            Some(Resolved::Closable(surface)) if surface.is_open() => Some(surface),
            _ => None,
        };
        debug!(%handle, closable = result.is_some(), "SurfaceRegistry::as_closable: returning");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    struct TestSurface {
        handle: SurfaceHandle,
        open: AtomicBool,
    }

    impl TestSurface {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                handle: SurfaceHandle::allocate(),
                open: AtomicBool::new(true),
            })
        }
    }

    impl ClosableSurface for TestSurface {
        fn handle(&self) -> SurfaceHandle {
            self.handle
        }

        fn close(&self) -> Option<CloseSignal> {
            self.open.store(false, Ordering::SeqCst);
            None
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_unknown_handle_is_not_alive() {
        let registry = SurfaceRegistry::new();
        assert!(!registry.is_alive(SurfaceHandle::from_raw(111)));
        assert!(registry.as_closable(SurfaceHandle::from_raw(111)).is_none());
    }

    #[test]
    fn test_registered_surface_is_alive_and_closable() {
        let registry = SurfaceRegistry::new();
        let surface = TestSurface::new();
        let handle = registry.register(&surface);

        assert!(registry.is_alive(handle));
        let closable = registry.as_closable(handle).unwrap();
        assert_eq!(closable.handle(), handle);
    }

    #[test]
    fn test_registry_does_not_keep_surface_alive() {
        let registry = SurfaceRegistry::new();
        let surface = TestSurface::new();
        let handle = registry.register(&surface);

        drop(surface);
        assert!(!registry.is_alive(handle));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_closed_surface_is_not_alive() {
        let registry = SurfaceRegistry::new();
        let surface = TestSurface::new();
        let handle = registry.register(&surface);

        surface.close();
        assert!(!registry.is_alive(handle));
        assert!(registry.as_closable(handle).is_none());
    }

    #[test]
    fn test_retired_surface_is_flushed_on_settle() {
        let registry = SurfaceRegistry::new();
        let surface = TestSurface::new();
        let handle = registry.register(&surface);

        registry.retire(handle);
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_alive(handle));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_opaque_is_alive_but_not_closable() {
        let registry = SurfaceRegistry::new();
        let object = Arc::new(String::from("spinner"));
        let handle = registry.register_opaque(SurfaceHandle::from_raw(7), &object);

        assert!(registry.is_alive(handle));
        assert!(registry.as_closable(handle).is_none());

        drop(object);
        assert!(!registry.is_alive(handle));
    }

    /// Surface whose open state is derived from the registry it lives in
    struct RegistryAwareSurface {
        handle: SurfaceHandle,
        registry: Weak<SurfaceRegistry>,
    }

    impl ClosableSurface for RegistryAwareSurface {
        fn handle(&self) -> SurfaceHandle {
            self.handle
        }

        fn close(&self) -> Option<CloseSignal> {
            None
        }

        fn is_open(&self) -> bool {
            self.registry.upgrade().is_some_and(|registry| !registry.is_empty())
        }
    }

    #[test]
    fn test_is_open_may_query_registry() {
        let registry = Arc::new(SurfaceRegistry::new());
        let surface = Arc::new(RegistryAwareSurface {
            handle: SurfaceHandle::allocate(),
            registry: Arc::downgrade(&registry),
        });
        let handle = registry.register(&surface);

        let (tx, rx) = mpsc::channel();
        let worker_registry = registry.clone();
        std::thread::spawn(move || {
            let alive = worker_registry.is_alive(handle);
            let closable = worker_registry.as_closable(handle).is_some();
            let _ = tx.send((alive, closable));
        });

        let (alive, closable) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("liveness check must not deadlock on the registry lock");
        assert!(alive);
        assert!(closable);
        drop(surface);
    }

    #[test]
    fn test_reregister_cancels_retire() {
        let registry = SurfaceRegistry::new();
        let surface = TestSurface::new();
        let handle = registry.register(&surface);

        registry.retire(handle);
        registry.register(&surface);
        assert!(registry.is_alive(handle));
    }

    #[test]
    fn test_close_signal_notified() {
        let (notifier, signal) = CloseSignal::channel();
        notifier.notify();
        assert!(signal.wait(Duration::from_secs(5)));
    }

    #[test]
    fn test_close_signal_completed() {
        assert!(CloseSignal::completed().wait(Duration::ZERO));
    }

    #[test]
    fn test_close_signal_dropped_notifier_counts_as_done() {
        let (notifier, signal) = CloseSignal::channel();
        drop(notifier);
        assert!(signal.wait(Duration::from_secs(5)));
    }

    #[test]
    fn test_close_signal_times_out() {
        let (_notifier, signal) = CloseSignal::channel();
        let started = Instant::now();
        assert!(!signal.wait(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_close_signal_from_other_thread() {
        let (notifier, signal) = CloseSignal::channel();
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            notifier.notify();
        });
        assert!(signal.wait(Duration::from_secs(5)));
        worker.join().unwrap();
    }
}
