//! Slot coordinator: the protocol object an application instantiates
//!
//! ```text
//! launch ─► is_active()? ── true ──► exit, the previous launch stays on screen
//!                │
//!              false
//!                ▼
//!          will_present(surface) ─► close previous app's surface (if alive), settle, take slot
//!                ▼
//!          present surface ... surface teardown ─► will_close() ─► slot free
//! ```
//!
//! The coordinator holds no mutable state of its own; everything lives in the
//! record store.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::liveness::{ClosableSurface, LivenessOracle};
use crate::record::{CoordinationRecord, SurfaceHandle};
use crate::store::RecordStore;

/// Per-process protocol object bound to one application name
pub struct Coordinator {
    /// Application name, should be unique among cooperating applications
    app_name: String,
    store: RecordStore,
    oracle: Arc<dyn LivenessOracle>,
    /// Upper bound on the wait after closing a previous surface
    settle_delay: Duration,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("app_name", &self.app_name)
            .field("store", &self.store)
            .field("settle_delay", &self.settle_delay)
            .finish()
    }
}

impl Coordinator {
    /// Create a coordinator for `app_name` with the default settle delay
    pub fn new(app_name: impl Into<String>, store: RecordStore, oracle: Arc<dyn LivenessOracle>) -> Self {
        let app_name = app_name.into();
        debug!(%app_name, path = ?store.path(), "Coordinator::new: called");
        Self {
            app_name,
            store,
            oracle,
            settle_delay: Duration::from_millis(crate::DEFAULT_SETTLE_DELAY_MS),
        }
    }

    /// Override the settle delay
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Test if the application is already active
    ///
    /// `true` means a previous launch of this application is still on screen
    /// and the caller should exit without presenting anything. Never modifies
    /// the record, not even a stale one.
    pub fn is_active(&self) -> Result<bool> {
        debug!(app = %self.app_name, "Coordinator::is_active: called");
        let result = match self.store.read()? {
            Some(record) if record.is_owned_by(&self.app_name) => {
                let alive = self.oracle.is_alive(record.surface_handle);
                debug!(%record, alive, "Coordinator::is_active: record names this app");
                alive
            }
            Some(record) => {
                debug!(%record, "Coordinator::is_active: record names another app");
                false
            }
            None => {
                debug!("Coordinator::is_active: no record");
                false
            }
        };
        debug!(app = %self.app_name, result, "Coordinator::is_active: returning");
        Ok(result)
    }

    /// Declare that the application is about to present `surface`
    ///
    /// Closes the surface of whichever other application holds the slot (if
    /// it is still alive), then records this application as the holder.
    /// Fails with [`Error::AlreadyActive`] if this application already holds
    /// the slot with a live surface.
    pub fn will_present(&self, surface: &dyn ClosableSurface) -> Result<()> {
        let handle = surface.handle();
        debug!(app = %self.app_name, %handle, "Coordinator::will_present: called");

        let mut lock = self.store.lock()?;
        // Surfaces already commanded closed by this call; never closed twice
        let mut closed: Vec<SurfaceHandle> = Vec::new();
        // Re-examined after every close: another launch may take the slot
        // while the lock is released for the close.
        while let Some(record) = self.store.read()? {
            if record.is_owned_by(&self.app_name) {
                self.ensure_not_active(&record)?;
                debug!(%record, "Coordinator::will_present: stale record for this app, overwriting");
                break;
            }
            if closed.contains(&record.surface_handle) {
                debug!(%record, "Coordinator::will_present: previous surface did not close, overwriting");
                break;
            }
            let Some(previous) = self.oracle.as_closable(record.surface_handle) else {
                // Leftover from an earlier session, or a surface that cannot be closed
                debug!(%record, "Coordinator::will_present: previous surface gone, ignoring record");
                break;
            };

            info!(app = %record.app_name, handle = %record.surface_handle, "Closing app");
            closed.push(record.surface_handle);
            // The closing surface's teardown calls will_close on its own
            // coordinator, which needs the store lock.
            drop(lock);
            self.close_and_settle(previous.as_ref());
            lock = self.store.lock()?;
        }

        let record = CoordinationRecord::new(self.app_name.clone(), handle);
        self.store.write(&record)?;
        drop(lock);

        info!(app = %self.app_name, %handle, "Launching app");
        Ok(())
    }

    /// Declare that the application is about to close its surface
    ///
    /// Frees the slot if this application holds it. A missing record is a
    /// no-op; a record naming another application fails with
    /// [`Error::NotActive`] and is left untouched.
    pub fn will_close(&self) -> Result<()> {
        debug!(app = %self.app_name, "Coordinator::will_close: called");
        let _lock = self.store.lock()?;
        match self.store.read()? {
            Some(record) if record.is_owned_by(&self.app_name) => {
                self.store.clear()?;
                info!(app = %self.app_name, "Slot released");
                Ok(())
            }
            Some(record) => {
                debug!(%record, "Coordinator::will_close: slot held by another app");
                Err(Error::NotActive {
                    app_name: self.app_name.clone(),
                    active: record.app_name,
                })
            }
            None => {
                debug!("Coordinator::will_close: no record, nothing to release");
                Ok(())
            }
        }
    }

    fn ensure_not_active(&self, record: &CoordinationRecord) -> Result<()> {
        if self.oracle.is_alive(record.surface_handle) {
            debug!(%record, "Coordinator::ensure_not_active: surface still alive");
            return Err(Error::AlreadyActive {
                app_name: self.app_name.clone(),
            });
        }
        Ok(())
    }

    fn close_and_settle(&self, surface: &dyn ClosableSurface) {
        let handle = surface.handle();
        match surface.close() {
            Some(signal) => {
                if !signal.wait(self.settle_delay) {
                    warn!(%handle, delay = ?self.settle_delay, "Surface did not report close completion within settle delay");
                }
            }
            None => {
                debug!(%handle, delay = ?self.settle_delay, "Coordinator::close_and_settle: no completion signal, sleeping");
                std::thread::sleep(self.settle_delay);
            }
        }
        self.oracle.settle();
    }
}
