//! SingleLaunch - single-instance coordination for relaunched applications
//!
//! An application that is started as a brand-new process on every launch
//! (home-screen shortcut, desktop launcher, ...) uses a [`Coordinator`] to find
//! out whether its previous launch is still on screen, and to take over the
//! slot from whatever other application presented last.
//!
//! # Architecture
//!
//! ```text
//! Coordinator ──► RecordStore     (single JSON record file, shared by all processes)
//!             └─► LivenessOracle  (SurfaceRegistry: handle -> weak surface, per process)
//! ```
//!
//! The record file holds `["<app name>", <surface handle>]`; its absence means
//! the slot is free.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use singlelaunch::{Coordinator, RecordStore, SurfaceRegistry};
//!
//! let registry = Arc::new(SurfaceRegistry::new());
//! let app = Coordinator::new("MyApp", RecordStore::new(path), registry.clone());
//! if !app.is_active()? {
//!     let view = MyView::new(&registry);
//!     registry.register(&view);
//!     app.will_present(view.as_ref())?;
//!     view.present();
//! }
//! ```

pub mod cli;
pub mod config;
mod coordinator;
mod error;
mod liveness;
mod record;
mod store;
pub mod surface;

pub use coordinator::Coordinator;
pub use error::{Error, Result};
pub use liveness::{CloseNotifier, CloseSignal, ClosableSurface, LivenessOracle, SurfaceRegistry};
pub use record::{CoordinationRecord, SurfaceHandle};
pub use store::{RecordStore, StoreLock};

/// Default settle delay after closing a previous surface (1s)
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1000;

/// File name of the record inside the default record directory
pub const RECORD_FILE_NAME: &str = "single_launch.lock";
