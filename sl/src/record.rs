//! Coordination record types

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-process sequence for allocated handles (0 is never issued)
static NEXT_SEQUENCE: AtomicU32 = AtomicU32::new(1);

/// Opaque identifier of a UI surface
///
/// Only the liveness oracle gives it meaning. Allocated handles carry the
/// process id in the high 32 bits, so handles from an earlier process rarely
/// collide with handles issued by the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    /// Wrap a raw handle value (e.g. a native window id)
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Allocate a fresh handle, unique within this process
    pub fn allocate() -> Self {
        let seq = NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let handle = Self((u64::from(std::process::id()) << 32) | u64::from(seq));
        debug!(%handle, "SurfaceHandle::allocate: allocated");
        handle
    }

    /// Raw handle value as stored in the record file
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SurfaceHandle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// The persisted description of the current slot holder
///
/// Serialized as a two-element array: `["<app name>", <surface handle>]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, SurfaceHandle)", into = "(String, SurfaceHandle)")]
pub struct CoordinationRecord {
    /// Application holding the slot
    pub app_name: String,
    /// Surface the application presented
    pub surface_handle: SurfaceHandle,
}

impl CoordinationRecord {
    /// Create a new record
    pub fn new(app_name: impl Into<String>, surface_handle: SurfaceHandle) -> Self {
        Self {
            app_name: app_name.into(),
            surface_handle,
        }
    }

    /// Whether this record names the given application
    pub fn is_owned_by(&self, app_name: &str) -> bool {
        self.app_name == app_name
    }
}

impl From<(String, SurfaceHandle)> for CoordinationRecord {
    fn from((app_name, surface_handle): (String, SurfaceHandle)) -> Self {
        Self {
            app_name,
            surface_handle,
        }
    }
}

impl From<CoordinationRecord> for (String, SurfaceHandle) {
    fn from(record: CoordinationRecord) -> Self {
        (record.app_name, record.surface_handle)
    }
}

impl std::fmt::Display for CoordinationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (surface {})", self.app_name, self.surface_handle)
    }
}
