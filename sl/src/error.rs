//! Error types for slot coordination

use std::path::PathBuf;

use thiserror::Error;

/// Result type for coordination operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the record store and the coordinator
#[derive(Debug, Error)]
pub enum Error {
    /// `will_present` called while this application already holds the slot
    #[error("App {app_name} is already active, cannot call will_present() against it")]
    AlreadyActive { app_name: String },

    /// `will_close` called by an application that no longer holds the slot
    #[error("App {app_name} is not active, {active} is active")]
    NotActive { app_name: String, active: String },

    #[error("Failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode coordination record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to replace record file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl Error {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Check if this is a will_present protocol violation
    pub fn is_already_active(&self) -> bool {
        matches!(self, Error::AlreadyActive { .. })
    }

    /// Check if this is a will_close protocol violation
    pub fn is_not_active(&self) -> bool {
        matches!(self, Error::NotActive { .. })
    }
}
