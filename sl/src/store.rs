//! Record store: the single coordination record on disk
//!
//! The record file is the only channel between otherwise unrelated launches.
//! Writes go through a temporary file in the same directory followed by a
//! rename, so a reader never observes a torn record. A sidecar guard file
//! carries the advisory lock that spans a read-check-write sequence.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::record::CoordinationRecord;

/// Persists and retrieves the coordination record
#[derive(Debug, Clone)]
pub struct RecordStore {
    /// Path to the record file
    path: PathBuf,
    /// Path to the sidecar file used for advisory locking
    guard_path: PathBuf,
    /// Whether `lock()` actually takes the advisory lock
    locking: bool,
}

/// Advisory exclusive lock on the record store, released on drop
#[derive(Debug)]
pub struct StoreLock {
    file: Option<File>,
    guard_path: PathBuf,
}

impl StoreLock {
    /// Whether an OS-level lock is held (false when locking is disabled)
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                warn!(path = ?self.guard_path, error = %e, "Failed to release record lock");
            } else {
                debug!(path = ?self.guard_path, "StoreLock::drop: released");
            }
        }
    }
}

fn guard_path_for(path: &Path) -> PathBuf {
    let mut guard: OsString = path.as_os_str().to_owned();
    guard.push(".guard");
    PathBuf::from(guard)
}

impl RecordStore {
    /// Create a store for the record at `path`, with advisory locking enabled
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(?path, "RecordStore::new: called");
        Self {
            guard_path: guard_path_for(&path),
            path,
            locking: true,
        }
    }

    /// Enable or disable the advisory lock
    pub fn with_locking(mut self, locking: bool) -> Self {
        self.locking = locking;
        self
    }

    /// Path to the record file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path to the sidecar guard file
    pub fn guard_path(&self) -> &Path {
        &self.guard_path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn ensure_parent(&self) -> Result<()> {
        let parent = self.parent_dir();
        fs::create_dir_all(parent).map_err(|e| Error::io("create directory", parent, e))
    }

    /// Read the current record
    ///
    /// Returns `None` when no record file exists. A record that cannot be
    /// parsed is logged and reported as absent, so it gets overwritten by the
    /// next `write` instead of blocking the slot forever.
    pub fn read(&self) -> Result<Option<CoordinationRecord>> {
        debug!(path = ?self.path, "RecordStore::read: called");
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("RecordStore::read: record file does not exist");
                return Ok(None);
            }
            Err(e) => return Err(Error::io("read", &self.path, e)),
        };

        match serde_json::from_slice::<CoordinationRecord>(&bytes) {
            Ok(record) => {
                debug!(%record, "RecordStore::read: returning record");
                Ok(Some(record))
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Ignoring malformed coordination record");
                Ok(None)
            }
        }
    }

    /// Persist `record`, atomically replacing any previous content
    pub fn write(&self, record: &CoordinationRecord) -> Result<()> {
        debug!(%record, path = ?self.path, "RecordStore::write: called");
        self.ensure_parent()?;

        let parent = self.parent_dir();
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| Error::io("create temporary file in", parent, e))?;
        serde_json::to_writer(&mut tmp, record)?;
        tmp.flush().map_err(|e| Error::io("write", tmp.path().to_path_buf(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::io("sync", tmp.path().to_path_buf(), e))?;
        tmp.persist(&self.path)?;

        debug!(path = ?self.path, "Wrote coordination record");
        Ok(())
    }

    /// Remove the record file; no-op if it does not exist
    pub fn clear(&self) -> Result<()> {
        debug!(path = ?self.path, "RecordStore::clear: called");
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = ?self.path, "Removed coordination record");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("RecordStore::clear: record file does not exist");
                Ok(())
            }
            Err(e) => Err(Error::io("remove", &self.path, e)),
        }
    }

    /// Whether a record file is present (parsable or not)
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Take the advisory exclusive lock, blocking until it is available
    ///
    /// The guard file is created on demand and never removed.
    pub fn lock(&self) -> Result<StoreLock> {
        debug!(path = ?self.guard_path, locking = self.locking, "RecordStore::lock: called");
        if !self.locking {
            return Ok(StoreLock {
                file: None,
                guard_path: self.guard_path.clone(),
            });
        }

        self.ensure_parent()?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.guard_path)
            .map_err(|e| Error::io("open", &self.guard_path, e))?;
        FileExt::lock_exclusive(&file).map_err(|e| Error::io("lock", &self.guard_path, e))?;

        debug!(path = ?self.guard_path, "RecordStore::lock: acquired");
        Ok(StoreLock {
            file: Some(file),
            guard_path: self.guard_path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SurfaceHandle;
    use tempfile::tempdir;

    fn record(app: &str, raw: u64) -> CoordinationRecord {
        CoordinationRecord::new(app, SurfaceHandle::from_raw(raw))
    }

    #[test]
    fn test_read_missing_returns_none() {
        let temp = tempdir().unwrap();
        let store = RecordStore::new(temp.path().join("single_launch.lock"));
        assert_eq!(store.read().unwrap(), None);
        assert!(!store.exists());
    }

    #[test]
    fn test_write_and_read_record() {
        let temp = tempdir().unwrap();
        let store = RecordStore::new(temp.path().join("single_launch.lock"));

        store.write(&record("X", 111)).unwrap();
        assert_eq!(store.read().unwrap(), Some(record("X", 111)));

        // Overwrite replaces the previous holder
        store.write(&record("Y", 222)).unwrap();
        assert_eq!(store.read().unwrap(), Some(record("Y", 222)));
    }

    #[test]
    fn test_write_uses_pair_format() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("single_launch.lock");
        let store = RecordStore::new(&path);

        store.write(&record("Demo app 1", 42)).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, r#"["Demo app 1",42]"#);
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("dir").join("single_launch.lock");
        let store = RecordStore::new(&path);

        store.write(&record("X", 1)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_write_leaves_no_temporary_files() {
        let temp = tempdir().unwrap();
        let store = RecordStore::new(temp.path().join("single_launch.lock"));

        store.write(&record("X", 1)).unwrap();
        store.write(&record("Y", 2)).unwrap();

        let entries: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_malformed_record_reads_as_absent() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("single_launch.lock");
        fs::write(&path, "not json at all").unwrap();

        let store = RecordStore::new(&path);
        assert_eq!(store.read().unwrap(), None);
        assert!(store.exists());

        // And can be overwritten
        store.write(&record("X", 7)).unwrap();
        assert_eq!(store.read().unwrap(), Some(record("X", 7)));
    }

    #[test]
    fn test_empty_record_reads_as_absent() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("single_launch.lock");
        fs::write(&path, "").unwrap();

        let store = RecordStore::new(&path);
        assert_eq!(store.read().unwrap(), None);
    }

    #[test]
    fn test_clear_removes_record() {
        let temp = tempdir().unwrap();
        let store = RecordStore::new(temp.path().join("single_launch.lock"));

        store.write(&record("X", 1)).unwrap();
        store.clear().unwrap();
        assert_eq!(store.read().unwrap(), None);
        assert!(!store.exists());
    }

    #[test]
    fn test_clear_missing_is_noop() {
        let temp = tempdir().unwrap();
        let store = RecordStore::new(temp.path().join("single_launch.lock"));
        store.clear().unwrap();
        store.clear().unwrap();
    }

    #[test]
    fn test_read_directory_is_io_error() {
        let temp = tempdir().unwrap();
        let store = RecordStore::new(temp.path());

        let err = store.read().unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_guard_path_is_sidecar() {
        let store = RecordStore::new("/tmp/slot/single_launch.lock");
        assert_eq!(store.guard_path(), Path::new("/tmp/slot/single_launch.lock.guard"));
    }

    #[test]
    fn test_lock_creates_guard_and_releases() {
        let temp = tempdir().unwrap();
        let store = RecordStore::new(temp.path().join("single_launch.lock"));

        {
            let lock = store.lock().unwrap();
            assert!(lock.is_held());
            assert!(store.guard_path().exists());
        }

        // Released on drop, so it can be taken again
        let lock = store.lock().unwrap();
        assert!(lock.is_held());
    }

    #[test]
    fn test_lock_excludes_other_handles() {
        let temp = tempdir().unwrap();
        let store = RecordStore::new(temp.path().join("single_launch.lock"));

        let _lock = store.lock().unwrap();
        let other = File::open(store.guard_path()).unwrap();
        assert!(FileExt::try_lock_exclusive(&other).is_err());
    }

    #[test]
    fn test_lock_disabled() {
        let temp = tempdir().unwrap();
        let store = RecordStore::new(temp.path().join("single_launch.lock")).with_locking(false);

        let lock = store.lock().unwrap();
        assert!(!lock.is_held());
        assert!(!store.guard_path().exists());
    }
}
