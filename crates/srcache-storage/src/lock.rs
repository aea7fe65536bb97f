//! # File Lock Manager
//!
//! Exclusive locks keyed by a resource's storage directory.
//!
//! A lock is two layers held together:
//!
//! 1. An in-process mutex from a lock table keyed by the directory, so
//!    threads sharing one [`Storage`](crate::Storage) queue up without
//!    touching the filesystem.
//! 2. An OS advisory lock (`flock`) on `<root>/.locks/<dir>.lock`, so
//!    separate processes sharing the root exclude each other. The kernel
//!    drops it when the holding process dies, so a crash never wedges a
//!    resource.
//!
//! Lock files live outside artifact directories and are never removed by
//! garbage collection. Deleting a resource [`retire`](LockManager::retire)s
//! its lock: the file is unlinked while still held, and a waiter that wakes
//! on the unlinked file reopens the path and locks again.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use fs4::FileExt;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

use crate::error::StorageError;

/// Directory under the storage root that holds lock files.
pub const LOCKS_DIR: &str = ".locks";

/// Lock table plus lock-file location for one storage root.
#[derive(Debug)]
pub struct LockManager {
    locks_dir: PathBuf,
    table: DashMap<String, Arc<Mutex<()>>>,
}

impl LockManager {
    pub fn new(base_path: &Path) -> Self {
        Self {
            locks_dir: base_path.join(LOCKS_DIR),
            table: DashMap::new(),
        }
    }

    /// Block until the lock for `key` (a storage-relative directory) is
    /// held by the caller.
    ///
    /// Not reentrant: acquiring the same key twice on one thread without
    /// releasing the first lock deadlocks.
    pub fn acquire(&self, key: &str) -> Result<ArtifactLock, StorageError> {
        // Clone the Arc out so the table shard is released before blocking.
        let mutex = self.table.entry(key.to_string()).or_default().clone();
        let guard = mutex.lock_arc();

        let path = self.lock_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StorageError::io("create lock directory", parent, e))?;
        }
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| StorageError::io("open lock file", &path, e))?;
            FileExt::lock_exclusive(&file).map_err(|e| StorageError::io("lock", &path, e))?;
            if still_linked(&file, &path) {
                return Ok(ArtifactLock {
                    file,
                    _guard: guard,
                    path,
                    key: key.to_string(),
                });
            }
            tracing::debug!(path = %path.display(), "lock file retired while waiting; reopening");
        }
    }

    /// Release a held lock for good: unlink its file and forget the table
    /// entry unless another thread is waiting on it.
    ///
    /// Call once the locked directory has been deleted.
    pub fn retire(&self, lock: ArtifactLock) {
        match fs::remove_file(&lock.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %lock.path.display(), error = %e, "failed to remove lock file")
            }
        }
        // The table and the held guard account for two references.
        self.table.remove_if(&lock.key, |_, mutex| Arc::strong_count(mutex) <= 2);
        drop(lock);
    }

    #[cfg(test)]
    pub(crate) fn tracked_keys(&self) -> usize {
        self.table.len()
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        let mut path = self.locks_dir.clone();
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        // Append rather than set_extension: names may contain dots.
        let mut file_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        file_name.push(".lock");
        path.set_file_name(file_name);
        path
    }
}

#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> bool {
    path.exists()
}

/// Release handle for a held artifact lock.
///
/// The lock is released when the handle is dropped or
/// [`release()`](ArtifactLock::release)d.
#[must_use = "the lock is released as soon as the handle is dropped"]
pub struct ArtifactLock {
    file: File,
    _guard: ArcMutexGuard<RawMutex, ()>,
    path: PathBuf,
    key: String,
}

impl ArtifactLock {
    /// Path of the lock file backing this handle.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock explicitly.
    pub fn release(self) {}
}

impl Drop for ArtifactLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release file lock");
        }
    }
}

impl std::fmt::Debug for ArtifactLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactLock")
            .field("key", &self.key)
            .field("path", &self.path)
            .finish()
    }
}
