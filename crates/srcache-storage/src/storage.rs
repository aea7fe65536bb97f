//! # Artifact Storage Engine
//!
//! Owns one root directory and every file under it. Layout:
//!
//! ```text
//! <root>/<kind>/<namespace>/<name>/<revision-qualified-filename>
//! <root>/<kind>/<namespace>/<name>/<kind>-latest.<ext>      (symlink)
//! <root>/.locks/<kind>/<namespace>/<name>.lock              (flock target)
//! ```
//!
//! ## Guarantees
//!
//! - **Atomic writes.** Content is written to a hidden temporary file in
//!   the destination directory, flushed, and renamed into place. Readers
//!   see the previous file or the complete new one.
//! - **Scoped GC.** [`Storage::remove_all_but_current()`] only ever lists
//!   the directory of the artifact it was given.
//! - **Verified reads.** [`Storage::read()`] and [`Storage::verify()`]
//!   recompute the SHA-256 of the stored bytes and compare it in constant
//!   time against the record.
//!
//! All operations are blocking. Async callers run them on a blocking
//! thread.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use srcache_core::{
    artifact_dir, artifact_path, artifact_url, sha256_digest, sha256_reader, Artifact,
    ContentDigest, CoreError, Hostname, ObjectKey, ResourceKind,
};
use subtle::ConstantTimeEq;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::lock::{ArtifactLock, LockManager};

/// Default permission bits for artifact files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Suffix of the redirect records written where symlinks are unavailable.
pub const REDIRECT_SUFFIX: &str = ".redirect";

/// The artifact storage engine.
///
/// Cheap to clone; clones share the root and the lock table.
#[derive(Debug, Clone)]
pub struct Storage {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    base_path: PathBuf,
    hostname: Hostname,
    locks: LockManager,
}

impl Storage {
    /// Open (and create if needed) the storage root.
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.base_path)
            .map_err(|e| StorageError::io("create storage root", &config.base_path, e))?;
        let locks = LockManager::new(&config.base_path);
        Ok(Self {
            inner: Arc::new(Inner {
                base_path: config.base_path,
                hostname: config.hostname,
                locks,
            }),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.inner.base_path
    }

    pub fn hostname(&self) -> &Hostname {
        &self.inner.hostname
    }

    /// Build an unwritten artifact record for a resource, with its URL set
    /// for the configured hostname.
    pub fn artifact_for(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
        revision: &str,
        filename: &str,
    ) -> Result<Artifact, StorageError> {
        let path = artifact_path(kind, key, filename)?;
        Ok(Artifact::new(path, revision).with_url(self.hostname()))
    }

    /// Re-derive `artifact.url` from the configured hostname.
    pub fn set_artifact_url(&self, artifact: &mut Artifact) {
        artifact.url = artifact_url(self.hostname(), &artifact.path);
    }

    /// Resolve an artifact's storage-relative path to a local path.
    ///
    /// Rejects records whose path would leave the storage root.
    pub fn local_path(&self, artifact: &Artifact) -> Result<PathBuf, StorageError> {
        self.resolve(&artifact.path)
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let mut path = self.inner.base_path.clone();
        for segment in relative.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
                return Err(CoreError::InvalidFilename(relative.to_string()).into());
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// Create every directory leading to the artifact's file. Idempotent.
    pub fn mkdir_all(&self, artifact: &Artifact) -> Result<PathBuf, StorageError> {
        let dir = self.resolve(artifact.dir())?;
        fs::create_dir_all(&dir).map_err(|e| StorageError::io("create directory", &dir, e))?;
        Ok(dir)
    }

    /// Write `reader` to the artifact's path through a temporary file and a
    /// single rename.
    ///
    /// The temporary file is removed on every failure path.
    pub fn atomic_write(
        &self,
        artifact: &Artifact,
        mut reader: impl Read,
        mode: u32,
    ) -> Result<(), StorageError> {
        let dest = self.local_path(artifact)?;
        let dir = self.resolve(artifact.dir())?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| StorageError::io("create temporary file in", &dir, e))?;
        io::copy(&mut reader, tmp.as_file_mut())
            .map_err(|e| StorageError::io("write", tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StorageError::io("sync", tmp.path(), e))?;
        set_mode(tmp.as_file(), mode).map_err(|e| StorageError::io("chmod", tmp.path(), e))?;

        tmp.persist(&dest)
            .map_err(|e| StorageError::io("rename into", &dest, e.error))?;
        tracing::debug!(path = %artifact.path, "wrote artifact");
        Ok(())
    }

    /// SHA-256 hex digest of `data`.
    pub fn checksum(&self, data: &[u8]) -> String {
        sha256_digest(data).to_hex()
    }

    /// Whether a regular file backs the artifact. Symlinks do not count.
    pub fn artifact_exists(&self, artifact: &Artifact) -> bool {
        self.local_path(artifact)
            .and_then(|p| {
                fs::symlink_metadata(&p).map_err(|e| StorageError::io("stat", &p, e))
            })
            .map(|m| m.file_type().is_file())
            .unwrap_or(false)
    }

    /// Acquire the exclusive lock for the artifact's directory.
    ///
    /// Hold it across `mkdir_all` → `atomic_write` → `symlink`. Do not call
    /// [`remove_all_but_current()`](Self::remove_all_but_current) while
    /// holding it.
    pub fn lock(&self, artifact: &Artifact) -> Result<ArtifactLock, StorageError> {
        self.resolve(artifact.dir())?;
        self.inner.locks.acquire(artifact.dir())
    }

    /// Delete every file in the artifact's directory except the one backing
    /// `current`, returning the paths removed.
    ///
    /// Symlinks, redirect records and subdirectories are kept. Files that
    /// vanish concurrently are ignored. Acquires the directory lock itself.
    pub fn remove_all_but_current(&self, current: &Artifact) -> Result<Vec<PathBuf>, StorageError> {
        let dir = self.resolve(current.dir())?;
        let keep = current.filename();
        let _lock = self.lock(current)?;

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io("list", &dir, e)),
        };

        let mut removed = Vec::new();
        let mut failures: Vec<io::Error> = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    failures.push(e);
                    continue;
                }
            };
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == keep || name.ends_with(REDIRECT_SUFFIX) {
                continue;
            }
            match entry.file_type() {
                Ok(ft) if ft.is_file() => {}
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    failures.push(e);
                    continue;
                }
            }
            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => removed.push(path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove superseded artifact");
                    failures.push(e);
                }
            }
        }

        let failed = failures.len();
        match failures.into_iter().next() {
            Some(first) => Err(StorageError::GarbageCollection { dir, failed, first }),
            None => {
                if !removed.is_empty() {
                    tracing::debug!(dir = %dir.display(), count = removed.len(), "garbage collected artifacts");
                }
                Ok(removed)
            }
        }
    }

    /// Remove a resource's whole artifact directory and retire its lock. An
    /// absent directory is not an error.
    pub fn remove_all(&self, kind: ResourceKind, key: &ObjectKey) -> Result<(), StorageError> {
        let rel = artifact_dir(kind, key);
        let dir = self.resolve(&rel)?;
        let lock = self.inner.locks.acquire(&rel)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io("remove", &dir, e)),
        }
        self.inner.locks.retire(lock);
        Ok(())
    }

    /// Point the stable-name link `link_name` at `target`, replacing any
    /// previous link in one rename, and return the link's public URL.
    pub fn symlink(&self, target: &Artifact, link_name: &str) -> Result<String, StorageError> {
        let link_rel = artifact_path_in(target.dir(), link_name)?;
        let dir = self.resolve(target.dir())?;
        let link = dir.join(link_name);
        replace_link(&dir, target.filename(), &link)?;
        tracing::debug!(link = %link_rel, target = %target.path, "updated stable-name link");
        Ok(artifact_url(self.hostname(), &link_rel))
    }

    /// Read the artifact's bytes and verify them against its checksum.
    pub fn read(&self, artifact: &Artifact) -> Result<Vec<u8>, StorageError> {
        let path = self.local_path(artifact)?;
        let data = fs::read(&path).map_err(|e| StorageError::io("read", &path, e))?;
        check_digest(&path, artifact, &sha256_digest(&data))?;
        Ok(data)
    }

    /// Stream the artifact's file through SHA-256 and compare the result
    /// with its checksum, without holding the content in memory.
    ///
    /// A record whose checksum is not a SHA-256 hex digest never verifies.
    pub fn verify(&self, artifact: &Artifact) -> Result<(), StorageError> {
        let path = self.local_path(artifact)?;
        let file = fs::File::open(&path).map_err(|e| StorageError::io("open", &path, e))?;
        let actual = sha256_reader(io::BufReader::new(file))
            .map_err(|e| StorageError::io("read", &path, e))?;
        check_digest(&path, artifact, &actual)
    }
}

fn check_digest(path: &Path, artifact: &Artifact, actual: &ContentDigest) -> Result<(), StorageError> {
    let matches = ContentDigest::from_hex(&artifact.checksum)
        .map(|expected| bool::from(expected.as_bytes()[..].ct_eq(&actual.as_bytes()[..])))
        .unwrap_or(false);
    if matches {
        return Ok(());
    }
    Err(StorageError::Integrity {
        path: path.to_path_buf(),
        expected: artifact.checksum.clone(),
        actual: actual.to_hex(),
    })
}

fn artifact_path_in(dir: &str, name: &str) -> Result<String, StorageError> {
    if name.is_empty() || name.starts_with('.') || name.contains(|c| matches!(c, '/' | '\\' | '\0')) {
        return Err(CoreError::InvalidFilename(name.to_string()).into());
    }
    Ok(format!("{dir}/{name}"))
}

#[cfg(unix)]
fn set_mode(file: &fs::File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &fs::File, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn replace_link(dir: &Path, target_filename: &str, link: &Path) -> Result<(), StorageError> {
    let file_name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{file_name}.{}.tmp", std::process::id()));
    match fs::remove_file(&tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(StorageError::io("remove stale link", &tmp, e)),
    }
    std::os::unix::fs::symlink(target_filename, &tmp)
        .map_err(|e| StorageError::io("create symlink", &tmp, e))?;
    if let Err(e) = fs::rename(&tmp, link) {
        let _ = fs::remove_file(&tmp);
        return Err(StorageError::io("rename link into", link, e));
    }
    Ok(())
}

#[cfg(not(unix))]
fn replace_link(dir: &Path, target_filename: &str, link: &Path) -> Result<(), StorageError> {
    let mut record = link.as_os_str().to_owned();
    record.push(REDIRECT_SUFFIX);
    let record = PathBuf::from(record);
    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| StorageError::io("create temporary file in", dir, e))?;
    io::Write::write_all(tmp.as_file_mut(), target_filename.as_bytes())
        .map_err(|e| StorageError::io("write", tmp.path(), e))?;
    tmp.persist(&record)
        .map_err(|e| StorageError::io("rename redirect record into", &record, e.error))?;
    Ok(())
}
