//! # Storage Error Types
//!
//! Every filesystem failure carries the operation and the path it touched,
//! so the condition message a reconciler publishes can name both.

use std::io;
use std::path::PathBuf;

use srcache_core::CoreError;
use thiserror::Error;

/// Errors from artifact storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A filesystem operation failed.
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        /// Short verb phrase, e.g. "create directory".
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    /// An artifact record or link name was rejected by path resolution.
    #[error(transparent)]
    InvalidPath(#[from] CoreError),

    /// Stored bytes do not match the checksum recorded for them.
    #[error("integrity violation: {} has checksum {actual} but the artifact records {expected}", path.display())]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// One or more superseded files could not be removed.
    #[error("garbage collection of {} failed for {failed} file(s): {first}", dir.display())]
    GarbageCollection {
        dir: PathBuf,
        failed: usize,
        first: io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Whether the failure was caused by a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}
