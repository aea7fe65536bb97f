//! # srcache-storage — Artifact Storage Engine
//!
//! Content-versioned on-disk cache for fetched source artifacts:
//!
//! - **Atomic writes** through a colocated temporary file and one rename.
//! - **Per-resource locks** combining an in-process lock table with an OS
//!   advisory file lock, so a crashed holder never wedges a resource.
//! - **Checksum verification** on read, compared in constant time.
//! - **Garbage collection** scoped to one resource's directory.
//! - **Stable-name links** (`<kind>-latest.<ext>`) replaced atomically.
//!
//! ## Crate Policy
//!
//! - Depends only on `srcache-core` internally.
//! - One [`Storage`] instance per root, passed explicitly to every
//!   collaborator. No global state.
//! - Blocking I/O only; async callers use a blocking thread.

pub mod config;
pub mod error;
pub mod lock;
pub mod storage;

pub use config::{ConfigError, StorageConfig};
pub use error::StorageError;
pub use lock::{ArtifactLock, LockManager};
pub use storage::{Storage, DEFAULT_FILE_MODE, REDIRECT_SUFFIX};
