//! # srcache-core — Foundational Types for the Source Cache
//!
//! This crate defines the types every other `srcache-*` crate shares. It
//! depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **One digest path.** Every checksum in the system is produced by
//!    [`sha256_digest()`] or [`sha256_reader()`], so a checksum computed at
//!    write time always agrees with one computed at read time.
//!
//! 2. **Validated identity newtypes.** [`ObjectKey`] and [`ResourceKind`]
//!    are the only way to name a managed resource. Their segments are
//!    checked before they are ever joined into a storage path, so a name
//!    can never escape its directory.
//!
//! 3. **Pure path resolution.** [`artifact_path()`] and [`artifact_url()`]
//!    are pure functions. The URL of an artifact is always derived from the
//!    current hostname, never trusted from a stored record.
//!
//! 4. **Ordered conditions.** [`Conditions`] upserts by type in place and
//!    supports removal, so transient markers disappear instead of lingering
//!    as `False`.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `srcache-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod artifact;
pub mod condition;
pub mod digest;
pub mod error;
pub mod identity;
pub mod resource;

pub use artifact::{artifact_dir, artifact_path, artifact_url, Artifact, Hostname};
pub use condition::{Condition, ConditionStatus, ConditionType, Conditions};
pub use digest::{sha256_digest, sha256_hex, sha256_reader, ContentDigest, DigestAlgorithm};
pub use error::CoreError;
pub use identity::{ObjectKey, ResourceKind};
pub use resource::{ChartSelector, ManagedResource, ResourceSpec, ResourceStatus};
