//! # srcache-reconcile — Reconciliation State Machine
//!
//! Drives each managed resource through
//! storage check → fetch → outdated check → persist → schedule, using one
//! shared [`Storage`](srcache_storage::Storage) instance.
//!
//! ## Sources
//!
//! - [`RepositorySource`]: fetches `<url>/index.yaml`. Revision is the
//!   index checksum; the stable link is `helmrepository-latest.yaml`.
//! - [`ChartSource`]: resolves a chart in a sibling repository's stored
//!   index and downloads it. Revision is the chart version; the stable
//!   link is `helmchart-latest.tgz`.
//!
//! ## Guarantees
//!
//! - A pass with unchanged remote content and hostname writes no files and
//!   leaves the recorded artifact identical.
//! - Failed persistence never changes the recorded artifact.
//! - `Ready=True` and `FetchFailed=True` are never published together.
//! - Garbage collection failures are logged, never reported.
//!
//! ## Crate Policy
//!
//! - The watch/queue machinery that calls [`Reconciler::reconcile()`]
//!   belongs to the host. Passes for one resource are expected to be
//!   serialized by it.
//! - No global state. Storage, store, getters and credentials are passed
//!   in explicitly.

pub mod config;
pub mod error;
pub mod phase;
pub mod reconciler;
pub mod source;
pub mod store;

pub use config::{ConfigError, ReconcilerConfig};
pub use error::{NextRun, ReconcileError};
pub use reconciler::Reconciler;
pub use source::{Candidate, ChartSource, Payload, RepositorySource, Source};
pub use store::{InMemoryResourceStore, ResourceStore, StoreError};
