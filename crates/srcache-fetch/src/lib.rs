//! # srcache-fetch — Source Fetch Collaborators
//!
//! The narrow interfaces a reconciliation pass uses to reach a remote
//! source:
//!
//! - [`CredentialResolver`] turns a secret reference into
//!   [`FetchOptions`] (basic auth and TLS material), or a typed
//!   [`CredentialError`].
//! - [`Getters`] picks a [`Getter`] by URL scheme. [`HttpGetter`] covers
//!   `http` and `https`.
//! - [`ChartIndex`] models a repository's `index.yaml`.
//!
//! ## Crate Policy
//!
//! - No dependency on storage or reconciliation.
//! - Getters do not retry. Retry policy belongs to the caller.
//! - Secrets never appear in `Debug` output.

pub mod credential;
pub mod error;
pub mod getter;
pub mod index;
pub mod options;

pub use credential::{CredentialResolver, InMemorySecrets};
pub use error::{CredentialError, IndexError, TransportError};
pub use getter::{
    parse_source_url, repository_index_url, resolve_chart_url, Getter, Getters, HttpGetter,
};
pub use index::{ChartIndex, ChartVersion};
pub use options::{options_from_secret, BasicAuth, FetchOptions, Secret, TlsOptions};
