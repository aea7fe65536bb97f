//! # Reconciliation Errors and Scheduling
//!
//! Every failure a pass can hit falls into one [`ReconcileError`] class.
//! Each class maps to exactly one `FetchFailed` reason and one
//! [`NextRun`]:
//!
//! | Class | Reason | Next run |
//! |---|---|---|
//! | `StorageIo` | `StorageOperationFailed` | retry interval |
//! | `Credential` | `AuthenticationFailed` | on change |
//! | `Transport` (invalid URL) | `URLInvalid` | on change |
//! | `Transport` (unsupported scheme) | `UnsupportedScheme` | on change |
//! | `Transport` (TLS, network, status, timeout) | `Failed` | retry interval |
//! | `Content` | `IndexationFailed` / `ChartPullFailed` | on change |
//! | `DependencyNotReady` | `DependencyNotReady` | retry interval |
//! | `Store` | `Failed` | retry interval |

use std::time::Duration;

use srcache_core::condition::reason;
use srcache_fetch::{CredentialError, TransportError};
use srcache_storage::StorageError;

use crate::store::StoreError;

/// When the host should run the next pass for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRun {
    /// Requeue without delay.
    Immediate,
    /// Requeue after the given delay.
    After(Duration),
    /// Do not requeue; wait for a spec change or an external resync.
    OnChange,
}

/// Errors that fail a reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    StorageIo(#[from] StorageError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The fetched content is empty, unparseable, or lacks the requested
    /// entry.
    #[error("{message}")]
    Content {
        reason: &'static str,
        message: String,
    },

    /// A resource this one depends on has no usable artifact yet.
    #[error("{0}")]
    DependencyNotReady(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub(crate) fn content(reason: &'static str, message: impl Into<String>) -> Self {
        Self::Content {
            reason,
            message: message.into(),
        }
    }

    /// The `FetchFailed` reason for this error.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::StorageIo(_) => reason::STORAGE_OPERATION_FAILED,
            Self::Credential(_) => reason::AUTHENTICATION_FAILED,
            Self::Transport(TransportError::InvalidUrl { .. }) => reason::URL_INVALID,
            Self::Transport(TransportError::UnsupportedScheme { .. }) => reason::UNSUPPORTED_SCHEME,
            Self::Transport(_) => reason::FAILED,
            Self::Content { reason, .. } => reason,
            Self::DependencyNotReady(_) => reason::DEPENDENCY_NOT_READY,
            Self::Store(_) => reason::FAILED,
        }
    }

    /// Whether the same pass can succeed later without a spec or secret
    /// change.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StorageIo(_) | Self::DependencyNotReady(_) | Self::Store(_) => true,
            Self::Transport(e) => e.is_retryable(),
            Self::Credential(_) | Self::Content { .. } => false,
        }
    }

    /// The scheduling decision for this error.
    pub fn next_run(&self, retry_interval: Duration) -> NextRun {
        if self.is_retryable() {
            NextRun::After(retry_interval)
        } else {
            NextRun::OnChange
        }
    }

    /// Whether the pass reports this error to its caller. Malformed URLs
    /// and unsupported schemes are recorded in status only.
    pub fn is_reported(&self) -> bool {
        !matches!(
            self,
            Self::Transport(TransportError::InvalidUrl { .. })
                | Self::Transport(TransportError::UnsupportedScheme { .. })
        )
    }
}
