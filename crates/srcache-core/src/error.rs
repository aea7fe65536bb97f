//! # Error Types
//!
//! Errors raised while constructing core values. Each carries the
//! offending input so a condition message can name it directly.

use thiserror::Error;

/// Errors from validating core identifiers and configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A namespace or name does not satisfy the identifier rules.
    #[error("invalid {field} {value:?}: {reason}")]
    InvalidIdentifier {
        /// Which identifier was being validated ("namespace", "name").
        field: &'static str,
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An artifact filename would escape its resource directory.
    #[error("invalid artifact filename {0:?}")]
    InvalidFilename(String),

    /// The configured public hostname is unusable.
    #[error("invalid hostname {value:?}: {reason}")]
    InvalidHostname {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}
