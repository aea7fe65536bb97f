//! # Condition Set
//!
//! The machine-readable status flags a reconciliation pass publishes.
//!
//! [`Conditions`] is an ordered sequence with upsert-by-type semantics:
//! setting a condition whose type is already present replaces it in place,
//! otherwise it is appended. Transient markers (`ArtifactOutdated`,
//! `ArtifactUnavailable`) are removed by [`Conditions::remove()`] once
//! resolved rather than flipped to `False`.
//!
//! ## Invariant
//!
//! `Ready=True` and `FetchFailed=True` are never asserted together. The
//! only way to set either is [`Conditions::mark_ready()`] or
//! [`Conditions::mark_fetch_failed()`], and each clears the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Condition reasons shared across reconcilers.
pub mod reason {
    /// Status is being initialized.
    pub const INITIALIZING: &str = "Initializing";
    /// The pass completed and the artifact is current.
    pub const SUCCEEDED: &str = "Succeeded";
    /// Generic failure.
    pub const FAILED: &str = "Failed";
    /// A newer revision is known but not yet stored.
    pub const NEW_REVISION: &str = "NewRevision";
    /// The recorded artifact has no backing file.
    pub const NO_ARTIFACT: &str = "NoArtifact";
    /// Credentials could not be resolved.
    pub const AUTHENTICATION_FAILED: &str = "AuthenticationFailed";
    /// The source URL is malformed.
    pub const URL_INVALID: &str = "URLInvalid";
    /// The source URL uses a scheme no getter supports.
    pub const UNSUPPORTED_SCHEME: &str = "UnsupportedScheme";
    /// A storage operation failed.
    pub const STORAGE_OPERATION_FAILED: &str = "StorageOperationFailed";
    /// The fetched content is empty or unusable.
    pub const INDEXATION_FAILED: &str = "IndexationFailed";
    /// The chart could not be located or downloaded.
    pub const CHART_PULL_FAILED: &str = "ChartPullFailed";
    /// A resource this one depends on is not ready.
    pub const DEPENDENCY_NOT_READY: &str = "DependencyNotReady";
}

/// The condition types a reconciliation pass may publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    /// The artifact is current and healthy.
    Ready,
    /// A newer revision is known but not yet persisted.
    ArtifactOutdated,
    /// The recorded artifact has no backing file.
    ArtifactUnavailable,
    /// The last fetch attempt errored.
    FetchFailed,
}

impl ConditionType {
    /// The canonical type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::ArtifactOutdated => "ArtifactOutdated",
            Self::ArtifactUnavailable => "ArtifactUnavailable",
            Self::FetchFailed => "FetchFailed",
        }
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state condition value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A named status flag with reason and message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    /// Changes only when `status` changes.
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Build a condition stamped with the current time.
    pub fn new(
        type_: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_,
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// Compare type, status, reason and message, ignoring the timestamp.
    pub fn matches(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// An ordered set of conditions, at most one per type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    /// Look up a condition by type.
    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    /// Whether the condition of `type_` is present with status `True`.
    pub fn is_true(&self, type_: ConditionType) -> bool {
        self.get(type_)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Replace the condition of the same type in place, or append it.
    ///
    /// When the status is unchanged the previous transition time is kept.
    pub fn upsert(&mut self, mut condition: Condition) {
        match self.0.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            None => self.0.push(condition),
        }
    }

    /// Remove the condition of `type_`, if present.
    pub fn remove(&mut self, type_: ConditionType) {
        self.0.retain(|c| c.type_ != type_);
    }

    pub fn mark_true(&mut self, type_: ConditionType, reason: &str, message: impl Into<String>) {
        self.upsert(Condition::new(type_, ConditionStatus::True, reason, message));
    }

    pub fn mark_false(&mut self, type_: ConditionType, reason: &str, message: impl Into<String>) {
        self.upsert(Condition::new(type_, ConditionStatus::False, reason, message));
    }

    pub fn mark_unknown(&mut self, type_: ConditionType, reason: &str, message: impl Into<String>) {
        self.upsert(Condition::new(type_, ConditionStatus::Unknown, reason, message));
    }

    /// Assert `Ready=True` and clear `FetchFailed`.
    pub fn mark_ready(&mut self, reason: &str, message: impl Into<String>) {
        self.remove(ConditionType::FetchFailed);
        self.mark_true(ConditionType::Ready, reason, message);
    }

    /// Assert `FetchFailed=True` and downgrade `Ready` to `False` with the
    /// same reason and message.
    pub fn mark_fetch_failed(&mut self, reason: &str, message: impl Into<String>) {
        let message = message.into();
        self.mark_true(ConditionType::FetchFailed, reason, message.clone());
        self.mark_false(ConditionType::Ready, reason, message);
    }
}
