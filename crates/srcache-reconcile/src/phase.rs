//! # Reconciliation Phases
//!
//! Each phase is a pure function from the current status plus the result
//! of that phase's I/O to a new status and a signal: continue to the next
//! phase, or stop with a scheduling result. The orchestrator in
//! [`reconciler`](crate::reconciler) performs the I/O and threads the
//! status through, so a failing phase can never leave a half-updated
//! status behind.
//!
//! ```text
//! initialize → storage check → fetch → outdated check → persist
//!                   │             │           │             │
//!                 stop          stop        stop          done
//!             (Immediate)   (error class) (up to date)  (interval)
//! ```

use std::time::Duration;

use srcache_core::condition::reason;
use srcache_core::{artifact_url, Artifact, ConditionType, Hostname, ResourceStatus};

use crate::error::{NextRun, ReconcileError};
use crate::source::Candidate;

/// Message recorded when a status points at a file that is gone.
pub const NO_ARTIFACT_MESSAGE: &str = "No artifact for resource in storage";

/// Outcome of one phase.
#[derive(Debug)]
pub enum PhaseOutcome<T> {
    /// Proceed with the updated status and the phase's product.
    Continue(ResourceStatus, T),
    /// End the pass with the updated status and this result.
    Stop(ResourceStatus, Result<NextRun, ReconcileError>),
}

/// `Ready` message for a stored revision.
pub fn stored_message(revision: &str) -> String {
    format!("Stored artifact for revision '{revision}'")
}

fn link_url(hostname: &Hostname, artifact: &Artifact, link_name: &str) -> String {
    artifact_url(hostname, &format!("{}/{link_name}", artifact.dir()))
}

/// Seed an empty condition set with `Ready=Unknown`.
pub fn initialize(mut status: ResourceStatus) -> ResourceStatus {
    if status.conditions.is_empty() {
        status
            .conditions
            .mark_unknown(ConditionType::Ready, reason::INITIALIZING, "reconciliation in progress");
    }
    status
}

/// Check the recorded artifact against storage.
///
/// `exists` is whether a regular file with the recorded checksum backs
/// `status.artifact`. A missing or altered file clears the record and
/// requests an immediate retry. A URL minted
/// for another hostname is rewritten in place.
pub fn check_storage(
    mut status: ResourceStatus,
    exists: bool,
    hostname: &Hostname,
    link_name: &str,
) -> PhaseOutcome<()> {
    let Some(artifact) = status.artifact.take() else {
        return PhaseOutcome::Continue(status, ());
    };

    if !exists {
        status.url = None;
        status.conditions.mark_true(
            ConditionType::ArtifactUnavailable,
            reason::NO_ARTIFACT,
            NO_ARTIFACT_MESSAGE,
        );
        status
            .conditions
            .mark_false(ConditionType::Ready, reason::NO_ARTIFACT, NO_ARTIFACT_MESSAGE);
        return PhaseOutcome::Stop(status, Ok(NextRun::Immediate));
    }

    let artifact = if artifact.url_matches(hostname) {
        artifact
    } else {
        tracing::info!(path = %artifact.path, from = %artifact.url, "rewriting artifact URL for current hostname");
        artifact.with_url(hostname)
    };
    status.url = Some(link_url(hostname, &artifact, link_name));
    status.artifact = Some(artifact);
    status.conditions.remove(ConditionType::ArtifactUnavailable);
    PhaseOutcome::Continue(status, ())
}

/// Record a failed phase: `FetchFailed` with the error's reason, `Ready`
/// downgraded, previous artifact kept.
pub fn fail<T>(
    mut status: ResourceStatus,
    error: ReconcileError,
    retry_interval: Duration,
) -> PhaseOutcome<T> {
    status
        .conditions
        .mark_fetch_failed(error.reason(), error.to_string());
    let result = if error.is_reported() {
        Err(error)
    } else {
        Ok(error.next_run(retry_interval))
    };
    PhaseOutcome::Stop(status, result)
}

/// Apply the fetch result.
pub fn check_fetch(
    status: ResourceStatus,
    fetched: Result<Candidate, ReconcileError>,
    retry_interval: Duration,
) -> PhaseOutcome<Candidate> {
    match fetched {
        Ok(candidate) => PhaseOutcome::Continue(status, candidate),
        Err(e) => fail(status, e, retry_interval),
    }
}

/// Compare the candidate with the recorded artifact. Equal checksums end
/// the pass with `Ready` reaffirmed; anything else marks the artifact
/// outdated.
pub fn check_outdated(
    mut status: ResourceStatus,
    candidate: Candidate,
    interval: Duration,
) -> PhaseOutcome<Candidate> {
    if let Some(current) = &status.artifact {
        if current.has_checksum(&candidate.checksum) {
            let message = stored_message(&current.revision);
            status.conditions.remove(ConditionType::ArtifactOutdated);
            status.conditions.mark_ready(reason::SUCCEEDED, message);
            return PhaseOutcome::Stop(status, Ok(NextRun::After(interval)));
        }
    }
    status.conditions.mark_true(
        ConditionType::ArtifactOutdated,
        reason::NEW_REVISION,
        format!("new revision '{}'", candidate.revision),
    );
    PhaseOutcome::Continue(status, candidate)
}

/// A completed persistence sequence.
#[derive(Debug, Clone)]
pub struct Persisted {
    pub artifact: Artifact,
    /// Public URL of the stable-name link.
    pub url: String,
}

/// Apply the persistence result. On success the new artifact replaces the
/// old one in a single assignment; on failure the old one stays.
pub fn check_persist(
    mut status: ResourceStatus,
    persisted: Result<Persisted, ReconcileError>,
    retry_interval: Duration,
) -> PhaseOutcome<Artifact> {
    match persisted {
        Ok(Persisted { artifact, url }) => {
            let message = stored_message(&artifact.revision);
            status.conditions.remove(ConditionType::ArtifactOutdated);
            status.conditions.remove(ConditionType::ArtifactUnavailable);
            status.conditions.mark_ready(reason::SUCCEEDED, message);
            status.url = Some(url);
            status.artifact = Some(artifact.clone());
            PhaseOutcome::Continue(status, artifact)
        }
        Err(e) => fail(status, e, retry_interval),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use srcache_core::ConditionStatus;
    use srcache_fetch::{CredentialError, TransportError};

    use crate::source::Payload;

    const INTERVAL: Duration = Duration::from_secs(600);
    const RETRY: Duration = Duration::from_secs(10);
    const LINK: &str = "helmchart-latest.tgz";

    fn host(s: &str) -> Hostname {
        Hostname::parse(s).unwrap()
    }

    fn stored(checksum: &str) -> Artifact {
        let mut a = Artifact::new("helmchart/default/podinfo/podinfo-1.0.0.tgz", "1.0.0")
            .with_url(&host("http://old"));
        a.checksum = checksum.to_string();
        a
    }

    fn candidate(revision: &str, checksum: &str) -> Candidate {
        Candidate {
            revision: revision.to_string(),
            filename: format!("podinfo-{revision}.tgz"),
            data: Bytes::from_static(b"chart"),
            checksum: checksum.to_string(),
            payload: Payload::Chart {
                name: "podinfo".into(),
                version: revision.into(),
            },
        }
    }

    fn with_artifact(a: Artifact) -> ResourceStatus {
        ResourceStatus {
            artifact: Some(a),
            ..Default::default()
        }
    }

    #[test]
    fn initialize_only_seeds_empty_conditions() {
        let status = initialize(ResourceStatus::default());
        let ready = status.conditions.get(ConditionType::Ready).unwrap();
        assert_eq!(ready.status, ConditionStatus::Unknown);
        assert_eq!(ready.reason, "Initializing");

        let mut seeded = ResourceStatus::default();
        seeded.conditions.mark_ready(reason::SUCCEEDED, "ok");
        let after = initialize(seeded.clone());
        assert_eq!(after, seeded);
    }

    #[test]
    fn missing_file_clears_record_and_retries_immediately() {
        let status = with_artifact(stored("abc"));
        match check_storage(status, false, &host("http://old"), LINK) {
            PhaseOutcome::Stop(status, Ok(NextRun::Immediate)) => {
                assert!(status.artifact.is_none());
                assert!(status.url.is_none());
                let unavailable = status.conditions.get(ConditionType::ArtifactUnavailable).unwrap();
                assert_eq!(unavailable.reason, "NoArtifact");
                assert_eq!(unavailable.message, NO_ARTIFACT_MESSAGE);
                assert!(!status.conditions.is_true(ConditionType::Ready));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn hostname_change_rewrites_url_only() {
        let before = stored("abc");
        match check_storage(with_artifact(before.clone()), true, &host("http://new"), LINK) {
            PhaseOutcome::Continue(status, ()) => {
                let after = status.artifact.unwrap();
                assert_eq!(after.url, "http://new/helmchart/default/podinfo/podinfo-1.0.0.tgz");
                assert_eq!(after.checksum, before.checksum);
                assert_eq!(after.last_update_time, before.last_update_time);
                assert_eq!(
                    status.url.as_deref(),
                    Some("http://new/helmchart/default/podinfo/helmchart-latest.tgz")
                );
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn no_artifact_passes_through() {
        let status = ResourceStatus::default();
        assert!(matches!(
            check_storage(status, false, &host("http://x"), LINK),
            PhaseOutcome::Continue(_, ())
        ));
    }

    #[test]
    fn auth_failure_is_reported() {
        let err = ReconcileError::from(CredentialError::NotFound {
            namespace: "default".into(),
            name: "non-existing".into(),
        });
        match check_fetch(with_artifact(stored("abc")), Err(err), RETRY) {
            PhaseOutcome::Stop(status, Err(e)) => {
                assert!(matches!(e, ReconcileError::Credential(_)));
                let failed = status.conditions.get(ConditionType::FetchFailed).unwrap();
                assert_eq!(failed.reason, "AuthenticationFailed");
                assert_eq!(failed.message, "secrets \"non-existing\" not found");
                assert!(status.artifact.is_some());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn unsupported_scheme_is_silent() {
        let err = ReconcileError::from(TransportError::UnsupportedScheme { scheme: "ftp".into() });
        match check_fetch(ResourceStatus::default(), Err(err), RETRY) {
            PhaseOutcome::Stop(status, Ok(NextRun::OnChange)) => {
                assert!(status.conditions.is_true(ConditionType::FetchFailed));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn same_checksum_is_up_to_date() {
        let status = with_artifact(stored("abc"));
        match check_outdated(status, candidate("1.0.0", "abc"), INTERVAL) {
            PhaseOutcome::Stop(status, Ok(NextRun::After(d))) => {
                assert_eq!(d, INTERVAL);
                assert!(status.conditions.is_true(ConditionType::Ready));
                assert!(status.conditions.get(ConditionType::ArtifactOutdated).is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn new_checksum_is_outdated() {
        let status = with_artifact(stored("abc"));
        match check_outdated(status, candidate("2.0.0", "def"), INTERVAL) {
            PhaseOutcome::Continue(status, c) => {
                assert_eq!(c.revision, "2.0.0");
                let outdated = status.conditions.get(ConditionType::ArtifactOutdated).unwrap();
                assert_eq!(outdated.reason, "NewRevision");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn persist_success_swaps_artifact_and_clears_markers() {
        let mut status = with_artifact(stored("abc"));
        status
            .conditions
            .mark_true(ConditionType::ArtifactOutdated, reason::NEW_REVISION, "x");
        status
            .conditions
            .mark_true(ConditionType::ArtifactUnavailable, reason::NO_ARTIFACT, "y");
        status.conditions.mark_fetch_failed(reason::FAILED, "earlier");

        let mut next = Artifact::new("helmchart/default/podinfo/podinfo-2.0.0.tgz", "2.0.0");
        next.checksum = "def".into();
        let persisted = Persisted {
            artifact: next.clone(),
            url: "http://x/helmchart/default/podinfo/helmchart-latest.tgz".into(),
        };
        match check_persist(status, Ok(persisted), RETRY) {
            PhaseOutcome::Continue(status, artifact) => {
                assert_eq!(artifact, next);
                assert_eq!(status.artifact, Some(next));
                let ready = status.conditions.get(ConditionType::Ready).unwrap();
                assert_eq!(ready.status, ConditionStatus::True);
                assert_eq!(ready.message, "Stored artifact for revision '2.0.0'");
                assert!(status.conditions.get(ConditionType::ArtifactOutdated).is_none());
                assert!(status.conditions.get(ConditionType::ArtifactUnavailable).is_none());
                assert!(status.conditions.get(ConditionType::FetchFailed).is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn persist_failure_keeps_previous_artifact() {
        let before = stored("abc");
        let err = ReconcileError::content(reason::INDEXATION_FAILED, "repository index has no chart entries");
        match check_persist(with_artifact(before.clone()), Err(err), RETRY) {
            PhaseOutcome::Stop(status, Err(_)) => {
                assert_eq!(status.artifact, Some(before));
                let failed = status.conditions.get(ConditionType::FetchFailed).unwrap();
                assert_eq!(failed.reason, "IndexationFailed");
                assert!(!status.conditions.is_true(ConditionType::Ready));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
