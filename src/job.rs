//! Queue job for a single pulled event.
//!
//! The runner hands over one payload per job and gets back a [`JobOutcome`].
//! Payload and storage problems become `Failure`; any other error is a bug in
//! a collaborator and is returned as `Err` for the runner's crash handling.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::catalog::{ChangeType, EventReconciler, VenueResolver};
use crate::config::ReconcileConfig;
use crate::error::{PullError, Result};
use crate::metrics::CatalogMetrics;
use crate::parser;
use crate::storage::Storage;

pub const JOB_TYPE: &str = "event_pull_pulled_event";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    MalformedPayload,
    Persistence,
}

impl FailureKind {
    /// Storage failures are often transient; a bad payload never fixes itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Persistence)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::MalformedPayload => "malformed_payload",
            FailureKind::Persistence => "persistence",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful job touched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub venue_id: Uuid,
    pub event_id: Uuid,
    pub venue_created: bool,
    pub event_created: bool,
    pub revision: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JobOutcome {
    Success(JobReport),
    Failure { kind: FailureKind, reason: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }

    fn label(&self) -> &'static str {
        match self {
            JobOutcome::Success(_) => "success",
            JobOutcome::Failure { kind, .. } => kind.as_str(),
        }
    }
}

/// Materializes the venue and event for one pulled-event payload.
pub struct PulledEventJob {
    venues: VenueResolver,
    events: EventReconciler,
}

impl PulledEventJob {
    pub fn new(storage: Arc<dyn Storage>, config: &ReconcileConfig) -> Self {
        Self {
            venues: VenueResolver::new(storage.clone(), config),
            events: EventReconciler::new(storage, config),
        }
    }

    #[instrument(skip_all, fields(job_type = JOB_TYPE))]
    pub async fn handle(&self, payload: &Value) -> Result<JobOutcome> {
        let outcome = match self.process(payload).await {
            Ok(report) => JobOutcome::Success(report),
            Err(PullError::MalformedPayload(reason)) => JobOutcome::Failure {
                kind: FailureKind::MalformedPayload,
                reason,
            },
            Err(PullError::Persistence(e)) => JobOutcome::Failure {
                kind: FailureKind::Persistence,
                reason: e.to_string(),
            },
            Err(other) => return Err(other),
        };

        match &outcome {
            JobOutcome::Success(report) => info!(
                event_id = %report.event_id,
                revision = report.revision,
                "Pulled event job succeeded"
            ),
            JobOutcome::Failure { kind, reason } => {
                warn!(%kind, retryable = kind.is_retryable(), "Pulled event job failed: {}", reason)
            }
        }
        CatalogMetrics::record_job(outcome.label());
        Ok(outcome)
    }

    async fn process(&self, payload: &Value) -> Result<JobReport> {
        let record = parser::parse(payload)?;

        let venue = self.venues.resolve_venue(&record.venue).await?;
        let event = self.events.reconcile_event(&venue.entity, &record).await?;

        let missing_id = |what: &str| PullError::invariant(format!("stored {} has no id", what));
        Ok(JobReport {
            venue_id: venue.entity.id.ok_or_else(|| missing_id("venue"))?,
            event_id: event.entity.id.ok_or_else(|| missing_id("event"))?,
            venue_created: venue.change == ChangeType::Created,
            event_created: event.change == ChangeType::Created,
            revision: event.entity.revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use serde_json::json;

    #[test]
    fn test_only_persistence_failures_are_retryable() {
        assert!(FailureKind::Persistence.is_retryable());
        assert!(!FailureKind::MalformedPayload.is_retryable());
    }

    #[test]
    fn test_outcome_label_matches_failure_kind() {
        for kind in [FailureKind::MalformedPayload, FailureKind::Persistence] {
            let outcome = JobOutcome::Failure {
                kind,
                reason: "boom".to_string(),
            };
            assert_eq!(outcome.label(), kind.to_string());
        }
        assert_eq!(FailureKind::Persistence.as_str(), "persistence");
    }

    #[tokio::test]
    async fn test_handle_reports_created_then_updated() {
        let storage = Arc::new(InMemoryStorage::new());
        let job = PulledEventJob::new(storage, &ReconcileConfig::default());
        let payload = json!({
            "remoteId": 42,
            "name": "Jazz Night",
            "venue": { "remoteId": 7, "name": "Blue Note" }
        });

        let JobOutcome::Success(first) = job.handle(&payload).await.unwrap() else {
            panic!("first delivery should succeed");
        };
        assert!(first.venue_created);
        assert!(first.event_created);
        assert_eq!(first.revision, 1);

        let JobOutcome::Success(second) = job.handle(&payload).await.unwrap() else {
            panic!("redelivery should succeed");
        };
        assert_eq!(second.venue_id, first.venue_id);
        assert_eq!(second.event_id, first.event_id);
        assert!(!second.venue_created);
        assert!(!second.event_created);
        assert_eq!(second.revision, 2);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_a_failure() {
        let job = PulledEventJob::new(Arc::new(InMemoryStorage::new()), &ReconcileConfig::default());

        let outcome = job.handle(&json!({ "name": "No ids" })).await.unwrap();
        match outcome {
            JobOutcome::Failure { kind, reason } => {
                assert_eq!(kind, FailureKind::MalformedPayload);
                assert!(reason.contains("remoteId"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
