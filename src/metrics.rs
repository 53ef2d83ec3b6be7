//! Metric names and recorders for pulled-event jobs.
//!
//! Recording is a no-op until a recorder is installed, so library code can
//! record unconditionally and only the binary decides whether to export.

use std::fmt;
use std::net::SocketAddr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    JobsTotal,
    VenuesCreated,
    EventsCreated,
    EventsUpdated,
    DuplicateMatches,
    CreateConflicts,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::JobsTotal => "event_pull_jobs_total",
            MetricName::VenuesCreated => "event_pull_venues_created_total",
            MetricName::EventsCreated => "event_pull_events_created_total",
            MetricName::EventsUpdated => "event_pull_events_updated_total",
            MetricName::DuplicateMatches => "event_pull_duplicate_matches_total",
            MetricName::CreateConflicts => "event_pull_conflicts_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorders for the job, resolver and reconciler.
pub struct CatalogMetrics;

impl CatalogMetrics {
    pub fn record_job(outcome: &'static str) {
        ::metrics::counter!(MetricName::JobsTotal.as_str(), "outcome" => outcome).increment(1);
    }

    pub fn record_venue_created() {
        ::metrics::counter!(MetricName::VenuesCreated.as_str()).increment(1);
    }

    pub fn record_event_created() {
        ::metrics::counter!(MetricName::EventsCreated.as_str()).increment(1);
    }

    pub fn record_event_updated() {
        ::metrics::counter!(MetricName::EventsUpdated.as_str()).increment(1);
    }

    pub fn record_duplicate_matches(entity: &'static str) {
        ::metrics::counter!(MetricName::DuplicateMatches.as_str(), "entity" => entity).increment(1);
    }

    pub fn record_conflict(entity: &'static str) {
        ::metrics::counter!(MetricName::CreateConflicts.as_str(), "entity" => entity).increment(1);
    }
}

/// Install the Prometheus exporter with an HTTP listener on `port`.
/// Must run inside a Tokio runtime.
pub fn init_metrics(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed: {}", e),
    }
}
