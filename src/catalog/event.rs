use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{first_in_storage_order, ChangeSet, Reconciled};
use crate::config::ReconcileConfig;
use crate::domain::{Event, EventRecord, Venue};
use crate::error::{PullError, Result};
use crate::metrics::CatalogMetrics;
use crate::storage::Storage;

/// Creates the event for an external event id, or overwrites the stored one.
///
/// On update only title, description and event date are taken from the
/// record. The stored URL, venue, publish flag and created timestamp stay as
/// they were when the event was first seen.
pub struct EventReconciler {
    storage: Arc<dyn Storage>,
    conflict_retries: u32,
}

impl EventReconciler {
    pub fn new(storage: Arc<dyn Storage>, config: &ReconcileConfig) -> Self {
        Self {
            storage,
            conflict_retries: config.conflict_retries,
        }
    }

    #[instrument(skip(self, venue, record), fields(external_event_id = record.remote_id))]
    pub async fn reconcile_event(
        &self,
        venue: &Venue,
        record: &EventRecord,
    ) -> Result<Reconciled<Event>> {
        let venue_id = venue
            .id
            .ok_or_else(|| PullError::invariant("resolved venue has no id"))?;

        let mut conflicts = 0;
        loop {
            let matches = self.storage.find_events_by_external_id(record.remote_id).await?;
            if let Some(existing) = first_in_storage_order(matches, "event", record.remote_id) {
                return self.update_existing(existing, record).await;
            }

            let mut event = Event::from_record(record, venue_id, Utc::now());
            match self.storage.create_event(&mut event).await {
                Ok(()) => {
                    info!("Created new event: {} at venue {}", event.title, venue.name);
                    CatalogMetrics::record_event_created();
                    return Ok(Reconciled::created(event));
                }
                // Another job created it first; fall through to the update path
                Err(e) if e.is_unique_violation() && conflicts < self.conflict_retries => {
                    conflicts += 1;
                    info!("Event create lost a race, re-querying");
                    CatalogMetrics::record_conflict("event");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn update_existing(
        &self,
        mut event: Event,
        record: &EventRecord,
    ) -> Result<Reconciled<Event>> {
        let changes = ChangeSet::for_event(&event, record);
        debug!(
            "Found existing event {:?}, {} field(s) changed",
            event.id,
            changes.changed_fields.len()
        );

        event.title = record.name.clone();
        event.description = record.description.clone();
        event.event_date = record.event_date;
        event.updated_at = Utc::now();

        self.storage
            .update_event(&mut event, &changes.summarize())
            .await?;

        info!(
            "Updated event: {} to revision {}",
            event.title, event.revision
        );
        CatalogMetrics::record_event_updated();
        Ok(Reconciled::updated(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ChangeType;
    use crate::domain::{EventDate, VenueRecord};
    use crate::storage::InMemoryStorage;
    use chrono::TimeZone;

    fn jazz_night() -> EventRecord {
        EventRecord {
            remote_id: 42,
            name: "Jazz Night".to_string(),
            description: "Live jazz".to_string(),
            event_date: Some(EventDate::at(Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap())),
            created_date: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            remote_url: "http://x/42".to_string(),
            venue: VenueRecord { remote_id: 7, name: "Blue Note".to_string() },
        }
    }

    async fn stored_venue(storage: &InMemoryStorage, remote_id: i64) -> Venue {
        let mut venue = Venue::new(&VenueRecord { remote_id, name: format!("Venue {}", remote_id) });
        storage.create_venue(&mut venue).await.unwrap();
        venue
    }

    #[tokio::test]
    async fn test_creates_published_event() {
        let storage = Arc::new(InMemoryStorage::new());
        let venue = stored_venue(&storage, 7).await;
        let reconciler = EventReconciler::new(storage.clone(), &ReconcileConfig::default());

        let result = reconciler.reconcile_event(&venue, &jazz_night()).await.unwrap();
        assert_eq!(result.change, ChangeType::Created);

        let event = result.entity;
        assert!(event.id.is_some());
        assert_eq!(event.external_event_id, 42);
        assert_eq!(event.title, "Jazz Night");
        assert_eq!(event.external_url, "http://x/42");
        assert_eq!(event.venue_id, venue.id.unwrap());
        assert!(event.published);
        assert_eq!(event.revision, 1);
        assert_eq!(event.created_at, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(event.updated_at, event.created_at);
    }

    #[tokio::test]
    async fn test_update_overwrites_only_mutable_fields() {
        let storage = Arc::new(InMemoryStorage::new());
        let venue = stored_venue(&storage, 7).await;
        let other_venue = stored_venue(&storage, 8).await;
        let reconciler = EventReconciler::new(storage.clone(), &ReconcileConfig::default());

        let created = reconciler
            .reconcile_event(&venue, &jazz_night())
            .await
            .unwrap()
            .entity;

        let mut resync = jazz_night();
        resync.name = "Jazz Night (Rescheduled)".to_string();
        resync.description = "Live jazz, now later".to_string();
        resync.event_date = Some(EventDate::at(Utc.with_ymd_and_hms(2024, 6, 1, 21, 0, 0).unwrap()));
        resync.remote_url = "http://x/42-new".to_string();
        resync.created_date = Some(Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap());

        let result = reconciler.reconcile_event(&other_venue, &resync).await.unwrap();
        assert_eq!(result.change, ChangeType::Updated);

        let updated = result.entity;
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.title, "Jazz Night (Rescheduled)");
        assert_eq!(updated.description, "Live jazz, now later");
        assert_eq!(updated.event_date, resync.event_date);
        assert_eq!(updated.external_url, "http://x/42");
        assert_eq!(updated.venue_id, venue.id.unwrap());
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.revision, 2);

        let revisions = storage.get_event_revisions(created.id.unwrap()).await.unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].snapshot, created);
        assert_eq!(
            revisions[0].log_message,
            "Updated event: title, description, event_date"
        );
    }

    #[tokio::test]
    async fn test_identical_resync_still_records_revision() {
        let storage = Arc::new(InMemoryStorage::new());
        let venue = stored_venue(&storage, 7).await;
        let reconciler = EventReconciler::new(storage.clone(), &ReconcileConfig::default());

        let created = reconciler.reconcile_event(&venue, &jazz_night()).await.unwrap().entity;
        let again = reconciler.reconcile_event(&venue, &jazz_night()).await.unwrap();
        assert_eq!(again.change, ChangeType::Updated);
        assert_eq!(again.entity.revision, 2);

        let revisions = storage.get_event_revisions(created.id.unwrap()).await.unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].log_message, "No field changes");
    }

    #[tokio::test]
    async fn test_venue_without_id_is_an_invariant_error() {
        let storage = Arc::new(InMemoryStorage::new());
        let reconciler = EventReconciler::new(storage.clone(), &ReconcileConfig::default());
        let unsaved = Venue::new(&VenueRecord { remote_id: 7, name: "Blue Note".to_string() });

        let err = reconciler.reconcile_event(&unsaved, &jazz_night()).await.unwrap_err();
        assert!(matches!(err, PullError::Invariant { .. }));
        assert!(storage.find_events_by_external_id(42).await.unwrap().is_empty());
    }
}
