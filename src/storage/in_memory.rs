use super::Storage;
use crate::domain::{Event, EventRevision, Venue};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// In-memory storage implementation for development/testing.
///
/// Rows are kept in insertion order, which is the storage order find methods
/// report. Uniqueness of external ids is enforced like a unique index would.
pub struct InMemoryStorage {
    venues: Mutex<Vec<Venue>>,
    events: Mutex<Vec<Event>>,
    revisions: Mutex<Vec<EventRevision>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            venues: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            revisions: Mutex::new(Vec::new()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StorageError::backend("in-memory storage lock poisoned"))
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn find_venues_by_external_id(&self, external_id: i64) -> StorageResult<Vec<Venue>> {
        let venues = lock(&self.venues)?;
        Ok(venues
            .iter()
            .filter(|v| v.external_venue_id == external_id)
            .cloned()
            .collect())
    }

    async fn create_venue(&self, venue: &mut Venue) -> StorageResult<()> {
        let mut venues = lock(&self.venues)?;
        if venues
            .iter()
            .any(|v| v.external_venue_id == venue.external_venue_id)
        {
            return Err(StorageError::UniqueViolation {
                entity: "venue",
                external_id: venue.external_venue_id,
            });
        }

        let id = Uuid::new_v4();
        venue.id = Some(id);
        venues.push(venue.clone());

        debug!("Created venue: {} with id {}", venue.name, id);
        Ok(())
    }

    async fn get_venue_by_id(&self, venue_id: Uuid) -> StorageResult<Option<Venue>> {
        let venues = lock(&self.venues)?;
        Ok(venues.iter().find(|v| v.id == Some(venue_id)).cloned())
    }

    async fn find_events_by_external_id(&self, external_id: i64) -> StorageResult<Vec<Event>> {
        let events = lock(&self.events)?;
        Ok(events
            .iter()
            .filter(|e| e.external_event_id == external_id)
            .cloned()
            .collect())
    }

    async fn create_event(&self, event: &mut Event) -> StorageResult<()> {
        let mut events = lock(&self.events)?;
        if events
            .iter()
            .any(|e| e.external_event_id == event.external_event_id)
        {
            return Err(StorageError::UniqueViolation {
                entity: "event",
                external_id: event.external_event_id,
            });
        }

        let id = Uuid::new_v4();
        event.id = Some(id);
        event.revision = 1;
        events.push(event.clone());

        debug!("Created event: {} with id {}", event.title, id);
        Ok(())
    }

    async fn update_event(&self, event: &mut Event, log_message: &str) -> StorageResult<()> {
        let event_id = event
            .id
            .ok_or_else(|| StorageError::backend("Cannot update event without ID"))?;

        let mut events = lock(&self.events)?;
        let stored = events
            .iter_mut()
            .find(|e| e.id == Some(event_id))
            .ok_or_else(|| StorageError::NotFound {
                entity: "event",
                id: event_id.to_string(),
            })?;

        let mut revisions = lock(&self.revisions)?;
        revisions.push(EventRevision {
            event_id,
            revision: stored.revision,
            snapshot: stored.clone(),
            log_message: log_message.to_string(),
            recorded_at: Utc::now(),
        });

        event.revision = stored.revision + 1;
        *stored = event.clone();

        debug!(
            "Updated event: {} with id {} to revision {}",
            event.title, event_id, event.revision
        );
        Ok(())
    }

    async fn get_event_by_id(&self, event_id: Uuid) -> StorageResult<Option<Event>> {
        let events = lock(&self.events)?;
        Ok(events.iter().find(|e| e.id == Some(event_id)).cloned())
    }

    async fn get_event_revisions(&self, event_id: Uuid) -> StorageResult<Vec<EventRevision>> {
        let revisions = lock(&self.revisions)?;
        Ok(revisions
            .iter()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect())
    }
}
