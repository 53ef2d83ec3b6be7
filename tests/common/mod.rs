#![allow(dead_code)]

use async_trait::async_trait;
use event_pull::config::ReconcileConfig;
use event_pull::domain::{Event, EventRevision, Venue};
use event_pull::error::{StorageError, StorageResult};
use event_pull::storage::{InMemoryStorage, Storage};
use event_pull::PulledEventJob;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub fn jazz_night() -> Value {
    json!({
        "remoteId": 42,
        "name": "Jazz Night",
        "description": "Live jazz",
        "eventDate": "2024-05-01T20:00",
        "createdDate": "2024-01-01T00:00",
        "remoteUrl": "http://x/42",
        "venue": { "remoteId": 7, "name": "Blue Note" }
    })
}

pub fn job(storage: Arc<dyn Storage>) -> PulledEventJob {
    PulledEventJob::new(storage, &ReconcileConfig::default())
}

/// Wraps an in-memory store and misbehaves on request.
#[derive(Default)]
pub struct ScriptedStorage {
    pub inner: InMemoryStorage,
    /// Venue finds still to answer with nothing, as if another job had not committed yet
    pub hidden_venue_finds: AtomicUsize,
    pub hidden_event_finds: AtomicUsize,
    pub fail_event_writes: AtomicBool,
    /// Answer every venue find with these rows instead of the stored ones
    pub fixed_venues: Option<Vec<Venue>>,
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Storage for ScriptedStorage {
    async fn find_venues_by_external_id(&self, external_id: i64) -> StorageResult<Vec<Venue>> {
        if let Some(fixed) = &self.fixed_venues {
            return Ok(fixed.clone());
        }
        if take(&self.hidden_venue_finds) {
            return Ok(vec![]);
        }
        self.inner.find_venues_by_external_id(external_id).await
    }

    async fn create_venue(&self, venue: &mut Venue) -> StorageResult<()> {
        self.inner.create_venue(venue).await
    }

    async fn get_venue_by_id(&self, venue_id: Uuid) -> StorageResult<Option<Venue>> {
        self.inner.get_venue_by_id(venue_id).await
    }

    async fn find_events_by_external_id(&self, external_id: i64) -> StorageResult<Vec<Event>> {
        if take(&self.hidden_event_finds) {
            return Ok(vec![]);
        }
        self.inner.find_events_by_external_id(external_id).await
    }

    async fn create_event(&self, event: &mut Event) -> StorageResult<()> {
        if self.fail_event_writes.load(Ordering::SeqCst) {
            return Err(StorageError::backend("database is locked"));
        }
        self.inner.create_event(event).await
    }

    async fn update_event(&self, event: &mut Event, log_message: &str) -> StorageResult<()> {
        if self.fail_event_writes.load(Ordering::SeqCst) {
            return Err(StorageError::backend("database is locked"));
        }
        self.inner.update_event(event, log_message).await
    }

    async fn get_event_by_id(&self, event_id: Uuid) -> StorageResult<Option<Event>> {
        self.inner.get_event_by_id(event_id).await
    }

    async fn get_event_revisions(&self, event_id: Uuid) -> StorageResult<Vec<EventRevision>> {
        self.inner.get_event_revisions(event_id).await
    }
}
