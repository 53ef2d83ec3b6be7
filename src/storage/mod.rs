use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Event, EventRevision, Venue};
use crate::error::StorageResult;

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStorage;
pub use sqlite::SqliteStorage;

/// Storage trait for venues, events and the event revision log.
///
/// Implementations must reject a second venue or event with the same external
/// id with [`crate::error::StorageError::UniqueViolation`]. Find methods return
/// matches in storage order, oldest first.
#[async_trait]
pub trait Storage: Send + Sync {
    // Venue operations
    async fn find_venues_by_external_id(&self, external_id: i64) -> StorageResult<Vec<Venue>>;
    /// Persist a new venue and assign its id.
    async fn create_venue(&self, venue: &mut Venue) -> StorageResult<()>;
    async fn get_venue_by_id(&self, venue_id: Uuid) -> StorageResult<Option<Venue>>;

    // Event operations
    async fn find_events_by_external_id(&self, external_id: i64) -> StorageResult<Vec<Event>>;
    /// Persist a new event, assign its id and set it to revision 1.
    async fn create_event(&self, event: &mut Event) -> StorageResult<()>;
    /// Overwrite a stored event. The stored state is appended to the revision
    /// log first, and `event.revision` is bumped past it.
    async fn update_event(&self, event: &mut Event, log_message: &str) -> StorageResult<()>;
    async fn get_event_by_id(&self, event_id: Uuid) -> StorageResult<Option<Event>>;

    // Revision log, oldest first
    async fn get_event_revisions(&self, event_id: Uuid) -> StorageResult<Vec<EventRevision>>;
}
