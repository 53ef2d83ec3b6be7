use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Event as delivered by the upstream source, after parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub remote_id: i64,
    pub name: String,
    pub description: String,
    pub event_date: Option<EventDate>,
    pub created_date: Option<DateTime<Utc>>,
    pub remote_url: String,
    pub venue: VenueRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueRecord {
    pub remote_id: i64,
    pub name: String,
}

/// A single point in time, or a range when `end` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDate {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl EventDate {
    pub fn at(start: DateTime<Utc>) -> Self {
        Self { start, end: None }
    }

    pub fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end: Some(end) }
    }
}

impl fmt::Display for EventDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{} - {}", self.start.to_rfc3339(), end.to_rfc3339()),
            None => write!(f, "{}", self.start.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: Option<Uuid>,
    pub external_venue_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<Uuid>,
    pub external_event_id: i64,
    pub title: String,
    pub description: String,
    pub event_date: Option<EventDate>,
    pub external_url: String,
    pub venue_id: Uuid,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Starts at 1 on create, bumped by storage on every update.
    pub revision: u32,
}

/// Prior state of an event, captured when the event was overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRevision {
    pub event_id: Uuid,
    pub revision: u32,
    pub snapshot: Event,
    pub log_message: String,
    pub recorded_at: DateTime<Utc>,
}

impl Venue {
    pub fn new(record: &VenueRecord) -> Self {
        Self {
            id: None,
            external_venue_id: record.remote_id,
            name: record.name.clone(),
            created_at: Utc::now(),
        }
    }
}

impl Event {
    /// Build a published, not yet persisted event for `record` hosted at `venue_id`.
    ///
    /// Both timestamps come from the payload's created date, falling back to
    /// `now` when the source did not send one.
    pub fn from_record(record: &EventRecord, venue_id: Uuid, now: DateTime<Utc>) -> Self {
        let created = record.created_date.unwrap_or(now);
        Self {
            id: None,
            external_event_id: record.remote_id,
            title: record.name.clone(),
            description: record.description.clone(),
            event_date: record.event_date,
            external_url: record.remote_url.clone(),
            venue_id,
            published: true,
            created_at: created,
            updated_at: created,
            revision: 1,
        }
    }
}
