use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::Storage;
use crate::domain::{Event, EventDate, EventRevision, Venue};
use crate::error::{StorageError, StorageResult};

// Extended result code for a violated UNIQUE index.
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

// How long a write waits on another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
    PRAGMA foreign_keys=ON;
    CREATE TABLE IF NOT EXISTS venues (
        id                 TEXT PRIMARY KEY,
        external_venue_id  INTEGER NOT NULL UNIQUE,
        name               TEXT NOT NULL,
        created_at         TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS events (
        id                 TEXT PRIMARY KEY,
        external_event_id  INTEGER NOT NULL UNIQUE,
        title              TEXT NOT NULL,
        description        TEXT NOT NULL,
        event_start        TEXT,
        event_end          TEXT,
        external_url       TEXT NOT NULL,
        venue_id           TEXT NOT NULL REFERENCES venues(id),
        published          INTEGER NOT NULL,
        created_at         TEXT NOT NULL,
        updated_at         TEXT NOT NULL,
        revision           INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS event_revisions (
        event_id     TEXT NOT NULL REFERENCES events(id),
        revision     INTEGER NOT NULL,
        snapshot     TEXT NOT NULL,
        log_message  TEXT NOT NULL,
        recorded_at  TEXT NOT NULL,
        PRIMARY KEY (event_id, revision)
    );
"#;

const EVENT_COLUMNS: &str = "id, external_event_id, title, description, event_start, event_end, \
     external_url, venue_id, published, created_at, updated_at, revision";

/// SQLite-backed storage. External ids carry UNIQUE indexes, so concurrent
/// creators of the same venue or event lose with `UniqueViolation`.
///
/// Several handles (or processes) may share one database file. Writers queue
/// on the file lock for up to [`BUSY_TIMEOUT`] instead of failing at once.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::backend(format!(
                    "Failed to create database directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::backend("SQLite connection lock poisoned"))
    }
}

fn map_insert_error(err: rusqlite::Error, entity: &'static str, external_id: i64) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == SQLITE_CONSTRAINT_UNIQUE => {
            StorageError::UniqueViolation {
                entity,
                external_id,
            }
        }
        _ => StorageError::Sqlite(err),
    }
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::backend(format!("Invalid stored timestamp '{}': {}", raw, e)))
}

fn parse_uuid(raw: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| StorageError::backend(format!("Invalid stored id '{}': {}", raw, e)))
}

struct VenueRow {
    id: String,
    external_venue_id: i64,
    name: String,
    created_at: String,
}

impl VenueRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            external_venue_id: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn into_venue(self) -> StorageResult<Venue> {
        Ok(Venue {
            id: Some(parse_uuid(&self.id)?),
            external_venue_id: self.external_venue_id,
            name: self.name,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct EventRow {
    id: String,
    external_event_id: i64,
    title: String,
    description: String,
    event_start: Option<String>,
    event_end: Option<String>,
    external_url: String,
    venue_id: String,
    published: bool,
    created_at: String,
    updated_at: String,
    revision: u32,
}

impl EventRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            external_event_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            event_start: row.get(4)?,
            event_end: row.get(5)?,
            external_url: row.get(6)?,
            venue_id: row.get(7)?,
            published: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            revision: row.get(11)?,
        })
    }

    fn into_event(self) -> StorageResult<Event> {
        let event_date = match self.event_start {
            Some(start) => Some(EventDate {
                start: parse_timestamp(&start)?,
                end: self.event_end.as_deref().map(parse_timestamp).transpose()?,
            }),
            None => None,
        };
        Ok(Event {
            id: Some(parse_uuid(&self.id)?),
            external_event_id: self.external_event_id,
            title: self.title,
            description: self.description,
            event_date,
            external_url: self.external_url,
            venue_id: parse_uuid(&self.venue_id)?,
            published: self.published,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            revision: self.revision,
        })
    }
}

fn event_bounds(event: &Event) -> (Option<String>, Option<String>) {
    match event.event_date {
        Some(date) => (
            Some(date.start.to_rfc3339()),
            date.end.map(|end| end.to_rfc3339()),
        ),
        None => (None, None),
    }
}

fn select_event(conn: &Connection, event_id: Uuid) -> StorageResult<Option<Event>> {
    let sql = format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS);
    let row = conn
        .query_row(&sql, params![event_id.to_string()], EventRow::from_row)
        .optional()?;
    row.map(EventRow::into_event).transpose()
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn find_venues_by_external_id(&self, external_id: i64) -> StorageResult<Vec<Venue>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, external_venue_id, name, created_at FROM venues
             WHERE external_venue_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map(params![external_id], VenueRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(VenueRow::into_venue).collect()
    }

    async fn create_venue(&self, venue: &mut Venue) -> StorageResult<()> {
        let id = Uuid::new_v4();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO venues (id, external_venue_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                id.to_string(),
                venue.external_venue_id,
                venue.name,
                venue.created_at.to_rfc3339()
            ],
        )
        .map_err(|e| map_insert_error(e, "venue", venue.external_venue_id))?;

        venue.id = Some(id);
        debug!("Created venue: {} with id {}", venue.name, id);
        Ok(())
    }

    async fn get_venue_by_id(&self, venue_id: Uuid) -> StorageResult<Option<Venue>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, external_venue_id, name, created_at FROM venues WHERE id = ?1",
                params![venue_id.to_string()],
                VenueRow::from_row,
            )
            .optional()?;
        row.map(VenueRow::into_venue).transpose()
    }

    async fn find_events_by_external_id(&self, external_id: i64) -> StorageResult<Vec<Event>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM events WHERE external_event_id = ?1 ORDER BY rowid",
            EVENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![external_id], EventRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(EventRow::into_event).collect()
    }

    async fn create_event(&self, event: &mut Event) -> StorageResult<()> {
        let id = Uuid::new_v4();
        let (event_start, event_end) = event_bounds(event);
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO events ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1)",
                EVENT_COLUMNS
            ),
            params![
                id.to_string(),
                event.external_event_id,
                event.title,
                event.description,
                event_start,
                event_end,
                event.external_url,
                event.venue_id.to_string(),
                event.published,
                event.created_at.to_rfc3339(),
                event.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| map_insert_error(e, "event", event.external_event_id))?;

        event.id = Some(id);
        event.revision = 1;
        debug!("Created event: {} with id {}", event.title, id);
        Ok(())
    }

    async fn update_event(&self, event: &mut Event, log_message: &str) -> StorageResult<()> {
        let event_id = event
            .id
            .ok_or_else(|| StorageError::backend("Cannot update event without ID"))?;

        let mut conn = self.conn()?;
        // Take the write lock before reading so the snapshot cannot go stale
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored = select_event(&tx, event_id)?.ok_or_else(|| StorageError::NotFound {
            entity: "event",
            id: event_id.to_string(),
        })?;
        let snapshot = serde_json::to_string(&stored)
            .map_err(|e| StorageError::backend(format!("Failed to encode revision: {}", e)))?;

        tx.execute(
            "INSERT INTO event_revisions (event_id, revision, snapshot, log_message, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event_id.to_string(),
                stored.revision,
                snapshot,
                log_message,
                Utc::now().to_rfc3339()
            ],
        )?;

        let next_revision = stored.revision + 1;
        let (event_start, event_end) = event_bounds(event);
        tx.execute(
            "UPDATE events SET title = ?2, description = ?3, event_start = ?4, event_end = ?5,
                 external_url = ?6, venue_id = ?7, published = ?8, created_at = ?9,
                 updated_at = ?10, revision = ?11
             WHERE id = ?1",
            params![
                event_id.to_string(),
                event.title,
                event.description,
                event_start,
                event_end,
                event.external_url,
                event.venue_id.to_string(),
                event.published,
                event.created_at.to_rfc3339(),
                event.updated_at.to_rfc3339(),
                next_revision,
            ],
        )?;
        tx.commit()?;

        event.revision = next_revision;
        debug!(
            "Updated event: {} with id {} to revision {}",
            event.title, event_id, next_revision
        );
        Ok(())
    }

    async fn get_event_by_id(&self, event_id: Uuid) -> StorageResult<Option<Event>> {
        let conn = self.conn()?;
        select_event(&conn, event_id)
    }

    async fn get_event_revisions(&self, event_id: Uuid) -> StorageResult<Vec<EventRevision>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT revision, snapshot, log_message, recorded_at FROM event_revisions
             WHERE event_id = ?1 ORDER BY revision",
        )?;
        let rows = stmt
            .query_map(params![event_id.to_string()], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(revision, snapshot, log_message, recorded_at)| {
                let snapshot: Event = serde_json::from_str(&snapshot).map_err(|e| {
                    StorageError::backend(format!("Failed to decode revision {}: {}", revision, e))
                })?;
                Ok(EventRevision {
                    event_id,
                    revision,
                    snapshot,
                    log_message,
                    recorded_at: parse_timestamp(&recorded_at)?,
                })
            })
            .collect()
    }
}
