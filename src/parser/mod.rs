//! Turns an untyped job payload into an [`EventRecord`].
//!
//! Only the two identifiers are strict. Everything else is read leniently so a
//! partially filled payload from the upstream source still produces a record.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

use crate::domain::{EventDate, EventRecord, VenueRecord};
use crate::error::{PullError, Result};

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a job payload. Fails with [`PullError::MalformedPayload`] when
/// `remoteId` or `venue.remoteId` is missing or not an integer.
pub fn parse(payload: &Value) -> Result<EventRecord> {
    if !payload.is_object() {
        return Err(PullError::MalformedPayload(
            "payload must be a JSON object".to_string(),
        ));
    }

    let remote_id = required_id(payload, "remoteId", "remoteId")?;

    let venue = payload.get("venue").unwrap_or(&Value::Null);
    if !venue.is_object() {
        return Err(PullError::missing_field("venue"));
    }
    let venue = VenueRecord {
        remote_id: required_id(venue, "remoteId", "venue.remoteId")?,
        name: lenient_string(venue.get("name")),
    };

    Ok(EventRecord {
        remote_id,
        name: lenient_string(payload.get("name")),
        description: lenient_string(payload.get("description")),
        event_date: parse_event_date(payload.get("eventDate")),
        created_date: date_field(payload.get("createdDate"), "createdDate"),
        remote_url: lenient_string(payload.get("remoteUrl")),
        venue,
    })
}

fn required_id(object: &Value, key: &str, field: &str) -> Result<i64> {
    match object.get(key) {
        None | Some(Value::Null) => Err(PullError::missing_field(field)),
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            PullError::MalformedPayload(format!("field '{}' is not an integer: {}", field, n))
        }),
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| {
            PullError::MalformedPayload(format!("field '{}' is not numeric: {:?}", field, s))
        }),
        Some(other) => Err(PullError::MalformedPayload(format!(
            "field '{}' is not numeric: {}",
            field, other
        ))),
    }
}

fn lenient_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        // Formatted text fields arrive as {"value": ..., "format": ...}
        Some(Value::Object(map)) => lenient_string(map.get("value")),
        _ => String::new(),
    }
}

fn parse_event_date(value: Option<&Value>) -> Option<EventDate> {
    match value {
        Some(Value::Object(map)) => {
            let start = map.get("value").or_else(|| map.get("start"));
            let end = map.get("end_value").or_else(|| map.get("end"));
            let start = date_field(start, "eventDate.start")?;
            Some(EventDate {
                start,
                end: date_field(end, "eventDate.end"),
            })
        }
        other => date_field(other, "eventDate").map(EventDate::at),
    }
}

/// Missing and null values are silently absent; anything present but
/// unreadable is traced and dropped.
fn date_field(value: Option<&Value>, field: &str) -> Option<DateTime<Utc>> {
    let value = match value {
        None | Some(Value::Null) => return None,
        Some(v) => v,
    };
    let parsed = parse_datetime(value);
    if parsed.is_none() {
        warn!(field, value = %value, "Ignoring unparseable date");
    }
    parsed
}

pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        Value::String(s) => parse_datetime_str(s),
        _ => None,
    }
}

fn parse_datetime_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    // Eight digits or fewer reads as a compact date, not epoch seconds
    if s.len() > 8 && s.chars().all(|c| c.is_ascii_digit()) {
        return s
            .parse::<i64>()
            .ok()
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
