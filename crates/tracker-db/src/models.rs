//! Row types that map directly to SQLite rows.
//! Conversions into `tracker_types` models live here so callers never see
//! the password column or raw text timestamps.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tracker_types::models::{ArrestEvent, Media, Subscription, User};

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password: String,
    pub role: String,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            email: row.email,
            role: row.role.parse()?,
        })
    }
}

pub struct EventRow {
    pub id: i64,
    pub time: String,
    pub latitude: f64,
    pub longitude: f64,
    pub police_count: u32,
    pub arrested_count: u32,
    pub car_plates: Option<String>,
    pub notes: Option<String>,
    pub created_by: i64,
}

impl TryFrom<EventRow> for ArrestEvent {
    type Error = anyhow::Error;

    fn try_from(row: EventRow) -> Result<Self> {
        let time = DateTime::parse_from_rfc3339(&row.time)
            .with_context(|| format!("bad timestamp on event {}: {}", row.id, row.time))?
            .with_timezone(&Utc);

        Ok(ArrestEvent {
            id: row.id,
            time,
            latitude: row.latitude,
            longitude: row.longitude,
            police_count: row.police_count,
            arrested_count: row.arrested_count,
            car_plates: row.car_plates,
            notes: row.notes,
            created_by: row.created_by,
        })
    }
}

/// Mutable columns of an event, used for both insert and update.
/// The creator is passed separately on insert and never updated.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub police_count: u32,
    pub arrested_count: u32,
    pub car_plates: Option<String>,
    pub notes: Option<String>,
}

pub struct MediaRow {
    pub id: i64,
    pub event_id: i64,
    pub file_path: String,
    pub kind: String,
}

impl TryFrom<MediaRow> for Media {
    type Error = anyhow::Error;

    fn try_from(row: MediaRow) -> Result<Self> {
        Ok(Media {
            id: row.id,
            event_id: row.event_id,
            file_path: row.file_path,
            kind: row.kind.parse()?,
        })
    }
}

pub struct SubscriptionRow {
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Subscription {
            id: row.id,
            event_id: row.event_id,
            user_id: row.user_id,
        }
    }
}

/// Canonical text form for stored timestamps. Fixed width so that text
/// ordering matches time ordering.
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}
