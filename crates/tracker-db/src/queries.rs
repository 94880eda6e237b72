use crate::Database;
use crate::models::{EventRecord, EventRow, MediaRow, SubscriptionRow, UserRow, format_timestamp};
use anyhow::Result;
use rusqlite::{Connection, Row};
use tracker_types::models::{MediaType, Role};

impl Database {
    // -- Users --

    /// Insert a user. Returns `None` if the email is already taken; the
    /// existing row is left untouched.
    pub fn create_user(&self, email: &str, password_hash: &str, role: Role) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO users (email, password, role) VALUES (?1, ?2, ?3)",
                (email, password_hash, role.as_str()),
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            Ok(Some(conn.last_insert_rowid()))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, password, role FROM users WHERE email = ?1",
                [email],
                map_user,
            )
            .optional()
        })
    }

    // -- Events --

    pub fn list_events(&self) -> Result<Vec<EventRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, time, latitude, longitude, police_count, arrested_count,
                        car_plates, notes, created_by
                 FROM arrest_events
                 ORDER BY time DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([], map_event)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_event(&self, id: i64) -> Result<Option<EventRow>> {
        self.with_conn(|conn| query_event(conn, id))
    }

    pub fn event_exists(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM arrest_events WHERE id = ?1)",
                [id],
                |r| r.get(0),
            )?;
            Ok(found != 0)
        })
    }

    pub fn insert_event(&self, record: &EventRecord, created_by: i64) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO arrest_events
                    (time, latitude, longitude, police_count, arrested_count, car_plates, notes, created_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    format_timestamp(&record.time),
                    record.latitude,
                    record.longitude,
                    record.police_count,
                    record.arrested_count,
                    record.car_plates,
                    record.notes,
                    created_by,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Overwrite the mutable columns of an event. `created_by` is never
    /// touched. Returns false if no row matched.
    pub fn update_event(&self, id: i64, record: &EventRecord) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE arrest_events
                 SET time = ?1, latitude = ?2, longitude = ?3, police_count = ?4,
                     arrested_count = ?5, car_plates = ?6, notes = ?7
                 WHERE id = ?8",
                rusqlite::params![
                    format_timestamp(&record.time),
                    record.latitude,
                    record.longitude,
                    record.police_count,
                    record.arrested_count,
                    record.car_plates,
                    record.notes,
                    id,
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Delete an event. Media and subscription rows cascade.
    pub fn delete_event(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM arrest_events WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    // -- Media --

    pub fn insert_media(&self, event_id: i64, file_path: &str, kind: MediaType) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO media (event_id, file_path, type) VALUES (?1, ?2, ?3)",
                rusqlite::params![event_id, file_path, kind.as_str()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_media(&self, id: i64) -> Result<Option<MediaRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, event_id, file_path, type FROM media WHERE id = ?1",
                [id],
                map_media,
            )
            .optional()
        })
    }

    /// Media for one event, newest first.
    pub fn media_for_event(&self, event_id: i64) -> Result<Vec<MediaRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, event_id, file_path, type
                 FROM media
                 WHERE event_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([event_id], map_media)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_media(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM media WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    // -- Subscriptions --

    /// Idempotent: the `UNIQUE(event_id, user_id)` constraint absorbs
    /// duplicates. Returns true only when a new row was written.
    pub fn subscribe(&self, event_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO subscriptions (event_id, user_id) VALUES (?1, ?2)",
                [event_id, user_id],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Returns true if a row was removed. Absence is not an error.
    pub fn unsubscribe(&self, event_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM subscriptions WHERE event_id = ?1 AND user_id = ?2",
                [event_id, user_id],
            )?;
            Ok(removed > 0)
        })
    }

    /// Users subscribed to an event, in subscription order.
    pub fn subscribers(&self, event_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.email, u.password, u.role
                 FROM subscriptions s
                 JOIN users u ON s.user_id = u.id
                 WHERE s.event_id = ?1
                 ORDER BY s.id",
            )?;
            let rows = stmt
                .query_map([event_id], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_subscribers(&self, event_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM subscriptions WHERE event_id = ?1",
                [event_id],
                |r| r.get(0),
            )?;
            Ok(count as usize)
        })
    }

    pub fn subscriptions_for_user(&self, user_id: i64) -> Result<Vec<SubscriptionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, event_id, user_id FROM subscriptions WHERE user_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(SubscriptionRow {
                        id: row.get(0)?,
                        event_id: row.get(1)?,
                        user_id: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        role: row.get(3)?,
    })
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        time: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        police_count: row.get(4)?,
        arrested_count: row.get(5)?,
        car_plates: row.get(6)?,
        notes: row.get(7)?,
        created_by: row.get(8)?,
    })
}

fn map_media(row: &Row<'_>) -> rusqlite::Result<MediaRow> {
    Ok(MediaRow {
        id: row.get(0)?,
        event_id: row.get(1)?,
        file_path: row.get(2)?,
        kind: row.get(3)?,
    })
}

fn query_event(conn: &Connection, id: i64) -> Result<Option<EventRow>> {
    conn.query_row(
        "SELECT id, time, latitude, longitude, police_count, arrested_count,
                car_plates, notes, created_by
         FROM arrest_events
         WHERE id = ?1",
        [id],
        map_event,
    )
    .optional()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(hour: u32) -> EventRecord {
        EventRecord {
            time: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
            latitude: 1.0,
            longitude: 2.0,
            police_count: 4,
            arrested_count: 2,
            car_plates: Some("AB-123".into()),
            notes: None,
        }
    }

    fn db_with_user() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .create_user("a@x.com", "hash-1", Role::Spotter)
            .unwrap()
            .unwrap();
        (db, id)
    }

    #[test]
    fn duplicate_email_keeps_first_hash() {
        let (db, _) = db_with_user();

        let second = db.create_user("a@x.com", "hash-2", Role::Advocate).unwrap();
        assert!(second.is_none());

        let row = db.get_user_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(row.password, "hash-1");
        assert_eq!(row.role, "spotter");
    }

    #[test]
    fn email_lookup_is_case_sensitive() {
        let (db, _) = db_with_user();
        assert!(db.get_user_by_email("A@X.com").unwrap().is_none());
    }

    #[test]
    fn events_list_newest_first() {
        let (db, user) = db_with_user();
        let early = db.insert_event(&record(8), user).unwrap();
        let late = db.insert_event(&record(20), user).unwrap();
        let mid = db.insert_event(&record(12), user).unwrap();

        let ids: Vec<i64> = db.list_events().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![late, mid, early]);
    }

    #[test]
    fn update_never_touches_creator() {
        let (db, user) = db_with_user();
        let id = db.insert_event(&record(8), user).unwrap();

        let mut changed = record(9);
        changed.notes = Some("moved".into());
        assert!(db.update_event(id, &changed).unwrap());

        let row = db.get_event(id).unwrap().unwrap();
        assert_eq!(row.created_by, user);
        assert_eq!(row.notes.as_deref(), Some("moved"));
        assert!(!db.update_event(id + 100, &changed).unwrap());
    }

    #[test]
    fn subscribe_twice_keeps_one_row() {
        let (db, user) = db_with_user();
        let event = db.insert_event(&record(8), user).unwrap();

        assert!(db.subscribe(event, user).unwrap());
        assert!(!db.subscribe(event, user).unwrap());
        assert_eq!(db.count_subscribers(event).unwrap(), 1);
        assert_eq!(db.subscriptions_for_user(user).unwrap().len(), 1);

        assert!(db.unsubscribe(event, user).unwrap());
        assert!(!db.unsubscribe(event, user).unwrap());
        assert_eq!(db.count_subscribers(event).unwrap(), 0);
    }

    #[test]
    fn deleting_event_cascades_children() {
        let (db, user) = db_with_user();
        let event = db.insert_event(&record(8), user).unwrap();
        db.subscribe(event, user).unwrap();
        let media = db.insert_media(event, "media/event_1/1_a.jpg", MediaType::Photo).unwrap();

        assert!(db.delete_event(event).unwrap());
        assert!(db.get_media(media).unwrap().is_none());
        assert_eq!(db.count_subscribers(event).unwrap(), 0);
        assert!(!db.event_exists(event).unwrap());
    }

    #[test]
    fn media_rejects_unknown_event() {
        let (db, _) = db_with_user();
        assert!(db.insert_media(999, "x", MediaType::Video).is_err());
    }
}
