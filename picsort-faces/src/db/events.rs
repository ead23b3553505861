//! Event rows
//!
//! Events are created and edited elsewhere; the pipeline only needs to own
//! the row that photos, detections and persons hang off, and to cascade its
//! deletion.

use chrono::{DateTime, Utc};
use picsort_common::Result;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{parse_guid, parse_timestamp};

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub guid: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert a new event
pub async fn create_event(conn: &mut SqliteConnection, name: &str) -> Result<Event> {
    let now = Utc::now();
    let event = Event {
        guid: Uuid::new_v4(),
        name: name.to_string(),
        created_at: now,
        updated_at: now,
    };

    sqlx::query("INSERT INTO events (guid, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(event.guid.to_string())
        .bind(&event.name)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *conn)
        .await?;

    Ok(event)
}

/// Load event by id
pub async fn load_event(conn: &mut SqliteConnection, event_id: Uuid) -> Result<Option<Event>> {
    let row = sqlx::query("SELECT guid, name, created_at, updated_at FROM events WHERE guid = ?")
        .bind(event_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(Some(Event {
            guid: parse_guid(row.get("guid"))?,
            name: row.get("name"),
            created_at: parse_timestamp(row.get("created_at"))?,
            updated_at: parse_timestamp(row.get("updated_at"))?,
        })),
        None => Ok(None),
    }
}

/// Bump the event's updated_at timestamp
pub async fn touch_event(conn: &mut SqliteConnection, event_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE events SET updated_at = ? WHERE guid = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(event_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Delete the event; photos, detections and persons cascade.
/// Returns false when no such event existed.
pub async fn delete_event(conn: &mut SqliteConnection, event_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM events WHERE guid = ?")
        .bind(event_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}
