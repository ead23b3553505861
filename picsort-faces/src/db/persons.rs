//! Per-event person identities

use chrono::{DateTime, Utc};
use picsort_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{events, parse_guid, parse_timestamp};

#[derive(Debug, Clone, PartialEq)]
pub struct EventPerson {
    pub guid: Uuid,
    pub name: String,
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Person listing entry with one photo to show for them
#[derive(Debug, Clone, PartialEq)]
pub struct PersonSummary {
    pub person: EventPerson,
    /// Storage key of the earliest photo the person appears in
    pub cover_storage_key: Option<String>,
    pub cover_photo_id: Option<Uuid>,
}

fn person_from_row(row: &SqliteRow) -> Result<EventPerson> {
    Ok(EventPerson {
        guid: parse_guid(row.get("guid"))?,
        name: row.get("name"),
        event_id: parse_guid(row.get("event_id"))?,
        created_at: parse_timestamp(row.get("created_at"))?,
    })
}

/// Create a person in the event, named "person N" where N is one more than
/// the persons already in the event
pub async fn create_person(conn: &mut SqliteConnection, event_id: Uuid) -> Result<EventPerson> {
    let existing = count_for_event(conn, event_id).await?;

    let person = EventPerson {
        guid: Uuid::new_v4(),
        name: format!("person {}", existing + 1),
        event_id,
        created_at: Utc::now(),
    };

    sqlx::query("INSERT INTO event_people (guid, name, event_id, created_at) VALUES (?, ?, ?, ?)")
        .bind(person.guid.to_string())
        .bind(&person.name)
        .bind(person.event_id.to_string())
        .bind(person.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;

    events::touch_event(conn, event_id).await?;

    Ok(person)
}

/// Load person by id
pub async fn load_person(conn: &mut SqliteConnection, person_id: Uuid) -> Result<Option<EventPerson>> {
    let row = sqlx::query("SELECT guid, name, event_id, created_at FROM event_people WHERE guid = ?")
        .bind(person_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(person_from_row).transpose()
}

/// Rename a person
pub async fn rename_person(conn: &mut SqliteConnection, person_id: Uuid, name: &str) -> Result<EventPerson> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("person name must not be empty".to_string()));
    }

    let mut person = load_person(conn, person_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("person {}", person_id)))?;

    sqlx::query("UPDATE event_people SET name = ? WHERE guid = ?")
        .bind(trimmed)
        .bind(person_id.to_string())
        .execute(&mut *conn)
        .await?;

    events::touch_event(conn, person.event_id).await?;

    person.name = trimmed.to_string();
    Ok(person)
}

/// Persons of an event, each with the earliest photo they appear in
pub async fn list_for_event(conn: &mut SqliteConnection, event_id: Uuid) -> Result<Vec<PersonSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT ep.guid, ep.name, ep.event_id, ep.created_at,
            (SELECT p.storage_key FROM face_detections fd
                JOIN photos p ON p.guid = fd.photo_id
                WHERE fd.person_id = ep.guid
                ORDER BY p.created_at, p.guid LIMIT 1) AS cover_storage_key,
            (SELECT p.guid FROM face_detections fd
                JOIN photos p ON p.guid = fd.photo_id
                WHERE fd.person_id = ep.guid
                ORDER BY p.created_at, p.guid LIMIT 1) AS cover_photo_id
        FROM event_people ep
        WHERE ep.event_id = ?
        ORDER BY ep.created_at, ep.guid
        "#,
    )
    .bind(event_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            let cover_photo_id: Option<String> = row.get("cover_photo_id");
            Ok(PersonSummary {
                person: person_from_row(row)?,
                cover_storage_key: row.get("cover_storage_key"),
                cover_photo_id: super::parse_optional_guid(cover_photo_id)?,
            })
        })
        .collect()
}

/// Count persons in an event
pub async fn count_for_event(conn: &mut SqliteConnection, event_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM event_people WHERE event_id = ?")
        .bind(event_id.to_string())
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}
