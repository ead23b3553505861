//! Photo rows
//!
//! A photo is written once, inside the same transaction as its detections,
//! and afterwards only read or deleted.

use chrono::{DateTime, Utc};
use picsort_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{parse_guid, parse_timestamp};

#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    pub guid: Uuid,
    /// Object-store key; globally unique
    pub storage_key: String,
    pub event_id: Uuid,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Photo {
    pub fn new(storage_key: impl Into<String>, event_id: Uuid, uploaded_by: Uuid) -> Self {
        Self {
            guid: Uuid::new_v4(),
            storage_key: storage_key.into(),
            event_id,
            uploaded_by,
            created_at: Utc::now(),
        }
    }
}

fn photo_from_row(row: &SqliteRow) -> Result<Photo> {
    Ok(Photo {
        guid: parse_guid(row.get("guid"))?,
        storage_key: row.get("storage_key"),
        event_id: parse_guid(row.get("event_id"))?,
        uploaded_by: parse_guid(row.get("uploaded_by"))?,
        created_at: parse_timestamp(row.get("created_at"))?,
    })
}

/// Insert a photo. A duplicate storage key is reported as `Error::Conflict`.
pub async fn insert_photo(conn: &mut SqliteConnection, photo: &Photo) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO photos (guid, storage_key, event_id, uploaded_by, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(photo.guid.to_string())
    .bind(&photo.storage_key)
    .bind(photo.event_id.to_string())
    .bind(photo.uploaded_by.to_string())
    .bind(photo.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::from_insert(e, format!("photo with storage key '{}'", photo.storage_key)))?;

    Ok(())
}

/// Load photo by id
pub async fn load_photo(conn: &mut SqliteConnection, photo_id: Uuid) -> Result<Option<Photo>> {
    let row = sqlx::query(
        "SELECT guid, storage_key, event_id, uploaded_by, created_at FROM photos WHERE guid = ?",
    )
    .bind(photo_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(photo_from_row).transpose()
}

/// Load photo by storage key
pub async fn load_photo_by_key(conn: &mut SqliteConnection, storage_key: &str) -> Result<Option<Photo>> {
    let row = sqlx::query(
        "SELECT guid, storage_key, event_id, uploaded_by, created_at FROM photos WHERE storage_key = ?",
    )
    .bind(storage_key)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(photo_from_row).transpose()
}

/// All storage keys belonging to an event
pub async fn storage_keys_for_event(conn: &mut SqliteConnection, event_id: Uuid) -> Result<Vec<String>> {
    let keys = sqlx::query_scalar("SELECT storage_key FROM photos WHERE event_id = ? ORDER BY created_at")
        .bind(event_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    Ok(keys)
}

/// Every photo of an event, oldest first
pub async fn photos_for_event(conn: &mut SqliteConnection, event_id: Uuid) -> Result<Vec<Photo>> {
    let rows = sqlx::query(
        "SELECT guid, storage_key, event_id, uploaded_by, created_at FROM photos WHERE event_id = ? ORDER BY created_at, guid",
    )
    .bind(event_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(photo_from_row).collect()
}

/// Distinct photos in which the person was detected
pub async fn photos_for_person(conn: &mut SqliteConnection, person_id: Uuid) -> Result<Vec<Photo>> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT p.guid, p.storage_key, p.event_id, p.uploaded_by, p.created_at
        FROM photos p
        JOIN face_detections fd ON fd.photo_id = p.guid
        WHERE fd.person_id = ?
        ORDER BY p.created_at, p.guid
        "#,
    )
    .bind(person_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(photo_from_row).collect()
}

/// Count photos in an event
pub async fn count_for_event(conn: &mut SqliteConnection, event_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM photos WHERE event_id = ?")
        .bind(event_id.to_string())
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Delete a photo; its detections cascade. Returns false when absent.
pub async fn delete_photo(conn: &mut SqliteConnection, photo_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM photos WHERE guid = ?")
        .bind(photo_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}
