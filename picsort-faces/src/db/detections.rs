//! Face detection rows
//!
//! One row per face the oracle indexed. `person_id` starts out NULL and is
//! set by the identity resolver; once set it never changes to a different
//! person.

use chrono::{DateTime, Utc};
use picsort_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::{parse_guid, parse_optional_guid, parse_timestamp};

#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    pub guid: Uuid,
    /// Face id assigned by the recognition oracle
    pub external_face_id: String,
    /// Oracle detection confidence (percent)
    pub confidence: f32,
    pub photo_id: Uuid,
    pub event_id: Uuid,
    /// NULL until resolved
    pub person_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl FaceDetection {
    pub fn new(external_face_id: impl Into<String>, confidence: f32, photo_id: Uuid, event_id: Uuid) -> Self {
        Self {
            guid: Uuid::new_v4(),
            external_face_id: external_face_id.into(),
            confidence,
            photo_id,
            event_id,
            person_id: None,
            created_at: Utc::now(),
        }
    }
}

const DETECTION_COLUMNS: &str =
    "guid, external_face_id, confidence, photo_id, event_id, person_id, created_at";

fn detection_from_row(row: &SqliteRow) -> Result<FaceDetection> {
    let confidence: f64 = row.get("confidence");
    Ok(FaceDetection {
        guid: parse_guid(row.get("guid"))?,
        external_face_id: row.get("external_face_id"),
        confidence: confidence as f32,
        photo_id: parse_guid(row.get("photo_id"))?,
        event_id: parse_guid(row.get("event_id"))?,
        person_id: parse_optional_guid(row.get("person_id"))?,
        created_at: parse_timestamp(row.get("created_at"))?,
    })
}

/// Insert detections for one photo
pub async fn insert_detections(conn: &mut SqliteConnection, detections: &[FaceDetection]) -> Result<()> {
    for detection in detections {
        sqlx::query(
            r#"
            INSERT INTO face_detections (guid, external_face_id, confidence, photo_id, event_id, person_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(detection.guid.to_string())
        .bind(&detection.external_face_id)
        .bind(detection.confidence as f64)
        .bind(detection.photo_id.to_string())
        .bind(detection.event_id.to_string())
        .bind(detection.person_id.map(|id| id.to_string()))
        .bind(detection.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::from_insert(e, format!("detection for face '{}'", detection.external_face_id)))?;
    }

    Ok(())
}

/// Load detection by id
pub async fn load_detection(conn: &mut SqliteConnection, detection_id: Uuid) -> Result<Option<FaceDetection>> {
    let row = sqlx::query(&format!("SELECT {} FROM face_detections WHERE guid = ?", DETECTION_COLUMNS))
        .bind(detection_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(detection_from_row).transpose()
}

/// All detections of a photo
pub async fn detections_for_photo(conn: &mut SqliteConnection, photo_id: Uuid) -> Result<Vec<FaceDetection>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM face_detections WHERE photo_id = ? ORDER BY created_at, guid",
        DETECTION_COLUMNS
    ))
    .bind(photo_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(detection_from_row).collect()
}

/// Detections of the given photos (within one event) that have no person yet
pub async fn unresolved_for_photos(
    conn: &mut SqliteConnection,
    event_id: Uuid,
    photo_ids: &[Uuid],
) -> Result<Vec<FaceDetection>> {
    if photo_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM face_detections WHERE person_id IS NULL AND event_id = ",
        DETECTION_COLUMNS
    ));
    query.push_bind(event_id.to_string());
    query.push(" AND photo_id IN (");
    let mut ids = query.separated(", ");
    for photo_id in photo_ids {
        ids.push_bind(photo_id.to_string());
    }
    ids.push_unseparated(") ORDER BY created_at, guid");

    let rows = query.build().fetch_all(&mut *conn).await?;
    rows.iter().map(detection_from_row).collect()
}

/// Find the detection an oracle face id belongs to within an event
pub async fn find_by_external_face_id(
    conn: &mut SqliteConnection,
    event_id: Uuid,
    external_face_id: &str,
) -> Result<Option<FaceDetection>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM face_detections WHERE event_id = ? AND external_face_id = ?",
        DETECTION_COLUMNS
    ))
    .bind(event_id.to_string())
    .bind(external_face_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(detection_from_row).transpose()
}

/// Link a detection to a person of the same event
///
/// Re-linking to the person it already has is a no-op. Linking to a
/// different person, or to a person of another event, is a `Conflict`.
pub async fn assign_person(conn: &mut SqliteConnection, detection_id: Uuid, person_id: Uuid) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE face_detections
        SET person_id = ?
        WHERE guid = ?
          AND (person_id IS NULL OR person_id = ?)
          AND event_id = (SELECT event_id FROM event_people WHERE guid = ?)
        "#,
    )
    .bind(person_id.to_string())
    .bind(detection_id.to_string())
    .bind(person_id.to_string())
    .bind(person_id.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    // Explain why nothing was updated
    match load_detection(conn, detection_id).await? {
        None => Err(Error::NotFound(format!("detection {}", detection_id))),
        Some(detection) => match detection.person_id {
            Some(existing) if existing != person_id => Err(Error::Conflict(format!(
                "detection {} already linked to person {}",
                detection_id, existing
            ))),
            _ => Err(Error::Conflict(format!(
                "person {} does not belong to event {}",
                person_id, detection.event_id
            ))),
        },
    }
}

/// Link every still-unlinked detection carrying `external_face_id` in the event.
/// Returns the number of rows updated (zero when no local row exists).
pub async fn assign_person_by_external_face_id(
    conn: &mut SqliteConnection,
    event_id: Uuid,
    external_face_id: &str,
    person_id: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE face_detections
        SET person_id = ?
        WHERE event_id = ? AND external_face_id = ? AND person_id IS NULL
        "#,
    )
    .bind(person_id.to_string())
    .bind(event_id.to_string())
    .bind(external_face_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Count detections in an event
pub async fn count_for_event(conn: &mut SqliteConnection, event_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM face_detections WHERE event_id = ?")
        .bind(event_id.to_string())
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}
