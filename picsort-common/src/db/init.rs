//! Database initialization
//!
//! Creates the SQLite database on first run and the tables the face
//! pipeline owns. Every statement is idempotent, so startup may run it
//! against an existing database.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Open (creating if needed) the database at `db_path` and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas set here apply to every pooled connection, not just the first
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(250));

    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .min_connections(2)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all pipeline tables and indexes if they don't exist
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_events_table(pool).await?;
    create_photos_table(pool).await?;
    create_event_people_table(pool).await?;
    create_face_detections_table(pool).await?;

    info!("Database tables initialized (events, photos, event_people, face_detections)");
    Ok(())
}

async fn create_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_photos_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS photos (
            guid TEXT PRIMARY KEY,
            storage_key TEXT NOT NULL UNIQUE,
            event_id TEXT NOT NULL REFERENCES events(guid) ON DELETE CASCADE,
            uploaded_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_photos_event ON photos(event_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_event_people_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS event_people (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            event_id TEXT NOT NULL REFERENCES events(guid) ON DELETE CASCADE,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_event_people_event ON event_people(event_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_face_detections_table(pool: &SqlitePool) -> Result<()> {
    // One oracle face id belongs to exactly one detection within an event
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS face_detections (
            guid TEXT PRIMARY KEY,
            external_face_id TEXT NOT NULL,
            confidence REAL NOT NULL,
            photo_id TEXT NOT NULL REFERENCES photos(guid) ON DELETE CASCADE,
            event_id TEXT NOT NULL REFERENCES events(guid) ON DELETE CASCADE,
            person_id TEXT REFERENCES event_people(guid) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            UNIQUE (event_id, external_face_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_face_detections_photo ON face_detections(photo_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_face_detections_person ON face_detections(person_id)")
        .execute(pool)
        .await?;

    Ok(())
}
