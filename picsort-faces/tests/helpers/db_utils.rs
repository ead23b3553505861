//! In-memory database and context builders

use picsort_common::db::{create_schema, init_database};
use picsort_faces::db::{detections, events, FaceDetection};
use picsort_faces::{AppContext, FaceSettings};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use super::fakes::{FakeObjectStore, FakeOracle};

pub const TEST_BUCKET: &str = "test-bucket";

/// Single-connection in-memory database with the full schema
///
/// The connection must never be recycled: closing it drops the database.
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    create_schema(&pool).await.expect("Failed to create schema");
    pool
}

/// On-disk WAL database with a multi-connection pool, as the binary opens it
///
/// Keep the `TempDir` alive for as long as the pool is used.
pub async fn create_file_pool() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let pool = init_database(&dir.path().join("picsort.db"))
        .await
        .expect("Failed to open on-disk database");
    (dir, pool)
}

pub async fn create_test_event(pool: &SqlitePool, name: &str) -> Uuid {
    let mut conn = pool.acquire().await.unwrap();
    events::create_event(&mut conn, name).await.unwrap().guid
}

pub fn test_settings() -> FaceSettings {
    FaceSettings::default().with_bucket(TEST_BUCKET)
}

pub fn test_context(pool: &SqlitePool, oracle: &Arc<FakeOracle>, objects: &Arc<FakeObjectStore>) -> AppContext {
    test_context_with_settings(pool, oracle, objects, test_settings())
}

pub fn test_context_with_settings(
    pool: &SqlitePool,
    oracle: &Arc<FakeOracle>,
    objects: &Arc<FakeObjectStore>,
    settings: FaceSettings,
) -> AppContext {
    AppContext::new(pool.clone(), oracle.clone(), objects.clone(), settings)
}

/// Row count of a table, optionally restricted to one event
pub async fn count_rows(pool: &SqlitePool, table: &str, event_id: Option<Uuid>) -> i64 {
    match event_id {
        Some(event_id) => sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {} WHERE event_id = ?", table))
            .bind(event_id.to_string())
            .fetch_one(pool)
            .await
            .unwrap(),
        None => sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await
            .unwrap(),
    }
}

/// Every detection of an event, in insertion order
pub async fn all_detections(pool: &SqlitePool, event_id: Uuid) -> Vec<FaceDetection> {
    let ids: Vec<String> =
        sqlx::query_scalar("SELECT guid FROM face_detections WHERE event_id = ? ORDER BY created_at, guid")
            .bind(event_id.to_string())
            .fetch_all(pool)
            .await
            .unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let mut rows = Vec::new();
    for id in ids {
        let id = Uuid::parse_str(&id).unwrap();
        rows.push(detections::load_detection(&mut conn, id).await.unwrap().unwrap());
    }
    rows
}
