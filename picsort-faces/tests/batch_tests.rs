//! Batch coordinator tests: fan-out, join, then one resolution pass

mod helpers;

use helpers::*;
use picsort_faces::services::BatchCoordinator;
use picsort_faces::{BatchItemError, IngestStage};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn test_clean_batch_resolves_every_detection() {
    let pool = create_test_pool().await;
    let oracle = Arc::new(FakeOracle::new());
    let objects = Arc::new(FakeObjectStore::new());
    let event_id = create_test_event(&pool, "Party").await;
    oracle.set_faces("p1.jpg", &["alice", "bob"]);
    oracle.set_faces("p2.jpg", &["carol"]);
    oracle.set_faces("p3.jpg", &[]);

    let coordinator = BatchCoordinator::new(test_context(&pool, &oracle, &objects));
    let photo_ids = coordinator
        .ingest_batch(&keys(&["p1.jpg", "p2.jpg", "p3.jpg"]), Uuid::new_v4(), event_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(photo_ids.len(), 3);
    let rows = all_detections(&pool, event_id).await;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|d| d.person_id.is_some()));
    assert_eq!(count_rows(&pool, "event_people", Some(event_id)).await, 3);
}

#[tokio::test]
async fn test_one_failing_photo_does_not_stop_the_others() {
    let pool = create_test_pool().await;
    let oracle = Arc::new(FakeOracle::new());
    let objects = Arc::new(FakeObjectStore::new());
    let event_id = create_test_event(&pool, "Partial").await;
    oracle.set_faces("ok-1.jpg", &["alice"]);
    oracle.set_faces("bad.jpg", &["bob"]);
    oracle.set_faces("ok-2.jpg", &["carol"]);
    oracle.fail_index_for("bad.jpg");

    let coordinator = BatchCoordinator::new(test_context(&pool, &oracle, &objects));
    let failure = coordinator
        .ingest_batch(&keys(&["ok-1.jpg", "bad.jpg", "ok-2.jpg"]), Uuid::new_v4(), event_id, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(failure.event_id, event_id);
    assert_eq!(failure.succeeded.len(), 2);
    assert_eq!(failure.errors.len(), 1);
    assert_eq!(failure.errors[0].storage_key(), Some("bad.jpg"));
    match &failure.errors[0] {
        BatchItemError::Ingest(e) => assert_eq!(e.stage, IngestStage::IndexFaces),
        other => panic!("unexpected error {:?}", other),
    }

    assert_eq!(count_rows(&pool, "photos", Some(event_id)).await, 2);
    let rows = all_detections(&pool, event_id).await;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|d| d.person_id.is_some()));
}

#[tokio::test]
async fn test_same_face_twice_in_one_batch_gets_one_person() {
    let pool = create_test_pool().await;
    let oracle = Arc::new(FakeOracle::new());
    let objects = Arc::new(FakeObjectStore::new());
    let event_id = create_test_event(&pool, "Twins").await;
    oracle.set_faces("left.jpg", &["dana"]);
    oracle.set_faces("right.jpg", &["dana"]);

    BatchCoordinator::new(test_context(&pool, &oracle, &objects))
        .ingest_batch(&keys(&["left.jpg", "right.jpg"]), Uuid::new_v4(), event_id, &CancellationToken::new())
        .await
        .unwrap();

    let rows = all_detections(&pool, event_id).await;
    assert_eq!(rows.len(), 2);
    assert!(rows[0].person_id.is_some());
    assert_eq!(rows[0].person_id, rows[1].person_id);
    assert_eq!(count_rows(&pool, "event_people", Some(event_id)).await, 1);
}

#[tokio::test]
async fn test_known_face_in_later_batch_reuses_person() {
    let pool = create_test_pool().await;
    let oracle = Arc::new(FakeOracle::new());
    let objects = Arc::new(FakeObjectStore::new());
    let event_id = create_test_event(&pool, "Two batches").await;
    oracle.set_faces("day1.jpg", &["erin"]);
    oracle.set_faces("day2.jpg", &["erin", "frank"]);

    let coordinator = BatchCoordinator::new(test_context(&pool, &oracle, &objects));
    let cancel = CancellationToken::new();
    coordinator
        .ingest_batch(&keys(&["day1.jpg"]), Uuid::new_v4(), event_id, &cancel)
        .await
        .unwrap();
    coordinator
        .ingest_batch(&keys(&["day2.jpg"]), Uuid::new_v4(), event_id, &cancel)
        .await
        .unwrap();

    let rows = all_detections(&pool, event_id).await;
    let erin: HashSet<_> = rows
        .iter()
        .filter(|d| d.external_face_id == "face-1" || d.external_face_id == "face-2")
        .map(|d| d.person_id)
        .collect();
    assert_eq!(erin.len(), 1);
    assert_eq!(count_rows(&pool, "event_people", Some(event_id)).await, 2);
}

#[tokio::test]
async fn test_panicking_task_is_reported_against_its_key() {
    let pool = create_test_pool().await;
    let oracle = Arc::new(FakeOracle::new());
    let objects = Arc::new(FakeObjectStore::new());
    let event_id = create_test_event(&pool, "Crash").await;
    oracle.set_faces("fine.jpg", &["gina"]);
    oracle.set_faces("crash.jpg", &["hank"]);
    oracle.panic_index_for("crash.jpg");

    let report = BatchCoordinator::new(test_context(&pool, &oracle, &objects))
        .run(&keys(&["fine.jpg", "crash.jpg"]), Uuid::new_v4(), event_id, &CancellationToken::new())
        .await;

    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(
        &report.errors[0],
        BatchItemError::TaskAborted { storage_key, .. } if storage_key == "crash.jpg"
    ));
    assert_eq!(count_rows(&pool, "photos", Some(event_id)).await, 1);
}

#[tokio::test]
async fn test_cancelled_batch_skips_resolution() {
    let pool = create_test_pool().await;
    let oracle = Arc::new(FakeOracle::new());
    let objects = Arc::new(FakeObjectStore::new());
    let event_id = create_test_event(&pool, "Stop").await;
    oracle.set_faces("a.jpg", &["ivan"]);
    oracle.set_faces("b.jpg", &["judy"]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = BatchCoordinator::new(test_context(&pool, &oracle, &objects))
        .run(&keys(&["a.jpg", "b.jpg"]), Uuid::new_v4(), event_id, &cancel)
        .await;

    assert!(report.succeeded.is_empty());
    assert!(matches!(report.errors.last(), Some(BatchItemError::Cancelled)));
    assert_eq!(oracle.search_face_calls(), 0);
    assert_eq!(count_rows(&pool, "photos", None).await, 0);
}

#[tokio::test]
async fn test_resolution_failure_joins_error_list() {
    let pool = create_test_pool().await;
    let oracle = Arc::new(FakeOracle::new());
    let objects = Arc::new(FakeObjectStore::new());
    let event_id = create_test_event(&pool, "Search down").await;
    oracle.set_faces("k.jpg", &["kim"]);
    oracle.fail_search_for("face-1");

    let failure = BatchCoordinator::new(test_context(&pool, &oracle, &objects))
        .ingest_batch(&keys(&["k.jpg"]), Uuid::new_v4(), event_id, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(failure.succeeded.len(), 1);
    assert!(matches!(failure.errors.as_slice(), [BatchItemError::Resolve(_)]));
    assert_eq!(count_rows(&pool, "photos", Some(event_id)).await, 1);
}

// =============================================================================
// On-disk database under concurrent ingestion
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_oracle_batch_ingests_in_parallel_without_lock_errors() {
    let (_dir, pool) = create_file_pool().await;
    let oracle = Arc::new(FakeOracle::new());
    let objects = Arc::new(FakeObjectStore::new());
    let event_id = create_test_event(&pool, "Busy").await;
    oracle.set_index_delay(Duration::from_millis(400));

    let names: Vec<String> = (0..8).map(|i| format!("busy-{}.jpg", i)).collect();
    for (i, name) in names.iter().enumerate() {
        oracle.set_faces(name, &[if i % 2 == 0 { "alice" } else { "bob" }]);
    }

    let settings = test_settings();
    assert!(settings.max_concurrent_ingests >= 8);
    let started = Instant::now();
    let report = BatchCoordinator::new(test_context_with_settings(&pool, &oracle, &objects, settings))
        .run(&names, Uuid::new_v4(), event_id, &CancellationToken::new())
        .await;
    let elapsed = started.elapsed();

    assert!(report.errors.is_empty(), "unexpected errors: {:?}", report.errors);
    assert_eq!(report.succeeded.len(), 8);
    assert!(oracle.peak_concurrent_indexing() > 1);
    assert!(elapsed < Duration::from_millis(8 * 400), "batch ran serially: {:?}", elapsed);

    let rows = all_detections(&pool, event_id).await;
    assert_eq!(rows.len(), 8);
    assert!(rows.iter().all(|d| d.person_id.is_some()));
    assert_eq!(count_rows(&pool, "event_people", Some(event_id)).await, 2);
}
