//! Image Ingestion Pipeline
//!
//! Durably records one uploaded photo and the faces the oracle found in it.
//!
//! **Algorithm:**
//! 1. Require a configured bucket (fatal `Config` error, nothing written)
//! 2. Check the event exists and the storage key is not recorded yet
//! 3. Ensure the event's face collection exists
//! 4. Index the photo's faces in the collection
//! 5. In one short transaction: insert the photo row, touch the event,
//!    insert one detection per indexed face, commit (retried on lock)
//!
//! No network call runs while the transaction is open, so concurrent
//! ingestions only contend for the database during step 5. Nothing is
//! visible locally before the commit, so a photo never exists without its
//! detections. If the oracle indexed faces and the photo is not committed,
//! those faces are removed from the collection again (best effort).

use picsort_common::{Error, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::collections::ensure_collection;
use crate::clients::IndexedFace;
use crate::db::{detections, events, photos, FaceDetection, Photo};
use crate::error::{IngestError, IngestStage};
use crate::utils::db_retry::is_lock_error;
use crate::utils::{retry_on_lock, until_cancelled};
use crate::AppContext;

/// Outcome of the write transaction, tagged with the stage that failed
type Staged = std::result::Result<(), (IngestStage, Error)>;

/// Attach stage context; cancellation is always reported as its own stage
fn stage_error(storage_key: &str, stage: IngestStage, source: Error) -> IngestError {
    let stage = match source {
        Error::Cancelled => IngestStage::Cancelled,
        _ => stage,
    };
    IngestError::new(storage_key, stage, source)
}

/// Hand lock errors to `retry_on_lock`; every other failure ends the retry
/// loop with its stage intact
fn retry_lock_only(staged: Staged) -> Result<Staged> {
    match staged {
        Err((_, e)) if is_lock_error(&e) => Err(e),
        other => Ok(other),
    }
}

/// Per-photo ingestion
#[derive(Clone)]
pub struct IngestionPipeline {
    ctx: AppContext,
}

impl IngestionPipeline {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Ingest one stored photo. Returns the new photo id.
    ///
    /// Zero detected faces is success: the photo is recorded with no detections.
    pub async fn ingest(
        &self,
        storage_key: &str,
        uploaded_by: Uuid,
        event_id: Uuid,
        cancel: &CancellationToken,
    ) -> std::result::Result<Uuid, IngestError> {
        let fail = |stage: IngestStage| move |source: Error| stage_error(storage_key, stage, source);

        let bucket = self
            .ctx
            .settings
            .require_bucket()
            .map_err(fail(IngestStage::Configuration))?;

        if cancel.is_cancelled() {
            return Err(fail(IngestStage::Cancelled)(Error::Cancelled));
        }

        tracing::debug!(storage_key, event_id = %event_id, "Ingesting photo");

        self.check_recordable(storage_key, event_id, cancel)
            .await
            .map_err(fail(IngestStage::RecordPhoto))?;

        let collection_id = ensure_collection(self.ctx.oracle.as_ref(), event_id, cancel)
            .await
            .map_err(fail(IngestStage::EnsureCollection))?;

        let faces = self
            .index_faces(&collection_id, bucket, storage_key, cancel)
            .await
            .map_err(fail(IngestStage::IndexFaces))?;

        let photo = Photo::new(storage_key, event_id, uploaded_by);
        let (photo_ref, faces_ref) = (&photo, faces.as_slice());
        let recorded = retry_on_lock("record photo", self.ctx.settings.max_lock_wait_ms, move || async move {
            retry_lock_only(self.record(photo_ref, faces_ref, cancel).await)
        })
        .await;

        let failure = match recorded {
            Ok(Ok(())) => {
                tracing::info!(
                    storage_key,
                    photo_id = %photo.guid,
                    event_id = %event_id,
                    faces = faces.len(),
                    "Photo ingested"
                );
                return Ok(photo.guid);
            }
            Ok(Err((stage, source))) => stage_error(storage_key, stage, source),
            Err(source) => stage_error(storage_key, IngestStage::RecordPhoto, source),
        };

        discard_indexed_faces(&self.ctx, &collection_id, storage_key, &faces).await;
        Err(failure)
    }

    /// Cheap read that spares the oracle work for photos that cannot be
    /// recorded. The insert still enforces both rules.
    async fn check_recordable(&self, storage_key: &str, event_id: Uuid, cancel: &CancellationToken) -> Result<()> {
        let mut conn = until_cancelled(cancel, async { self.ctx.db.acquire().await.map_err(Error::from) }).await?;

        if events::load_event(&mut conn, event_id).await?.is_none() {
            return Err(Error::NotFound(format!("event {}", event_id)));
        }
        if photos::load_photo_by_key(&mut conn, storage_key).await?.is_some() {
            return Err(Error::Conflict(format!("photo {} already recorded", storage_key)));
        }
        Ok(())
    }

    /// Index faces on a separate task so a cancelled ingest can return at
    /// once while the oracle call finishes; faces it indexed after the
    /// cancellation are removed again in the background
    async fn index_faces(
        &self,
        collection_id: &str,
        bucket: &str,
        storage_key: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<IndexedFace>> {
        let mut indexing: JoinHandle<Result<Vec<IndexedFace>>> = {
            let oracle = self.ctx.oracle.clone();
            let (collection_id, bucket, storage_key) =
                (collection_id.to_string(), bucket.to_string(), storage_key.to_string());
            tokio::spawn(async move { oracle.index_faces(&collection_id, &bucket, &storage_key).await })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let ctx = self.ctx.clone();
                let (collection_id, storage_key) = (collection_id.to_string(), storage_key.to_string());
                tokio::spawn(async move {
                    if let Ok(Ok(faces)) = indexing.await {
                        discard_indexed_faces(&ctx, &collection_id, &storage_key, &faces).await;
                    }
                });
                Err(Error::Cancelled)
            }
            joined = &mut indexing => match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => Err(Error::Internal(format!("indexing {} aborted: {}", storage_key, e))),
            }
        }
    }

    /// The photo's unit of work. The photo row is the first statement, so
    /// the transaction takes the write lock before it reads anything.
    async fn record(&self, photo: &Photo, faces: &[IndexedFace], cancel: &CancellationToken) -> Staged {
        let mut tx = until_cancelled(cancel, async { self.ctx.db.begin().await.map_err(Error::from) })
            .await
            .map_err(|e| (IngestStage::RecordPhoto, e))?;

        photos::insert_photo(&mut *tx, photo)
            .await
            .map_err(|e| match e {
                Error::Database(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                    Error::NotFound(format!("event {}", photo.event_id))
                }
                other => other,
            })
            .map_err(|e| (IngestStage::RecordPhoto, e))?;
        events::touch_event(&mut *tx, photo.event_id)
            .await
            .map_err(|e| (IngestStage::RecordPhoto, e))?;

        let rows: Vec<FaceDetection> = faces
            .iter()
            .map(|face| FaceDetection::new(&face.face_id, face.confidence, photo.guid, photo.event_id))
            .collect();

        detections::insert_detections(&mut *tx, &rows)
            .await
            .map_err(|e| (IngestStage::RecordDetections, e))?;

        if cancel.is_cancelled() {
            return Err((IngestStage::Cancelled, Error::Cancelled));
        }

        tx.commit()
            .await
            .map_err(|e| (IngestStage::Commit, Error::from(e)))
    }
}

async fn discard_indexed_faces(ctx: &AppContext, collection_id: &str, storage_key: &str, faces: &[IndexedFace]) {
    if faces.is_empty() {
        return;
    }

    let face_ids: Vec<String> = faces.iter().map(|f| f.face_id.clone()).collect();
    match ctx.oracle.delete_faces(collection_id, &face_ids).await {
        Ok(()) => tracing::debug!(
            storage_key,
            collection_id,
            faces = face_ids.len(),
            "Removed faces of unrecorded photo from collection"
        ),
        Err(e) => tracing::warn!(
            storage_key,
            collection_id,
            faces = face_ids.len(),
            error = %e,
            "Failed to remove faces of unrecorded photo from collection"
        ),
    }
}
