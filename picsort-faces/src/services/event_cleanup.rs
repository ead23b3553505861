//! Photo and event deletion
//!
//! Rows are read first, then stored objects are deleted, then the rows are
//! removed in a short write transaction retried on lock. An object-store
//! failure leaves every row in place. Oracle cleanup is best effort and
//! only logged when it fails.

use picsort_common::{Error, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::collections::collection_id_for;
use crate::db::{detections, events, persons, photos};
use crate::utils::{retry_on_lock, until_cancelled};
use crate::AppContext;

/// What an event deletion removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDeletion {
    pub event_id: Uuid,
    pub photos_removed: i64,
    pub detections_removed: i64,
    pub persons_removed: i64,
    /// False when the collection could not be destroyed (logged)
    pub collection_deleted: bool,
}

pub struct EventCleanup {
    ctx: AppContext,
}

impl EventCleanup {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Delete one photo, its detections and its stored object
    pub async fn delete_photo(&self, photo_id: Uuid, cancel: &CancellationToken) -> Result<()> {
        let bucket = self.ctx.settings.require_bucket()?;

        let (photo, face_ids) = {
            let mut conn = until_cancelled(cancel, async { self.ctx.db.acquire().await.map_err(Error::from) }).await?;
            let photo = photos::load_photo(&mut conn, photo_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("photo {}", photo_id)))?;
            let face_ids: Vec<String> = detections::detections_for_photo(&mut conn, photo_id)
                .await?
                .into_iter()
                .map(|d| d.external_face_id)
                .collect();
            (photo, face_ids)
        };

        if !face_ids.is_empty() {
            let collection_id = collection_id_for(photo.event_id);
            match until_cancelled(cancel, self.ctx.oracle.delete_faces(&collection_id, &face_ids)).await {
                Ok(()) => {}
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => tracing::warn!(
                    photo_id = %photo_id,
                    collection_id = %collection_id,
                    faces = face_ids.len(),
                    error = %e,
                    "Failed to delete photo faces from collection"
                ),
            }
        }

        until_cancelled(cancel, self.ctx.objects.delete(bucket, &photo.storage_key)).await?;

        let removed = retry_on_lock("delete photo", self.ctx.settings.max_lock_wait_ms, || {
            self.remove_photo_row(photo_id, photo.event_id)
        })
        .await?;

        if !removed {
            tracing::debug!(photo_id = %photo_id, "Photo row already removed");
        }
        tracing::info!(
            photo_id = %photo_id,
            event_id = %photo.event_id,
            storage_key = %photo.storage_key,
            "Photo deleted"
        );
        Ok(())
    }

    /// Row removal; the delete is its first statement
    async fn remove_photo_row(&self, photo_id: Uuid, event_id: Uuid) -> Result<bool> {
        let mut tx = self.ctx.db.begin().await?;
        let removed = photos::delete_photo(&mut *tx, photo_id).await?;
        if removed {
            events::touch_event(&mut *tx, event_id).await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    /// Delete an event with all its photos, detections, persons and stored
    /// objects, then destroy its face collection
    pub async fn delete_event(&self, event_id: Uuid, cancel: &CancellationToken) -> Result<EventDeletion> {
        let bucket = self.ctx.settings.require_bucket()?;

        let storage_keys = {
            let mut conn = until_cancelled(cancel, async { self.ctx.db.acquire().await.map_err(Error::from) }).await?;
            if events::load_event(&mut conn, event_id).await?.is_none() {
                return Err(Error::NotFound(format!("event {}", event_id)));
            }
            photos::storage_keys_for_event(&mut conn, event_id).await?
        };

        if !storage_keys.is_empty() {
            until_cancelled(cancel, self.ctx.objects.delete_many(bucket, &storage_keys)).await?;
        }

        let (photos_removed, detections_removed, persons_removed) =
            retry_on_lock("delete event", self.ctx.settings.max_lock_wait_ms, || {
                self.remove_event_rows(event_id)
            })
            .await?;

        let collection_id = collection_id_for(event_id);
        let collection_deleted = match self.ctx.oracle.delete_collection(&collection_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    event_id = %event_id,
                    collection_id = %collection_id,
                    error = %e,
                    "Failed to delete face collection"
                );
                false
            }
        };

        let deletion = EventDeletion {
            event_id,
            photos_removed,
            detections_removed,
            persons_removed,
            collection_deleted,
        };

        tracing::info!(
            event_id = %event_id,
            photos = deletion.photos_removed,
            detections = deletion.detections_removed,
            persons = deletion.persons_removed,
            "Event deleted"
        );
        Ok(deletion)
    }

    /// Counts what the cascade removes in the same unit of work as the
    /// delete. Touching the event first takes the write lock up front.
    async fn remove_event_rows(&self, event_id: Uuid) -> Result<(i64, i64, i64)> {
        let mut tx = self.ctx.db.begin().await?;
        events::touch_event(&mut *tx, event_id).await?;

        let photos_removed = photos::count_for_event(&mut *tx, event_id).await?;
        let detections_removed = detections::count_for_event(&mut *tx, event_id).await?;
        let persons_removed = persons::count_for_event(&mut *tx, event_id).await?;

        events::delete_event(&mut *tx, event_id).await?;
        tx.commit().await?;
        Ok((photos_removed, detections_removed, persons_removed))
    }
}
