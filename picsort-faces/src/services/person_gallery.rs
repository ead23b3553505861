//! Gallery views: an event's photos, the photos a person appears in,
//! person listing and renaming

use chrono::{DateTime, Utc};
use picsort_common::{Error, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::{events, persons, photos, EventPerson, PersonSummary, Photo};
use crate::utils::until_cancelled;
use crate::AppContext;

/// Time-limited download link for one photo
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoLink {
    pub photo_id: Uuid,
    pub storage_key: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

pub struct PersonGallery {
    ctx: AppContext,
}

impl PersonGallery {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Download links for every photo the person appears in, oldest first
    pub async fn photo_links(&self, person_id: Uuid, cancel: &CancellationToken) -> Result<Vec<PhotoLink>> {
        let bucket = self.ctx.settings.require_bucket()?;

        let person_photos = {
            let mut conn = until_cancelled(cancel, async { self.ctx.db.acquire().await.map_err(Error::from) }).await?;
            if persons::load_person(&mut conn, person_id).await?.is_none() {
                return Err(Error::NotFound(format!("person {}", person_id)));
            }
            photos::photos_for_person(&mut conn, person_id).await?
        };

        let links = self.presign_all(bucket, person_photos, cancel).await?;
        tracing::debug!(person_id = %person_id, photos = links.len(), "Presigned person photos");
        Ok(links)
    }

    /// Download links for every photo of an event, oldest first
    pub async fn event_photo_links(&self, event_id: Uuid, cancel: &CancellationToken) -> Result<Vec<PhotoLink>> {
        let bucket = self.ctx.settings.require_bucket()?;

        let event_photos = {
            let mut conn = until_cancelled(cancel, async { self.ctx.db.acquire().await.map_err(Error::from) }).await?;
            if events::load_event(&mut conn, event_id).await?.is_none() {
                return Err(Error::NotFound(format!("event {}", event_id)));
            }
            photos::photos_for_event(&mut conn, event_id).await?
        };

        let links = self.presign_all(bucket, event_photos, cancel).await?;
        tracing::debug!(event_id = %event_id, photos = links.len(), "Presigned event photos");
        Ok(links)
    }

    async fn presign_all(&self, bucket: &str, photos: Vec<Photo>, cancel: &CancellationToken) -> Result<Vec<PhotoLink>> {
        let ttl = self.ctx.settings.download_ttl;
        let mut links = Vec::with_capacity(photos.len());

        for photo in photos {
            let url = until_cancelled(
                cancel,
                self.ctx.objects.presign_download(bucket, &photo.storage_key, ttl),
            )
            .await?;

            links.push(PhotoLink {
                photo_id: photo.guid,
                storage_key: photo.storage_key,
                url,
                expires_at: super::expires_at(ttl)?,
            });
        }
        Ok(links)
    }

    /// Persons of an event with a cover photo each
    pub async fn list_people(&self, event_id: Uuid) -> Result<Vec<PersonSummary>> {
        let mut conn = self.ctx.db.acquire().await?;
        if events::load_event(&mut conn, event_id).await?.is_none() {
            return Err(Error::NotFound(format!("event {}", event_id)));
        }
        persons::list_for_event(&mut conn, event_id).await
    }

    pub async fn rename(&self, person_id: Uuid, name: &str) -> Result<EventPerson> {
        let mut tx = self.ctx.db.begin().await?;
        let person = persons::rename_person(&mut *tx, person_id, name).await?;
        tx.commit().await?;

        tracing::info!(person_id = %person_id, name = %person.name, "Person renamed");
        Ok(person)
    }
}
