//! Presigned upload URLs
//!
//! Clients upload photo bytes straight to the object store, then hand the
//! returned storage keys to the batch coordinator.

use chrono::{DateTime, Utc};
use picsort_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::events;
use crate::utils::until_cancelled;
use crate::AppContext;

/// Content types accepted for upload
pub const ALLOWED_CONTENT_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub filename: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresignedUpload {
    pub filename: String,
    pub storage_key: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Storage key for a new upload: `events/<event id>/<uuid>-<filename>`
pub fn storage_key_for(event_id: Uuid, filename: &str) -> String {
    format!("events/{}/{}-{}", event_id, Uuid::new_v4(), filename)
}

fn validate(request: &UploadRequest) -> Result<()> {
    let filename = request.filename.trim();
    if filename.is_empty() || filename.contains('/') || filename.contains('\\') {
        return Err(Error::Validation(format!("invalid filename '{}'", request.filename)));
    }

    if !ALLOWED_CONTENT_TYPES
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(request.content_type.trim()))
    {
        return Err(Error::Validation(format!(
            "unsupported content type '{}' for '{}' (allowed: {})",
            request.content_type,
            request.filename,
            ALLOWED_CONTENT_TYPES.join(", ")
        )));
    }

    Ok(())
}

pub struct UploadPresigner {
    ctx: AppContext,
}

impl UploadPresigner {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Presign one upload URL per request
    ///
    /// Every request is validated before any URL is issued.
    pub async fn presign_uploads(
        &self,
        event_id: Uuid,
        requests: &[UploadRequest],
        cancel: &CancellationToken,
    ) -> Result<Vec<PresignedUpload>> {
        let bucket = self.ctx.settings.require_bucket()?;
        requests.iter().try_for_each(validate)?;

        {
            let mut conn = until_cancelled(cancel, async { self.ctx.db.acquire().await.map_err(Error::from) }).await?;
            if events::load_event(&mut conn, event_id).await?.is_none() {
                return Err(Error::NotFound(format!("event {}", event_id)));
            }
        }

        let ttl = self.ctx.settings.upload_ttl;
        let mut uploads = Vec::with_capacity(requests.len());

        for request in requests {
            let filename = request.filename.trim();
            let storage_key = storage_key_for(event_id, filename);
            let content_type = request.content_type.trim().to_ascii_lowercase();

            let url = until_cancelled(
                cancel,
                self.ctx.objects.presign_upload(bucket, &storage_key, &content_type, ttl),
            )
            .await?;

            uploads.push(PresignedUpload {
                filename: filename.to_string(),
                storage_key,
                url,
                expires_at: super::expires_at(ttl)?,
            });
        }

        tracing::debug!(event_id = %event_id, uploads = uploads.len(), "Presigned upload URLs");
        Ok(uploads)
    }
}
