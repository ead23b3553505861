//! Face Match Query
//!
//! "Who is this?" for a single reference image already in the bucket.

use picsort_common::{Error, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::collections::require_collection;
use crate::db::detections;
use crate::utils::until_cancelled;
use crate::AppContext;

/// Lookup result. `NoMatchFound` is an answer, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched { person_id: Uuid },
    NoMatchFound,
}

pub struct FaceMatcher {
    ctx: AppContext,
}

impl FaceMatcher {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Find the person shown in the reference image
    ///
    /// The image must contain exactly one face; anything else is a
    /// `Validation` error raised before the collection is searched.
    pub async fn find_person(
        &self,
        reference_key: &str,
        event_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<MatchOutcome> {
        let bucket = self.ctx.settings.require_bucket()?;
        let oracle = self.ctx.oracle.as_ref();

        let collection_id = require_collection(oracle, event_id, cancel).await?;

        let face_count = until_cancelled(cancel, oracle.count_faces(bucket, reference_key)).await?;
        if face_count != 1 {
            return Err(Error::Validation(format!(
                "reference image must contain exactly 1 face, found {}",
                face_count
            )));
        }

        let matches = until_cancelled(
            cancel,
            oracle.search_by_image(
                &collection_id,
                bucket,
                reference_key,
                self.ctx.settings.match_threshold,
                self.ctx.settings.match_max_results,
            ),
        )
        .await?;

        let Some(best_match) = matches.first() else {
            tracing::debug!(event_id = %event_id, reference_key, "No similar face in collection");
            return Ok(MatchOutcome::NoMatchFound);
        };

        let mut conn = until_cancelled(cancel, async { self.ctx.db.acquire().await.map_err(Error::from) }).await?;
        let detection = detections::find_by_external_face_id(&mut conn, event_id, best_match).await?;

        match detection.and_then(|d| d.person_id) {
            Some(person_id) => {
                tracing::debug!(event_id = %event_id, person_id = %person_id, "Reference face matched");
                Ok(MatchOutcome::Matched { person_id })
            }
            None => {
                tracing::debug!(
                    event_id = %event_id,
                    face_id = %best_match,
                    "Matched face has no resolved person"
                );
                Ok(MatchOutcome::NoMatchFound)
            }
        }
    }
}
