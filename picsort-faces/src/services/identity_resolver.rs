//! Face Identity Resolver
//!
//! Assigns every unresolved detection of a batch to a person of its event.
//!
//! **Algorithm (per detection, strictly sequential):**
//! 1. Confirm the event's collection exists (`NotFound` otherwise)
//! 2. Search the collection for faces similar to the detection's face
//! 3. In one transaction (retried on lock): re-read the detection, skip it
//!    if it is already linked, look up the best match's local row, decide,
//!    apply, commit
//!
//! The first error aborts the remaining queue. Detections committed before
//! it stay resolved, and running the resolver again re-derives everything
//! from current rows.

use picsort_common::{Error, Result};
use serde::Serialize;
use sqlx::SqliteConnection;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::collections::require_collection;
use crate::db::{detections, persons, FaceDetection};
use crate::utils::{retry_on_lock, until_cancelled};
use crate::AppContext;

/// How one detection gets its person
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchDecision {
    /// No similar face known: new person
    NewPerson,
    /// Similar face known to the oracle but with no local row: new person,
    /// and any row carrying that face id later is backfilled
    RepairOrphan { orphan_face_id: String },
    /// Similar face's row has no person yet: new person for both rows
    RaceRepair { matched_detection_id: Uuid },
    /// Similar face already belongs to a person
    Reuse { person_id: Uuid },
}

impl MatchDecision {
    /// First matching case wins
    pub fn decide(best_match: Option<&str>, matched_row: Option<&FaceDetection>) -> Self {
        match (best_match, matched_row) {
            (None, _) => MatchDecision::NewPerson,
            (Some(face_id), None) => MatchDecision::RepairOrphan {
                orphan_face_id: face_id.to_string(),
            },
            (Some(_), Some(row)) => match row.person_id {
                None => MatchDecision::RaceRepair {
                    matched_detection_id: row.guid,
                },
                Some(person_id) => MatchDecision::Reuse { person_id },
            },
        }
    }

    fn creates_person(&self) -> bool {
        !matches!(self, MatchDecision::Reuse { .. })
    }
}

/// One committed assignment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub detection_id: Uuid,
    pub person_id: Uuid,
    pub decision: MatchDecision,
}

/// Result of one resolver invocation
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveReport {
    pub resolved: Vec<Resolution>,
    /// Detections already linked by the time their turn came
    pub skipped: usize,
    pub persons_created: usize,
}

pub struct IdentityResolver {
    ctx: AppContext,
}

impl IdentityResolver {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Resolve every unlinked detection of `photo_ids` within the event
    pub async fn resolve(
        &self,
        event_id: Uuid,
        photo_ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<ResolveReport> {
        let pending = {
            let mut conn = until_cancelled(cancel, async { self.ctx.db.acquire().await.map_err(Error::from) }).await?;
            detections::unresolved_for_photos(&mut conn, event_id, photo_ids).await?
        };

        let mut report = ResolveReport::default();
        if pending.is_empty() {
            tracing::debug!(event_id = %event_id, photos = photo_ids.len(), "No unresolved detections");
            return Ok(report);
        }

        tracing::info!(
            event_id = %event_id,
            detections = pending.len(),
            "Resolving face identities"
        );

        for detection in &pending {
            if cancel.is_cancelled() {
                tracing::info!(
                    event_id = %event_id,
                    resolved = report.resolved.len(),
                    "Identity resolution cancelled"
                );
                return Err(Error::Cancelled);
            }

            let collection_id = require_collection(self.ctx.oracle.as_ref(), event_id, cancel).await?;

            let matches = until_cancelled(
                cancel,
                self.ctx.oracle.search_by_face_id(
                    &collection_id,
                    &detection.external_face_id,
                    self.ctx.settings.resolve_threshold,
                ),
            )
            .await?;
            let best_match = matches.first().map(String::as_str);

            let outcome = retry_on_lock("resolve detection", self.ctx.settings.max_lock_wait_ms, || {
                self.apply(detection.guid, event_id, best_match)
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    event_id = %event_id,
                    detection_id = %detection.guid,
                    error = %e,
                    "Identity resolution aborted"
                );
                e
            })?;

            match outcome {
                Some(resolution) => {
                    if resolution.decision.creates_person() {
                        report.persons_created += 1;
                    }
                    report.resolved.push(resolution);
                }
                None => report.skipped += 1,
            }
        }

        tracing::info!(
            event_id = %event_id,
            resolved = report.resolved.len(),
            skipped = report.skipped,
            persons_created = report.persons_created,
            "Face identities resolved"
        );

        Ok(report)
    }

    /// One detection's unit of work. `None` when it needs nothing.
    async fn apply(&self, detection_id: Uuid, event_id: Uuid, best_match: Option<&str>) -> Result<Option<Resolution>> {
        let mut tx = self.ctx.db.begin().await?;

        let current = match detections::load_detection(&mut *tx, detection_id).await? {
            Some(current) if current.person_id.is_none() => current,
            _ => return Ok(None),
        };

        let matched_row = match best_match {
            Some(face_id) => detections::find_by_external_face_id(&mut *tx, event_id, face_id).await?,
            None => None,
        };

        let decision = MatchDecision::decide(best_match, matched_row.as_ref());
        let person_id = apply_decision(&mut *tx, &current, &decision).await?;

        tx.commit().await?;

        tracing::debug!(
            detection_id = %detection_id,
            person_id = %person_id,
            decision = ?decision,
            "Detection resolved"
        );

        Ok(Some(Resolution {
            detection_id,
            person_id,
            decision,
        }))
    }
}

async fn apply_decision(
    conn: &mut SqliteConnection,
    detection: &FaceDetection,
    decision: &MatchDecision,
) -> Result<Uuid> {
    match decision {
        MatchDecision::Reuse { person_id } => {
            detections::assign_person(conn, detection.guid, *person_id).await?;
            Ok(*person_id)
        }
        MatchDecision::NewPerson => {
            let person = persons::create_person(conn, detection.event_id).await?;
            detections::assign_person(conn, detection.guid, person.guid).await?;
            Ok(person.guid)
        }
        MatchDecision::RepairOrphan { orphan_face_id } => {
            let person = persons::create_person(conn, detection.event_id).await?;
            detections::assign_person(conn, detection.guid, person.guid).await?;
            let backfilled =
                detections::assign_person_by_external_face_id(conn, detection.event_id, orphan_face_id, person.guid)
                    .await?;
            tracing::warn!(
                event_id = %detection.event_id,
                orphan_face_id = %orphan_face_id,
                backfilled,
                "Matched face has no local detection"
            );
            Ok(person.guid)
        }
        MatchDecision::RaceRepair { matched_detection_id } => {
            let person = persons::create_person(conn, detection.event_id).await?;
            detections::assign_person(conn, detection.guid, person.guid).await?;
            detections::assign_person(conn, *matched_detection_id, person.guid).await?;
            Ok(person.guid)
        }
    }
}
