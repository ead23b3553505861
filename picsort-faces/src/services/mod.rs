//! Pipeline components
//!
//! Every component is built from an `AppContext` and is cheap to construct.

pub mod batch_coordinator;
pub mod collections;
pub mod event_cleanup;
pub mod face_matcher;
pub mod identity_resolver;
pub mod ingestion;
pub mod person_gallery;
pub mod upload_presigner;

pub use batch_coordinator::BatchCoordinator;
pub use collections::{collection_id_for, ensure_collection};
pub use event_cleanup::{EventCleanup, EventDeletion};
pub use face_matcher::{FaceMatcher, MatchOutcome};
pub use identity_resolver::{IdentityResolver, MatchDecision, ResolveReport, Resolution};
pub use ingestion::IngestionPipeline;
pub use person_gallery::{PersonGallery, PhotoLink};
pub use upload_presigner::{PresignedUpload, UploadPresigner, UploadRequest};

use chrono::{DateTime, Utc};
use picsort_common::{Error, Result};
use std::time::Duration;

/// Wall-clock expiry of a presigned URL issued now
pub(crate) fn expires_at(ttl: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .map(|lifetime| Utc::now() + lifetime)
        .map_err(|e| Error::Validation(format!("invalid URL lifetime {:?}: {}", ttl, e)))
}
