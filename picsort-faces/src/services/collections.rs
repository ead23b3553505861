//! Per-event face collections
//!
//! A collection's presence is only ever learned by asking the oracle. There
//! is no local flag and no lock: concurrent creators race, and the loser's
//! "already exists" answer counts as success.

use picsort_common::{Error, Result};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clients::FaceOracle;
use crate::utils::until_cancelled;

/// Collection id for an event: `event-<event id>`
pub fn collection_id_for(event_id: Uuid) -> String {
    format!("event-{}", event_id)
}

/// Create the event's collection if the oracle does not have it yet
///
/// Returns the collection id.
pub async fn ensure_collection(
    oracle: &dyn FaceOracle,
    event_id: Uuid,
    cancel: &CancellationToken,
) -> Result<String> {
    let collection_id = collection_id_for(event_id);

    if until_cancelled(cancel, oracle.collection_exists(&collection_id)).await? {
        return Ok(collection_id);
    }

    match until_cancelled(cancel, oracle.create_collection(&collection_id)).await {
        Ok(()) => {
            tracing::info!(event_id = %event_id, collection_id = %collection_id, "Created face collection");
            Ok(collection_id)
        }
        Err(Error::Conflict(_)) => {
            tracing::debug!(collection_id = %collection_id, "Face collection created concurrently");
            Ok(collection_id)
        }
        Err(e) => Err(e),
    }
}

/// Fail with `NotFound` unless the event's collection exists
pub async fn require_collection(
    oracle: &dyn FaceOracle,
    event_id: Uuid,
    cancel: &CancellationToken,
) -> Result<String> {
    let collection_id = collection_id_for(event_id);

    if until_cancelled(cancel, oracle.collection_exists(&collection_id)).await? {
        Ok(collection_id)
    } else {
        Err(Error::NotFound(format!("face collection {}", collection_id)))
    }
}
