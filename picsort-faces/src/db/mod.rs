//! Database access for the face pipeline
//!
//! Every store function takes `&mut SqliteConnection`, so callers compose
//! them inside one transaction (`&mut *tx`) or run them against a pooled
//! connection (`&mut *pool.acquire().await?`).

pub mod detections;
pub mod events;
pub mod persons;
pub mod photos;

pub use detections::FaceDetection;
pub use events::Event;
pub use persons::{EventPerson, PersonSummary};
pub use photos::Photo;

use chrono::{DateTime, Utc};
use picsort_common::{Error, Result};
use uuid::Uuid;

/// Parse a TEXT guid column
pub(crate) fn parse_guid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Corrupt guid '{}': {}", value, e)))
}

/// Parse a nullable TEXT guid column
pub(crate) fn parse_optional_guid(value: Option<String>) -> Result<Option<Uuid>> {
    value.as_deref().map(parse_guid).transpose()
}

/// Parse an RFC 3339 timestamp column
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Corrupt timestamp '{}': {}", value, e)))
}
