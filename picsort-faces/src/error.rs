//! Error types for the face pipeline
//!
//! `picsort_common::Error` is the taxonomy. The types here add the context
//! a batch caller needs: which photo failed and at which stage.

use picsort_common::Error;
use uuid::Uuid;

/// Step of `IngestionPipeline::ingest` that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Configuration,
    RecordPhoto,
    EnsureCollection,
    IndexFaces,
    RecordDetections,
    Commit,
    Cancelled,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Configuration => "configuration",
            IngestStage::RecordPhoto => "record photo",
            IngestStage::EnsureCollection => "ensure collection",
            IngestStage::IndexFaces => "index faces",
            IngestStage::RecordDetections => "record detections",
            IngestStage::Commit => "commit",
            IngestStage::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ingestion failure for one photo
#[derive(Debug, thiserror::Error)]
#[error("ingest '{storage_key}' failed at {stage}: {source}")]
pub struct IngestError {
    pub storage_key: String,
    pub stage: IngestStage,
    #[source]
    pub source: Error,
}

impl IngestError {
    pub fn new(storage_key: impl Into<String>, stage: IngestStage, source: Error) -> Self {
        Self {
            storage_key: storage_key.into(),
            stage,
            source,
        }
    }

    /// Underlying taxonomy error
    pub fn kind(&self) -> &Error {
        &self.source
    }
}

/// One entry in a batch's error collection
#[derive(Debug, thiserror::Error)]
pub enum BatchItemError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Resolution pass over the batch's photos failed
    #[error("identity resolution failed: {0}")]
    Resolve(#[source] Error),

    /// Ingest task panicked or was aborted before reporting
    #[error("ingest task for '{storage_key}' aborted: {message}")]
    TaskAborted { storage_key: String, message: String },

    /// Batch was cancelled; resolution skipped
    #[error("batch cancelled before identity resolution")]
    Cancelled,
}

impl BatchItemError {
    /// Storage key the error is attributable to, if any
    pub fn storage_key(&self) -> Option<&str> {
        match self {
            BatchItemError::Ingest(e) => Some(&e.storage_key),
            BatchItemError::TaskAborted { storage_key, .. } => Some(storage_key),
            BatchItemError::Resolve(_) | BatchItemError::Cancelled => None,
        }
    }
}

/// Outcome of one batch: persisted photos plus every collected error
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<Uuid>,
    pub errors: Vec<BatchItemError>,
}

impl BatchReport {
    /// Success only with zero collected errors
    pub fn into_result(self, event_id: Uuid) -> Result<Vec<Uuid>, BatchFailure> {
        if self.errors.is_empty() {
            Ok(self.succeeded)
        } else {
            Err(BatchFailure {
                event_id,
                succeeded: self.succeeded,
                errors: self.errors,
            })
        }
    }
}

/// Aggregate batch failure
///
/// Carries the photos that did persist so callers need not re-query.
#[derive(Debug, thiserror::Error)]
#[error("batch for event {event_id} failed: {} error(s), {} photo(s) persisted", .errors.len(), .succeeded.len())]
pub struct BatchFailure {
    pub event_id: Uuid,
    pub succeeded: Vec<Uuid>,
    pub errors: Vec<BatchItemError>,
}
