//! External capability contracts
//!
//! The pipeline never detects or compares faces itself and never moves
//! photo bytes. It talks to two external services through these traits:
//! - `FaceOracle`: per-event face collections (index, search, delete)
//! - `ObjectStore`: presigned URLs and deletion of stored photos
//!
//! Implementations must be cheap to share (`Arc<dyn ...>`) and safe to call
//! from many ingestion tasks at once. Failures are reported as
//! `Error::External` unless a method documents otherwise.

#[cfg(feature = "aws")]
pub mod rekognition_client;
#[cfg(feature = "aws")]
pub mod s3_client;

#[cfg(feature = "aws")]
pub use rekognition_client::RekognitionOracle;
#[cfg(feature = "aws")]
pub use s3_client::S3ObjectStore;

use async_trait::async_trait;
use picsort_common::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One face the oracle added to a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedFace {
    /// Oracle-assigned face id, unique within the collection
    pub face_id: String,
    /// Detection confidence (percent)
    pub confidence: f32,
}

/// Stateful face recognition service holding one collection per event
#[async_trait]
pub trait FaceOracle: Send + Sync {
    /// Whether the collection currently exists
    async fn collection_exists(&self, collection_id: &str) -> Result<bool>;

    /// Create a collection. An existing collection is reported as `Error::Conflict`.
    async fn create_collection(&self, collection_id: &str) -> Result<()>;

    /// Detect faces in the stored image and add them to the collection
    async fn index_faces(&self, collection_id: &str, bucket: &str, key: &str) -> Result<Vec<IndexedFace>>;

    /// Faces in the collection similar to an already-indexed face, best match
    /// first. The queried face itself is never part of the result.
    async fn search_by_face_id(&self, collection_id: &str, face_id: &str, threshold: f32) -> Result<Vec<String>>;

    /// Faces in the collection similar to the face in a stored image, best match first
    async fn search_by_image(
        &self,
        collection_id: &str,
        bucket: &str,
        key: &str,
        threshold: f32,
        max_results: u32,
    ) -> Result<Vec<String>>;

    /// Number of faces detected in a stored image, without indexing them
    async fn count_faces(&self, bucket: &str, key: &str) -> Result<usize>;

    /// Remove faces from a collection
    async fn delete_faces(&self, collection_id: &str, face_ids: &[String]) -> Result<()>;

    /// Destroy a collection. A collection that is already gone is success.
    async fn delete_collection(&self, collection_id: &str) -> Result<()>;
}

/// Binary object storage addressed by bucket and key
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// URL the client can PUT the object to until `ttl` elapses
    async fn presign_upload(&self, bucket: &str, key: &str, content_type: &str, ttl: Duration) -> Result<String>;

    /// URL the client can GET the object from until `ttl` elapses
    async fn presign_download(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String>;

    /// Delete one object. A missing object is success.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Delete many objects; any per-object failure fails the call
    async fn delete_many(&self, bucket: &str, keys: &[String]) -> Result<()>;
}
