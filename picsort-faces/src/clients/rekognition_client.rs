//! Amazon Rekognition face oracle
//!
//! Collections map one-to-one onto Rekognition collections. Images are
//! always referenced by S3 location, so photo bytes never pass through
//! this process.

use async_trait::async_trait;
use aws_sdk_rekognition::error::DisplayErrorContext;
use aws_sdk_rekognition::types::{Attribute, Image, S3Object};
use aws_sdk_rekognition::Client;
use picsort_common::{Error, Result};
use tracing::{debug, info};

use super::{FaceOracle, IndexedFace};

const SERVICE: &str = "rekognition";

/// Rekognition-backed `FaceOracle`
#[derive(Clone)]
pub struct RekognitionOracle {
    client: Client,
}

impl RekognitionOracle {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

fn s3_image(bucket: &str, key: &str) -> Image {
    Image::builder()
        .s3_object(S3Object::builder().bucket(bucket).name(key).build())
        .build()
}

fn external<E: std::error::Error>(err: E) -> Error {
    Error::external(SERVICE, DisplayErrorContext(err))
}

#[async_trait]
impl FaceOracle for RekognitionOracle {
    async fn collection_exists(&self, collection_id: &str) -> Result<bool> {
        match self.client.describe_collection().collection_id(collection_id).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_resource_not_found_exception())
                    .unwrap_or(false);
                if not_found {
                    Ok(false)
                } else {
                    Err(external(err))
                }
            }
        }
    }

    async fn create_collection(&self, collection_id: &str) -> Result<()> {
        match self.client.create_collection().collection_id(collection_id).send().await {
            Ok(_) => {
                info!(collection_id, "Created Rekognition collection");
                Ok(())
            }
            Err(err) => {
                let exists = err
                    .as_service_error()
                    .map(|e| e.is_resource_already_exists_exception())
                    .unwrap_or(false);
                if exists {
                    Err(Error::Conflict(format!("collection {} already exists", collection_id)))
                } else {
                    Err(external(err))
                }
            }
        }
    }

    async fn index_faces(&self, collection_id: &str, bucket: &str, key: &str) -> Result<Vec<IndexedFace>> {
        let output = self
            .client
            .index_faces()
            .collection_id(collection_id)
            .image(s3_image(bucket, key))
            .detection_attributes(Attribute::Default)
            .send()
            .await
            .map_err(external)?;

        let faces: Vec<IndexedFace> = output
            .face_records()
            .iter()
            .filter_map(|record| {
                let face = record.face()?;
                Some(IndexedFace {
                    face_id: face.face_id()?.to_string(),
                    confidence: face.confidence().unwrap_or_default(),
                })
            })
            .collect();

        debug!(collection_id, key, faces = faces.len(), "Rekognition IndexFaces complete");
        Ok(faces)
    }

    async fn search_by_face_id(&self, collection_id: &str, face_id: &str, threshold: f32) -> Result<Vec<String>> {
        let output = self
            .client
            .search_faces()
            .collection_id(collection_id)
            .face_id(face_id)
            .face_match_threshold(threshold)
            .send()
            .await
            .map_err(external)?;

        Ok(output
            .face_matches()
            .iter()
            .filter_map(|m| m.face().and_then(|f| f.face_id()).map(str::to_string))
            .collect())
    }

    async fn search_by_image(
        &self,
        collection_id: &str,
        bucket: &str,
        key: &str,
        threshold: f32,
        max_results: u32,
    ) -> Result<Vec<String>> {
        let output = self
            .client
            .search_faces_by_image()
            .collection_id(collection_id)
            .image(s3_image(bucket, key))
            .max_faces(i32::try_from(max_results).unwrap_or(i32::MAX))
            .face_match_threshold(threshold)
            .send()
            .await
            .map_err(external)?;

        Ok(output
            .face_matches()
            .iter()
            .filter_map(|m| m.face().and_then(|f| f.face_id()).map(str::to_string))
            .collect())
    }

    async fn count_faces(&self, bucket: &str, key: &str) -> Result<usize> {
        let output = self
            .client
            .detect_faces()
            .image(s3_image(bucket, key))
            .attributes(Attribute::Default)
            .send()
            .await
            .map_err(external)?;

        Ok(output.face_details().len())
    }

    async fn delete_faces(&self, collection_id: &str, face_ids: &[String]) -> Result<()> {
        if face_ids.is_empty() {
            return Ok(());
        }

        self.client
            .delete_faces()
            .collection_id(collection_id)
            .set_face_ids(Some(face_ids.to_vec()))
            .send()
            .await
            .map_err(external)?;

        info!(collection_id, count = face_ids.len(), "Deleted faces from Rekognition collection");
        Ok(())
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<()> {
        match self.client.delete_collection().collection_id(collection_id).send().await {
            Ok(_) => {
                info!(collection_id, "Deleted Rekognition collection");
                Ok(())
            }
            Err(err) => {
                let already_gone = err
                    .as_service_error()
                    .map(|e| e.is_resource_not_found_exception())
                    .unwrap_or(false);
                if already_gone {
                    debug!(collection_id, "Rekognition collection already deleted");
                    Ok(())
                } else {
                    Err(external(err))
                }
            }
        }
    }
}
