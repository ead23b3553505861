//! Amazon S3 object store

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use picsort_common::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

use super::ObjectStore;

const SERVICE: &str = "s3";

/// DeleteObjects accepts at most this many keys per request
const DELETE_BATCH_SIZE: usize = 1000;

/// S3-backed `ObjectStore`
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

fn external<E: std::error::Error>(err: E) -> Error {
    Error::external(SERVICE, DisplayErrorContext(err))
}

fn presigning(ttl: Duration) -> Result<PresigningConfig> {
    PresigningConfig::expires_in(ttl)
        .map_err(|e| Error::Validation(format!("invalid presign lifetime {:?}: {}", ttl, e)))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn presign_upload(&self, bucket: &str, key: &str, content_type: &str, ttl: Duration) -> Result<String> {
        let request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning(ttl)?)
            .await
            .map_err(external)?;

        Ok(request.uri().to_string())
    }

    async fn presign_download(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning(ttl)?)
            .await
            .map_err(external)?;

        Ok(request.uri().to_string())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(external)?;

        Ok(())
    }

    async fn delete_many(&self, bucket: &str, keys: &[String]) -> Result<()> {
        for chunk in keys.chunks(DELETE_BATCH_SIZE) {
            let objects = chunk
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build().map_err(external))
                .collect::<Result<Vec<_>>>()?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(external)?;

            let output = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(external)?;

            let failures = output.errors();
            if !failures.is_empty() {
                for failure in failures {
                    warn!(
                        bucket,
                        key = failure.key().unwrap_or_default(),
                        message = failure.message().unwrap_or_default(),
                        "S3 object deletion failed"
                    );
                }
                return Err(Error::external(
                    SERVICE,
                    format!("{} of {} objects failed to delete", failures.len(), chunk.len()),
                ));
            }
        }

        info!(bucket, count = keys.len(), "Deleted objects from S3");
        Ok(())
    }
}
