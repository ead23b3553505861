//! Runtime settings for the face pipeline
//!
//! Resolved once from `TomlConfig` plus environment overrides and shared
//! read-only through `AppContext`.
//!
//! **Bucket priority:** ENV (`PICSORT_BUCKET_NAME`) → TOML `[storage].bucket`

use picsort_common::config::TomlConfig;
use picsort_common::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the photo bucket
pub const BUCKET_ENV_VAR: &str = "PICSORT_BUCKET_NAME";

/// Resolved pipeline settings
#[derive(Debug, Clone, PartialEq)]
pub struct FaceSettings {
    /// Photo bucket. Absence is reported when a photo is ingested, not at startup.
    pub bucket: Option<String>,
    pub resolve_threshold: f32,
    pub match_threshold: f32,
    pub match_max_results: u32,
    pub upload_ttl: Duration,
    pub download_ttl: Duration,
    /// Worker limit for one batch, at least 1
    pub max_concurrent_ingests: usize,
    pub max_lock_wait_ms: u64,
}

impl Default for FaceSettings {
    fn default() -> Self {
        Self::from_toml(&TomlConfig::default(), None)
    }
}

impl FaceSettings {
    /// Resolve settings from the TOML model and process environment
    pub fn resolve(toml_config: &TomlConfig) -> Self {
        let env_bucket = std::env::var(BUCKET_ENV_VAR).ok();
        Self::from_toml(toml_config, env_bucket)
    }

    fn from_toml(toml_config: &TomlConfig, env_bucket: Option<String>) -> Self {
        let env_bucket = non_blank(env_bucket);
        let toml_bucket = non_blank(toml_config.storage.bucket.clone());

        let bucket = match (env_bucket, toml_bucket) {
            (Some(env), Some(_)) => {
                warn!(
                    "Bucket configured in both {} and TOML. Using environment.",
                    BUCKET_ENV_VAR
                );
                Some(env)
            }
            (Some(env), None) => {
                info!("Bucket loaded from environment");
                Some(env)
            }
            (None, toml) => toml,
        };

        Self {
            bucket,
            resolve_threshold: toml_config.recognition.resolve_threshold,
            match_threshold: toml_config.recognition.match_threshold,
            match_max_results: toml_config.recognition.match_max_results,
            upload_ttl: Duration::from_secs(toml_config.storage.upload_url_ttl_secs),
            download_ttl: Duration::from_secs(toml_config.storage.download_url_ttl_secs),
            max_concurrent_ingests: toml_config.pipeline.max_concurrent_ingests.max(1),
            max_lock_wait_ms: toml_config.database.max_lock_wait_ms,
        }
    }

    /// Configured bucket, or a fatal `Config` error
    pub fn require_bucket(&self) -> Result<&str> {
        self.bucket.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "no photo bucket configured (set {} or [storage].bucket)",
                BUCKET_ENV_VAR
            ))
        })
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
