//! Configuration loading and root folder resolution
//!
//! Config file lookup order:
//! 1. Explicit path (command-line argument)
//! 2. `PICSORT_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/picsort/config.toml` on Linux)
//! 4. Built-in defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PICSORT_CONFIG";

/// Environment variable naming the data root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "PICSORT_ROOT_FOLDER";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// Data folder holding the SQLite database
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub recognition: RecognitionConfig,
    pub pipeline: PipelineConfig,
    pub database: DatabaseConfig,
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Object storage section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Bucket holding uploaded photos. Required for ingestion.
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Lifetime of presigned upload URLs
    pub upload_url_ttl_secs: u64,
    /// Lifetime of presigned download URLs
    pub download_url_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            region: None,
            upload_url_ttl_secs: 180,
            download_url_ttl_secs: 4 * 60 * 60,
        }
    }
}

/// Face recognition section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Similarity (percent) required to attach a new detection to a known face
    pub resolve_threshold: f32,
    /// Similarity (percent) required for a reference-image lookup
    pub match_threshold: f32,
    /// Maximum candidates returned by a reference-image lookup
    pub match_max_results: u32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            resolve_threshold: 85.0,
            match_threshold: 90.0,
            match_max_results: 5,
        }
    }
}

/// Batch pipeline section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Photos ingested simultaneously within one batch
    pub max_concurrent_ingests: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_ingests: 8,
        }
    }
}

/// Database section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Explicit database file; defaults to `<root_folder>/picsort.db`
    pub path: Option<PathBuf>,
    /// Upper bound on retrying a unit of work that hit a database lock
    pub max_lock_wait_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_lock_wait_ms: 5000,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Database file location, falling back to the resolved root folder
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            resolve_root_folder(self.root_folder.as_deref()).join("picsort.db")
        })
    }
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = TomlConfig::from_toml_str(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Load configuration following the lookup order in the module docs
///
/// An explicit path or `PICSORT_CONFIG` that cannot be read is an error;
/// a missing platform default file is not.
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        return load_toml_config(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return load_toml_config(Path::new(&path));
    }

    if let Some(path) = default_config_path() {
        if path.exists() {
            return load_toml_config(&path);
        }
        debug!("No config file at {}, using defaults", path.display());
    }

    Ok(TomlConfig::default())
}

/// Platform config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("picsort").join("config.toml"))
}

/// Resolve the data root folder: config value, then environment, then OS default
pub fn resolve_root_folder(configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        return PathBuf::from(path);
    }

    get_default_root_folder()
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("picsort"))
        .unwrap_or_else(|| PathBuf::from("./picsort_data"))
}
