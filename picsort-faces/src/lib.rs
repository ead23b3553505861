//! picsort-faces library interface
//!
//! Photo ingestion and face-identity resolution for event-scoped photo
//! sharing. Components receive an `AppContext` at construction; nothing is
//! held in process-wide state.

pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod utils;

pub use crate::config::FaceSettings;
pub use crate::error::{BatchFailure, BatchItemError, BatchReport, IngestError, IngestStage};

use clients::{FaceOracle, ObjectStore};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared state handed to every pipeline component
#[derive(Clone)]
pub struct AppContext {
    /// Database connection pool
    pub db: SqlitePool,
    /// Face recognition oracle
    pub oracle: Arc<dyn FaceOracle>,
    /// Photo object storage
    pub objects: Arc<dyn ObjectStore>,
    pub settings: Arc<FaceSettings>,
}

impl AppContext {
    pub fn new(
        db: SqlitePool,
        oracle: Arc<dyn FaceOracle>,
        objects: Arc<dyn ObjectStore>,
        settings: FaceSettings,
    ) -> Self {
        Self {
            db,
            oracle,
            objects,
            settings: Arc::new(settings),
        }
    }
}
