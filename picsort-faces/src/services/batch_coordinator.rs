//! Batch Coordinator
//!
//! Fans a batch of storage keys out to the ingestion pipeline, joins, and
//! then runs identity resolution once over every photo that persisted.
//!
//! - Each key is ingested in its own spawned task; one failure (or panic)
//!   never blocks or cancels the others
//! - At most `max_concurrent_ingests` tasks run at once
//! - A cancelled batch skips resolution and reports `Cancelled`

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::identity_resolver::IdentityResolver;
use super::ingestion::IngestionPipeline;
use crate::error::{BatchFailure, BatchItemError, BatchReport, IngestError};
use crate::AppContext;

pub struct BatchCoordinator {
    pipeline: Arc<IngestionPipeline>,
    resolver: IdentityResolver,
    max_concurrent: usize,
}

impl BatchCoordinator {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            pipeline: Arc::new(IngestionPipeline::new(ctx.clone())),
            max_concurrent: ctx.settings.max_concurrent_ingests.max(1),
            resolver: IdentityResolver::new(ctx),
        }
    }

    /// Ingest and resolve a batch, failing unless every step succeeded
    pub async fn ingest_batch(
        &self,
        storage_keys: &[String],
        uploaded_by: Uuid,
        event_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Vec<Uuid>, BatchFailure> {
        self.run(storage_keys, uploaded_by, event_id, cancel)
            .await
            .into_result(event_id)
    }

    /// Ingest and resolve a batch, returning successes and errors side by side
    ///
    /// `succeeded` keeps the order of `storage_keys`.
    pub async fn run(
        &self,
        storage_keys: &[String],
        uploaded_by: Uuid,
        event_id: Uuid,
        cancel: &CancellationToken,
    ) -> BatchReport {
        tracing::info!(
            event_id = %event_id,
            photos = storage_keys.len(),
            workers = self.max_concurrent,
            "Starting photo batch"
        );

        let mut outcomes: Vec<(usize, String, Result<Result<Uuid, IngestError>, tokio::task::JoinError>)> =
            stream::iter(storage_keys.iter().cloned().enumerate())
                .map(|(index, storage_key)| {
                    let pipeline = self.pipeline.clone();
                    let cancel = cancel.clone();
                    let task_key = storage_key.clone();

                    async move {
                        let handle = tokio::spawn(async move {
                            pipeline.ingest(&task_key, uploaded_by, event_id, &cancel).await
                        });
                        (index, storage_key, handle.await)
                    }
                })
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;

        // Join point
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut report = BatchReport::default();
        for (_, storage_key, outcome) in outcomes {
            match outcome {
                Ok(Ok(photo_id)) => report.succeeded.push(photo_id),
                Ok(Err(e)) => {
                    tracing::error!(
                        event_id = %event_id,
                        storage_key = %storage_key,
                        stage = %e.stage,
                        error = %e.source,
                        "Photo ingestion failed"
                    );
                    report.errors.push(BatchItemError::Ingest(e));
                }
                Err(join_err) => {
                    tracing::error!(
                        event_id = %event_id,
                        storage_key = %storage_key,
                        error = %join_err,
                        "Photo ingestion task aborted"
                    );
                    report.errors.push(BatchItemError::TaskAborted {
                        storage_key,
                        message: join_err.to_string(),
                    });
                }
            }
        }

        if cancel.is_cancelled() {
            tracing::info!(
                event_id = %event_id,
                persisted = report.succeeded.len(),
                "Batch cancelled, skipping identity resolution"
            );
            report.errors.push(BatchItemError::Cancelled);
            return report;
        }

        if !report.succeeded.is_empty() {
            if let Err(e) = self.resolver.resolve(event_id, &report.succeeded, cancel).await {
                report.errors.push(BatchItemError::Resolve(e));
            }
        }

        tracing::info!(
            event_id = %event_id,
            succeeded = report.succeeded.len(),
            failed = report.errors.len(),
            "Photo batch completed"
        );

        report
    }
}
