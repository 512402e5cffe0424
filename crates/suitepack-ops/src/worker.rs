//! Asynchronous execution of serialization jobs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::classifier::{Classification, FailureClassifier};
use crate::error::OpsResult;
use crate::serializer::{ManifestWritten, SuiteSerializer};

/// A queued request to serialize one serialized-suite request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializationJob {
    pub request_id: Uuid,
}

impl SerializationJob {
    pub fn new(request_id: Uuid) -> Self {
        Self { request_id }
    }
}

/// What handling a job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The manifest was written.
    Written(ManifestWritten),
    /// Serialization failed and the request was marked with this failure.
    Failed(Classification),
    /// The request had already failed; nothing was attempted.
    Skipped,
}

/// Runs the serializer for queued jobs and records failures.
#[derive(Debug, Clone)]
pub struct Worker {
    serializer: Arc<SuiteSerializer>,
    catalog: Arc<dyn Catalog>,
    classifier: FailureClassifier,
}

impl Worker {
    pub fn new(
        serializer: Arc<SuiteSerializer>,
        catalog: Arc<dyn Catalog>,
        classifier: FailureClassifier,
    ) -> Self {
        Self {
            serializer,
            catalog,
            classifier,
        }
    }

    /// Handle one job.
    ///
    /// Serialization errors are classified and recorded, not returned. An
    /// error is returned only when the request cannot be loaded or updated.
    pub async fn handle(&self, job: SerializationJob) -> OpsResult<JobOutcome> {
        let request = self.catalog.request(job.request_id).await?;
        if request.is_failed() {
            debug!(request = %request.id, "Request already failed, skipping");
            return Ok(JobOutcome::Skipped);
        }

        match self.serializer.write(&request).await {
            Ok(written) => Ok(JobOutcome::Written(written)),
            Err(error) => {
                let classification = self.classifier.classify(&error);
                let recorded = self
                    .catalog
                    .mark_failed(request.id, classification.reason, &classification.message)
                    .await?;
                warn!(
                    request = %request.id,
                    reason = %classification.reason,
                    recorded,
                    error = %error,
                    "Serialization failed"
                );
                Ok(JobOutcome::Failed(classification))
            }
        }
    }

    /// Process jobs one at a time until the channel closes.
    ///
    /// Returns the number of jobs received.
    pub async fn run(&self, mut jobs: mpsc::Receiver<SerializationJob>) -> usize {
        let mut handled = 0;
        while let Some(job) = jobs.recv().await {
            handled += 1;
            if let Err(e) = self.handle(job).await {
                warn!(request = %job.request_id, error = %e, "Failed to handle job");
            }
        }
        info!(handled, "Job queue closed");
        handled
    }
}
