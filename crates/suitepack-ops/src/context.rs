//! OpsContext - wires configuration into a ready-to-run pipeline.
//!
//! The context owns the stores, the repository factory and the serializer so
//! that a queue consumer or an API layer only has to supply a [`Catalog`].

use std::sync::Arc;

use suitepack_core::{RepositoryKind, SerializedSuiteRequest, SerializedSuiteView};
use suitepack_git::GitRepositoryStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::classifier::FailureClassifier;
use crate::config::Config;
use crate::error::OpsResult;
use crate::repository::RepositoryFactory;
use crate::serializer::{SerializationStatus, SuiteSerializer};
use crate::storage::{BlobStore, FsBlobStore, StoreRegistry};
use crate::worker::{SerializationJob, Worker};

/// The main operations context.
#[derive(Debug, Clone)]
pub struct OpsContext {
    /// Configuration the pipeline was built from.
    pub config: Config,
    catalog: Arc<dyn Catalog>,
    serializer: Arc<SuiteSerializer>,
}

impl OpsContext {
    /// Build filesystem-backed stores and the serializer from `config`.
    pub fn new(config: Config, catalog: Arc<dyn Catalog>) -> Self {
        let git_store = GitRepositoryStore::new(
            &config.scratch_dir,
            config.git_binary.clone(),
            config.git_timeout(),
        );
        let stores = StoreRegistry::new()
            .with_store(
                RepositoryKind::File,
                Arc::new(FsBlobStore::new(&config.file_store_dir)),
            )
            .with_store(
                RepositoryKind::Git,
                Arc::new(FsBlobStore::new(&config.scratch_dir)),
            );
        let manifests: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&config.manifest_store_dir));

        let serializer = SuiteSerializer::new(
            catalog.clone(),
            RepositoryFactory::with_defaults(git_store),
            stores,
            manifests,
            config.structured_extensions.clone(),
        );

        info!(
            scratch = %config.scratch_dir.display(),
            manifests = %config.manifest_store_dir.display(),
            "Initialized pipeline"
        );

        Self {
            config,
            catalog,
            serializer: Arc::new(serializer),
        }
    }

    /// Create a context from the on-disk configuration.
    pub fn from_config(catalog: Arc<dyn Catalog>) -> OpsResult<Self> {
        Ok(Self::new(Config::load()?, catalog))
    }

    pub fn serializer(&self) -> &SuiteSerializer {
        &self.serializer
    }

    /// A worker using the default failure classifier.
    pub fn worker(&self) -> Worker {
        Worker::new(
            self.serializer.clone(),
            self.catalog.clone(),
            FailureClassifier::new(),
        )
    }

    /// Start a worker task consuming `jobs` until the channel closes.
    pub fn spawn_worker(&self, jobs: mpsc::Receiver<SerializationJob>) -> JoinHandle<usize> {
        let worker = self.worker();
        tokio::spawn(async move { worker.run(jobs).await })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Public view of a request.
    pub async fn view(&self, request_id: Uuid) -> OpsResult<SerializedSuiteView> {
        Ok(self.catalog.request(request_id).await?.view())
    }

    pub async fn status(&self, request_id: Uuid) -> OpsResult<SerializationStatus> {
        self.serializer.status(request_id).await
    }

    /// Manifest bytes of a request, or `NotYetAvailable`.
    pub async fn read(&self, request_id: Uuid) -> OpsResult<Vec<u8>> {
        let request: SerializedSuiteRequest = self.catalog.request(request_id).await?;
        self.serializer.read(&request).await
    }
}
