//! Suite serialization: materialize, resolve, validate, persist, release.

use std::sync::Arc;

use humansize::{format_size, DECIMAL};
use serde::{Deserialize, Serialize};
use suitepack_core::{
    manifest_key, normalize_relative, path_to_key, Manifest, MaterializedRepository,
    OriginSource, SerializedSuiteRequest, Suite,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::{OpsError, OpsResult};
use crate::lister::DirectoryLister;
use crate::repository::RepositoryFactory;
use crate::storage::{BlobStore, StoreRegistry};

/// Summary of a persisted manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestWritten {
    /// Storage key the manifest was written to.
    pub key: String,
    /// Number of files in the manifest.
    pub file_count: usize,
    /// Encoded size in bytes.
    pub size: usize,
}

/// Where a request stands, combining its record with manifest presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationStatus {
    /// Neither failed nor written yet.
    Pending,
    /// The manifest can be read.
    Ready,
    /// The request failed; see its failure reason.
    Failed,
}

/// Produces and reads manifests for serialized-suite requests.
///
/// The serializer never classifies failures; errors are returned with their
/// full cause chain.
#[derive(Debug)]
pub struct SuiteSerializer {
    catalog: Arc<dyn Catalog>,
    factory: RepositoryFactory,
    stores: StoreRegistry,
    lister: DirectoryLister,
    manifests: Arc<dyn BlobStore>,
}

impl SuiteSerializer {
    /// Create a serializer.
    ///
    /// `stores` supplies the storage materialized repositories are read from
    /// and `extensions` selects the files kept when a suite selects all.
    pub fn new(
        catalog: Arc<dyn Catalog>,
        factory: RepositoryFactory,
        stores: StoreRegistry,
        manifests: Arc<dyn BlobStore>,
        extensions: Vec<String>,
    ) -> Self {
        Self {
            catalog,
            lister: DirectoryLister::new(stores.clone(), extensions),
            factory,
            stores,
            manifests,
        }
    }

    /// Serialize the request's suite into one manifest and persist it.
    ///
    /// The materialized repository is released whether or not writing
    /// succeeded. A release failure is logged and does not replace the result.
    pub async fn write(&self, request: &SerializedSuiteRequest) -> OpsResult<ManifestWritten> {
        let suite = self.catalog.suite(request.suite_id).await?;
        let origin = self.catalog.origin(suite.origin_id).await?;

        let repository = self.factory.materialize(&origin, request).await?;
        let result = self.build(&origin, &suite, request, &repository).await;

        if let Err(e) = self.factory.release(&repository).await {
            warn!(
                request = %request.id,
                base = %repository.base_path,
                error = %e,
                "Failed to release materialized repository"
            );
        }

        let written = result?;
        info!(
            request = %request.id,
            key = %written.key,
            files = written.file_count,
            size = %format_size(written.size, DECIMAL),
            "Wrote manifest"
        );
        Ok(written)
    }

    /// Raw manifest bytes for a request.
    ///
    /// Returns [`OpsError::NotYetAvailable`] while no manifest exists.
    pub async fn read(&self, request: &SerializedSuiteRequest) -> OpsResult<Vec<u8>> {
        let key = self.manifest_location(request).await?;
        match self.manifests.read(&key).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.is_not_found() => Err(OpsError::NotYetAvailable {
                request_id: request.id,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Decoded manifest for a request.
    pub async fn read_manifest(&self, request: &SerializedSuiteRequest) -> OpsResult<Manifest> {
        let bytes = self.read(request).await?;
        Ok(Manifest::decode(&bytes)?)
    }

    pub async fn status(&self, request_id: Uuid) -> OpsResult<SerializationStatus> {
        let request = self.catalog.request(request_id).await?;
        if request.is_failed() {
            return Ok(SerializationStatus::Failed);
        }
        let key = self.manifest_location(&request).await?;
        if self.manifests.exists(&key).await? {
            Ok(SerializationStatus::Ready)
        } else {
            Ok(SerializationStatus::Pending)
        }
    }

    /// Manifest key for a request. Written manifests stay readable after
    /// their suite is soft-deleted.
    async fn manifest_location(&self, request: &SerializedSuiteRequest) -> OpsResult<String> {
        let suite = self.catalog.suite_including_deleted(request.suite_id).await?;
        let origin = self.catalog.origin(suite.origin_id).await?;
        Ok(manifest_key(origin.owner_id, request.id))
    }

    async fn build(
        &self,
        origin: &OriginSource,
        suite: &Suite,
        request: &SerializedSuiteRequest,
        repository: &MaterializedRepository,
    ) -> OpsResult<ManifestWritten> {
        let store = self
            .stores
            .get(repository.kind)
            .ok_or_else(|| OpsError::RepositoryUnreadable {
                kind: repository.kind,
                path: repository.base_path.clone(),
            })?;

        let paths: Vec<String> = if suite.selects_all() {
            self.lister.list(repository).await?.into_iter().collect()
        } else {
            suite
                .tests
                .iter()
                .map(|test| normalize_test_path(test))
                .collect::<OpsResult<_>>()?
        };

        let mut manifest = Manifest::new(request.parameters.clone());
        for path in paths {
            let content = read_test(store.as_ref(), repository, &path).await?;
            validate_document(&path, &content)?;
            debug!(request = %request.id, path = %path, "Resolved test");
            manifest.insert(path, content);
        }

        let bytes = manifest.encode()?;
        let key = manifest_key(origin.owner_id, request.id);
        self.manifests
            .write(&key, &bytes)
            .await
            .map_err(|source| OpsError::TargetWrite {
                key: key.clone(),
                source,
            })?;

        Ok(ManifestWritten {
            key,
            file_count: manifest.files().len(),
            size: bytes.len(),
        })
    }
}

/// Normalize an explicitly selected path, rejecting ones that leave the base.
fn normalize_test_path(test: &str) -> OpsResult<String> {
    let invalid = || OpsError::InvalidTestPath {
        path: test.to_string(),
    };
    let normalized = normalize_relative(test).ok_or_else(invalid)?;
    let key = path_to_key(&normalized);
    if key.is_empty() {
        return Err(invalid());
    }
    Ok(key)
}

async fn read_test(
    store: &dyn BlobStore,
    repository: &MaterializedRepository,
    path: &str,
) -> OpsResult<String> {
    let bytes = match store.read(&repository.key(path)).await {
        Ok(bytes) => bytes,
        Err(source) if source.is_not_found() => {
            return Err(OpsError::MissingTest {
                path: path.to_string(),
                source,
            })
        }
        Err(e) => return Err(e.into()),
    };
    String::from_utf8(bytes).map_err(|source| OpsError::NotUtf8 {
        path: path.to_string(),
        source,
    })
}

/// Parse every document in `content`; the error names the line and column.
fn validate_document(path: &str, content: &str) -> OpsResult<()> {
    for document in serde_yaml::Deserializer::from_str(content) {
        serde_yaml::Value::deserialize(document).map_err(|source| OpsError::InvalidDocument {
            path: path.to_string(),
            message: source.to_string(),
            source,
        })?;
    }
    Ok(())
}
