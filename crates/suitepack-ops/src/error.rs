//! Error types for the operations layer.

use suitepack_core::{ManifestError, RepositoryKind};
use suitepack_git::GitRepositoryError;
use thiserror::Error;
use uuid::Uuid;

use crate::storage::StorageError;

/// Result type for operations.
pub type OpsResult<T> = Result<T, OpsError>;

/// Errors that can occur during operations.
///
/// Wrapped errors are kept as `source()` so the failure classifier can walk
/// the whole cause chain.
#[derive(Debug, Error)]
pub enum OpsError {
    /// A record is missing from the catalog.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// No registered handler materializes this kind of origin.
    #[error("no materializer for source type `{type_name}`")]
    UnsupportedSource { type_name: String },

    /// Cloning or checking out a git origin failed.
    #[error("git materialization failed: {0}")]
    Git(#[from] GitRepositoryError),

    /// No storage is registered for the materialized repository's kind.
    #[error("no storage available to read {kind} repository at {path}")]
    RepositoryUnreadable { kind: RepositoryKind, path: String },

    /// An explicitly selected test is absent from the source tree.
    #[error("test `{path}` not found in source repository")]
    MissingTest {
        path: String,
        #[source]
        source: StorageError,
    },

    /// An explicitly selected test points outside the source tree.
    #[error("test path `{path}` is outside the source repository")]
    InvalidTestPath { path: String },

    /// A selected file is not UTF-8 text.
    #[error("test `{path}` is not valid UTF-8")]
    NotUtf8 {
        path: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// A selected file does not parse as structured data.
    #[error("test `{path}` is not valid structured data: {message}")]
    InvalidDocument {
        path: String,
        message: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The manifest could not be persisted.
    #[error("unable to write manifest to {key}: {source}")]
    TargetWrite {
        key: String,
        #[source]
        source: StorageError,
    },

    /// No manifest exists yet for the request.
    #[error("manifest for request {request_id} is not yet available")]
    NotYetAvailable { request_id: Uuid },

    /// Storage access failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Manifest encoding or decoding failed.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OpsError {
    /// Create a not-found error for a catalog entity.
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Whether the error means "nothing to read yet" rather than a failure.
    pub fn is_not_yet_available(&self) -> bool {
        matches!(self, Self::NotYetAvailable { .. })
    }
}
