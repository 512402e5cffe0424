//! Suitepack Operations Layer
//!
//! Materializes origin sources, serializes suites into manifests and records
//! failures against the closed failure taxonomy.
//!
//! ## Architecture
//!
//! - **Catalog**: the record store the pipeline reads and updates
//! - **RepositoryFactory**: turns an origin into a readable tree and releases it
//! - **SuiteSerializer**: materialize, resolve, validate, persist, release
//! - **FailureClassifier**: maps an error chain onto a failure reason
//! - **Worker**: drives the serializer from a job queue
//! - **OpsContext**: wires all of the above from a [`Config`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use suitepack_ops::{Config, InMemoryCatalog, OpsContext, SerializationJob};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let catalog = Arc::new(InMemoryCatalog::new());
//!     let ctx = OpsContext::new(Config::load()?, catalog);
//!
//!     let (jobs, rx) = tokio::sync::mpsc::channel(16);
//!     let worker = ctx.spawn_worker(rx);
//!     jobs.send(SerializationJob::new(Uuid::new_v4())).await?;
//!     drop(jobs);
//!     worker.await?;
//!     Ok(())
//! }
//! ```

mod catalog;
mod classifier;
mod config;
mod context;
mod error;
mod lister;
mod repository;
mod serializer;
mod storage;
mod worker;

// Re-export public API
pub use catalog::{Catalog, InMemoryCatalog};
pub use classifier::{Classification, FailureClassifier, Matcher};
pub use config::Config;
pub use context::OpsContext;
pub use error::{OpsError, OpsResult};
pub use lister::DirectoryLister;
pub use repository::{
    FileRepositoryHandler, GitRepositoryHandler, RepositoryFactory, RepositoryHandler,
};
pub use serializer::{ManifestWritten, SerializationStatus, SuiteSerializer};
pub use storage::{
    BlobStore, FsBlobStore, MemoryBlobStore, StorageError, StorageResult, StoreRegistry,
};
pub use worker::{JobOutcome, SerializationJob, Worker};
