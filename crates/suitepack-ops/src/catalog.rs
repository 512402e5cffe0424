//! Record store for origin sources, suites and serialized-suite requests.

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use suitepack_core::{FailureReason, OriginSource, SerializedSuiteRequest, Suite};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{OpsError, OpsResult};

/// Lookup and state transitions on the persisted records.
#[async_trait]
pub trait Catalog: Debug + Send + Sync {
    async fn origin(&self, id: Uuid) -> OpsResult<OriginSource>;

    /// Resolve a suite. Soft-deleted suites are reported as not found.
    async fn suite(&self, id: Uuid) -> OpsResult<Suite>;

    /// Resolve a suite whether or not it was soft-deleted.
    async fn suite_including_deleted(&self, id: Uuid) -> OpsResult<Suite>;

    async fn request(&self, id: Uuid) -> OpsResult<SerializedSuiteRequest>;

    /// Move a request to `FAILED`. Returns `false` if it had already failed.
    async fn mark_failed(&self, id: Uuid, reason: FailureReason, message: &str) -> OpsResult<bool>;
}

#[derive(Debug, Default)]
struct Records {
    origins: HashMap<Uuid, OriginSource>,
    suites: HashMap<Uuid, Suite>,
    requests: HashMap<Uuid, SerializedSuiteRequest>,
}

/// A [`Catalog`] held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    records: RwLock<Records>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_origin(&self, origin: OriginSource) {
        self.records.write().await.origins.insert(origin.id, origin);
    }

    pub async fn insert_suite(&self, suite: Suite) {
        self.records.write().await.suites.insert(suite.id, suite);
    }

    /// Store a request unless one with the same id exists.
    ///
    /// Returns `true` when the request was created.
    pub async fn insert_request(&self, request: SerializedSuiteRequest) -> bool {
        let mut records = self.records.write().await;
        if records.requests.contains_key(&request.id) {
            return false;
        }
        records.requests.insert(request.id, request);
        true
    }

    /// Soft-delete a suite. Returns `false` if it does not exist.
    pub async fn delete_suite(&self, id: Uuid) -> bool {
        match self.records.write().await.suites.get_mut(&id) {
            Some(suite) => {
                suite.deleted = true;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn origin(&self, id: Uuid) -> OpsResult<OriginSource> {
        self.records
            .read()
            .await
            .origins
            .get(&id)
            .cloned()
            .ok_or_else(|| OpsError::not_found("origin source", id))
    }

    async fn suite(&self, id: Uuid) -> OpsResult<Suite> {
        self.records
            .read()
            .await
            .suites
            .get(&id)
            .filter(|suite| !suite.deleted)
            .cloned()
            .ok_or_else(|| OpsError::not_found("suite", id))
    }

    async fn suite_including_deleted(&self, id: Uuid) -> OpsResult<Suite> {
        self.records
            .read()
            .await
            .suites
            .get(&id)
            .cloned()
            .ok_or_else(|| OpsError::not_found("suite", id))
    }

    async fn request(&self, id: Uuid) -> OpsResult<SerializedSuiteRequest> {
        self.records
            .read()
            .await
            .requests
            .get(&id)
            .cloned()
            .ok_or_else(|| OpsError::not_found("serialized suite", id))
    }

    async fn mark_failed(&self, id: Uuid, reason: FailureReason, message: &str) -> OpsResult<bool> {
        let mut records = self.records.write().await;
        let request = records
            .requests
            .get_mut(&id)
            .ok_or_else(|| OpsError::not_found("serialized suite", id))?;
        let changed = request.mark_failed(reason, message);
        debug!(request = %id, reason = %reason, changed, "Recorded failure");
        Ok(changed)
    }
}
