//! Turning origin sources into readable file trees and tearing them down.

use async_trait::async_trait;
use suitepack_core::{
    MaterializedRepository, OriginKind, OriginSource, RepositoryKind, SerializedSuiteRequest,
    REF_PARAMETER,
};
use suitepack_git::GitRepositoryStore;
use tracing::debug;

use crate::error::{OpsError, OpsResult};

/// Materializes one family of origin sources.
#[async_trait]
pub trait RepositoryHandler: Send + Sync {
    /// Handler name for logs.
    fn name(&self) -> &'static str;

    /// Kind of repository this handler produces and releases.
    fn kind(&self) -> RepositoryKind;

    fn supports(&self, origin: &OriginSource) -> bool;

    /// Produce a readable tree of `origin` for one attempt of `request`.
    async fn materialize(
        &self,
        origin: &OriginSource,
        request: &SerializedSuiteRequest,
    ) -> OpsResult<MaterializedRepository>;

    /// Release what [`materialize`](Self::materialize) allocated.
    async fn release(&self, repository: &MaterializedRepository) -> OpsResult<()>;
}

/// File origins are read in place; nothing is allocated or released.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileRepositoryHandler;

#[async_trait]
impl RepositoryHandler for FileRepositoryHandler {
    fn name(&self) -> &'static str {
        "file"
    }

    fn kind(&self) -> RepositoryKind {
        RepositoryKind::File
    }

    fn supports(&self, origin: &OriginSource) -> bool {
        matches!(origin.kind, OriginKind::File(_))
    }

    async fn materialize(
        &self,
        origin: &OriginSource,
        _request: &SerializedSuiteRequest,
    ) -> OpsResult<MaterializedRepository> {
        Ok(MaterializedRepository::file(origin))
    }

    async fn release(&self, _repository: &MaterializedRepository) -> OpsResult<()> {
        Ok(())
    }
}

/// Git origins are cloned into a scratch directory named after the request.
#[derive(Debug, Clone)]
pub struct GitRepositoryHandler {
    store: GitRepositoryStore,
}

impl GitRepositoryHandler {
    pub fn new(store: GitRepositoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RepositoryHandler for GitRepositoryHandler {
    fn name(&self) -> &'static str {
        "git"
    }

    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Git
    }

    fn supports(&self, origin: &OriginSource) -> bool {
        origin.as_git().is_some()
    }

    async fn materialize(
        &self,
        origin: &OriginSource,
        request: &SerializedSuiteRequest,
    ) -> OpsResult<MaterializedRepository> {
        let git = origin.as_git().ok_or_else(|| OpsError::UnsupportedSource {
            type_name: origin.type_name().to_string(),
        })?;
        let git_ref = request
            .parameters
            .get(REF_PARAMETER)
            .filter(|r| !r.trim().is_empty())
            .or(git.default_ref.as_ref())
            .map(String::as_str)
            .filter(|r| !r.trim().is_empty());

        Ok(self
            .store
            .initialize(request.id, origin.id, git, git_ref)
            .await?)
    }

    async fn release(&self, repository: &MaterializedRepository) -> OpsResult<()> {
        Ok(self.store.remove(repository).await?)
    }
}

/// Dispatches origins to the first handler that supports them.
#[derive(Default)]
pub struct RepositoryFactory {
    handlers: Vec<Box<dyn RepositoryHandler>>,
}

impl std::fmt::Debug for RepositoryFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.handlers.iter().map(|h| h.name()).collect();
        f.debug_struct("RepositoryFactory")
            .field("handlers", &names)
            .finish()
    }
}

impl RepositoryFactory {
    /// A factory with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// File and git handlers, in that order.
    pub fn with_defaults(git_store: GitRepositoryStore) -> Self {
        Self::new()
            .register(FileRepositoryHandler)
            .register(GitRepositoryHandler::new(git_store))
    }

    /// Append a handler. Earlier registrations take precedence.
    pub fn register(mut self, handler: impl RepositoryHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn supports(&self, origin: &OriginSource) -> bool {
        self.handlers.iter().any(|h| h.supports(origin))
    }

    pub async fn materialize(
        &self,
        origin: &OriginSource,
        request: &SerializedSuiteRequest,
    ) -> OpsResult<MaterializedRepository> {
        let handler = self
            .handlers
            .iter()
            .find(|h| h.supports(origin))
            .ok_or_else(|| OpsError::UnsupportedSource {
                type_name: origin.type_name().to_string(),
            })?;
        debug!(
            origin = %origin.id,
            request = %request.id,
            handler = handler.name(),
            "Materializing origin"
        );
        handler.materialize(origin, request).await
    }

    /// Release through the handler that produces `repository.kind`.
    pub async fn release(&self, repository: &MaterializedRepository) -> OpsResult<()> {
        match self.handlers.iter().find(|h| h.kind() == repository.kind) {
            Some(handler) => handler.release(repository).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use suitepack_core::{GitOrigin, Parameters, Suite};
    use uuid::Uuid;

    fn request_for(origin: &OriginSource, parameters: Parameters) -> SerializedSuiteRequest {
        SerializedSuiteRequest::new(&Suite::all(origin.id), origin, parameters)
    }

    #[tokio::test]
    async fn test_file_origin_is_passthrough() {
        let factory = RepositoryFactory::new().register(FileRepositoryHandler);
        let origin = OriginSource::file(Uuid::new_v4(), "uploads");
        let request = request_for(&origin, Parameters::new());

        let repo = factory.materialize(&origin, &request).await.unwrap();
        assert_eq!(repo.kind, RepositoryKind::File);
        assert_eq!(repo.base_path, origin.base_path());
        assert!(repo.scratch_dir.is_none());
        factory.release(&repo).await.unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_source_names_type() {
        let factory = RepositoryFactory::new().register(FileRepositoryHandler);
        let origin = OriginSource::git(Uuid::new_v4(), GitOrigin::new("https://example.com/r.git"));
        let request = request_for(&origin, Parameters::new());

        match factory.materialize(&origin, &request).await {
            Err(OpsError::UnsupportedSource { type_name }) => assert_eq!(type_name, "git"),
            other => panic!("Expected UnsupportedSource, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_support_both_kinds() {
        let store = GitRepositoryStore::new("/tmp/unused", "git", Duration::from_secs(1));
        let factory = RepositoryFactory::with_defaults(store);
        let owner = Uuid::new_v4();
        assert!(factory.supports(&OriginSource::file(owner, "x")));
        assert!(factory.supports(&OriginSource::git(owner, GitOrigin::new("u"))));
        assert_eq!(
            format!("{:?}", factory),
            r#"RepositoryFactory { handlers: ["file", "git"] }"#
        );
    }
}
