//! Enumerating the files of a materialized repository.

use std::collections::BTreeSet;

use suitepack_core::MaterializedRepository;
use tracing::debug;

use crate::config::has_extension;
use crate::error::{OpsError, OpsResult};
use crate::storage::StoreRegistry;

/// Lists files below a repository's base, keeping configured extensions.
#[derive(Debug, Clone)]
pub struct DirectoryLister {
    stores: StoreRegistry,
    extensions: Vec<String>,
}

impl DirectoryLister {
    pub fn new(stores: StoreRegistry, extensions: Vec<String>) -> Self {
        Self { stores, extensions }
    }

    /// Relative paths of every structured-data file in `repository`.
    ///
    /// A missing or empty tree lists as empty. Storage errors propagate.
    pub async fn list(&self, repository: &MaterializedRepository) -> OpsResult<BTreeSet<String>> {
        let store = self
            .stores
            .get(repository.kind)
            .ok_or_else(|| OpsError::RepositoryUnreadable {
                kind: repository.kind,
                path: repository.base_path.clone(),
            })?;

        let base = repository.base_path.trim_matches('/');
        let keys = store.list(base).await?;

        let files: BTreeSet<String> = keys
            .iter()
            .filter_map(|key| relative_to(base, key))
            .filter(|path| self.matches(path))
            .collect();

        debug!(
            base = %repository.base_path,
            listed = keys.len(),
            kept = files.len(),
            "Listed repository"
        );
        Ok(files)
    }

    fn matches(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);
        if name.starts_with('.') {
            return false;
        }
        has_extension(name, &self.extensions)
    }
}

fn relative_to(base: &str, key: &str) -> Option<String> {
    if base.is_empty() {
        return Some(key.to_string());
    }
    key.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
}
