//! Blob storage used for origin trees, git scratch clones and manifests.
//!
//! Keys are `/`-separated paths relative to a store's root. Keys that climb
//! above the root are rejected with [`StorageError::InvalidKey`].

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use suitepack_core::{normalize_relative, path_to_key, RepositoryKind};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a [`BlobStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object {key} not found")]
    NotFound { key: String },

    #[error("invalid storage key `{key}`")]
    InvalidKey { key: String },

    #[error("storage I/O failed for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(key: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound {
                key: key.to_string(),
            }
        } else {
            StorageError::Io {
                key: key.to_string(),
                source,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Byte storage addressed by relative keys.
#[async_trait]
pub trait BlobStore: Debug + Send + Sync {
    /// Read the object stored at `key`.
    async fn read(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Store `bytes` at `key`, replacing any previous object atomically.
    async fn write(&self, key: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Delete the object or tree at `key`. Deleting nothing is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Keys of all objects under `prefix`, recursively, sorted ascending.
    ///
    /// Hidden entries (any path segment starting with `.`) are not listed and
    /// a missing prefix lists as empty.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Whether an object exists at `key`.
    async fn exists(&self, key: &str) -> StorageResult<bool>;
}

fn normalize_key(key: &str) -> StorageResult<String> {
    normalize_relative(key)
        .map(|path| path_to_key(&path))
        .ok_or_else(|| StorageError::InvalidKey {
            key: key.to_string(),
        })
}

fn is_hidden_key(key: &str) -> bool {
    key.split('/').any(|segment| segment.starts_with('.'))
}

// =============================================================================
// Filesystem Store
// =============================================================================

/// A [`BlobStore`] backed by a directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = normalize_relative(key).ok_or_else(|| StorageError::InvalidKey {
            key: key.to_string(),
        })?;
        Ok(self.root.join(relative))
    }

    /// Reject objects whose real location (after symlinks) is outside the root.
    async fn confine(&self, key: &str, path: &Path) -> StorageResult<()> {
        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        let real = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        if real.starts_with(&root) {
            Ok(())
        } else {
            Err(StorageError::InvalidKey {
                key: key.to_string(),
            })
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(key)?;
        self.confine(key, &path).await?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| StorageError::io(key, e))
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        let path = self.resolve(key)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::InvalidKey {
                key: key.to_string(),
            })?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    key: key.to_string(),
                    source,
                })?;
        }

        let staging = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        tokio::fs::write(&staging, bytes).await.map_err(io_err)?;
        if let Err(source) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(io_err(source));
        }

        debug!(key, bytes = bytes.len(), "Wrote object");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve(key)?;
        let metadata = match tokio::fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::io(key, e)),
        };
        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(key, e)),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let dir = self.resolve(prefix)?;
        let root = self.root.clone();
        let key = prefix.to_string();

        tokio::task::spawn_blocking(move || walk_files(&root, &dir))
            .await
            .map_err(|e| StorageError::Io {
                key: key.clone(),
                source: io::Error::other(e.to_string()),
            })?
            .map_err(|source| StorageError::Io { key, source })
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::io(key, e))
    }
}

/// Collect regular files below `dir` as keys relative to `root`.
fn walk_files(root: &Path, dir: &Path) -> io::Result<Vec<String>> {
    match std::fs::symlink_metadata(dir) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    }

    let mut keys = Vec::new();
    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry.map_err(|e| {
            let message = e.to_string();
            e.into_io_error().unwrap_or_else(|| io::Error::other(message))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            keys.push(path_to_key(relative));
        }
    }
    keys.sort();
    Ok(keys)
}

/// Check if entry is hidden (starts with .).
fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// A [`BlobStore`] kept in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let normalized = normalize_key(key)?;
        self.objects
            .read()
            .await
            .get(&normalized)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        let normalized = normalize_key(key)?;
        if normalized.is_empty() {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
            });
        }
        self.objects.write().await.insert(normalized, bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let normalized = normalize_key(key)?;
        let nested = format!("{}/", normalized);
        self.objects
            .write()
            .await
            .retain(|k, _| k != &normalized && !(normalized.is_empty() || k.starts_with(&nested)));
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let normalized = normalize_key(prefix)?;
        let nested = format!("{}/", normalized);
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| normalized.is_empty() || *k == &normalized || k.starts_with(&nested))
            .filter(|k| {
                let key: &str = k;
                !is_hidden_key(key.strip_prefix(nested.as_str()).unwrap_or(key))
            })
            .cloned()
            .collect())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let normalized = normalize_key(key)?;
        Ok(self.objects.read().await.contains_key(&normalized))
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Maps each repository kind to the storage its trees are read from.
#[derive(Debug, Clone, Default)]
pub struct StoreRegistry {
    stores: HashMap<RepositoryKind, Arc<dyn BlobStore>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the store for `kind`, replacing any previous one.
    pub fn with_store(mut self, kind: RepositoryKind, store: Arc<dyn BlobStore>) -> Self {
        self.stores.insert(kind, store);
        self
    }

    pub fn get(&self, kind: RepositoryKind) -> Option<Arc<dyn BlobStore>> {
        self.stores.get(&kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_store_round_trip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store.write("o/r/b.yaml", b"b").await.unwrap();
        store.write("o/r/a.yaml", b"a").await.unwrap();
        store.write("o/r/nested/c.json", b"{}").await.unwrap();
        store.write("o/r/.git/config", b"x").await.unwrap();
        store.write("other/z.yaml", b"z").await.unwrap();

        assert_eq!(store.read("o/r/a.yaml").await.unwrap(), b"a");
        assert_eq!(
            store.list("o/r").await.unwrap(),
            vec!["o/r/a.yaml", "o/r/b.yaml", "o/r/nested/c.json"]
        );
        assert!(store.list("missing/prefix").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fs_store_write_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.write("k/manifest", b"one").await.unwrap();
        store.write("k/manifest", b"two").await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("k")).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(store.read("k/manifest").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_fs_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("root"));
        assert!(matches!(
            store.read("../secret").await,
            Err(StorageError::InvalidKey { .. })
        ));
        assert!(matches!(
            store.write("a/../../b", b"x").await,
            Err(StorageError::InvalidKey { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fs_store_refuses_symlinks_out_of_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(dir.path().join("secret.yaml"), "token: x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("secret.yaml"), root.join("link.yaml")).unwrap();

        let store = FsBlobStore::new(&root);
        assert!(matches!(
            store.read("link.yaml").await,
            Err(StorageError::InvalidKey { .. })
        ));
        assert!(store.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fs_store_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let err = store.read("nope.yaml").await.unwrap_err();
        assert!(err.is_not_found());
        store.delete("nope.yaml").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_prefix_semantics() {
        let store = MemoryBlobStore::new();
        store.write("a/b/c.yaml", b"1").await.unwrap();
        store.write("a/bc/d.yaml", b"2").await.unwrap();
        store.write("a/b/.hidden/e.yaml", b"3").await.unwrap();

        assert_eq!(store.list("a/b").await.unwrap(), vec!["a/b/c.yaml"]);
        assert_eq!(store.list("./a//b/").await.unwrap(), vec!["a/b/c.yaml"]);

        store.delete("a/b").await.unwrap();
        assert!(!store.exists("a/b/c.yaml").await.unwrap());
        assert!(store.exists("a/bc/d.yaml").await.unwrap());
    }

    #[test]
    fn test_registry_lookup() {
        let registry =
            StoreRegistry::new().with_store(RepositoryKind::File, Arc::new(MemoryBlobStore::new()));
        assert!(registry.get(RepositoryKind::File).is_some());
        assert!(registry.get(RepositoryKind::Git).is_none());
    }
}
