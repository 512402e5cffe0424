//! The combined artifact produced by a serialization.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Parameters;

/// Fixed file name of a manifest inside its request directory.
pub const MANIFEST_FILE_NAME: &str = "manifest";

const MANIFEST_VERSION: u32 = 1;

/// Storage key of the manifest for a request: `{owner}/{request}/manifest`.
pub fn manifest_key(owner_id: Uuid, request_id: Uuid) -> String {
    format!("{}/{}/{}", owner_id, request_id, MANIFEST_FILE_NAME)
}

/// Errors from encoding or decoding a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("manifest decoding failed: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("unsupported manifest version {0}")]
    UnsupportedVersion(u32),
}

/// One resolved file inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the materialized repository base.
    pub path: String,
    /// Raw file content.
    pub content: String,
}

/// All resolved files of a suite plus the run parameters.
///
/// Entries are kept sorted by path and parameters by name, so two manifests
/// built from the same inputs encode to identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    version: u32,
    files: Vec<ManifestEntry>,
    parameters: Parameters,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new(Parameters::new())
    }
}

impl Manifest {
    /// Start a manifest with the given run parameters and no files.
    pub fn new(parameters: Parameters) -> Self {
        Self {
            version: MANIFEST_VERSION,
            files: Vec::new(),
            parameters,
        }
    }

    /// Add a file, replacing any entry with the same path.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let entry = ManifestEntry {
            path: path.into(),
            content: content.into(),
        };
        match self.files.binary_search_by(|e| e.path.cmp(&entry.path)) {
            Ok(index) => self.files[index] = entry,
            Err(index) => self.files.insert(index, entry),
        }
    }

    pub fn files(&self) -> &[ManifestEntry] {
        &self.files
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Encode to the textual artifact.
    pub fn encode(&self) -> Result<Vec<u8>, ManifestError> {
        serde_json::to_vec_pretty(self).map_err(ManifestError::Encode)
    }

    /// Decode a previously encoded manifest.
    pub fn decode(bytes: &[u8]) -> Result<Self, ManifestError> {
        let mut manifest: Manifest = serde_json::from_slice(bytes).map_err(ManifestError::Decode)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion(manifest.version));
        }
        manifest.files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_sorted_regardless_of_insertion_order() {
        let mut manifest = Manifest::default();
        manifest.insert("b.yaml", "b: 1\n");
        manifest.insert("a.yaml", "a: 1\n");
        manifest.insert("nested/c.yaml", "c: 1\n");

        let paths: Vec<&str> = manifest.files().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.yaml", "b.yaml", "nested/c.yaml"]);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let params = Parameters::from([
            ("vus".to_string(), "10".to_string()),
            ("duration".to_string(), "30s".to_string()),
        ]);
        let mut first = Manifest::new(params.clone());
        first.insert("a.yaml", "a");
        first.insert("b.yaml", "b");
        let mut second = Manifest::new(params);
        second.insert("b.yaml", "b");
        second.insert("a.yaml", "a");

        assert_eq!(first.encode().unwrap(), second.encode().unwrap());
    }

    #[test]
    fn test_parameters_section_sorted_by_name() {
        let params = Parameters::from([
            ("zeta".to_string(), "1".to_string()),
            ("alpha".to_string(), "2".to_string()),
        ]);
        let text = String::from_utf8(Manifest::new(params).encode().unwrap()).unwrap();
        let alpha = text.find("alpha").unwrap();
        let zeta = text.find("zeta").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let bytes = br#"{"version": 99, "files": [], "parameters": {}}"#;
        assert!(matches!(
            Manifest::decode(bytes),
            Err(ManifestError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_insert_replaces_same_path() {
        let mut manifest = Manifest::default();
        manifest.insert("a.yaml", "old");
        manifest.insert("a.yaml", "new");
        assert_eq!(manifest.files().len(), 1);
        assert_eq!(manifest.files()[0].content, "new");
    }

    #[test]
    fn test_manifest_key_layout() {
        let owner = Uuid::new_v4();
        let request = Uuid::new_v4();
        assert_eq!(
            manifest_key(owner, request),
            format!("{}/{}/manifest", owner, request)
        );
    }
}
