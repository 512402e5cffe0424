//! Configuration for the serialization pipeline.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{OpsError, OpsResult};

const ENV_SCRATCH_DIR: &str = "SUITEPACK_SCRATCH_DIR";
const ENV_FILE_STORE_DIR: &str = "SUITEPACK_FILE_STORE_DIR";
const ENV_MANIFEST_STORE_DIR: &str = "SUITEPACK_MANIFEST_STORE_DIR";
const ENV_GIT_BINARY: &str = "SUITEPACK_GIT_BINARY";
const ENV_GIT_TIMEOUT_SECS: &str = "SUITEPACK_GIT_TIMEOUT_SECS";

/// Configuration for suitepack operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory git origins are cloned into, one sub-directory per request.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Root of file-origin storage.
    #[serde(default = "default_file_store_dir")]
    pub file_store_dir: PathBuf,

    /// Root of manifest output storage.
    #[serde(default = "default_manifest_store_dir")]
    pub manifest_store_dir: PathBuf,

    /// Git executable used for clone and checkout.
    #[serde(default = "default_git_binary")]
    pub git_binary: String,

    /// Seconds a git command may run before it is killed.
    #[serde(default = "default_git_timeout_secs")]
    pub git_timeout_secs: u64,

    /// Extensions treated as structured test definitions.
    #[serde(default = "default_structured_extensions")]
    pub structured_extensions: Vec<String>,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "suitepack", "suitepack")
}

fn default_scratch_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().join("scratch"))
        .unwrap_or_else(|| PathBuf::from(".suitepack/scratch"))
}

fn default_file_store_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("sources"))
        .unwrap_or_else(|| PathBuf::from(".suitepack/sources"))
}

fn default_manifest_store_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("manifests"))
        .unwrap_or_else(|| PathBuf::from(".suitepack/manifests"))
}

fn default_git_binary() -> String {
    "git".to_string()
}

fn default_git_timeout_secs() -> u64 {
    300
}

fn default_structured_extensions() -> Vec<String> {
    vec!["yaml".to_string(), "yml".to_string(), "json".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            file_store_dir: default_file_store_dir(),
            manifest_store_dir: default_manifest_store_dir(),
            git_binary: default_git_binary(),
            git_timeout_secs: default_git_timeout_secs(),
            structured_extensions: default_structured_extensions(),
        }
    }
}

impl Config {
    /// Configuration with every store rooted below `root`.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            scratch_dir: root.join("scratch"),
            file_store_dir: root.join("sources"),
            manifest_store_dir: root.join("manifests"),
            ..Self::default()
        }
    }

    /// Load configuration from disk with environment overrides.
    pub fn load() -> OpsResult<Self> {
        let config = match Self::config_file_path() {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)?;
                serde_json::from_str(&contents)?
            }
            _ => Self::default(),
        };
        config.with_env_overrides()
    }

    /// Apply `SUITEPACK_*` environment variables on top of this configuration.
    pub fn with_env_overrides(mut self) -> OpsResult<Self> {
        let vars = [
            ("scratch_dir", ENV_SCRATCH_DIR),
            ("file_store_dir", ENV_FILE_STORE_DIR),
            ("manifest_store_dir", ENV_MANIFEST_STORE_DIR),
            ("git_binary", ENV_GIT_BINARY),
            ("git_timeout_secs", ENV_GIT_TIMEOUT_SECS),
        ];
        for (key, var) in vars {
            if let Ok(value) = std::env::var(var) {
                self.set(key, &value)?;
            }
        }
        Ok(self)
    }

    /// Save configuration to disk.
    pub fn save(&self) -> OpsResult<()> {
        if let Some(path) = Self::config_file_path() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(self)?;
            std::fs::write(&path, contents)?;
        }
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_file_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.json"))
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    /// Whether `path` has one of the structured extensions.
    pub fn is_structured(&self, path: &str) -> bool {
        has_extension(path, &self.structured_extensions)
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "scratch_dir" => Some(self.scratch_dir.display().to_string()),
            "file_store_dir" => Some(self.file_store_dir.display().to_string()),
            "manifest_store_dir" => Some(self.manifest_store_dir.display().to_string()),
            "git_binary" => Some(self.git_binary.clone()),
            "git_timeout_secs" => Some(self.git_timeout_secs.to_string()),
            "structured_extensions" => Some(self.structured_extensions.join(",")),
            _ => None,
        }
    }

    /// Set a configuration value by key.
    pub fn set(&mut self, key: &str, value: &str) -> OpsResult<()> {
        match key {
            "scratch_dir" => self.scratch_dir = PathBuf::from(value),
            "file_store_dir" => self.file_store_dir = PathBuf::from(value),
            "manifest_store_dir" => self.manifest_store_dir = PathBuf::from(value),
            "git_binary" => {
                if value.trim().is_empty() {
                    return Err(OpsError::Config("git_binary must not be empty".to_string()));
                }
                self.git_binary = value.to_string();
            }
            "git_timeout_secs" => {
                self.git_timeout_secs = value
                    .parse()
                    .map_err(|_| OpsError::Config(format!("Invalid number: {}", value)))?;
            }
            "structured_extensions" => {
                self.structured_extensions = value
                    .split(',')
                    .map(|ext| ext.trim().trim_start_matches('.').to_string())
                    .filter(|ext| !ext.is_empty())
                    .collect();
            }
            _ => {
                return Err(OpsError::Config(format!("Unknown config key: {}", key)));
            }
        }
        Ok(())
    }
}

/// Whether the file name of `path` ends in one of `extensions`, ignoring case.
pub(crate) fn has_extension(path: &str, extensions: &[String]) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    extensions.iter().any(|known| known.eq_ignore_ascii_case(ext))
}
