//! Core domain types shared across the suitepack workspace.
//!
//! Origin sources, suites and serialized-suite requests are the records an
//! external store keeps; [`MaterializedRepository`] and [`Manifest`] only live
//! for the duration of a serialization attempt.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod manifest;

pub use manifest::{manifest_key, Manifest, ManifestEntry, ManifestError, MANIFEST_FILE_NAME};

/// Run parameters attached to a serialized-suite request, ordered by name.
pub type Parameters = BTreeMap<String, String>;

/// Name of the run parameter that selects a git ref.
pub const REF_PARAMETER: &str = "ref";

// =============================================================================
// Origin Sources
// =============================================================================

/// A managed blob-storage area holding test definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOrigin {
    /// Display label chosen by the owner.
    pub label: String,
}

/// A remote git repository holding test definitions.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitOrigin {
    /// Clone URL of the remote repository.
    pub host_url: String,
    /// Directory inside the repository that holds the test definitions.
    #[serde(default)]
    pub sub_path: String,
    /// Credential injected into the clone URL (`token` or `user:token`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Ref checked out when a request does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ref: Option<String>,
}

impl fmt::Debug for GitOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitOrigin")
            .field("host_url", &self.host_url)
            .field("sub_path", &self.sub_path)
            .field("credential", &self.credential.as_ref().map(|_| "***"))
            .field("default_ref", &self.default_ref)
            .finish()
    }
}

impl GitOrigin {
    /// Create a git origin for the given URL rooted at the repository top.
    pub fn new(host_url: impl Into<String>) -> Self {
        Self {
            host_url: host_url.into(),
            sub_path: String::new(),
            credential: None,
            default_ref: None,
        }
    }

    /// Scope the origin to a directory inside the repository.
    pub fn with_sub_path(mut self, sub_path: impl Into<String>) -> Self {
        self.sub_path = sub_path.into();
        self
    }

    /// Attach a credential used when cloning.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Set the ref checked out by default.
    pub fn with_default_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.default_ref = Some(git_ref.into());
        self
    }
}

/// The concrete kind of an origin source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OriginKind {
    /// Files uploaded into managed storage.
    File(FileOrigin),
    /// Files living in a remote git repository.
    Git(GitOrigin),
}

impl OriginKind {
    /// Stable name of the variant, used in logs and failure messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            OriginKind::File(_) => "file",
            OriginKind::Git(_) => "git",
        }
    }
}

/// A user-registered source of test definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginSource {
    /// Identity of the source.
    pub id: Uuid,
    /// Identity of the owning user.
    pub owner_id: Uuid,
    /// File or git specifics.
    pub kind: OriginKind,
    /// Run parameter names this source accepts.
    #[serde(default)]
    pub parameters: BTreeSet<String>,
}

impl OriginSource {
    /// Create a file-backed origin.
    pub fn file(owner_id: Uuid, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            kind: OriginKind::File(FileOrigin {
                label: label.into(),
            }),
            parameters: BTreeSet::new(),
        }
    }

    /// Create a git-backed origin.
    pub fn git(owner_id: Uuid, origin: GitOrigin) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            kind: OriginKind::Git(origin),
            parameters: BTreeSet::new(),
        }
    }

    /// Declare run parameter names this origin accepts.
    pub fn with_parameters(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.parameters.extend(names.into_iter().map(Into::into));
        self
    }

    /// Name of the origin variant.
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Whether a run parameter with this name is retained for this origin.
    ///
    /// Git origins always accept [`REF_PARAMETER`].
    pub fn recognizes(&self, name: &str) -> bool {
        if matches!(self.kind, OriginKind::Git(_)) && name == REF_PARAMETER {
            return true;
        }
        self.parameters.contains(name)
    }

    /// Location of a file origin's tree inside file-origin storage.
    pub fn base_path(&self) -> String {
        format!("{}/{}", self.owner_id, self.id)
    }

    /// The git specifics, if this is a git origin.
    pub fn as_git(&self) -> Option<&GitOrigin> {
        match &self.kind {
            OriginKind::Git(git) => Some(git),
            OriginKind::File(_) => None,
        }
    }
}

// =============================================================================
// Suites
// =============================================================================

/// A selection of files from one origin source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suite {
    /// Identity of the suite.
    pub id: Uuid,
    /// The origin the files come from.
    pub origin_id: Uuid,
    /// Selected relative paths; empty selects every file.
    #[serde(default)]
    pub tests: Vec<String>,
    /// Soft-delete marker.
    #[serde(default)]
    pub deleted: bool,
}

impl Suite {
    /// Create a suite selecting the given paths.
    pub fn new(origin_id: Uuid, tests: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut selected: Vec<String> = Vec::new();
        for test in tests {
            let test = test.into();
            if !selected.contains(&test) {
                selected.push(test);
            }
        }
        Self {
            id: Uuid::new_v4(),
            origin_id,
            tests: selected,
            deleted: false,
        }
    }

    /// Create a suite that selects every file of the origin.
    pub fn all(origin_id: Uuid) -> Self {
        Self::new(origin_id, Vec::<String>::new())
    }

    /// Whether the suite selects the whole tree.
    pub fn selects_all(&self) -> bool {
        self.tests.is_empty()
    }
}

// =============================================================================
// Failure Taxonomy
// =============================================================================

/// Closed set of reasons a serialization can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    /// No materializer handles the origin's type.
    #[serde(rename = "source/unserializable-type")]
    UnserializableSourceType,
    /// A git origin's sub-path resolves outside the clone.
    #[serde(rename = "local-git-repository/out-of-scope")]
    OutOfScopeSubPath,
    /// `git clone` failed.
    #[serde(rename = "git/clone")]
    GitClone,
    /// `git checkout` failed.
    #[serde(rename = "git/checkout")]
    GitCheckout,
    /// The manifest could not be written.
    #[serde(rename = "target/write")]
    TargetWrite,
    /// No storage is available to read the materialized repository.
    #[serde(rename = "source-repository/read")]
    SourceRepositoryRead,
    /// Anything not covered above.
    #[serde(rename = "unknown")]
    Unknown,
}

impl FailureReason {
    /// Every reason, in classification priority order.
    pub const ALL: [FailureReason; 7] = [
        FailureReason::UnserializableSourceType,
        FailureReason::OutOfScopeSubPath,
        FailureReason::GitClone,
        FailureReason::GitCheckout,
        FailureReason::TargetWrite,
        FailureReason::SourceRepositoryRead,
        FailureReason::Unknown,
    ];

    /// Machine-stable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::UnserializableSourceType => "source/unserializable-type",
            FailureReason::OutOfScopeSubPath => "local-git-repository/out-of-scope",
            FailureReason::GitClone => "git/clone",
            FailureReason::GitCheckout => "git/checkout",
            FailureReason::TargetWrite => "target/write",
            FailureReason::SourceRepositoryRead => "source-repository/read",
            FailureReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned when parsing an unknown failure reason code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown failure reason code: {0}")]
pub struct UnknownFailureReason(pub String);

impl FromStr for FailureReason {
    type Err = UnknownFailureReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureReason::ALL
            .into_iter()
            .find(|reason| reason.code() == s)
            .ok_or_else(|| UnknownFailureReason(s.to_string()))
    }
}

// =============================================================================
// Serialized-Suite Requests
// =============================================================================

/// Persisted lifecycle state of a serialized-suite request.
///
/// Success has no state of its own: it is the presence of a readable manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Requested,
    Failed,
}

/// A request to produce one manifest snapshot of a suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedSuiteRequest {
    /// Identity of the request.
    pub id: Uuid,
    /// The suite being serialized.
    pub suite_id: Uuid,
    /// Run parameters recognized by the suite's origin.
    pub parameters: Parameters,
    state: RequestState,
    failure_reason: Option<FailureReason>,
    failure_message: Option<String>,
}

impl SerializedSuiteRequest {
    /// Create a request in the `REQUESTED` state.
    ///
    /// Parameters the origin does not recognize are dropped.
    pub fn new(suite: &Suite, origin: &OriginSource, parameters: Parameters) -> Self {
        let parameters = parameters
            .into_iter()
            .filter(|(name, _)| origin.recognizes(name))
            .collect();
        Self {
            id: Uuid::new_v4(),
            suite_id: suite.id,
            parameters,
            state: RequestState::Requested,
            failure_reason: None,
            failure_message: None,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.failure_reason
    }

    pub fn failure_message(&self) -> Option<&str> {
        self.failure_message.as_deref()
    }

    pub fn is_failed(&self) -> bool {
        self.state == RequestState::Failed
    }

    /// Record a failure. Only the first failure sticks.
    ///
    /// Returns `false` when the request had already failed and nothing changed.
    pub fn mark_failed(&mut self, reason: FailureReason, message: impl Into<String>) -> bool {
        if self.is_failed() {
            return false;
        }
        self.state = RequestState::Failed;
        self.failure_reason = Some(reason);
        self.failure_message = Some(message.into());
        true
    }

    /// Public shape of the request.
    pub fn view(&self) -> SerializedSuiteView {
        SerializedSuiteView {
            id: self.id,
            suite_id: self.suite_id,
            parameters: self.parameters.clone(),
            state: self.state,
            failure_reason: self.failure_reason,
            failure_message: self.failure_message.clone(),
        }
    }
}

/// The request shape exposed to API consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedSuiteView {
    pub id: Uuid,
    pub suite_id: Uuid,
    pub parameters: Parameters,
    pub state: RequestState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

// =============================================================================
// Materialized Repositories
// =============================================================================

/// Which storage a materialized repository is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryKind {
    /// File-origin storage.
    File,
    /// Git scratch storage.
    Git,
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryKind::File => write!(f, "file"),
            RepositoryKind::Git => write!(f, "git"),
        }
    }
}

/// A readable file tree for one origin, valid for one serialization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedRepository {
    /// The origin this tree was produced from.
    pub origin_id: Uuid,
    /// Storage the tree lives in.
    pub kind: RepositoryKind,
    /// Base of the tree, relative to the root of its storage.
    pub base_path: String,
    /// Directory to delete on release (git clones only).
    pub scratch_dir: Option<PathBuf>,
    /// Ref that was checked out, if any.
    pub git_ref: Option<String>,
}

impl MaterializedRepository {
    /// A file origin's tree, read in place.
    pub fn file(origin: &OriginSource) -> Self {
        Self {
            origin_id: origin.id,
            kind: RepositoryKind::File,
            base_path: origin.base_path(),
            scratch_dir: None,
            git_ref: None,
        }
    }

    /// Storage key of a file relative to the repository base.
    pub fn key(&self, relative: &str) -> String {
        join_key(&self.base_path, relative)
    }
}

// =============================================================================
// Path Helpers
// =============================================================================

/// Join two `/`-separated storage keys.
pub fn join_key(base: &str, relative: &str) -> String {
    let base = base.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    match (base.is_empty(), relative.is_empty()) {
        (true, _) => relative.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base, relative),
    }
}

/// Lexically normalize a relative path, resolving `.` and `..`.
///
/// Leading separators are ignored so the result is always relative. Returns
/// `None` when the path climbs above its starting point.
pub fn normalize_relative(path: impl AsRef<Path>) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    let mut depth = 0usize;
    for component in path.as_ref().components() {
        match component {
            Component::Normal(part) => {
                normalized.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                normalized.pop();
                depth -= 1;
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Some(normalized)
}

/// Render a relative path as a `/`-separated key.
pub fn path_to_key(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
