//! Mapping pipeline errors onto the closed failure taxonomy.

use std::error::Error as StdError;

use suitepack_core::FailureReason;
use suitepack_git::GitRepositoryError;

use crate::error::OpsError;

/// A failure reason plus the message recorded with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub reason: FailureReason,
    pub message: String,
}

impl Classification {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Inspects one error in a cause chain; `None` means "not mine".
pub type Matcher = fn(&(dyn StdError + 'static)) -> Option<Classification>;

/// Ordered matchers over an error and its causes. The first match wins.
#[derive(Clone)]
pub struct FailureClassifier {
    matchers: Vec<Matcher>,
}

impl std::fmt::Debug for FailureClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureClassifier")
            .field("matchers", &self.matchers.len())
            .finish()
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self {
            matchers: vec![
                unsupported_source,
                path_traversal,
                clone_failed,
                checkout_failed,
                target_write,
                repository_unreadable,
            ],
        }
    }
}

impl FailureClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a matcher ahead of the built-in ones.
    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matchers.insert(0, matcher);
        self
    }

    /// Classify `error`, falling back to [`FailureReason::Unknown`].
    ///
    /// Matchers are tried in order; each is applied to every error of the
    /// cause chain before the next matcher is consulted.
    pub fn classify(&self, error: &(dyn StdError + 'static)) -> Classification {
        for matcher in &self.matchers {
            if let Some(found) = chain(error).find_map(matcher) {
                return found;
            }
        }
        Classification::new(FailureReason::Unknown, error.to_string())
    }
}

fn chain<'a>(
    error: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(error), |&e| e.source())
}

fn unsupported_source(error: &(dyn StdError + 'static)) -> Option<Classification> {
    match error.downcast_ref::<OpsError>()? {
        OpsError::UnsupportedSource { type_name } => Some(Classification::new(
            FailureReason::UnserializableSourceType,
            type_name.as_str(),
        )),
        _ => None,
    }
}

fn path_traversal(error: &(dyn StdError + 'static)) -> Option<Classification> {
    match error.downcast_ref::<GitRepositoryError>()? {
        GitRepositoryError::PathTraversal { sub_path } => Some(Classification::new(
            FailureReason::OutOfScopeSubPath,
            sub_path.as_str(),
        )),
        _ => None,
    }
}

fn clone_failed(error: &(dyn StdError + 'static)) -> Option<Classification> {
    match error.downcast_ref::<GitRepositoryError>()? {
        GitRepositoryError::CloneFailed { stderr, .. } => {
            Some(Classification::new(FailureReason::GitClone, stderr.as_str()))
        }
        _ => None,
    }
}

fn checkout_failed(error: &(dyn StdError + 'static)) -> Option<Classification> {
    match error.downcast_ref::<GitRepositoryError>()? {
        GitRepositoryError::CheckoutFailed { stderr, .. } => {
            Some(Classification::new(FailureReason::GitCheckout, stderr.as_str()))
        }
        _ => None,
    }
}

fn target_write(error: &(dyn StdError + 'static)) -> Option<Classification> {
    match error.downcast_ref::<OpsError>()? {
        OpsError::TargetWrite { key, .. } => {
            Some(Classification::new(FailureReason::TargetWrite, key.as_str()))
        }
        _ => None,
    }
}

fn repository_unreadable(error: &(dyn StdError + 'static)) -> Option<Classification> {
    match error.downcast_ref::<OpsError>()? {
        OpsError::RepositoryUnreadable { path, .. } => Some(Classification::new(
            FailureReason::SourceRepositoryRead,
            path.as_str(),
        )),
        _ => None,
    }
}
