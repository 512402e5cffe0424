//! Git materialization helpers.
//!
//! [`ProcessExecutor`] runs shell command templates with quoted parameters and
//! turns launch, timeout and signal failures into [`ProcessError`].
//! [`GitRepositoryStore`] uses it to clone git origins into scratch
//! directories, check out refs, and keep origin sub-paths inside the clone.

mod process;
mod store;

pub use process::{
    quote, render_command, LineSink, ProcessError, ProcessExecutor, ProcessOptions,
    ProcessOutcome, PLACEHOLDER,
};
pub use store::{
    credential_env, redact, redact_url, GitRepositoryError, GitRepositoryStore, GitResult,
    REDACTED,
};
