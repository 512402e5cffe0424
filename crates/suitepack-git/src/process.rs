//! Shell command execution with quoted parameter substitution.

use std::borrow::Cow;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Placeholder replaced by one quoted parameter.
pub const PLACEHOLDER: &str = "{}";

/// Receives each captured stdout line after the process exits.
pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Errors raised when a command could not run to completion.
///
/// A non-zero exit code is not an error; it is reported in [`ProcessOutcome`].
/// Every variant names the command template, never the rendered command, so
/// parameter values (which may hold credentials) stay out of messages.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process could not be started or waited on.
    #[error("unable to run `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The requested working directory is missing.
    #[error("working directory {path} does not exist")]
    MissingWorkingDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The process ran longer than allowed and was killed.
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout {
        command: String,
        timeout: Duration,
        #[source]
        source: tokio::time::error::Elapsed,
    },

    /// The process was terminated by a signal.
    #[error("`{command}` was terminated by signal {signal}")]
    Signaled { command: String, signal: i32 },

    /// The executor was called incorrectly.
    #[error("process executor misuse: {0}")]
    Misuse(String),
}

/// Exit code and captured output of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Per-call execution options.
#[derive(Clone)]
pub struct ProcessOptions {
    /// Directory the command runs in.
    pub working_dir: Option<PathBuf>,
    /// Overrides the executor's default timeout.
    pub timeout: Option<Duration>,
    /// Capture stdout and stderr. When off, both are discarded.
    pub capture_output: bool,
    /// Receives captured stdout lines. Requires `capture_output`.
    pub line_sink: Option<LineSink>,
    /// Extra environment variables for the command.
    pub env: Vec<(String, String)>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            working_dir: None,
            timeout: None,
            capture_output: true,
            line_sink: None,
            env: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ProcessOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessOptions")
            .field("working_dir", &self.working_dir)
            .field("timeout", &self.timeout)
            .field("capture_output", &self.capture_output)
            .field("line_sink", &self.line_sink.is_some())
            .field("env", &self.env.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

impl ProcessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn discard_output(mut self) -> Self {
        self.capture_output = false;
        self
    }

    pub fn line_sink(mut self, sink: LineSink) -> Self {
        self.line_sink = Some(sink);
        self
    }

    /// Set `key` in the command's environment. Values are never logged.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Runs command templates through `sh -c`.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    shell: String,
    default_timeout: Option<Duration>,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            default_timeout: None,
        }
    }
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill commands that run longer than `timeout` unless a call overrides it.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Run `template` with each `{}` replaced by the next quoted parameter.
    pub async fn execute(
        &self,
        template: &str,
        params: &[&str],
        options: ProcessOptions,
    ) -> Result<ProcessOutcome, ProcessError> {
        if options.line_sink.is_some() && !options.capture_output {
            return Err(ProcessError::Misuse(
                "a line sink was requested with output capture disabled".to_string(),
            ));
        }

        let rendered = render_command(template, params)?;

        let mut command = Command::new(&self.shell);
        command.arg("-c").arg(&rendered);
        command.stdin(Stdio::null());
        command.kill_on_drop(true);
        command.envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        if let Some(dir) = &options.working_dir {
            if let Err(source) = tokio::fs::metadata(dir).await {
                return Err(ProcessError::MissingWorkingDirectory {
                    path: dir.clone(),
                    source,
                });
            }
            command.current_dir(dir);
        }

        if options.capture_output {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let child = command.spawn().map_err(|source| ProcessError::Launch {
            command: template.to_string(),
            source,
        })?;

        let wait = child.wait_with_output();
        let output = match options.timeout.or(self.default_timeout) {
            Some(timeout) => tokio::time::timeout(timeout, wait)
                .await
                .map_err(|source| ProcessError::Timeout {
                    command: template.to_string(),
                    timeout,
                    source,
                })?,
            None => wait.await,
        }
        .map_err(|source| ProcessError::Launch {
            command: template.to_string(),
            source,
        })?;

        let exit_code = match output.status.code() {
            Some(code) => code,
            None => {
                return Err(ProcessError::Signaled {
                    command: template.to_string(),
                    signal: termination_signal(&output.status),
                })
            }
        };

        let outcome = ProcessOutcome {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if let Some(sink) = &options.line_sink {
            for line in outcome.stdout.lines() {
                sink(line);
            }
        }

        debug!(command = %template, exit_code, "Process finished");
        Ok(outcome)
    }
}

/// Substitute each placeholder with one shell-quoted parameter.
pub fn render_command(template: &str, params: &[&str]) -> Result<String, ProcessError> {
    let pieces: Vec<&str> = template.split(PLACEHOLDER).collect();
    let placeholders = pieces.len() - 1;
    if placeholders != params.len() {
        return Err(ProcessError::Misuse(format!(
            "`{}` expects {} parameters, got {}",
            template,
            placeholders,
            params.len()
        )));
    }

    let mut rendered = String::with_capacity(template.len());
    for (index, piece) in pieces.iter().enumerate() {
        rendered.push_str(piece);
        if let Some(param) = params.get(index) {
            rendered.push_str(&quote(param));
        }
    }
    Ok(rendered)
}

/// Quote a value as a single shell token.
pub fn quote(value: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(value))
}

#[cfg(unix)]
fn termination_signal(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().unwrap_or(-1)
}

#[cfg(not(unix))]
fn termination_signal(_status: &std::process::ExitStatus) -> i32 {
    -1
}
