//! Interpreter subprocess and failure classification

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::script::{ERROR_SENTINEL, ScriptProgram};
use crate::error::{BridgeError, ErrorKind, Result};

pub const DEFAULT_INTERPRETER: &str = "osascript";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Raw outcome of one interpreter run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeResult {
    pub stdout: String,
    /// Set when the process could not be spawned, timed out or exited non-zero
    pub exit_error: Option<String>,
    pub stderr: String,
    /// Set only when the run was cut off by the timeout
    pub timed_out_after: Option<u64>,
}

impl BridgeResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn failure(exit_error: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_error: Some(exit_error.into()),
            stderr: stderr.into(),
            ..Default::default()
        }
    }
}

/// Executes generated programs
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn execute(&self, program: &ScriptProgram) -> BridgeResult;
}

/// Runs programs through `osascript -e`
#[derive(Debug, Clone)]
pub struct Osascript {
    interpreter: PathBuf,
    timeout: Duration,
}

impl Osascript {
    pub fn new(interpreter: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }
}

impl Default for Osascript {
    fn default() -> Self {
        Self::new(
            DEFAULT_INTERPRETER,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }
}

#[async_trait]
impl ScriptRunner for Osascript {
    async fn execute(&self, program: &ScriptProgram) -> BridgeResult {
        debug!(
            "Running {} script ({} bytes) via {}",
            program.app(),
            program.source().len(),
            self.interpreter.display()
        );

        let child = Command::new(&self.interpreter)
            .arg("-e")
            .arg(program.source())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                if output.status.success() {
                    BridgeResult {
                        stdout,
                        stderr,
                        ..Default::default()
                    }
                } else {
                    BridgeResult {
                        stdout,
                        exit_error: Some(output.status.to_string()),
                        stderr,
                        timed_out_after: None,
                    }
                }
            }
            Ok(Err(e)) => BridgeResult::failure(
                format!("Failed to execute {}", self.interpreter.display()),
                e.to_string(),
            ),
            Err(_) => BridgeResult {
                exit_error: Some(format!(
                    "Script timed out after {} seconds",
                    self.timeout.as_secs()
                )),
                timed_out_after: Some(self.timeout.as_secs()),
                ..Default::default()
            },
        }
    }
}

/// Turn a raw run into the success payload or a classified error
pub fn classify(app: &str, result: BridgeResult) -> Result<String> {
    if let Some(secs) = result.timed_out_after {
        warn!("{} script timed out after {}s", app, secs);
        return Err(BridgeError::new(
            ErrorKind::ScriptExecutionFailed,
            format!("{} did not respond within {} seconds", app, secs),
        )
        .with_context("app", app)
        .with_context("timeout_secs", secs));
    }

    if let Some(exit) = result.exit_error {
        let stderr = result.stderr.trim();
        warn!("{} script failed ({}): {}", app, exit, stderr);
        let kind = classify_diagnostic(stderr, false);
        let message = if stderr.is_empty() {
            exit.clone()
        } else {
            stderr.to_string()
        };
        return Err(BridgeError::new(kind, message)
            .with_context("app", app)
            .with_context("stderr", stderr)
            .with_context("exit", exit));
    }

    // tabs separate fields in tabular rows, so an empty last field must survive
    let stdout = result
        .stdout
        .trim_matches(|c: char| c.is_whitespace() && c != '\t');
    if let Some(payload) = stdout.strip_prefix(ERROR_SENTINEL) {
        let (number, message) = payload.split_once('|').unwrap_or(("", payload));
        let kind = classify_diagnostic(payload, true);
        debug!("{} script reported error {}: {}", app, number, message);
        let mut err = BridgeError::new(kind, message.trim()).with_context("app", app);
        if !number.is_empty() {
            err = err.with_context("error_number", number);
        }
        return Err(err);
    }

    Ok(stdout.to_string())
}

/// Map a diagnostic to an error kind. Not-found detection only applies to
/// errors the script itself reported.
fn classify_diagnostic(diagnostic: &str, script_level: bool) -> ErrorKind {
    let text = diagnostic.replace('\u{2019}', "'").to_lowercase();
    let has = |needle: &str| text.contains(needle);

    if has("isn't running") || has("not running") || has("-600") {
        ErrorKind::ApplicationNotRunning
    } else if has("permission")
        || has("couldn't be opened")
        || has("not authorized")
        || has("not allowed")
        || has("authorization denied")
        || has("operation not permitted")
        || has("-1743")
    {
        ErrorKind::PermissionDenied
    } else if script_level
        && (has("not found")
            || has("wasn't found")
            || has("can't get")
            || has("-1728")
            || has("-1719"))
    {
        ErrorKind::TargetNotFound
    } else {
        ErrorKind::ScriptExecutionFailed
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Spy runner: records every program and replays canned results in order.
    /// Once the queue is empty it answers with an empty success.
    #[derive(Default)]
    pub struct StubRunner {
        replies: Mutex<VecDeque<BridgeResult>>,
        programs: Mutex<Vec<ScriptProgram>>,
    }

    impl StubRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn replying(replies: impl IntoIterator<Item = BridgeResult>) -> Self {
            let runner = Self::new();
            runner.replies.lock().unwrap().extend(replies);
            runner
        }

        pub fn invocations(&self) -> usize {
            self.programs.lock().unwrap().len()
        }

        pub fn programs(&self) -> Vec<ScriptProgram> {
            self.programs.lock().unwrap().clone()
        }

        /// Source of the most recent program
        pub fn last_source(&self) -> String {
            self.programs
                .lock()
                .unwrap()
                .last()
                .map(|p| p.source().to_string())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl ScriptRunner for StubRunner {
        async fn execute(&self, program: &ScriptProgram) -> BridgeResult {
            self.programs.lock().unwrap().push(program.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default()
        }
    }
}
