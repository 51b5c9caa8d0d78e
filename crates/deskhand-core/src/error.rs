//! Classified bridge errors
//!
//! Every failure the bridge can produce is terminal for the current command
//! and carries a machine-readable [`ErrorKind`], a human message, and a small
//! context map for the CLI to render.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Category of a bridge failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Host is not the platform that owns the automation facility
    PlatformUnsupported,
    /// Target application is not running
    ApplicationNotRunning,
    /// OS-level automation or file access was refused
    PermissionDenied,
    /// Lookup found nothing; a normal outcome, not a system failure
    TargetNotFound,
    /// Script failed for any other reason (raw diagnostic attached)
    ScriptExecutionFailed,
    /// Script succeeded but its output did not match the record schema
    DecodeFailed,
    /// Caller-supplied argument was rejected before any script was built
    InvalidInput,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PlatformUnsupported => "platform_unsupported",
            ErrorKind::ApplicationNotRunning => "application_not_running",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::TargetNotFound => "target_not_found",
            ErrorKind::ScriptExecutionFailed => "script_execution_failed",
            ErrorKind::DecodeFailed => "decode_failed",
            ErrorKind::InvalidInput => "invalid_input",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure from any bridge stage
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a context entry, replacing any previous value for `key`
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    pub fn platform_unsupported(detected: &str, required: &str) -> Self {
        Self::new(
            ErrorKind::PlatformUnsupported,
            format!(
                "Desktop automation requires {}, but this host is {}",
                required, detected
            ),
        )
        .with_context("detected", detected)
        .with_context("required", required)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TargetNotFound, message)
    }

    pub fn decode(schema: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DecodeFailed, message).with_context("schema", schema)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::TargetNotFound
    }
}
