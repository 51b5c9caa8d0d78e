//! JSON rendering and exit codes
//!
//! Results go to stdout, errors to stderr as `{"error": {...}}`, so stdout
//! only ever carries a successful payload.

use anyhow::Result;
use serde::Serialize;
use serde_json::{Value, json};

use deskhand_core::{BridgeError, ErrorKind};

#[derive(Debug, Clone, Copy)]
pub struct Output {
    pretty: bool,
}

impl Output {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    pub fn render<T: Serialize>(&self, value: &T) -> Result<String> {
        let text = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(text)
    }

    pub fn print<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", self.render(value)?);
        Ok(())
    }

    /// Acknowledge an operation that has no result payload
    pub fn done(&self) -> Result<()> {
        self.print(&json!({ "ok": true }))
    }

    pub fn print_error(&self, err: &anyhow::Error) {
        match self.render(&error_payload(err)) {
            Ok(text) => eprintln!("{}", text),
            Err(_) => eprintln!("error: {:#}", err),
        }
    }
}

/// Structured error body. Bridge failures keep their kind and context;
/// anything else (config, IO) is reported as kind `error`.
pub fn error_payload(err: &anyhow::Error) -> Value {
    match err.downcast_ref::<BridgeError>() {
        Some(bridge) => json!({ "error": bridge }),
        None => json!({
            "error": {
                "kind": "error",
                "message": format!("{:#}", err),
            }
        }),
    }
}

pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<BridgeError>().map(|e| e.kind) {
        Some(ErrorKind::InvalidInput) => 2,
        Some(ErrorKind::TargetNotFound) => 3,
        Some(ErrorKind::PermissionDenied) => 4,
        Some(ErrorKind::ApplicationNotRunning) => 5,
        Some(ErrorKind::PlatformUnsupported) => 6,
        Some(ErrorKind::ScriptExecutionFailed) | Some(ErrorKind::DecodeFailed) | None => 1,
    }
}
