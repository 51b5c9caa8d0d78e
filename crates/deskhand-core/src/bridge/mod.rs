//! Desktop-automation bridge
//!
//! Shared by every application adapter: build a program with
//! [`script::Script`], run it through a [`runner::ScriptRunner`], classify
//! the outcome, and decode the payload with a [`records::RecordSchema`].

pub mod escape;
pub mod platform;
pub mod records;
pub mod richtext;
pub mod runner;
pub mod script;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use platform::PlatformGate;
use records::{Record, RecordSchema};
use runner::{Osascript, ScriptRunner};
use script::ScriptProgram;

/// Gate, runner and classifier behind one call
#[derive(Clone)]
pub struct Bridge {
    runner: Arc<dyn ScriptRunner>,
    gate: PlatformGate,
}

impl Bridge {
    /// Bridge for the running host using the given runner
    pub fn new(runner: Arc<dyn ScriptRunner>) -> Self {
        Self::with_gate(runner, PlatformGate::host())
    }

    pub fn with_gate(runner: Arc<dyn ScriptRunner>, gate: PlatformGate) -> Self {
        Self { runner, gate }
    }

    /// Bridge backed by a real interpreter
    pub fn osascript(interpreter: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self::new(Arc::new(Osascript::new(interpreter, timeout)))
    }

    pub fn check_platform(&self) -> Result<()> {
        self.gate.check()
    }

    /// Run a program and return its trimmed output
    pub async fn run(&self, program: &ScriptProgram) -> Result<String> {
        self.gate.check()?;
        let result = self.runner.execute(program).await;
        runner::classify(program.app(), result)
    }

    /// Run a program and decode its output as `schema` records
    pub async fn fetch(
        &self,
        program: &ScriptProgram,
        schema: &'static RecordSchema,
    ) -> Result<Vec<Record>> {
        let payload = self.run(program).await?;
        let records = schema.decode(&payload)?;
        debug!("{} returned {} {} record(s)", program.app(), records.len(), schema.name);
        Ok(records)
    }

    /// Run a program expected to produce exactly one row
    pub async fn fetch_one(
        &self,
        program: &ScriptProgram,
        schema: &'static RecordSchema,
    ) -> Result<Record> {
        self.fetch(program, schema).await?.into_iter().next().ok_or_else(|| {
            crate::error::BridgeError::decode(schema.name, "Script returned no record")
        })
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge").field("gate", &self.gate).finish()
    }
}
