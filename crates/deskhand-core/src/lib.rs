//! deskhand-core - Desktop automation through AppleScript
//!
//! This crate provides:
//! - Injection-safe AppleScript generation from typed queries and property bags
//! - `osascript` execution with failure classification
//! - A flat-record protocol for decoding script output into typed records
//! - Adapters for Calendar, Mail, Contacts, Notes, Reminders, Finder, Safari and Chrome

pub mod apps;
pub mod bridge;
pub mod error;
pub mod types;

pub use bridge::Bridge;
pub use bridge::platform::PlatformGate;
pub use bridge::runner::{BridgeResult, Osascript, ScriptRunner};
pub use error::{BridgeError, ErrorKind, Result};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _ = std::mem::size_of::<Bridge>();
        let _ = std::mem::size_of::<BridgeError>();
        let _ = std::mem::size_of::<types::Reminder>();
        let _ = std::mem::size_of::<apps::Calendar>();
    }
}
