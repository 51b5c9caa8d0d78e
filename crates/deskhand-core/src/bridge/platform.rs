//! Host platform gate

use crate::error::{BridgeError, Result};

/// The only platform with the AppleScript automation facility
pub const REQUIRED_PLATFORM: &str = "macos";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformGate {
    detected: String,
}

impl PlatformGate {
    /// Gate for the running host
    pub fn host() -> Self {
        Self::for_platform(std::env::consts::OS)
    }

    pub fn for_platform(os: impl Into<String>) -> Self {
        Self { detected: os.into() }
    }

    pub fn detected(&self) -> &str {
        &self.detected
    }

    pub fn is_supported(&self) -> bool {
        self.detected == REQUIRED_PLATFORM
    }

    pub fn check(&self) -> Result<()> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(BridgeError::platform_unsupported(
                &self.detected,
                REQUIRED_PLATFORM,
            ))
        }
    }
}

impl Default for PlatformGate {
    fn default() -> Self {
        Self::host()
    }
}
