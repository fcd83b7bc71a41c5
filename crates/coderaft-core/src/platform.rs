//! Platform detection
//!
//! Used by the host engine supervisor to pick a platform-specific start
//! strategy for the desktop container engine.

use std::fs;
use tracing::{debug, instrument};

/// Host platform kinds relevant to starting/polling the container engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Native Linux
    Linux,
    /// macOS
    MacOS,
    /// Native Windows
    Windows,
    /// Windows Subsystem for Linux
    WSL,
}

impl Platform {
    /// Detect the current platform environment.
    #[instrument]
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            return Platform::Windows;
        }
        if cfg!(target_os = "macos") {
            return Platform::MacOS;
        }
        if cfg!(target_os = "linux") {
            if Self::is_wsl() {
                Platform::WSL
            } else {
                Platform::Linux
            }
        } else {
            Platform::Linux
        }
    }

    fn is_wsl() -> bool {
        if let Ok(version_content) = fs::read_to_string("/proc/version") {
            let is_wsl = version_content.to_lowercase().contains("microsoft");
            debug!(is_wsl, "WSL detection via /proc/version");
            is_wsl
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_detection_returns_a_known_variant() {
        let platform = Platform::detect();
        match platform {
            Platform::Linux | Platform::MacOS | Platform::Windows | Platform::WSL => {}
        }
    }
}
