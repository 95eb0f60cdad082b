use crate::script::CaptureArch;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a capture session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    /// Whether the input-suppression shield is armed for new windows.
    pub shield_enabled: bool,

    /// How captured items leave the page: drained by polling or pushed.
    pub capture_arch: CaptureArch,

    /// Delay between reconciliation ticks, in milliseconds.
    pub polling_interval_ms: u64,

    /// Seconds to wait after opening the initial URL before reloading it.
    /// Zero disables the startup reload.
    pub wait_time_for_startup_reload: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            shield_enabled: true,
            capture_arch: CaptureArch::Polling,
            polling_interval_ms: 500,
            wait_time_for_startup_reload: 0,
        }
    }
}

impl CaptureConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set whether the shield is armed.
    pub fn shield_enabled(mut self, enabled: bool) -> Self {
        self.shield_enabled = enabled;
        self
    }

    /// Builder method: set the capture architecture.
    pub fn capture_arch(mut self, arch: CaptureArch) -> Self {
        self.capture_arch = arch;
        self
    }

    /// Builder method: set the polling interval in milliseconds.
    pub fn polling_interval_ms(mut self, millis: u64) -> Self {
        self.polling_interval_ms = millis;
        self
    }

    /// Builder method: set the startup reload wait in seconds.
    pub fn wait_time_for_startup_reload(mut self, seconds: u64) -> Self {
        self.wait_time_for_startup_reload = seconds;
        self
    }

    /// The polling interval as a [`Duration`].
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}
