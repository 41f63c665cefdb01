//! Timeout configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default deadline for a single service command, in seconds.
    pub command_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_seconds: 60,
        }
    }
}

impl TimeoutConfig {
    /// Returns the default command deadline.
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_seconds)
    }
}
