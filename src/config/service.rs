//! Service definitions and dependency rule configuration types.

use serde::{Deserialize, Serialize};

use crate::error::{JunbanError, Result};
use crate::service::{is_kind, Service};

/// Service definition for an exec-backed service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceDefinition {
    /// Start command.
    pub start: String,

    /// Stop command (optional, stopping is a no-op without one).
    pub stop: Option<String>,

    /// Readiness check run after the start command; exit code 0 means ready.
    pub status: Option<String>,

    /// Working directory.
    pub working_dir: Option<String>,

    /// Environment variables (`KEY=VALUE`).
    pub env: Vec<String>,

    /// Command timeout in seconds (defaults to `timeout.command_seconds`).
    pub timeout: Option<u64>,

    /// Extra kinds this service provides, besides its own name.
    pub kinds: Vec<String>,

    /// Kinds this service depends on.
    pub depends_on: Vec<String>,
}

impl ServiceDefinition {
    /// Validates a single service definition.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.start.trim().is_empty() {
            return Err(JunbanError::config(format!(
                "services.{}.start is required",
                name
            )));
        }
        if matches!(&self.stop, Some(stop) if stop.trim().is_empty()) {
            return Err(JunbanError::config(format!(
                "services.{}.stop must not be empty when set",
                name
            )));
        }
        if self.timeout == Some(0) {
            return Err(JunbanError::config(format!(
                "services.{}.timeout must be > 0",
                name
            )));
        }
        for env_var in &self.env {
            if !env_var.contains('=') {
                return Err(JunbanError::config(format!(
                    "services.{}.env entry '{}' must be KEY=VALUE",
                    name, env_var
                )));
            }
        }
        Ok(())
    }
}

/// Selects services by name pattern and/or kind.
///
/// A service is selected when its name matches any glob in `names`, or it
/// is of any kind listed in `kinds`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Selector {
    /// Glob patterns matched against service names.
    pub names: Vec<String>,

    /// Kinds matched against the service's kinds.
    pub kinds: Vec<String>,
}

impl Selector {
    /// Checks whether this selector picks the given service.
    pub fn matches(&self, service: &dyn Service) -> bool {
        self.names
            .iter()
            .any(|pattern| glob_match::glob_match(pattern, service.name()))
            || self.kinds.iter().any(|kind| is_kind(service, kind))
    }

    fn is_empty(&self) -> bool {
        self.names.is_empty() && self.kinds.is_empty()
    }
}

/// An explicit dependency rule: every selected dependent starts after, and
/// stops before, every selected dependency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleDefinition {
    /// Services that depend on the `dependencies` side.
    pub dependents: Selector,

    /// Services the `dependents` side depends on.
    pub dependencies: Selector,
}

impl RuleDefinition {
    /// Validates a rule at the given position.
    pub fn validate(&self, index: usize) -> Result<()> {
        if self.dependents.is_empty() {
            return Err(JunbanError::config(format!(
                "rules[{}].dependents must name at least one pattern or kind",
                index
            )));
        }
        if self.dependencies.is_empty() {
            return Err(JunbanError::config(format!(
                "rules[{}].dependencies must name at least one pattern or kind",
                index
            )));
        }
        Ok(())
    }
}
