//! Configuration module for junban.
//!
//! This module provides all configuration types and loading functionality.
//! Configuration is loaded from YAML files and can be overridden by
//! environment variables.

mod logging;
mod service;
mod timeout;

pub use logging::{LogFormat, LogLevel, LogOutput, LoggingConfig};
pub use service::{RuleDefinition, Selector, ServiceDefinition};
pub use timeout::TimeoutConfig;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{JunbanError, Result};

/// Environment variable for configuration file path.
pub const ENV_CONFIG_PATH: &str = "JUNBAN_CONFIG";

/// Paths searched, in order, when no configuration path is given.
pub const DEFAULT_CONFIG_PATHS: [&str; 3] =
    ["/etc/junban/config.yaml", "junban.yaml", "junban.yml"];

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Timeout configuration.
    pub timeout: TimeoutConfig,

    /// Service definitions, keyed (and ordered) by name.
    pub services: BTreeMap<String, ServiceDefinition>,

    /// Explicit dependency rules, applied in order.
    pub rules: Vec<RuleDefinition>,
}

impl Config {
    /// Loads configuration with the following priority:
    /// 1. Explicit path (if provided)
    /// 2. JUNBAN_CONFIG environment variable
    /// 3. Default paths
    ///
    /// Returns default config if no file exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_config_path(explicit_path) {
            Some(path) if path.exists() => Self::parse_file(&path)?,
            Some(path) => {
                return Err(JunbanError::config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            None => Config::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::parse_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML string.
    pub fn load_from_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| JunbanError::config_with_source("Failed to parse config", e))?;

        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            JunbanError::config_with_source(
                format!("Failed to read config file: {}", path.display()),
                e,
            )
        })?;

        serde_yaml::from_str(&content).map_err(|e| {
            JunbanError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })
    }

    /// Resolves the configuration file path based on priority.
    ///
    /// An explicit or environment-provided path is returned even when it
    /// does not exist so the caller can report it.
    fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit_path {
            return Some(path.to_path_buf());
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_PATH) {
            return Some(PathBuf::from(env_path));
        }

        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("JUNBAN_LOG_LEVEL") {
            if let Ok(level) = level.parse() {
                self.logging.level = level;
            }
        }
        if let Ok(format) = env::var("JUNBAN_LOG_FORMAT") {
            if let Ok(format) = format.parse() {
                self.logging.format = format;
            }
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.logging.output == LogOutput::File && self.logging.file_path.is_none() {
            return Err(JunbanError::config(
                "logging.file_path is required when output is file",
            ));
        }

        if self.timeout.command_seconds == 0 {
            return Err(JunbanError::config("timeout.command_seconds must be > 0"));
        }

        for (name, service) in &self.services {
            service.validate(name)?;
        }

        for (index, rule) in self.rules.iter().enumerate() {
            rule.validate(index)?;
        }

        for (name, service) in &self.services {
            for kind in &service.depends_on {
                if !self.provides_kind(kind) {
                    return Err(JunbanError::config(format!(
                        "services.{}.depends_on names '{}', which no service provides",
                        name, kind
                    )));
                }
            }
        }

        Ok(())
    }

    fn provides_kind(&self, kind: &str) -> bool {
        self.services
            .iter()
            .any(|(name, def)| name == kind || def.kinds.iter().any(|k| k == kind))
    }
}
