//! Error types and error handling for junban.
//!
//! This module defines the crate error type, the per-service start failure
//! recorded on graph nodes, the aggregate startup failure reported to
//! `Lifecycle::start` callers, and CLI exit codes.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// An error shared between the node that recorded it and every caller that
/// observes the aggregated outcome.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// CLI exit codes.
pub mod exit_code {
    /// Success
    pub const SUCCESS: i32 = 0;
    /// General error
    pub const GENERAL_ERROR: i32 = 1;
    /// Configuration error
    pub const CONFIG_ERROR: i32 = 2;
    /// Dependency graph error (ambiguous rule or cycle)
    pub const DEPENDENCY_ERROR: i32 = 3;
    /// One or more services failed to start
    pub const STARTUP_ERROR: i32 = 4;
    /// Timeout error
    pub const TIMEOUT_ERROR: i32 = 5;
    /// Command line argument error
    pub const CLI_ERROR: i32 = 64;
}

/// The main error type for junban.
#[derive(Debug, Error)]
pub enum JunbanError {
    /// Configuration file is invalid or cannot be loaded.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A service matched both sides of one dependency rule.
    #[error("Service '{service}' marked as dependent and dependency")]
    AmbiguousDependencyRole { service: String },

    /// Start made no progress while services remained unstarted.
    #[error(
        "Dependency cycle detected involving the following services: [{}]",
        .services.join(", ")
    )]
    DependencyCycle { services: Vec<String> },

    /// One or more services failed to start.
    #[error(transparent)]
    Startup(#[from] StartupFailure),

    /// A service command or the async runtime failed.
    #[error("Backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("Timeout: {operation} (waited {seconds}s)")]
    Timeout { operation: String, seconds: u64 },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JunbanError {
    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            JunbanError::Config { .. } | JunbanError::Yaml(_) => exit_code::CONFIG_ERROR,
            JunbanError::AmbiguousDependencyRole { .. } | JunbanError::DependencyCycle { .. } => {
                exit_code::DEPENDENCY_ERROR
            }
            JunbanError::Startup(_) => exit_code::STARTUP_ERROR,
            JunbanError::Timeout { .. } => exit_code::TIMEOUT_ERROR,
            _ => exit_code::GENERAL_ERROR,
        }
    }

    /// Creates a configuration error with a message.
    pub fn config(message: impl Into<String>) -> Self {
        JunbanError::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a configuration error with a message and source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        JunbanError::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a backend error with a message.
    pub fn backend(message: impl Into<String>) -> Self {
        JunbanError::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a backend error with a message and source.
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        JunbanError::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// A single service's start hook failure.
#[derive(Debug, Clone, Error)]
#[error("Service '{service}' failed to start")]
pub struct ServiceStartFailure {
    /// The failing service.
    pub service: String,
    /// The error returned by its start hook.
    #[source]
    pub cause: SharedError,
}

/// Aggregate failure of a start pass.
///
/// The first failing service in graph order is the primary cause; every
/// other failing service is attached as a secondary cause.
#[derive(Debug, Clone)]
pub struct StartupFailure {
    primary: ServiceStartFailure,
    secondary: Vec<ServiceStartFailure>,
}

impl StartupFailure {
    /// Folds per-service failures (in graph order) into one aggregate.
    ///
    /// Returns `None` when there is nothing to report.
    pub fn from_failures(failures: impl IntoIterator<Item = ServiceStartFailure>) -> Option<Self> {
        let mut failures = failures.into_iter();
        let primary = failures.next()?;
        Some(Self {
            primary,
            secondary: failures.collect(),
        })
    }

    /// The primary cause.
    pub fn primary(&self) -> &ServiceStartFailure {
        &self.primary
    }

    /// Secondary causes, in graph order.
    pub fn secondary(&self) -> &[ServiceStartFailure] {
        &self.secondary
    }

    /// Names of every failed service, primary first.
    pub fn services(&self) -> Vec<&str> {
        std::iter::once(&self.primary)
            .chain(&self.secondary)
            .map(|failure| failure.service.as_str())
            .collect()
    }
}

impl fmt::Display for StartupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        match self.secondary.len() {
            0 => Ok(()),
            1 => write!(f, " (1 other service also failed)"),
            n => write!(f, " ({} other services also failed)", n),
        }
    }
}

impl std::error::Error for StartupFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.primary)
    }
}

/// Result type alias for junban operations.
pub type Result<T> = std::result::Result<T, JunbanError>;
