//! Logging configuration and subscriber setup.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::error::{JunbanError, Result};

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: LogLevel,

    /// Log format.
    pub format: LogFormat,

    /// Log output destination.
    pub output: LogOutput,

    /// Log file path (when output = file).
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
            output: LogOutput::Stderr,
            file_path: None,
        }
    }
}

impl LoggingConfig {
    /// Builds the event filter.
    ///
    /// `RUST_LOG` wins when set; otherwise `level_override` (from CLI flags)
    /// or the configured level applies.
    pub fn filter(&self, level_override: Option<LogLevel>) -> EnvFilter {
        let level = level_override.unwrap_or(self.level);
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
    }

    /// Installs the global tracing subscriber.
    pub fn init(&self, level_override: Option<LogLevel>) -> Result<()> {
        let filter = self.filter(level_override);
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true);

        let installed = match (self.output, self.format) {
            (LogOutput::Stdout, LogFormat::Text) => builder.with_writer(std::io::stdout).try_init(),
            (LogOutput::Stdout, LogFormat::Json) => {
                builder.json().with_writer(std::io::stdout).try_init()
            }
            (LogOutput::Stderr, LogFormat::Text) => builder.with_writer(std::io::stderr).try_init(),
            (LogOutput::Stderr, LogFormat::Json) => {
                builder.json().with_writer(std::io::stderr).try_init()
            }
            (LogOutput::File, format) => {
                let path = self.file_path.as_deref().ok_or_else(|| {
                    JunbanError::config("logging.file_path is required when output is file")
                })?;
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        JunbanError::config_with_source(
                            format!("Failed to open log file '{}'", path),
                            e,
                        )
                    })?;
                let writer = Arc::new(file);
                match format {
                    LogFormat::Text => builder.with_ansi(false).with_writer(writer).try_init(),
                    LogFormat::Json => builder.json().with_writer(writer).try_init(),
                }
            }
        };

        installed.map_err(|e| JunbanError::config(format!("Failed to install logger: {}", e)))
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warn level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the directive understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = JunbanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(JunbanError::config(format!("Unknown log level: {}", s))),
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = JunbanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            _ => Err(JunbanError::config(format!("Unknown log format: {}", s))),
        }
    }
}

/// Log output destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output.
    Stdout,
    /// Standard error. Keeps stdout free for command output.
    #[default]
    Stderr,
    /// File output.
    File,
}
