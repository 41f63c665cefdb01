//! Exec service implementation.
//!
//! This service runs user-defined commands for its start and stop hooks.
//! It's how the CLI turns configured service definitions into services the
//! orchestrator can drive.

use crate::config::ServiceDefinition;
use crate::error::{JunbanError, Result};
use crate::service::{HookError, Service};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// A service driven by shell-style commands.
pub struct ExecService {
    /// Service name.
    name: String,
    /// Commands and metadata from configuration.
    definition: ServiceDefinition,
    /// Deadline applied when the definition sets none.
    default_timeout: Duration,
}

impl ExecService {
    /// Creates a new exec service.
    pub fn new(
        name: impl Into<String>,
        definition: ServiceDefinition,
        default_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            definition,
            default_timeout,
        }
    }

    fn command_timeout(&self) -> Duration {
        self.definition
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
    }

    /// Executes a command and returns the exit status and output.
    async fn execute_command(&self, command: &str) -> Result<(bool, String)> {
        debug!(service = %self.name, command = command, "Executing command");

        // Parse command into program and arguments using shell-style parsing
        let parts = shell_words::split(command).map_err(|e| {
            JunbanError::backend(format!("Failed to parse command '{}': {}", command, e))
        })?;
        let (program, args) = parts
            .split_first()
            .ok_or_else(|| JunbanError::backend("Empty command"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(working_dir) = &self.definition.working_dir {
            cmd.current_dir(working_dir);
        }

        for env_var in &self.definition.env {
            if let Some((key, value)) = env_var.split_once('=') {
                cmd.env(key, value);
            } else {
                warn!(
                    service = %self.name,
                    env_var = env_var,
                    "Invalid environment variable format, expected KEY=VALUE"
                );
            }
        }

        let deadline = self.command_timeout();
        let output = timeout(deadline, cmd.output())
            .await
            .map_err(|_| JunbanError::Timeout {
                operation: format!("command execution: {}", command),
                seconds: deadline.as_secs(),
            })?
            .map_err(|e| {
                JunbanError::backend_with_source(
                    format!("Failed to execute command '{}'", command),
                    e,
                )
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined_output = if stderr.is_empty() {
            stdout.trim_end().to_string()
        } else {
            format!("{}\n{}", stdout, stderr).trim_end().to_string()
        };

        debug!(
            service = %self.name,
            exit_code = output.status.code(),
            stdout = %stdout,
            stderr = %stderr,
            "Command completed"
        );

        Ok((output.status.success(), combined_output))
    }

    /// Runs one lifecycle command, turning a non-zero exit into an error.
    async fn run_phase(&self, phase: &str, command: &str) -> Result<()> {
        let (success, output) = self.execute_command(command).await?;
        if success {
            Ok(())
        } else {
            Err(JunbanError::backend(format!(
                "{} command for service '{}' failed: {}",
                phase, self.name, output
            )))
        }
    }
}

#[async_trait]
impl Service for ExecService {
    fn name(&self) -> &str {
        &self.name
    }

    fn kinds(&self) -> &[String] {
        &self.definition.kinds
    }

    fn depends_on(&self) -> &[String] {
        &self.definition.depends_on
    }

    async fn start(&self) -> std::result::Result<(), HookError> {
        info!(service = %self.name, "Starting service");
        self.run_phase("start", &self.definition.start).await?;

        if let Some(status) = &self.definition.status {
            let (ready, output) = self.execute_command(status).await?;
            if !ready {
                return Err(JunbanError::backend(format!(
                    "Service '{}' did not become ready: {}",
                    self.name, output
                ))
                .into());
            }
        }

        info!(service = %self.name, "Service started");
        Ok(())
    }

    async fn stop(&self) -> std::result::Result<(), HookError> {
        let Some(stop) = &self.definition.stop else {
            debug!(service = %self.name, "No stop command defined");
            return Ok(());
        };

        info!(service = %self.name, "Stopping service");
        self.run_phase("stop", stop).await?;
        info!(service = %self.name, "Service stopped");
        Ok(())
    }
}
