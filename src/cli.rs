//! Command-line interface definition for junban.
//!
//! This module defines the CLI structure using clap derive macros,
//! including all subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::LogLevel;

/// junban - Dependency-ordered service lifecycle orchestrator
///
/// Starts every configured service once the services it depends on are up,
/// and stops them again in reverse order.
#[derive(Debug, Parser)]
#[command(name = "junban")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "JUNBAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level requested by the verbose/quiet flags, if any.
    ///
    /// `None` leaves the configured level in effect.
    pub fn log_level(&self) -> Option<LogLevel> {
        if self.quiet {
            return Some(LogLevel::Error);
        }

        match self.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    }
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start every service, wait for Ctrl-C, then stop them
    Run(RunArgs),

    /// Print the resolved dependency graph
    Graph(GraphArgs),

    /// Configuration file operations
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Arguments for the `run` subcommand.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Give up (and stop whatever started) if startup takes longer than this many seconds
    #[arg(long)]
    pub start_timeout: Option<u64>,
}

/// Arguments for the `graph` subcommand.
#[derive(Debug, Args)]
pub struct GraphArgs {
    /// Print the graph as JSON
    #[arg(long)]
    pub json: bool,
}

/// Configuration subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Validate the configuration file
    Validate,

    /// Show the current configuration
    Show,
}
