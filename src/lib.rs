//! junban - Dependency-ordered service lifecycle orchestrator
//!
//! This crate starts a set of interdependent services concurrently while
//! respecting their dependencies, and stops them in reverse order.
//!
//! # Overview
//!
//! Services implement [`Service`] and declare the kinds they provide and
//! depend on. [`GraphBuilder`] resolves that metadata, together with any
//! explicit [`DependencyRule`]s, into a [`ServiceGraph`]. A [`Lifecycle`]
//! then drives one start pass and one stop pass over the graph, detecting
//! dependency cycles at start time and rolling back when a service fails.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`config`] - Configuration file parsing and validation
//! - [`error`] - Error types and error handling
//! - [`graph`] - Graph construction and lifecycle coordination
//! - [`service`] - The service trait and the exec-based implementation

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod service;

// Re-exports for convenience
pub use cli::Cli;
pub use config::Config;
pub use error::{JunbanError, Result, ServiceStartFailure, StartupFailure};
pub use graph::{
    named, of_kind, DependencyRule, Executor, GraphBuilder, Lifecycle, NodeState, ServiceGraph,
    ServiceStatus, TokioExecutor,
};
pub use service::{ExecService, HookError, HookResult, Service};
