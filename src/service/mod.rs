//! Service module - the unit of work the orchestrator starts and stops.
//!
//! This module defines the `Service` trait that every orchestrated service
//! implements, along with the exec-based implementation used by the CLI.

pub mod exec;


use async_trait::async_trait;

pub use exec::ExecService;

/// Error returned by a service's start or stop hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a start or stop hook.
pub type HookResult = Result<(), HookError>;

/// Trait for orchestrated services.
///
/// A service is owned by the caller; the orchestrator only invokes its hooks
/// once its dependencies (for start) or dependents (for stop) have settled.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Returns the display name of this service.
    fn name(&self) -> &str;

    /// Kinds (capability tags) this service provides.
    ///
    /// A service is always of the kind matching its own name; this list adds
    /// further kinds.
    fn kinds(&self) -> &[String] {
        &[]
    }

    /// Kinds this service depends on.
    ///
    /// The service starts after, and stops before, every service of any of
    /// these kinds.
    fn depends_on(&self) -> &[String] {
        &[]
    }

    /// Starts the service.
    async fn start(&self) -> Result<(), HookError>;

    /// Stops the service.
    async fn stop(&self) -> Result<(), HookError>;
}

/// Checks whether a service is of the given kind.
pub fn is_kind(service: &dyn Service, kind: &str) -> bool {
    service.name() == kind || service.kinds().iter().any(|k| k == kind)
}
