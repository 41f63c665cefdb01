//! Execution substrate for service hooks.
//!
//! The coordinator never awaits a hook itself. It hands each hook to an
//! [`Executor`] together with a completion callback and reacts when that
//! callback fires, from whichever worker ran the hook.

use std::future::Future;
use std::pin::Pin;

use tokio::runtime::Handle;
use tracing::error;

use crate::error::{JunbanError, Result};
use crate::service::{HookError, HookResult};

/// A boxed start or stop hook.
pub type Hook = Pin<Box<dyn Future<Output = HookResult> + Send + 'static>>;

/// Receives the outcome of one hook.
pub type Completion = Box<dyn FnOnce(HookResult) + Send + 'static>;

/// Runs hooks off the calling task.
pub trait Executor: Send + Sync {
    /// Runs `hook` asynchronously and invokes `on_complete` exactly once with
    /// its outcome.
    fn submit(&self, hook: Hook, on_complete: Completion);
}

/// Executor spawning every hook onto a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Creates an executor on the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates an executor on the runtime of the calling task.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| JunbanError::backend_with_source("No tokio runtime available", e))
    }
}

impl Executor for TokioExecutor {
    fn submit(&self, hook: Hook, on_complete: Completion) {
        let handle = self.handle.clone();
        self.handle.spawn(async move {
            // The hook runs in its own task so a panic surfaces as a join
            // error instead of losing the completion.
            let result = match handle.spawn(hook).await {
                Ok(result) => result,
                Err(join_error) => {
                    error!(error = %join_error, "Service hook panicked or was cancelled");
                    Err(Box::new(join_error) as HookError)
                }
            };
            on_complete(result);
        });
    }
}
