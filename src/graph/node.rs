//! Graph nodes and their per-node lifecycle state.
//!
//! A node wraps one service together with its edges (as indices into the
//! graph's node arena) and the atomic counters that decide when it may
//! start and stop. Every method that can trigger a cascade reports the
//! transition exactly once, so concurrent completions never double-fire.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::SharedError;
use crate::service::{HookError, Service};

/// Observable state of one service during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum NodeState {
    /// Waiting for dependencies, or never reached.
    NotStarted = 0,
    /// Start hook submitted.
    Starting = 1,
    /// Start hook completed successfully.
    Started = 2,
    /// Start hook returned an error.
    Failed = 3,
    /// Start was short-circuited because startup had already failed.
    Skipped = 4,
    /// Stop hook submitted.
    Stopping = 5,
    /// Stop hook completed.
    Stopped = 6,
    /// Stop hook returned an error.
    StopFailed = 7,
}

impl NodeState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => NodeState::Starting,
            2 => NodeState::Started,
            3 => NodeState::Failed,
            4 => NodeState::Skipped,
            5 => NodeState::Stopping,
            6 => NodeState::Stopped,
            7 => NodeState::StopFailed,
            _ => NodeState::NotStarted,
        }
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::NotStarted => write!(f, "not started"),
            NodeState::Starting => write!(f, "starting"),
            NodeState::Started => write!(f, "started"),
            NodeState::Failed => write!(f, "failed"),
            NodeState::Skipped => write!(f, "skipped"),
            NodeState::Stopping => write!(f, "stopping"),
            NodeState::Stopped => write!(f, "stopped"),
            NodeState::StopFailed => write!(f, "stop failed"),
        }
    }
}

/// One service in the graph.
pub(crate) struct Node {
    service: Arc<dyn Service>,
    /// Nodes this node depends on.
    dependencies: Vec<usize>,
    /// Nodes depending on this node.
    dependents: Vec<usize>,
    /// Dependencies that have not finished starting yet.
    dependencies_to_start: AtomicUsize,
    /// Dependents that were accounted as started and have not stopped yet.
    dependents_to_stop: AtomicUsize,
    /// Set once the coordinator has counted this node as started.
    accounted: AtomicBool,
    /// Set once the start hook completed without error.
    running: AtomicBool,
    /// One-shot stop guard.
    stop_claimed: AtomicBool,
    start_error: OnceLock<SharedError>,
    state: AtomicU8,
}

impl Node {
    pub(crate) fn new(
        service: Arc<dyn Service>,
        dependencies: Vec<usize>,
        dependents: Vec<usize>,
    ) -> Self {
        let pending = dependencies.len();
        Self {
            service,
            dependencies,
            dependents,
            dependencies_to_start: AtomicUsize::new(pending),
            dependents_to_stop: AtomicUsize::new(0),
            accounted: AtomicBool::new(false),
            running: AtomicBool::new(false),
            stop_claimed: AtomicBool::new(false),
            start_error: OnceLock::new(),
            state: AtomicU8::new(NodeState::NotStarted as u8),
        }
    }

    pub(crate) fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    pub(crate) fn name(&self) -> &str {
        self.service.name()
    }

    pub(crate) fn dependencies(&self) -> &[usize] {
        &self.dependencies
    }

    pub(crate) fn dependents(&self) -> &[usize] {
        &self.dependents
    }

    pub(crate) fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: NodeState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Records that one dependency finished starting.
    ///
    /// Returns `true` for exactly one caller: the one retiring the last
    /// outstanding dependency.
    pub(crate) fn dependency_started(&self) -> bool {
        self.dependencies_to_start.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Records that one dependent was counted as started.
    pub(crate) fn dependent_started(&self) {
        self.dependents_to_stop.fetch_add(1, Ordering::AcqRel);
    }

    /// Records that one accounted dependent finished stopping.
    ///
    /// Returns `true` for exactly one caller: the one retiring the last
    /// outstanding dependent.
    pub(crate) fn dependent_stopped(&self) -> bool {
        self.dependents_to_stop.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Whether no started dependent still has to stop.
    pub(crate) fn ready_to_stop(&self) -> bool {
        self.dependents_to_stop.load(Ordering::Acquire) == 0
    }

    pub(crate) fn begin_start(&self) {
        self.set_state(NodeState::Starting);
    }

    pub(crate) fn skip_start(&self) {
        self.set_state(NodeState::Skipped);
    }

    /// Applies the outcome of the start hook.
    pub(crate) fn finish_start(&self, result: Result<(), HookError>) {
        match result {
            Ok(()) => {
                self.running.store(true, Ordering::Release);
                self.set_state(NodeState::Started);
            }
            Err(error) => {
                let _ = self.start_error.set(Arc::from(error));
                self.set_state(NodeState::Failed);
            }
        }
    }

    pub(crate) fn start_error(&self) -> Option<&SharedError> {
        self.start_error.get()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Marks this node as counted toward the started total.
    pub(crate) fn mark_accounted(&self) {
        self.accounted.store(true, Ordering::Release);
    }

    /// Whether the coordinator counted this node as started, whether it
    /// actually ran, failed or was short-circuited.
    pub(crate) fn is_accounted(&self) -> bool {
        self.accounted.load(Ordering::Acquire)
    }

    /// Claims the single stop attempt for this node.
    pub(crate) fn claim_stop(&self) -> bool {
        self.stop_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn begin_stop(&self) {
        self.set_state(NodeState::Stopping);
    }

    /// Applies the outcome of the stop hook.
    pub(crate) fn finish_stop(&self, failed: bool) {
        self.running.store(false, Ordering::Release);
        if failed {
            self.set_state(NodeState::StopFailed);
        } else {
            self.set_state(NodeState::Stopped);
        }
    }
}
