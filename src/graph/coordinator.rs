//! Lifecycle coordinator.
//!
//! [`Lifecycle`] owns one [`ServiceGraph`] and runs a single start pass and a
//! single stop pass over it. Nodes are started as soon as every dependency
//! has been accounted for and stopped as soon as every started dependent has
//! stopped; everything else runs concurrently on the [`Executor`].
//!
//! Progress is tracked with three counters:
//! - `to_start`: nodes not yet accounted as started. Reaching zero settles
//!   the start pass.
//! - `starting`: nodes between the start decision and the end of their
//!   completion handling. If it drops to zero while `to_start` is still
//!   positive, nothing can make progress any more and the remaining nodes
//!   form (or hang off) a dependency cycle.
//! - `to_stop`: nodes not yet stopped. Reaching zero settles the stop pass.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{JunbanError, Result, ServiceStartFailure, StartupFailure};
use crate::graph::executor::Executor;
use crate::graph::latch::Latch;
use crate::graph::node::{Node, NodeState};
use crate::graph::ServiceGraph;
use crate::service::HookResult;

/// Outcome of a failed start pass, replayed to every caller.
#[derive(Debug, Clone)]
enum Failure {
    Cycle(Vec<String>),
    Startup(StartupFailure),
}

impl From<Failure> for JunbanError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Cycle(services) => JunbanError::DependencyCycle { services },
            Failure::Startup(failure) => JunbanError::Startup(failure),
        }
    }
}

/// Name and state of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    /// Service name.
    pub name: String,
    /// Current state.
    pub state: NodeState,
}

/// Drives one start/stop run over a service graph.
pub struct Lifecycle {
    shared: Arc<Shared>,
    /// Serializes `start` and `stop`.
    run_lock: Mutex<()>,
}

impl Lifecycle {
    /// Creates a coordinator for the given graph.
    pub fn new(graph: ServiceGraph, executor: Arc<dyn Executor>) -> Self {
        let nodes = graph.into_nodes();
        let count = nodes.len();
        Self {
            shared: Arc::new(Shared {
                run_id: Uuid::new_v4(),
                nodes,
                executor,
                to_start: AtomicUsize::new(count),
                to_stop: AtomicUsize::new(count),
                starting: AtomicUsize::new(0),
                start_requested: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                startup_failed: AtomicBool::new(false),
                failure: OnceLock::new(),
                started: Latch::new(),
                stopped: Latch::new(),
            }),
            run_lock: Mutex::new(()),
        }
    }

    /// Identifier attached to this run's log events.
    pub fn run_id(&self) -> Uuid {
        self.shared.run_id
    }

    /// Starts every service in dependency order.
    ///
    /// Resolves once every service has been accounted for, or a dependency
    /// cycle has been detected. On failure every service that did start is
    /// stopped before the error is returned. Calling this again returns the
    /// same outcome without starting anything twice. Once `stop` has run,
    /// this returns `Ok(())` without starting anything.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.run_lock.lock().await;
        let shared = &self.shared;

        if !shared.start_requested.swap(true, Ordering::AcqRel) {
            shared.begin_start();
        }
        shared.started.wait().await;

        match shared.failure.get() {
            Some(failure) => {
                self.stop_locked().await;
                Err(failure.clone().into())
            }
            None => Ok(()),
        }
    }

    /// Stops every service in reverse dependency order.
    ///
    /// Resolves once every service has stopped. Stop hook errors are logged
    /// and never interrupt the pass. Calling this again is a no-op.
    pub async fn stop(&self) {
        let _guard = self.run_lock.lock().await;
        self.stop_locked().await;
    }

    async fn stop_locked(&self) {
        let shared = &self.shared;

        // A start pass whose caller went away keeps running; let it settle
        // so the dependent counters are final before seeding. A graph that
        // stops before it ever started is closed to later starts.
        if shared.start_requested.swap(true, Ordering::AcqRel) {
            shared.started.wait().await;
        } else {
            shared.started.open();
        }

        if !shared.stop_requested.swap(true, Ordering::AcqRel) {
            shared.begin_stop();
        }
        shared.stopped.wait().await;
    }

    /// Snapshot of every service's state, in graph order.
    pub fn status(&self) -> Vec<ServiceStatus> {
        self.shared
            .nodes
            .iter()
            .map(|node| ServiceStatus {
                name: node.name().to_string(),
                state: node.state(),
            })
            .collect()
    }

    /// Number of services managed by this coordinator.
    pub fn len(&self) -> usize {
        self.shared.nodes.len()
    }

    /// Whether this coordinator manages no services.
    pub fn is_empty(&self) -> bool {
        self.shared.nodes.is_empty()
    }
}

/// State shared with completion callbacks.
struct Shared {
    run_id: Uuid,
    nodes: Vec<Node>,
    executor: Arc<dyn Executor>,
    to_start: AtomicUsize,
    to_stop: AtomicUsize,
    starting: AtomicUsize,
    start_requested: AtomicBool,
    stop_requested: AtomicBool,
    startup_failed: AtomicBool,
    failure: OnceLock<Failure>,
    started: Latch,
    stopped: Latch,
}

impl Shared {
    fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    fn begin_start(self: &Arc<Self>) {
        if self.nodes.is_empty() {
            self.started.open();
            return;
        }

        info!(
            run_id = %self.run_id,
            services = self.nodes.len(),
            "Initializing {} services...",
            self.nodes.len()
        );

        // Hold one in-flight slot while seeding so a fast completion cannot
        // see `starting` drop to zero before every root was submitted.
        self.starting.fetch_add(1, Ordering::AcqRel);
        for (index, node) in self.nodes.iter().enumerate() {
            if node.dependencies().is_empty() {
                self.start_node(index);
            }
        }
        self.release_starting();
    }

    fn start_node(self: &Arc<Self>, index: usize) {
        let node = self.node(index);
        self.starting.fetch_add(1, Ordering::AcqRel);

        if self.startup_failed.load(Ordering::Acquire) {
            debug!(
                run_id = %self.run_id,
                service = node.name(),
                "Skipping start after startup failure"
            );
            node.skip_start();
            self.service_did_start(index);
            return;
        }

        debug!(run_id = %self.run_id, service = node.name(), "Starting service");
        node.begin_start();

        let service = Arc::clone(node.service());
        let shared = Arc::clone(self);
        self.executor.submit(
            Box::pin(async move { service.start().await }),
            Box::new(move |result| shared.on_start_complete(index, result)),
        );
    }

    fn on_start_complete(self: &Arc<Self>, index: usize, result: HookResult) {
        let node = self.node(index);
        if let Err(e) = &result {
            error!(
                run_id = %self.run_id,
                service = node.name(),
                error = %e,
                "Service failed to start"
            );
        }
        let failed = result.is_err();
        node.finish_start(result);
        if failed {
            self.startup_failed.store(true, Ordering::Release);
        }
        self.service_did_start(index);
    }

    /// Accounts a node as started (successfully, failed, or skipped) and
    /// cascades to its dependents.
    fn service_did_start(self: &Arc<Self>, index: usize) {
        let node = self.node(index);
        node.mark_accounted();
        for &dependency in node.dependencies() {
            self.node(dependency).dependent_started();
        }

        if self.to_start.fetch_sub(1, Ordering::AcqRel) == 1 {
            if self.startup_failed.load(Ordering::Acquire) {
                if let Some(failure) = self.collect_start_failures() {
                    let _ = self.failure.set(Failure::Startup(failure));
                }
            }
            self.started.open();
            return;
        }

        for &dependent in node.dependents() {
            if self.node(dependent).dependency_started() {
                self.start_node(dependent);
            }
        }
        self.release_starting();
    }

    fn release_starting(&self) {
        if self.starting.fetch_sub(1, Ordering::AcqRel) == 1
            && self.to_start.load(Ordering::Acquire) > 0
        {
            self.on_cycle();
        }
    }

    fn on_cycle(&self) {
        let services: Vec<String> = self
            .nodes
            .iter()
            .filter(|node| !node.is_accounted())
            .map(|node| node.name().to_string())
            .collect();

        error!(
            run_id = %self.run_id,
            services = %services.join(", "),
            "Dependency cycle detected"
        );
        let _ = self.failure.set(Failure::Cycle(services));
        self.started.open();
    }

    fn collect_start_failures(&self) -> Option<StartupFailure> {
        StartupFailure::from_failures(self.nodes.iter().filter_map(|node| {
            node.start_error().map(|cause| ServiceStartFailure {
                service: node.name().to_string(),
                cause: Arc::clone(cause),
            })
        }))
    }

    fn begin_stop(self: &Arc<Self>) {
        if self.nodes.is_empty() {
            self.stopped.open();
            return;
        }

        info!(
            run_id = %self.run_id,
            services = self.nodes.len(),
            "Stopping {} services...",
            self.nodes.len()
        );

        for (index, node) in self.nodes.iter().enumerate() {
            if node.ready_to_stop() {
                self.stop_node(index);
            }
        }
    }

    fn stop_node(self: &Arc<Self>, index: usize) {
        let node = self.node(index);
        if !node.claim_stop() {
            return;
        }

        if !node.is_running() {
            self.service_did_stop(index);
            return;
        }

        debug!(run_id = %self.run_id, service = node.name(), "Stopping service");
        node.begin_stop();

        let service = Arc::clone(node.service());
        let shared = Arc::clone(self);
        self.executor.submit(
            Box::pin(async move { service.stop().await }),
            Box::new(move |result| shared.on_stop_complete(index, result)),
        );
    }

    fn on_stop_complete(self: &Arc<Self>, index: usize, result: HookResult) {
        let node = self.node(index);
        if let Err(e) = &result {
            warn!(
                run_id = %self.run_id,
                service = node.name(),
                error = %e,
                "Service '{}' threw an error while stopping",
                node.name()
            );
        }
        node.finish_stop(result.is_err());
        self.service_did_stop(index);
    }

    fn service_did_stop(self: &Arc<Self>, index: usize) {
        if self.to_stop.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.stopped.open();
            return;
        }

        // Only nodes counted as started were counted by their dependencies.
        let node = self.node(index);
        if !node.is_accounted() {
            return;
        }
        for &dependency in node.dependencies() {
            if self.node(dependency).dependent_stopped() {
                self.stop_node(dependency);
            }
        }
    }
}
