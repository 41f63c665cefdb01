//! Graph module - dependency resolution and lifecycle orchestration.
//!
//! [`GraphBuilder`] resolves services and dependency rules into a
//! [`ServiceGraph`]; [`Lifecycle`] drives one start/stop run over that
//! graph, handing hooks to an [`Executor`].

pub mod builder;
pub mod coordinator;
pub mod executor;
mod latch;
mod node;

#[cfg(test)]
mod coordinator_tests;

use serde::Serialize;

use node::Node;

// Re-exports for convenience
pub use builder::{named, of_kind, DependencyRule, GraphBuilder, ServicePredicate};
pub use coordinator::{Lifecycle, ServiceStatus};
pub use executor::{Completion, Executor, Hook, TokioExecutor};
pub use node::NodeState;

/// Services and their resolved dependency edges.
///
/// Built once by [`GraphBuilder`] and consumed by one [`Lifecycle`].
pub struct ServiceGraph {
    nodes: Vec<Node>,
}

impl ServiceGraph {
    pub(crate) fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub(crate) fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    /// Number of services.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no services.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Service names in graph order.
    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(Node::name).collect()
    }

    /// Names of the services the named service depends on.
    pub fn dependencies_of(&self, name: &str) -> Option<Vec<&str>> {
        self.find(name).map(|node| self.names_of(node.dependencies()))
    }

    /// Names of the services depending on the named service.
    pub fn dependents_of(&self, name: &str) -> Option<Vec<&str>> {
        self.find(name).map(|node| self.names_of(node.dependents()))
    }

    /// One entry per service, in graph order.
    pub fn describe(&self) -> Vec<ServiceEdges<'_>> {
        self.nodes
            .iter()
            .map(|node| ServiceEdges {
                name: node.name(),
                dependencies: self.names_of(node.dependencies()),
                dependents: self.names_of(node.dependents()),
            })
            .collect()
    }

    fn find(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name() == name)
    }

    fn names_of(&self, indices: &[usize]) -> Vec<&str> {
        indices
            .iter()
            .filter_map(|&index| self.nodes.get(index))
            .map(Node::name)
            .collect()
    }
}

/// A service together with its resolved edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceEdges<'a> {
    /// Service name.
    pub name: &'a str,
    /// Services it depends on.
    pub dependencies: Vec<&'a str>,
    /// Services depending on it.
    pub dependents: Vec<&'a str>,
}
