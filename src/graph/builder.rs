//! Graph construction and dependency resolution.
//!
//! The builder collects services and explicit dependency rules, then
//! resolves them, together with each service's own `depends_on` metadata,
//! into directed edges between nodes. The result is immutable and backs
//! exactly one orchestration run.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::{Config, RuleDefinition};
use crate::error::{JunbanError, Result};
use crate::graph::node::Node;
use crate::graph::ServiceGraph;
use crate::service::{is_kind, ExecService, Service};

/// A boolean test over a service.
pub type ServicePredicate = Arc<dyn Fn(&dyn Service) -> bool + Send + Sync>;

/// Predicate matching the service with exactly this name.
pub fn named(name: impl Into<String>) -> ServicePredicate {
    let name = name.into();
    Arc::new(move |service: &dyn Service| service.name() == name)
}

/// Predicate matching every service of the given kind.
pub fn of_kind(kind: impl Into<String>) -> ServicePredicate {
    let kind = kind.into();
    Arc::new(move |service: &dyn Service| is_kind(service, &kind))
}

/// An explicit dependency rule.
///
/// Every service matching `dependents` starts after, and stops before,
/// every service matching `dependencies`.
#[derive(Clone)]
pub struct DependencyRule {
    dependents: ServicePredicate,
    dependencies: ServicePredicate,
}

impl DependencyRule {
    /// Creates a rule from a pair of predicates.
    pub fn new<D, P>(dependents: D, dependencies: P) -> Self
    where
        D: Fn(&dyn Service) -> bool + Send + Sync + 'static,
        P: Fn(&dyn Service) -> bool + Send + Sync + 'static,
    {
        Self {
            dependents: Arc::new(dependents),
            dependencies: Arc::new(dependencies),
        }
    }

    /// Creates a rule from predicates that are already shared.
    pub fn from_predicates(dependents: ServicePredicate, dependencies: ServicePredicate) -> Self {
        Self {
            dependents,
            dependencies,
        }
    }
}

impl From<RuleDefinition> for DependencyRule {
    fn from(rule: RuleDefinition) -> Self {
        let RuleDefinition {
            dependents,
            dependencies,
        } = rule;
        DependencyRule::new(
            move |service| dependents.matches(service),
            move |service| dependencies.matches(service),
        )
    }
}

impl std::fmt::Debug for DependencyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyRule").finish_non_exhaustive()
    }
}

/// Collects services and rules and resolves them into a [`ServiceGraph`].
#[derive(Default)]
pub struct GraphBuilder {
    services: Vec<Arc<dyn Service>>,
    rules: Vec<DependencyRule>,
}

impl GraphBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder holding an exec service per configured definition
    /// and every configured rule.
    pub fn from_config(config: &Config) -> Self {
        let default_timeout = config.timeout.command();
        let services = config.services.iter().map(|(name, definition)| {
            Arc::new(ExecService::new(name.clone(), definition.clone(), default_timeout))
                as Arc<dyn Service>
        });

        config
            .rules
            .iter()
            .cloned()
            .map(DependencyRule::from)
            .fold(Self::new().services(services), Self::rule)
    }

    /// Adds a service.
    pub fn service(mut self, service: Arc<dyn Service>) -> Self {
        self.services.push(service);
        self
    }

    /// Adds several services, keeping their order.
    pub fn services(mut self, services: impl IntoIterator<Item = Arc<dyn Service>>) -> Self {
        self.services.extend(services);
        self
    }

    /// Adds an explicit dependency rule.
    pub fn rule(mut self, rule: DependencyRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Adds an explicit dependency rule from a pair of predicates.
    pub fn depends_on<D, P>(self, dependents: D, dependencies: P) -> Self
    where
        D: Fn(&dyn Service) -> bool + Send + Sync + 'static,
        P: Fn(&dyn Service) -> bool + Send + Sync + 'static,
    {
        self.rule(DependencyRule::new(dependents, dependencies))
    }

    /// Resolves every rule into edges and freezes the graph.
    ///
    /// Explicit rules apply first, in the order they were added, then one
    /// implicit rule per service carrying `depends_on` metadata.
    pub fn build(self) -> Result<ServiceGraph> {
        let mut edges = Edges::new(self.services.len());

        for rule in &self.rules {
            edges.apply(
                &self.services,
                |_, service| (rule.dependents)(service),
                |_, service| (rule.dependencies)(service),
            )?;
        }

        for (owner, service) in self.services.iter().enumerate() {
            let kinds = service.depends_on();
            if kinds.is_empty() {
                continue;
            }
            edges.apply(
                &self.services,
                |index, _| index == owner,
                |_, candidate| kinds.iter().any(|kind| is_kind(candidate, kind)),
            )?;
        }

        let nodes = self
            .services
            .into_iter()
            .zip(edges.dependencies)
            .zip(edges.dependents)
            .map(|((service, dependencies), dependents)| {
                Node::new(
                    service,
                    dependencies.into_iter().collect(),
                    dependents.into_iter().collect(),
                )
            })
            .collect();

        Ok(ServiceGraph::new(nodes))
    }
}

/// Edge sets under construction, indexed like the service list.
struct Edges {
    dependencies: Vec<BTreeSet<usize>>,
    dependents: Vec<BTreeSet<usize>>,
}

impl Edges {
    fn new(len: usize) -> Self {
        Self {
            dependencies: vec![BTreeSet::new(); len],
            dependents: vec![BTreeSet::new(); len],
        }
    }

    /// Evaluates one rule against every service and records its edges.
    fn apply<D, P>(
        &mut self,
        services: &[Arc<dyn Service>],
        is_dependent: D,
        is_dependency: P,
    ) -> Result<()>
    where
        D: Fn(usize, &dyn Service) -> bool,
        P: Fn(usize, &dyn Service) -> bool,
    {
        let mut dependent_nodes = Vec::new();
        let mut dependency_nodes = Vec::new();

        for (index, service) in services.iter().enumerate() {
            let service = service.as_ref();
            let dependent = is_dependent(index, service);
            if dependent {
                dependent_nodes.push(index);
            }
            if is_dependency(index, service) {
                if dependent {
                    return Err(JunbanError::AmbiguousDependencyRole {
                        service: service.name().to_string(),
                    });
                }
                dependency_nodes.push(index);
            }
        }

        for &dependency in &dependency_nodes {
            for &dependent in &dependent_nodes {
                self.dependencies[dependent].insert(dependency);
                self.dependents[dependency].insert(dependent);
            }
        }

        Ok(())
    }
}
