//! Static dependency graph between fragment trees
//!
//! Nodes are reference fragments; an edge `a -> b` means some fragment in
//! tree `a` is terminated (under any scenario) to sub-fragment `b`. The graph
//! lets a caller reject sub-fragment cycles before traversing and compute
//! an order in which sub-models come before the models using them.
//!
//! [`SubfragmentGraph::reachable`] builds the narrower graph a single
//! traversal can actually walk: trees reachable from one fragment, following
//! only the terminations selected by one scenario.

use std::collections::BTreeSet;

use lca_entity::{FragmentId, Scenario};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::error::FragmentError;
use crate::store::FragmentStore;

/// Reference-fragment dependency graph
#[derive(Debug, Clone, Default)]
pub struct SubfragmentGraph {
    inner: DiGraphMap<FragmentId, ()>,
}

impl SubfragmentGraph {
    /// Empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for every tree in `store`
    pub fn from_store(store: &FragmentStore) -> Result<Self, FragmentError> {
        let mut graph = Self::new();
        for fragment in store.iter() {
            let top = store.top(fragment.id())?;
            graph.add_model(top);
            for (_, termination) in fragment.terminations() {
                if let Some(sub) = termination.subfragment() {
                    graph.add_usage(top, sub);
                }
            }
        }
        Ok(graph)
    }

    /// Build the graph of trees a traversal of `root` under `scenario` visits
    pub fn reachable(store: &FragmentStore, root: FragmentId, scenario: &Scenario) -> Result<Self, FragmentError> {
        let mut graph = Self::new();
        graph.add_model(root);
        let mut seen = BTreeSet::from([root]);
        let mut pending = vec![root];
        while let Some(model) = pending.pop() {
            let mut stack = vec![model];
            while let Some(id) = stack.pop() {
                let fragment = store.get(id)?;
                if fragment.is_background() {
                    continue;
                }
                let termination = fragment.termination(scenario)?;
                if termination.is_null() {
                    continue;
                }
                if let Some(sub) = termination.subfragment() {
                    graph.add_usage(model, sub);
                    if seen.insert(sub) {
                        pending.push(sub);
                    }
                }
                stack.extend(store.children(id));
            }
        }
        Ok(graph)
    }

    /// Add a reference fragment
    pub fn add_model(&mut self, model: FragmentId) {
        self.inner.add_node(model);
    }

    /// Record that `user` terminates into `sub`
    pub fn add_usage(&mut self, user: FragmentId, sub: FragmentId) {
        self.inner.add_edge(user, sub, ());
    }

    /// Number of trees
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Number of distinct usages
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Sub-models used directly by `model`
    #[must_use]
    pub fn uses(&self, model: FragmentId) -> Vec<FragmentId> {
        self.inner.neighbors_directed(model, Direction::Outgoing).collect()
    }

    /// Whether the usage relation is cyclic
    #[must_use]
    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.inner)
    }

    /// Reject cyclic usage
    pub fn validate(&self) -> Result<(), FragmentError> {
        match toposort(&self.inner, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(FragmentError::SubfragmentCycle(cycle.node_id())),
        }
    }

    /// Sub-models first, then the models that use them
    pub fn dependency_order(&self) -> Result<Vec<FragmentId>, FragmentError> {
        let mut order =
            toposort(&self.inner, None).map_err(|cycle| FragmentError::SubfragmentCycle(cycle.node_id()))?;
        order.reverse();
        Ok(order)
    }

    /// Trees no other tree uses
    #[must_use]
    pub fn top_level_models(&self) -> Vec<FragmentId> {
        self.inner
            .nodes()
            .filter(|n| self.inner.neighbors_directed(*n, Direction::Incoming).next().is_none())
            .collect()
    }

    /// Trees that use no sub-model
    #[must_use]
    pub fn leaf_models(&self) -> Vec<FragmentId> {
        self.inner
            .nodes()
            .filter(|n| self.inner.neighbors_directed(*n, Direction::Outgoing).next().is_none())
            .collect()
    }
}

impl FragmentStore {
    /// Dependency graph of the trees in this store
    pub fn subfragment_graph(&self) -> Result<SubfragmentGraph, FragmentError> {
        SubfragmentGraph::from_store(self)
    }

    /// Reject sub-fragment cycles across all scenarios
    pub fn check_acyclic(&self) -> Result<(), FragmentError> {
        self.subfragment_graph()?.validate()
    }

    /// Reject sub-fragment cycles a traversal of `root` under `scenario` would enter
    pub fn check_acyclic_from(&self, root: FragmentId, scenario: &Scenario) -> Result<(), FragmentError> {
        SubfragmentGraph::reachable(self, root, scenario)?.validate()
    }

    /// Reference fragments with sub-models before their users
    pub fn dependency_order(&self) -> Result<Vec<FragmentId>, FragmentError> {
        self.subfragment_graph()?.dependency_order()
    }
}
