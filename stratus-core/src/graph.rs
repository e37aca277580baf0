//! Explicit resource graph with up-front validation.
//!
//! The graph is the single source of truth for a run: nodes are registered
//! once via [`ResourceGraph::define`], never mutated afterwards, and the
//! realization order is derived (not accidental) via a deterministic
//! topological sort.

use crate::error::{Result, StratusError};
use crate::types::resource::{AttrValue, OutputBinding, ResourceKind, ResourceNode};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, instrument};

/// A set of declared resources and their dependency edges.
///
/// Each run owns its own graph; there is no process-wide registry, so
/// independent runs (and tests) never interfere.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    index: HashMap<String, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node.
    ///
    /// Dependencies are the union of `depends_on` and the targets of any
    /// symbolic references in `attrs`, deduplicated in first-seen order.
    /// Fails with `DuplicateId` if `id` is taken and `InvalidConfig` if a
    /// required attribute for `kind` is missing or the node references
    /// itself. Missing dependencies and cycles are caught by
    /// [`ResourceGraph::validate`] before any provisioning call.
    #[instrument(skip(self, attrs, depends_on), fields(id = %id.as_ref(), kind = %kind))]
    pub fn define(
        &mut self,
        kind: ResourceKind,
        id: impl AsRef<str>,
        attrs: BTreeMap<String, AttrValue>,
        depends_on: &[&str],
    ) -> Result<()> {
        let id = id.as_ref();

        if self.index.contains_key(id) {
            return Err(StratusError::DuplicateId { id: id.to_string() });
        }

        for required in kind.required_attrs() {
            if !attrs.contains_key(*required) {
                return Err(StratusError::InvalidConfig {
                    id: id.to_string(),
                    reason: format!("missing required attribute '{}' for kind {}", required, kind),
                });
            }
        }

        let mut deps: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for dep in depends_on
            .iter()
            .map(|d| d.to_string())
            .chain(attrs.values().flat_map(|v| {
                v.referenced_nodes().into_iter().map(str::to_string).collect::<Vec<_>>()
            }))
        {
            if seen.insert(dep.clone()) {
                deps.push(dep);
            }
        }

        if deps.iter().any(|d| d == id) {
            return Err(StratusError::InvalidConfig {
                id: id.to_string(),
                reason: "resource cannot depend on itself".to_string(),
            });
        }

        debug!(deps = ?deps, "Registered resource node");

        self.index.insert(id.to_string(), self.nodes.len());
        self.nodes.push(ResourceNode { id: id.to_string(), kind, attrs, depends_on: deps });
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Validate edges: every dependency exists, required dependency kinds
    /// are present, and Output nodes bind a reference.
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            for dep in &node.depends_on {
                if !self.index.contains_key(dep) {
                    return Err(StratusError::MissingDependency {
                        id: node.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }

            for required_kind in node.kind.required_dep_kinds() {
                let satisfied = node
                    .depends_on
                    .iter()
                    .filter_map(|d| self.get(d))
                    .any(|dep| dep.kind == *required_kind);
                if !satisfied {
                    return Err(StratusError::InvalidConfig {
                        id: node.id.clone(),
                        reason: format!(
                            "kind {} requires a dependency of kind {}",
                            node.kind, required_kind
                        ),
                    });
                }
            }

            if node.kind == ResourceKind::Output {
                let is_ref = matches!(node.attr("value"), Some(AttrValue::Ref { .. }));
                if !is_ref {
                    return Err(StratusError::InvalidConfig {
                        id: node.id.clone(),
                        reason: "output 'value' must reference another node's attribute"
                            .to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Compute a realization order: every node appears after all nodes it
    /// depends on. Ties among independent nodes are broken by declaration
    /// order, so identical graphs always yield identical orders.
    ///
    /// Fails with `CycleDetected` naming the cycle's member ids when no
    /// topological order exists. The result is re-derivable: calling this
    /// again on the same graph returns the same sequence.
    #[instrument(skip(self), fields(nodes = self.nodes.len()))]
    pub fn resolve_order(&self) -> Result<Vec<&ResourceNode>> {
        self.validate()?;

        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.depends_on {
                let d = self.index[dep];
                dependents[d].push(i);
                in_degree[i] += 1;
            }
        }

        // Kahn's algorithm; the ready set is kept sorted by declaration
        // index so the order is deterministic.
        let mut ready: Vec<usize> =
            (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(&next) = ready.iter().min() {
            ready.retain(|&i| i != next);
            order.push(next);

            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(dependent);
                }
            }
        }

        if order.len() != n {
            let residual: HashSet<usize> =
                (0..n).filter(|i| !order.contains(i)).collect();
            let mut members = self.cycle_members(residual);
            members.sort_by_key(|id| self.index[id]);
            return Err(StratusError::CycleDetected { members });
        }

        Ok(order.into_iter().map(|i| &self.nodes[i]).collect())
    }

    /// Output bindings declared by Output nodes.
    pub fn output_bindings(&self) -> Vec<OutputBinding> {
        self.nodes
            .iter()
            .filter(|node| node.kind == ResourceKind::Output)
            .filter_map(|node| match node.attr("value") {
                Some(AttrValue::Ref { node: target, attr }) => Some(OutputBinding {
                    name: node.id.clone(),
                    node: target.clone(),
                    attribute: attr.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Reduce a residual (non-sortable) node set to the union of its
    /// cycles by repeatedly peeling nodes that no residual node depends on.
    fn cycle_members(&self, mut residual: HashSet<usize>) -> Vec<String> {
        loop {
            let peelable: Vec<usize> = residual
                .iter()
                .copied()
                .filter(|&i| {
                    !residual.iter().any(|&j| {
                        self.nodes[j].depends_on.iter().any(|d| self.index[d] == i)
                    })
                })
                .collect();
            if peelable.is_empty() {
                break;
            }
            for i in peelable {
                residual.remove(&i);
            }
        }
        residual.into_iter().map(|i| self.nodes[i].id.clone()).collect()
    }
}
