//! Idempotency/diff layer.
//!
//! Compares a desired graph against the last-known realized state and
//! decides, per node, whether anything needs to happen. A node whose
//! declared attributes and dependency edges are unchanged is a NoOp; a
//! change to a mutable attribute is an Update; a change to an immutable
//! attribute (or the node's kind) forces a Replace, modeled downstream as
//! delete-then-create.

use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::state::DeploymentState;
use crate::types::resource::{ResourceKind, ResourceNode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, instrument};

/// What the engine should do for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Replace,
    NoOp,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Replace => "replace",
            Operation::NoOp => "no-op",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One step of a plan, in realization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub node_id: String,
    pub kind: ResourceKind,
    pub op: Operation,
    /// Attribute names that differ from the last-known state.
    pub changed: Vec<String>,
}

/// Compute the operation sequence to bring `last_known` to `desired`.
///
/// Steps come back in realization order. Calling this again with the state
/// produced by applying the plan yields NoOp for every node.
#[instrument(skip(desired, last_known), fields(nodes = desired.len()))]
pub fn plan(desired: &ResourceGraph, last_known: &DeploymentState) -> Result<Vec<PlannedStep>> {
    let order = desired.resolve_order()?;

    let mut steps: Vec<PlannedStep> = Vec::with_capacity(order.len());
    let mut ops: HashMap<String, Operation> = HashMap::new();

    for node in &order {
        let step = diff_node(node, last_known);
        debug!(node = %step.node_id, op = %step.op, changed = ?step.changed, "Planned");
        ops.insert(step.node_id.clone(), step.op);
        steps.push(step);
    }

    // A replaced resource gets a new identity, so dependents that would
    // otherwise be untouched must refresh their resolved references once
    // the replacement completes.
    for step in &mut steps {
        if step.op != Operation::NoOp {
            continue;
        }
        let node = desired.get(&step.node_id).expect("planned node exists in graph");
        let dep_replaced = node
            .depends_on
            .iter()
            .any(|dep| matches!(ops.get(dep), Some(Operation::Replace)));
        if dep_replaced {
            step.op = Operation::Update;
        }
    }

    Ok(steps)
}

fn diff_node(node: &ResourceNode, last_known: &DeploymentState) -> PlannedStep {
    let Some(record) = last_known.resources.get(&node.id) else {
        return PlannedStep {
            node_id: node.id.clone(),
            kind: node.kind,
            op: Operation::Create,
            changed: vec![],
        };
    };

    if record.kind != node.kind {
        return PlannedStep {
            node_id: node.id.clone(),
            kind: node.kind,
            op: Operation::Replace,
            changed: vec!["kind".to_string()],
        };
    }

    let mut changed: Vec<String> = Vec::new();
    for (key, value) in &node.attrs {
        if record.attrs.get(key) != Some(value) {
            changed.push(key.clone());
        }
    }
    for key in record.attrs.keys() {
        if !node.attrs.contains_key(key) {
            changed.push(key.clone());
        }
    }
    changed.sort();
    changed.dedup();

    let deps_changed = record.depends_on != node.depends_on;

    let op = if changed.is_empty() && !deps_changed {
        Operation::NoOp
    } else if changed.iter().any(|key| node.kind.immutable_attrs().contains(&key.as_str())) {
        Operation::Replace
    } else {
        Operation::Update
    };

    PlannedStep { node_id: node.id.clone(), kind: node.kind, op, changed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RecordedResource;
    use crate::types::resource::AttrValue;
    use std::collections::BTreeMap;

    fn network_graph(cidr: &str) -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        graph
            .define(
                ResourceKind::Network,
                "vpc",
                BTreeMap::from([("cidr".to_string(), AttrValue::from(cidr))]),
                &[],
            )
            .unwrap();
        graph
            .define(
                ResourceKind::ContainerTask,
                "task",
                BTreeMap::from([
                    ("image".to_string(), AttrValue::from("dpage/pgadmin4")),
                    ("memory_mib".to_string(), AttrValue::from(256i64)),
                    ("cpu_units".to_string(), AttrValue::from(256i64)),
                    ("network".to_string(), AttrValue::reference("vpc", "network_id")),
                ]),
                &[],
            )
            .unwrap();
        graph
    }

    fn state_for(graph: &ResourceGraph) -> DeploymentState {
        let mut resources = BTreeMap::new();
        for (sequence, node) in graph.nodes().iter().enumerate() {
            resources.insert(
                node.id.clone(),
                RecordedResource {
                    kind: node.kind,
                    attrs: node.attrs.clone(),
                    depends_on: node.depends_on.clone(),
                    identity: Some(format!("arn:stratus:{}/{}", node.kind, node.id)),
                    realized_attrs: BTreeMap::new(),
                    sequence,
                },
            );
        }
        DeploymentState { run_id: Some("run-1".to_string()), updated_at: None, resources }
    }

    fn minimal_graph(cpu_units: i64) -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        graph
            .define(
                ResourceKind::Network,
                "vpc",
                BTreeMap::from([("cidr".to_string(), AttrValue::from("10.10.0.0/16"))]),
                &[],
            )
            .unwrap();
        graph
            .define(
                ResourceKind::ContainerTask,
                "task",
                BTreeMap::from([
                    ("image".to_string(), AttrValue::from("dpage/pgadmin4")),
                    ("memory_mib".to_string(), AttrValue::from(256i64)),
                    ("cpu_units".to_string(), AttrValue::from(cpu_units)),
                ]),
                &["vpc"],
            )
            .unwrap();
        graph
    }

    #[test]
    fn test_empty_state_plans_creates() {
        let graph = minimal_graph(256);
        let steps = plan(&graph, &DeploymentState::default()).unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|s| s.op == Operation::Create));
    }

    #[test]
    fn test_unchanged_graph_plans_noops() {
        let graph = minimal_graph(256);
        let state = state_for(&graph);
        let steps = plan(&graph, &state).unwrap();
        assert!(steps.iter().all(|s| s.op == Operation::NoOp));

        // Idempotence: planning again changes nothing.
        let again = plan(&graph, &state).unwrap();
        assert_eq!(steps, again);
    }

    #[test]
    fn test_mutable_change_plans_update() {
        let state = state_for(&minimal_graph(256));
        let desired = minimal_graph(512);

        let steps = plan(&desired, &state).unwrap();
        let task = steps.iter().find(|s| s.node_id == "task").unwrap();
        assert_eq!(task.op, Operation::Update);
        assert_eq!(task.changed, vec!["cpu_units".to_string()]);
    }

    #[test]
    fn test_immutable_change_plans_replace_and_cascades() {
        let base = network_graph("10.10.0.0/16");
        let state = state_for(&base);
        let desired = network_graph("10.20.0.0/16");

        let steps = plan(&desired, &state).unwrap();
        let vpc = steps.iter().find(|s| s.node_id == "vpc").unwrap();
        assert_eq!(vpc.op, Operation::Replace);

        // The dependent task was itself unchanged, but its reference
        // target is being replaced.
        let task = steps.iter().find(|s| s.node_id == "task").unwrap();
        assert_eq!(task.op, Operation::Update);
    }

    #[test]
    fn test_kind_change_plans_replace() {
        let mut state = state_for(&minimal_graph(256));
        state.resources.get_mut("task").unwrap().kind = ResourceKind::Service;

        let steps = plan(&minimal_graph(256), &state).unwrap();
        let task = steps.iter().find(|s| s.node_id == "task").unwrap();
        assert_eq!(task.op, Operation::Replace);
    }
}
