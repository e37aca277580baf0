//! Realization engine.
//!
//! Turns a validated resource graph plus a plan into ordered provisioning
//! calls against a [`CloudAdapter`]. Independent nodes are realized in
//! parallel waves; a dependent's call never starts before all of its
//! dependencies are Created. Any failure (including a per-call timeout or
//! a user cancellation) halts forward progress and triggers best-effort
//! compensating deletes in reverse creation order.

use crate::adapters::CloudAdapter;
use crate::error::{Result, StratusError};
use crate::graph::ResourceGraph;
use crate::plan::{Operation, PlannedStep};
use crate::state::{DeploymentState, RecordedResource};
use crate::types::resource::{
    AttrValue, RealizedResource, ResourceKind, ResourceNode, ResourceStatus,
};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Timeout applied to every individual provisioning call.
    pub call_timeout: Duration,

    /// Realize independent nodes concurrently. Disable for strictly
    /// sequential, fully deterministic creation order.
    pub parallel: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { call_timeout: Duration::from_secs(30), parallel: true }
    }
}

impl EngineOptions {
    /// Sequential realization with the default timeout.
    pub fn sequential() -> Self {
        Self { parallel: false, ..Self::default() }
    }
}

/// Cooperative cancellation flag for a run.
///
/// Cancelling is modeled identically to a failure: the engine stops
/// starting new nodes and rolls back everything already created.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one compensating delete.
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackOutcome {
    pub node_id: String,
    pub status: ResourceStatus,
    /// Present when the delete itself failed.
    pub error: Option<String>,
}

/// Outcomes of the rollback pass, in execution (reverse creation) order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollbackReport {
    pub outcomes: Vec<RollbackOutcome>,
}

impl RollbackReport {
    pub fn fully_rolled_back(&self) -> bool {
        self.outcomes.iter().all(|o| o.status == ResourceStatus::RolledBack)
    }

    /// Node ids that still hold provider resources and need manual cleanup.
    pub fn remaining(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.status == ResourceStatus::RollbackFailed)
            .map(|o| o.node_id.as_str())
            .collect()
    }
}

/// Why a run failed and what the rollback did about it.
#[derive(Debug)]
pub struct FailureReport {
    /// Node whose provisioning call failed.
    pub node_id: String,

    /// Underlying cause.
    pub error: StratusError,

    /// What happened to everything created before the failure.
    pub rollback: RollbackReport,
}

/// Result of one realization run. A failed run still carries the full
/// per-resource status map, so there is never silent partial state.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub resources: BTreeMap<String, RealizedResource>,
    pub failure: Option<FailureReport>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Convert to a Result, surfacing the failing node's error.
    pub fn into_result(self) -> Result<BTreeMap<String, RealizedResource>> {
        match self.failure {
            None => Ok(self.resources),
            Some(report) => Err(report.error),
        }
    }
}

/// Outcome of an explicit teardown.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Node ids deleted, in execution order.
    pub deleted: Vec<String>,
    /// Node ids whose delete failed, with reasons.
    pub failed: Vec<(String, String)>,
}

/// Executes plans against a cloud adapter.
pub struct RealizationEngine {
    adapter: Arc<dyn CloudAdapter>,
    options: EngineOptions,
    cancel: CancelHandle,
}

impl RealizationEngine {
    pub fn new(adapter: Arc<dyn CloudAdapter>) -> Self {
        Self::with_options(adapter, EngineOptions::default())
    }

    pub fn with_options(adapter: Arc<dyn CloudAdapter>, options: EngineOptions) -> Self {
        Self { adapter, options, cancel: CancelHandle::new() }
    }

    /// Handle for aborting this engine's runs from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Realize a graph from scratch (every node is a Create).
    pub async fn realize(&self, graph: &ResourceGraph) -> Result<RunReport> {
        let empty = DeploymentState::default();
        let steps = crate::plan::plan(graph, &empty)?;
        self.apply(graph, &steps, &empty).await
    }

    /// Execute a plan.
    ///
    /// Build-time problems (invalid graph, cycles) surface as `Err` before
    /// any provisioning call is made. Realization failures come back as a
    /// `RunReport` whose `failure` names the failing node, the cause, and
    /// the rollback outcome per resource.
    #[instrument(skip_all, fields(nodes = graph.len(), adapter = self.adapter.name()))]
    pub async fn apply(
        &self,
        graph: &ResourceGraph,
        steps: &[PlannedStep],
        prior: &DeploymentState,
    ) -> Result<RunReport> {
        let order = graph.resolve_order()?;
        let run_id = format!("run-{}", Uuid::new_v4().simple());

        let mut ops: HashMap<String, Operation> = HashMap::new();
        for step in steps {
            ops.insert(step.node_id.clone(), step.op);
        }
        for node in &order {
            if !ops.contains_key(&node.id) {
                return Err(StratusError::Internal(format!(
                    "plan has no step for node {}",
                    node.id
                )));
            }
        }

        info!(run_id = %run_id, "Starting realization run");

        let realized: Arc<Mutex<BTreeMap<String, RealizedResource>>> = Arc::new(Mutex::new(
            order
                .iter()
                .map(|n| (n.id.clone(), RealizedResource::pending(&n.id, n.kind)))
                .collect(),
        ));
        let created_log: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));

        // Sequential runs make one provisioning call at a time, in the
        // resolver's order; parallel runs batch independent nodes.
        let waves: Vec<Vec<ResourceNode>> = if self.options.parallel {
            compute_waves(&order)
        } else {
            order.iter().map(|n| vec![(*n).clone()]).collect()
        };
        let mut failure: Option<(String, StratusError)> = None;

        'waves: for wave in waves {
            for node in &wave {
                if self.cancel.is_cancelled() {
                    failure =
                        Some((node.id.clone(), StratusError::Cancelled { id: node.id.clone() }));
                    break 'waves;
                }
            }

            if !self.options.parallel || wave.len() == 1 {
                for node in wave {
                    let op = ops[&node.id];
                    let record = prior.resources.get(&node.id).cloned();
                    if let Err(e) = realize_node(
                        Arc::clone(&self.adapter),
                        node.clone(),
                        op,
                        record,
                        Arc::clone(&realized),
                        Arc::clone(&created_log),
                        self.options.call_timeout,
                    )
                    .await
                    {
                        failure = Some((node.id.clone(), e));
                        break 'waves;
                    }
                }
            } else {
                let mut handles = Vec::with_capacity(wave.len());
                for node in wave {
                    let op = ops[&node.id];
                    let record = prior.resources.get(&node.id).cloned();
                    let id = node.id.clone();
                    let handle = tokio::spawn(realize_node(
                        Arc::clone(&self.adapter),
                        node,
                        op,
                        record,
                        Arc::clone(&realized),
                        Arc::clone(&created_log),
                        self.options.call_timeout,
                    ));
                    handles.push((id, handle));
                }

                // Siblings are independent, so let the whole wave settle
                // and report the first failure in wave order.
                for (id, handle) in handles {
                    match handle.await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            if failure.is_none() {
                                failure = Some((id, e));
                            }
                        }
                        Err(join_err) => {
                            if failure.is_none() {
                                failure =
                                    Some((id, StratusError::Internal(join_err.to_string())));
                            }
                        }
                    }
                }
                if failure.is_some() {
                    break 'waves;
                }
            }
        }

        if let Some((node_id, cause)) = failure {
            error!(run_id = %run_id, node = %node_id, error = %cause, "Run failed, rolling back");
            metrics::counter!("stratus_runs_total", "outcome" => "failed").increment(1);

            let rollback = self.rollback(&realized, &created_log).await;
            if rollback.fully_rolled_back() {
                warn!(run_id = %run_id, "Rollback complete, no resources remain");
            } else {
                warn!(
                    run_id = %run_id,
                    remaining = ?rollback.remaining(),
                    "Rollback incomplete, manual cleanup required"
                );
            }

            let resources = realized.lock().await.clone();
            return Ok(RunReport {
                run_id,
                resources,
                failure: Some(FailureReport { node_id, error: cause, rollback }),
            });
        }

        let resources = realized.lock().await.clone();
        metrics::counter!("stratus_runs_total", "outcome" => "succeeded").increment(1);
        info!(run_id = %run_id, resources = resources.len(), "Run completed");

        Ok(RunReport { run_id, resources, failure: None })
    }

    /// Delete everything recorded by a previous run, last-created-first.
    /// Best-effort: a failed delete is reported and does not stop the rest.
    #[instrument(skip_all, fields(resources = state.resources.len()))]
    pub async fn teardown(&self, state: &DeploymentState) -> Result<TeardownReport> {
        let mut report = TeardownReport::default();

        for (id, record) in state.reverse_order() {
            let Some(identity) = &record.identity else {
                // Engine-resolved nodes (outputs) own nothing.
                report.deleted.push(id.clone());
                continue;
            };

            match with_timeout(id, self.options.call_timeout, self.adapter.delete(identity)).await
            {
                Ok(()) | Err(StratusError::IdentityNotFound { .. }) => {
                    info!(node = %id, identity = %identity, "Deleted");
                    report.deleted.push(id.clone());
                }
                Err(e) => {
                    warn!(node = %id, identity = %identity, error = %e, "Delete failed");
                    report.failed.push((id.clone(), e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Compensating deletes for everything created in this run, in strict
    /// reverse creation order.
    async fn rollback(
        &self,
        realized: &Arc<Mutex<BTreeMap<String, RealizedResource>>>,
        created_log: &Arc<Mutex<Vec<(String, String)>>>,
    ) -> RollbackReport {
        let created: Vec<(String, String)> = created_log.lock().await.clone();
        let mut report = RollbackReport::default();

        for (node_id, identity) in created.iter().rev() {
            set_status(realized, node_id, ResourceStatus::RollingBack).await;

            match with_timeout(node_id, self.options.call_timeout, self.adapter.delete(identity))
                .await
            {
                Ok(()) | Err(StratusError::IdentityNotFound { .. }) => {
                    set_status(realized, node_id, ResourceStatus::RolledBack).await;
                    metrics::counter!("stratus_resources_rolled_back_total").increment(1);
                    report.outcomes.push(RollbackOutcome {
                        node_id: node_id.clone(),
                        status: ResourceStatus::RolledBack,
                        error: None,
                    });
                }
                Err(e) => {
                    let reported = StratusError::RollbackFailed {
                        id: node_id.clone(),
                        reason: e.to_string(),
                    };
                    warn!(node = %node_id, error = %reported, "Compensating delete failed");
                    set_status(realized, node_id, ResourceStatus::RollbackFailed).await;
                    report.outcomes.push(RollbackOutcome {
                        node_id: node_id.clone(),
                        status: ResourceStatus::RollbackFailed,
                        error: Some(reported.to_string()),
                    });
                }
            }
        }

        report
    }
}

/// Realize a single node: resolve references, run the planned operation,
/// record the outcome in the shared map.
async fn realize_node(
    adapter: Arc<dyn CloudAdapter>,
    node: ResourceNode,
    op: Operation,
    record: Option<RecordedResource>,
    realized: Arc<Mutex<BTreeMap<String, RealizedResource>>>,
    created_log: Arc<Mutex<Vec<(String, String)>>>,
    call_timeout: Duration,
) -> Result<()> {
    set_status(&realized, &node.id, ResourceStatus::Creating).await;

    let config = {
        let map = realized.lock().await;
        match resolve_attrs(&node, &map) {
            Ok(config) => config,
            Err(e) => {
                drop(map);
                set_status(&realized, &node.id, ResourceStatus::Failed).await;
                return Err(e);
            }
        }
    };

    // Output nodes are pure reference resolution; nothing to provision.
    if node.kind == ResourceKind::Output {
        let value = config
            .get("value")
            .and_then(AttrValue::render)
            .ok_or_else(|| StratusError::InvalidConfig {
                id: node.id.clone(),
                reason: "output 'value' did not resolve to a literal".to_string(),
            });
        return match value {
            Ok(value) => {
                let mut map = realized.lock().await;
                let entry = map.get_mut(&node.id).expect("node seeded in realized map");
                entry.attrs.insert("value".to_string(), value);
                entry.status = ResourceStatus::Created;
                Ok(())
            }
            Err(e) => {
                set_status(&realized, &node.id, ResourceStatus::Failed).await;
                Err(e)
            }
        };
    }

    let result: Result<(Option<String>, BTreeMap<String, String>, bool)> = match op {
        Operation::NoOp => match record {
            Some(record) => Ok((record.identity, record.realized_attrs, false)),
            None => Err(StratusError::Internal(format!(
                "no-op planned for {} but no prior record exists",
                node.id
            ))),
        },
        Operation::Create => {
            with_timeout(&node.id, call_timeout, adapter.create(node.kind, &node.id, &config))
                .await
                .map(|created| (Some(created.identity), created.attrs, true))
        }
        Operation::Update => match record.and_then(|r| r.identity) {
            Some(identity) => {
                with_timeout(&node.id, call_timeout, adapter.update(&identity, &config))
                    .await
                    .map(|attrs| (Some(identity), attrs, false))
            }
            None => Err(StratusError::Internal(format!(
                "update planned for {} but no prior identity exists",
                node.id
            ))),
        },
        Operation::Replace => match record.and_then(|r| r.identity) {
            Some(old_identity) => {
                // Delete the previous incarnation, then create anew.
                // Dependents resolve against the new identity's attributes.
                // A prior incarnation that is already gone (a replace that
                // failed after its delete, say) counts as deleted, so a
                // retry with stale state still converges.
                match with_timeout(&node.id, call_timeout, adapter.delete(&old_identity)).await {
                    Ok(()) | Err(StratusError::IdentityNotFound { .. }) => with_timeout(
                        &node.id,
                        call_timeout,
                        adapter.create(node.kind, &node.id, &config),
                    )
                    .await
                    .map(|created| (Some(created.identity), created.attrs, true)),
                    Err(e) => Err(StratusError::ProvisioningCall {
                        id: node.id.clone(),
                        reason: format!("failed to delete previous incarnation: {}", e),
                    }),
                }
            }
            None => Err(StratusError::Internal(format!(
                "replace planned for {} but no prior identity exists",
                node.id
            ))),
        },
    };

    match result {
        Ok((identity, attrs, newly_created)) => {
            if newly_created {
                if let Some(identity) = &identity {
                    created_log.lock().await.push((node.id.clone(), identity.clone()));
                }
                metrics::counter!("stratus_resources_created_total").increment(1);
            }
            let mut map = realized.lock().await;
            let entry = map.get_mut(&node.id).expect("node seeded in realized map");
            entry.identity = identity;
            entry.attrs = attrs;
            entry.status = ResourceStatus::Created;
            Ok(())
        }
        Err(e) => {
            set_status(&realized, &node.id, ResourceStatus::Failed).await;
            Err(e)
        }
    }
}

/// Substitute every symbolic reference in a node's attributes with the
/// realized value it names. Dependencies are Created before this runs, so
/// a missing attribute is a configuration error, not a race.
fn resolve_attrs(
    node: &ResourceNode,
    realized: &BTreeMap<String, RealizedResource>,
) -> Result<BTreeMap<String, AttrValue>> {
    fn resolve_value(
        value: &AttrValue,
        realized: &BTreeMap<String, RealizedResource>,
    ) -> Result<AttrValue> {
        match value {
            AttrValue::Ref { node, attr } | AttrValue::SecretRef { node, field: attr } => {
                let real = realized.get(node).ok_or_else(|| StratusError::MissingAttribute {
                    id: node.clone(),
                    attribute: attr.clone(),
                })?;
                if real.status != ResourceStatus::Created {
                    return Err(StratusError::MissingAttribute {
                        id: node.clone(),
                        attribute: attr.clone(),
                    });
                }
                real.attr(attr).map(|v| AttrValue::Str(v.to_string())).ok_or_else(|| {
                    StratusError::MissingAttribute { id: node.clone(), attribute: attr.clone() }
                })
            }
            AttrValue::Map(map) => {
                let mut resolved = BTreeMap::new();
                for (key, nested) in map {
                    resolved.insert(key.clone(), resolve_value(nested, realized)?);
                }
                Ok(AttrValue::Map(resolved))
            }
            literal => Ok(literal.clone()),
        }
    }

    let mut resolved = BTreeMap::new();
    for (key, value) in &node.attrs {
        resolved.insert(key.clone(), resolve_value(value, realized)?);
    }
    Ok(resolved)
}

/// Group an already-sorted node sequence into waves: a node lands one wave
/// after the deepest of its dependencies, so members of a wave are
/// mutually independent.
fn compute_waves(order: &[&ResourceNode]) -> Vec<Vec<ResourceNode>> {
    let mut wave_of: HashMap<&str, usize> = HashMap::new();
    let mut waves: Vec<Vec<ResourceNode>> = Vec::new();

    for node in order {
        let wave = node
            .depends_on
            .iter()
            .map(|dep| wave_of[dep.as_str()] + 1)
            .max()
            .unwrap_or(0);
        wave_of.insert(node.id.as_str(), wave);
        if waves.len() == wave {
            waves.push(Vec::new());
        }
        waves[wave].push((*node).clone());
    }

    waves
}

async fn set_status(
    realized: &Arc<Mutex<BTreeMap<String, RealizedResource>>>,
    id: &str,
    status: ResourceStatus,
) {
    let mut map = realized.lock().await;
    if let Some(entry) = map.get_mut(id) {
        entry.status = status;
    }
}

async fn with_timeout<T>(
    id: &str,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            Err(StratusError::CallTimeout { id: id.to_string(), timeout_secs: timeout.as_secs() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, deps: &[&str]) -> ResourceNode {
        ResourceNode {
            id: id.to_string(),
            kind: ResourceKind::ComputeCluster,
            attrs: BTreeMap::new(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_compute_waves_groups_independent_nodes() {
        let a = node("a", &[]);
        let b = node("b", &[]);
        let c = node("c", &["a"]);
        let d = node("d", &["a", "b"]);
        let e = node("e", &["c", "d"]);

        let order: Vec<&ResourceNode> = vec![&a, &b, &c, &d, &e];
        let waves = compute_waves(&order);

        let names: Vec<Vec<&str>> =
            waves.iter().map(|w| w.iter().map(|n| n.id.as_str()).collect()).collect();
        assert_eq!(names, vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]);
    }

    #[test]
    fn test_resolve_attrs_substitutes_references() {
        let mut realized = BTreeMap::new();
        let mut vpc = RealizedResource::pending("vpc", ResourceKind::Network);
        vpc.status = ResourceStatus::Created;
        vpc.attrs.insert("network_id".to_string(), "net-0001".to_string());
        realized.insert("vpc".to_string(), vpc);

        let mut attrs = BTreeMap::new();
        attrs.insert("network".to_string(), AttrValue::reference("vpc", "network_id"));
        attrs.insert("plain".to_string(), AttrValue::from("kept"));
        let n = ResourceNode {
            id: "cluster".to_string(),
            kind: ResourceKind::ComputeCluster,
            attrs,
            depends_on: vec!["vpc".to_string()],
        };

        let resolved = resolve_attrs(&n, &realized).unwrap();
        assert_eq!(resolved["network"], AttrValue::from("net-0001"));
        assert_eq!(resolved["plain"], AttrValue::from("kept"));
        assert!(resolved.values().all(|v| !v.is_symbolic()));
    }

    #[test]
    fn test_resolve_attrs_missing_attribute() {
        let mut realized = BTreeMap::new();
        let mut vpc = RealizedResource::pending("vpc", ResourceKind::Network);
        vpc.status = ResourceStatus::Created;
        realized.insert("vpc".to_string(), vpc);

        let mut attrs = BTreeMap::new();
        attrs.insert("network".to_string(), AttrValue::reference("vpc", "absent"));
        let n = ResourceNode {
            id: "cluster".to_string(),
            kind: ResourceKind::ComputeCluster,
            attrs,
            depends_on: vec!["vpc".to_string()],
        };

        let result = resolve_attrs(&n, &realized);
        match result {
            Err(StratusError::MissingAttribute { id, attribute }) => {
                assert_eq!(id, "vpc");
                assert_eq!(attribute, "absent");
            }
            other => panic!("Expected MissingAttribute, got {:?}", other),
        }
    }

    #[test]
    fn test_cancel_handle() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_cancelled());
        clone.cancel();
        assert!(handle.is_cancelled());
    }
}
