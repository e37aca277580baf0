//! Last-known realized state.
//!
//! A small persisted record keyed by node id, written after a successful
//! run and consumed by the diff layer and by teardown. Desired state (the
//! graph) stays a pure declaration; this file is the only thing that
//! remembers what a previous run actually created.

use crate::error::{Result, StratusError};
use crate::graph::ResourceGraph;
use crate::types::resource::{AttrValue, RealizedResource, ResourceKind, ResourceStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// What a previous run recorded about one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedResource {
    pub kind: ResourceKind,

    /// Declared attributes at the time of the run, symbolic references
    /// included. Compared verbatim by the diff layer.
    pub attrs: BTreeMap<String, AttrValue>,

    /// Dependency edges at the time of the run.
    pub depends_on: Vec<String>,

    /// Provider identity. None for engine-resolved nodes (outputs).
    pub identity: Option<String>,

    /// Provider-reported attributes captured at creation.
    pub realized_attrs: BTreeMap<String, String>,

    /// Position in the realization order, used for reverse-order teardown.
    pub sequence: usize,
}

/// Persisted record of the last successful run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Id of the run that produced this record.
    pub run_id: Option<String>,

    /// When the record was written.
    pub updated_at: Option<DateTime<Utc>>,

    /// Records keyed by node id.
    pub resources: BTreeMap<String, RecordedResource>,
}

impl DeploymentState {
    /// Load from disk; a missing file is an empty state, not an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| StratusError::IoError { path: path.to_path_buf(), source: e })?;
        serde_json::from_str(&content).map_err(|e| StratusError::StateStore {
            reason: format!("failed to parse state file {:?}: {}", path, e),
        })
    }

    /// Save to disk, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StratusError::IoError { path: parent.to_path_buf(), source: e })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| StratusError::StateStore {
            reason: format!("failed to serialize state: {}", e),
        })?;
        std::fs::write(path, content)
            .map_err(|e| StratusError::IoError { path: path.to_path_buf(), source: e })
    }

    /// Record a run's outcome against its graph.
    ///
    /// Only Created resources are recorded; the graph's realization order
    /// supplies each record's sequence number.
    pub fn record_run(
        run_id: &str,
        graph: &ResourceGraph,
        realized: &BTreeMap<String, RealizedResource>,
    ) -> Result<Self> {
        let mut resources = BTreeMap::new();
        for (sequence, node) in graph.resolve_order()?.into_iter().enumerate() {
            let Some(real) = realized.get(&node.id) else { continue };
            if real.status != ResourceStatus::Created {
                continue;
            }
            resources.insert(
                node.id.clone(),
                RecordedResource {
                    kind: node.kind,
                    attrs: node.attrs.clone(),
                    depends_on: node.depends_on.clone(),
                    identity: real.identity.clone(),
                    realized_attrs: real.attrs.clone(),
                    sequence,
                },
            );
        }
        Ok(Self { run_id: Some(run_id.to_string()), updated_at: Some(Utc::now()), resources })
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Recorded resources in reverse realization order (for teardown).
    pub fn reverse_order(&self) -> Vec<(&String, &RecordedResource)> {
        let mut entries: Vec<_> = self.resources.iter().collect();
        entries.sort_by(|a, b| b.1.sequence.cmp(&a.1.sequence));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_state() -> DeploymentState {
        let mut resources = BTreeMap::new();
        resources.insert(
            "vpc".to_string(),
            RecordedResource {
                kind: ResourceKind::Network,
                attrs: BTreeMap::from([(
                    "cidr".to_string(),
                    AttrValue::from("10.10.0.0/16"),
                )]),
                depends_on: vec![],
                identity: Some("arn:stratus:network/vpc-0001".to_string()),
                realized_attrs: BTreeMap::from([(
                    "network_id".to_string(),
                    "net-0001".to_string(),
                )]),
                sequence: 0,
            },
        );
        resources.insert(
            "cluster".to_string(),
            RecordedResource {
                kind: ResourceKind::ComputeCluster,
                attrs: BTreeMap::new(),
                depends_on: vec!["vpc".to_string()],
                identity: Some("arn:stratus:compute-cluster/cluster-0002".to_string()),
                realized_attrs: BTreeMap::new(),
                sequence: 1,
            },
        );
        DeploymentState {
            run_id: Some("run-1".to_string()),
            updated_at: Some(Utc::now()),
            resources,
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let state = DeploymentState::load(&dir.path().join("absent.json")).unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deploy/state.json");

        let state = sample_state();
        state.save(&path).unwrap();

        let loaded = DeploymentState::load(&path).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_reverse_order_is_last_created_first() {
        let state = sample_state();
        let order: Vec<&str> =
            state.reverse_order().into_iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["cluster", "vpc"]);
    }
}
