//! The pgadmin stack topology.
//!
//! A fixed nine-node graph: an isolated network, a compute cluster with an
//! instance-backed capacity pool, a generated admin credential, the pgadmin
//! container task and its service, an internet-facing load balancer with an
//! HTTP listener, and an exported URL output. Tunables live in
//! [`TopologyParams`], loadable from a JSON file.

use crate::error::{Result, StratusError};
use crate::graph::ResourceGraph;
use crate::types::resource::{AttrValue, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Tunable parameters for the pgadmin topology.
///
/// Defaults describe the stock deployment; a params file only needs to name
/// the fields it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyParams {
    /// Address space for the network.
    pub cidr: String,

    /// Per-tier subnet prefix length.
    pub subnet_bits: i64,

    /// Instance type backing the capacity pool.
    pub instance_type: String,

    /// Container image for the pgadmin task.
    pub image: String,

    /// Task memory reservation in MiB.
    pub memory_mib: i64,

    /// Task CPU share in provider units.
    pub cpu_units: i64,

    /// Port the container listens on.
    pub container_port: i64,

    /// Number of task replicas the service maintains.
    pub desired_count: i64,

    /// Public listener port.
    pub listener_port: i64,

    /// Consecutive successes before a target counts as healthy.
    pub healthy_threshold: i64,

    /// Consecutive failures before a target counts as unhealthy.
    pub unhealthy_threshold: i64,

    /// Health probe timeout, seconds.
    pub health_timeout_secs: u64,

    /// Interval between health probes, seconds.
    pub health_interval_secs: u64,

    /// Admin login email stored alongside the generated password.
    pub admin_email: String,

    /// Name of the credential secret.
    pub secret_name: String,
}

impl Default for TopologyParams {
    fn default() -> Self {
        Self {
            cidr: "10.10.0.0/16".to_string(),
            subnet_bits: 24,
            instance_type: "t2.small".to_string(),
            image: "dpage/pgadmin4".to_string(),
            memory_mib: 256,
            cpu_units: 256,
            container_port: 80,
            desired_count: 1,
            listener_port: 80,
            healthy_threshold: 2,
            unhealthy_threshold: 10,
            health_timeout_secs: 20,
            health_interval_secs: 30,
            admin_email: "hello@myorg.lab".to_string(),
            secret_name: "pgadmin-secret".to_string(),
        }
    }
}

impl TopologyParams {
    /// Load params from a JSON file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = ?path, "No params file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| StratusError::IoError { path: path.to_path_buf(), source: e })?;
        let params: Self = serde_json::from_str(&content).map_err(|e| {
            StratusError::InvalidConfig {
                id: "params".to_string(),
                reason: format!("failed to parse {:?}: {}", path, e),
            }
        })?;
        info!(path = ?path, "Loaded topology params");
        Ok(params)
    }

    /// Save params as pretty JSON, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StratusError::IoError { path: parent.to_path_buf(), source: e })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            StratusError::InvalidConfig {
                id: "params".to_string(),
                reason: format!("failed to serialize params: {}", e),
            }
        })?;
        std::fs::write(path, content)
            .map_err(|e| StratusError::IoError { path: path.to_path_buf(), source: e })
    }

    /// Build the pgadmin resource graph from these params.
    pub fn build_graph(&self) -> Result<ResourceGraph> {
        let mut graph = ResourceGraph::new();

        graph.define(
            ResourceKind::Network,
            "vpc",
            BTreeMap::from([
                ("cidr".to_string(), AttrValue::from(self.cidr.as_str())),
                (
                    "subnet_tiers".to_string(),
                    AttrValue::Map(BTreeMap::from([
                        ("public".to_string(), AttrValue::from(self.subnet_bits)),
                        ("private-with-nat".to_string(), AttrValue::from(self.subnet_bits)),
                        ("private-isolated".to_string(), AttrValue::from(self.subnet_bits)),
                    ])),
                ),
            ]),
            &[],
        )?;

        graph.define(
            ResourceKind::ComputeCluster,
            "cluster",
            BTreeMap::from([(
                "network".to_string(),
                AttrValue::reference("vpc", "network_id"),
            )]),
            &[],
        )?;

        graph.define(
            ResourceKind::CapacityPool,
            "capacity",
            BTreeMap::from([
                ("instance_type".to_string(), AttrValue::from(self.instance_type.as_str())),
                ("cluster".to_string(), AttrValue::reference("cluster", "cluster_name")),
            ]),
            &[],
        )?;

        graph.define(
            ResourceKind::SecretStore,
            "creds",
            BTreeMap::from([
                ("name".to_string(), AttrValue::from(self.secret_name.as_str())),
                ("generate_field".to_string(), AttrValue::from("password")),
                (
                    "template".to_string(),
                    AttrValue::Map(BTreeMap::from([(
                        "email".to_string(),
                        AttrValue::from(self.admin_email.as_str()),
                    )])),
                ),
                ("exclude_punctuation".to_string(), AttrValue::from(true)),
                ("include_space".to_string(), AttrValue::from(false)),
            ]),
            &[],
        )?;

        graph.define(
            ResourceKind::ContainerTask,
            "task",
            BTreeMap::from([
                ("image".to_string(), AttrValue::from(self.image.as_str())),
                ("memory_mib".to_string(), AttrValue::from(self.memory_mib)),
                ("cpu_units".to_string(), AttrValue::from(self.cpu_units)),
                ("container_port".to_string(), AttrValue::from(self.container_port)),
                ("log_stream_prefix".to_string(), AttrValue::from("pgadmin")),
                (
                    "env".to_string(),
                    AttrValue::Map(BTreeMap::from([
                        (
                            "PGADMIN_DEFAULT_EMAIL".to_string(),
                            AttrValue::secret("creds", "email"),
                        ),
                        (
                            "PGADMIN_DEFAULT_PASSWORD".to_string(),
                            AttrValue::secret("creds", "password"),
                        ),
                    ])),
                ),
            ]),
            &[],
        )?;

        graph.define(
            ResourceKind::Service,
            "service",
            BTreeMap::from([
                ("desired_count".to_string(), AttrValue::from(self.desired_count)),
                ("cluster".to_string(), AttrValue::reference("cluster", "cluster_name")),
                ("task".to_string(), AttrValue::reference("task", "task_family")),
            ]),
            // The service schedules onto pool-backed instances, so it must
            // not start before the pool exists.
            &["capacity"],
        )?;

        graph.define(
            ResourceKind::LoadBalancer,
            "alb",
            BTreeMap::from([
                ("internet_facing".to_string(), AttrValue::from(true)),
                ("network".to_string(), AttrValue::reference("vpc", "network_id")),
            ]),
            &[],
        )?;

        graph.define(
            ResourceKind::Listener,
            "listener",
            BTreeMap::from([
                ("port".to_string(), AttrValue::from(self.listener_port)),
                ("protocol".to_string(), AttrValue::from("HTTP")),
                ("load_balancer".to_string(), AttrValue::reference("alb", "dns_name")),
                ("target".to_string(), AttrValue::reference("service", "service_name")),
                ("target_port".to_string(), AttrValue::from(self.container_port)),
                ("healthy_threshold".to_string(), AttrValue::from(self.healthy_threshold)),
                (
                    "unhealthy_threshold".to_string(),
                    AttrValue::from(self.unhealthy_threshold),
                ),
                ("health_timeout".to_string(), AttrValue::seconds(self.health_timeout_secs)),
                (
                    "health_interval".to_string(),
                    AttrValue::seconds(self.health_interval_secs),
                ),
            ]),
            &[],
        )?;

        graph.define(
            ResourceKind::Output,
            "alb-url",
            BTreeMap::from([("value".to_string(), AttrValue::reference("alb", "dns_name"))]),
            &[],
        )?;

        graph.validate()?;
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_params() {
        let params = TopologyParams::default();
        assert_eq!(params.cidr, "10.10.0.0/16");
        assert_eq!(params.instance_type, "t2.small");
        assert_eq!(params.image, "dpage/pgadmin4");
        assert_eq!(params.memory_mib, 256);
        assert_eq!(params.cpu_units, 256);
        assert_eq!(params.desired_count, 1);
        assert_eq!(params.listener_port, 80);
        assert_eq!(params.admin_email, "hello@myorg.lab");
    }

    #[test]
    fn test_build_graph_is_valid_and_ordered() {
        let graph = TopologyParams::default().build_graph().unwrap();
        assert_eq!(graph.len(), 9);

        let order: Vec<&str> =
            graph.resolve_order().unwrap().iter().map(|n| n.id.as_str()).collect();

        let pos = |id: &str| order.iter().position(|n| *n == id).unwrap();
        assert!(pos("vpc") < pos("cluster"));
        assert!(pos("cluster") < pos("capacity"));
        assert!(pos("capacity") < pos("service"));
        assert!(pos("creds") < pos("task"));
        assert!(pos("task") < pos("service"));
        assert!(pos("vpc") < pos("alb"));
        assert!(pos("alb") < pos("listener"));
        assert!(pos("service") < pos("listener"));
        assert!(pos("alb") < pos("alb-url"));
    }

    #[test]
    fn test_graph_exports_alb_url() {
        let graph = TopologyParams::default().build_graph().unwrap();
        let bindings = graph.output_bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].name, "alb-url");
        assert_eq!(bindings[0].node, "alb");
        assert_eq!(bindings[0].attribute, "dns_name");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let params = TopologyParams::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(params, TopologyParams::default());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.json");

        let params = TopologyParams { desired_count: 3, ..TopologyParams::default() };
        params.save(&path).unwrap();

        let loaded = TopologyParams::load(&path).unwrap();
        assert_eq!(loaded.desired_count, 3);
        assert_eq!(loaded.image, "dpage/pgadmin4");
    }

    #[test]
    fn test_partial_params_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"listener_port": 8080}"#).unwrap();

        let params = TopologyParams::load(&path).unwrap();
        assert_eq!(params.listener_port, 8080);
        assert_eq!(params.cidr, "10.10.0.0/16");
    }
}
