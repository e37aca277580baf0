//! Resource graph domain types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The kinds of infrastructure units stratus knows how to declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Isolated network with tiered subnets.
    Network,
    /// Container orchestration cluster.
    ComputeCluster,
    /// Machine capacity attached to a cluster.
    CapacityPool,
    /// Generated credential secret.
    SecretStore,
    /// Containerized application task definition.
    ContainerTask,
    /// Desired-count wrapper around task instances.
    Service,
    /// Public-facing load balancer.
    LoadBalancer,
    /// Load balancer listener routing to a service.
    Listener,
    /// Named value derived from another resource, exported after the run.
    Output,
}

impl ResourceKind {
    /// String representation used in identities and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::ComputeCluster => "compute-cluster",
            ResourceKind::CapacityPool => "capacity-pool",
            ResourceKind::SecretStore => "secret-store",
            ResourceKind::ContainerTask => "container-task",
            ResourceKind::Service => "service",
            ResourceKind::LoadBalancer => "load-balancer",
            ResourceKind::Listener => "listener",
            ResourceKind::Output => "output",
        }
    }

    /// Attributes that must be present when a node of this kind is defined.
    pub fn required_attrs(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Network => &["cidr"],
            ResourceKind::ComputeCluster => &[],
            ResourceKind::CapacityPool => &["instance_type"],
            ResourceKind::SecretStore => &["name", "generate_field"],
            ResourceKind::ContainerTask => &["image", "memory_mib", "cpu_units"],
            ResourceKind::Service => &["desired_count"],
            ResourceKind::LoadBalancer => &["internet_facing"],
            ResourceKind::Listener => &["port", "protocol"],
            ResourceKind::Output => &["value"],
        }
    }

    /// Kinds that must appear among a node's dependencies.
    pub fn required_dep_kinds(&self) -> &'static [ResourceKind] {
        match self {
            ResourceKind::ComputeCluster => &[ResourceKind::Network],
            ResourceKind::CapacityPool => &[ResourceKind::ComputeCluster],
            ResourceKind::Service => &[ResourceKind::ComputeCluster, ResourceKind::ContainerTask],
            ResourceKind::LoadBalancer => &[ResourceKind::Network],
            ResourceKind::Listener => &[ResourceKind::LoadBalancer, ResourceKind::Service],
            _ => &[],
        }
    }

    /// Attributes that cannot change in place. A change to one of these
    /// forces a Replace (delete old, create new) in the plan.
    pub fn immutable_attrs(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Network => &["cidr"],
            ResourceKind::CapacityPool => &["instance_type"],
            ResourceKind::SecretStore => &["name"],
            ResourceKind::LoadBalancer => &["internet_facing"],
            ResourceKind::Listener => &["port"],
            _ => &[],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A configuration attribute value.
///
/// Values are either literal or symbolic. Symbolic values (`Ref`,
/// `SecretRef`) name an attribute of another node and are substituted with
/// the realized value by the engine before the provisioning call is made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Bool(bool),
    /// Duration expressed in whole seconds.
    Secs(u64),
    Map(BTreeMap<String, AttrValue>),
    /// Reference to a realized attribute of another node.
    Ref { node: String, attr: String },
    /// Reference to a single generated field of a secret store node.
    SecretRef { node: String, field: String },
}

impl AttrValue {
    /// Reference to another node's realized attribute.
    pub fn reference(node: impl Into<String>, attr: impl Into<String>) -> Self {
        AttrValue::Ref { node: node.into(), attr: attr.into() }
    }

    /// Field-level reference into a secret store.
    pub fn secret(node: impl Into<String>, field: impl Into<String>) -> Self {
        AttrValue::SecretRef { node: node.into(), field: field.into() }
    }

    pub fn seconds(secs: u64) -> Self {
        AttrValue::Secs(secs)
    }

    /// True if this value (or any nested value) still names another node
    /// instead of carrying a concrete value.
    pub fn is_symbolic(&self) -> bool {
        match self {
            AttrValue::Ref { .. } | AttrValue::SecretRef { .. } => true,
            AttrValue::Map(map) => map.values().any(AttrValue::is_symbolic),
            _ => false,
        }
    }

    /// Node ids this value references.
    pub fn referenced_nodes(&self) -> Vec<&str> {
        match self {
            AttrValue::Ref { node, .. } | AttrValue::SecretRef { node, .. } => vec![node.as_str()],
            AttrValue::Map(map) => map.values().flat_map(AttrValue::referenced_nodes).collect(),
            _ => vec![],
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, AttrValue>> {
        match self {
            AttrValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Concrete rendering for adapters and exports. Symbolic values render
    /// as None; the engine resolves them before any adapter sees them.
    pub fn render(&self) -> Option<String> {
        match self {
            AttrValue::Str(s) => Some(s.clone()),
            AttrValue::Int(i) => Some(i.to_string()),
            AttrValue::Bool(b) => Some(b.to_string()),
            AttrValue::Secs(s) => Some(s.to_string()),
            AttrValue::Map(_) | AttrValue::Ref { .. } | AttrValue::SecretRef { .. } => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

/// A declared infrastructure unit. Immutable once registered in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Identifier, unique within the graph.
    pub id: String,

    /// What this node declares.
    pub kind: ResourceKind,

    /// Configuration attributes, possibly containing symbolic references.
    pub attrs: BTreeMap<String, AttrValue>,

    /// Ids of nodes this one depends on. Includes targets of symbolic
    /// references in `attrs`; populated at definition time.
    pub depends_on: Vec<String>,
}

impl ResourceNode {
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }
}

/// Per-run lifecycle status of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// Declared but not yet touched in this run.
    #[default]
    Pending,
    /// Provisioning call in flight.
    Creating,
    /// Provider confirmed the resource exists with the desired config.
    Created,
    /// Provisioning call failed or timed out.
    Failed,
    /// Compensating delete in flight.
    RollingBack,
    /// Compensating delete succeeded.
    RolledBack,
    /// Compensating delete itself failed; manual cleanup required.
    RollbackFailed,
    /// Removed by an explicit teardown.
    Deleted,
}

impl ResourceStatus {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Pending => "pending",
            ResourceStatus::Creating => "creating",
            ResourceStatus::Created => "created",
            ResourceStatus::Failed => "failed",
            ResourceStatus::RollingBack => "rollingback",
            ResourceStatus::RolledBack => "rolledback",
            ResourceStatus::RollbackFailed => "rollbackfailed",
            ResourceStatus::Deleted => "deleted",
        }
    }

    /// Terminal states never change again within a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResourceStatus::Created
                | ResourceStatus::RolledBack
                | ResourceStatus::RollbackFailed
                | ResourceStatus::Deleted
        )
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The provider-assigned side of a realized node.
///
/// Owned exclusively by the realization engine; once status reaches a
/// terminal state the record is immutable for the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealizedResource {
    /// Id of the node this realization belongs to.
    pub node_id: String,

    /// Kind, carried for reporting.
    pub kind: ResourceKind,

    /// Provider-assigned identity (ARN/ID). None until Created.
    pub identity: Option<String>,

    /// Provider-reported attributes (DNS names, generated fields, ids).
    pub attrs: BTreeMap<String, String>,

    /// Current lifecycle status.
    pub status: ResourceStatus,
}

impl RealizedResource {
    /// A fresh Pending record for a node.
    pub fn pending(node_id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            node_id: node_id.into(),
            kind,
            identity: None,
            attrs: BTreeMap::new(),
            status: ResourceStatus::Pending,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

/// A named, externally consumable value derived from a realized resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBinding {
    /// Export name (e.g. `alb-url`).
    pub name: String,

    /// Node the value is read from.
    pub node: String,

    /// Realized attribute holding the value.
    pub attribute: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde_round_trip() {
        for status in [
            ResourceStatus::Pending,
            ResourceStatus::Creating,
            ResourceStatus::Created,
            ResourceStatus::Failed,
            ResourceStatus::RollingBack,
            ResourceStatus::RolledBack,
            ResourceStatus::RollbackFailed,
            ResourceStatus::Deleted,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            let back: ResourceStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(ResourceStatus::Created.is_terminal());
        assert!(ResourceStatus::RolledBack.is_terminal());
        assert!(ResourceStatus::RollbackFailed.is_terminal());
        assert!(!ResourceStatus::Creating.is_terminal());
        assert!(!ResourceStatus::RollingBack.is_terminal());
    }

    #[test]
    fn test_symbolic_detection_nested() {
        let mut env = BTreeMap::new();
        env.insert("PASSWORD".to_string(), AttrValue::secret("creds", "password"));
        let value = AttrValue::Map(env);
        assert!(value.is_symbolic());
        assert_eq!(value.referenced_nodes(), vec!["creds"]);

        let literal = AttrValue::from("dpage/pgadmin4");
        assert!(!literal.is_symbolic());
        assert!(literal.referenced_nodes().is_empty());
    }

    #[test]
    fn test_render_literals_only() {
        assert_eq!(AttrValue::from(80i64).render(), Some("80".to_string()));
        assert_eq!(AttrValue::seconds(20).render(), Some("20".to_string()));
        assert_eq!(AttrValue::reference("vpc", "network_id").render(), None);
    }
}
