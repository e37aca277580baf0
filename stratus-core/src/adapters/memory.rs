//! In-memory simulated cloud.
//!
//! Assigns deterministic identities, synthesizes the provider attributes
//! each kind would report (DNS names, generated secret fields), and tracks
//! live resources so deletes and describes behave like a real account.
//! Failure injection and per-node create delays make the rollback and
//! timeout paths testable.

use crate::adapters::{CloudAdapter, CreatedResource};
use crate::error::{Result, StratusError};
use crate::types::resource::{AttrValue, ResourceKind};
use crate::types::secret::SecretSpec;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct StoredResource {
    node_id: String,
    kind: ResourceKind,
    attrs: BTreeMap<String, String>,
}

/// Simulated provisioning backend.
#[derive(Default)]
pub struct MemoryCloudAdapter {
    resources: Mutex<HashMap<String, StoredResource>>,
    sequence: AtomicU64,
    fail_create: Mutex<HashSet<String>>,
    fail_delete: Mutex<HashSet<String>>,
    create_delay: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MemoryCloudAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create` fail for the given node id.
    pub fn fail_create(&self, node_id: &str) {
        self.fail_create.lock().unwrap().insert(node_id.to_string());
    }

    /// Stop failing `create` for the given node id.
    pub fn clear_fail_create(&self, node_id: &str) {
        self.fail_create.lock().unwrap().remove(node_id);
    }

    /// Make `delete` fail for resources created from the given node id.
    pub fn fail_delete(&self, node_id: &str) {
        self.fail_delete.lock().unwrap().insert(node_id.to_string());
    }

    /// Delay `create` for the given node id (for timeout tests).
    pub fn delay_create(&self, node_id: &str, delay: Duration) {
        self.create_delay.lock().unwrap().insert(node_id.to_string(), delay);
    }

    /// Number of currently live resources.
    pub fn live_count(&self) -> usize {
        self.resources.lock().unwrap().len()
    }

    /// Whether a resource with this identity is live.
    pub fn contains(&self, identity: &str) -> bool {
        self.resources.lock().unwrap().contains_key(identity)
    }

    /// Chronological (operation, node-or-identity) log.
    pub fn call_log(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, op: &str, subject: &str) {
        self.calls.lock().unwrap().push((op.to_string(), subject.to_string()));
    }

    /// Synthesize the attributes a provider would report for this kind.
    fn synthesize_attrs(
        kind: ResourceKind,
        id: &str,
        seq: u64,
        config: &BTreeMap<String, AttrValue>,
    ) -> Result<BTreeMap<String, String>> {
        // Echo literal config first; provider-assigned values win below.
        let mut attrs: BTreeMap<String, String> = config
            .iter()
            .filter_map(|(k, v)| v.render().map(|s| (k.clone(), s)))
            .collect();

        match kind {
            ResourceKind::Network => {
                attrs.insert("network_id".to_string(), format!("net-{:04}", seq));
            }
            ResourceKind::ComputeCluster => {
                attrs.insert("cluster_name".to_string(), format!("{}-{:04}", id, seq));
            }
            ResourceKind::CapacityPool => {
                attrs.insert("pool_name".to_string(), format!("{}-{:04}", id, seq));
            }
            ResourceKind::SecretStore => {
                let spec = SecretSpec::from_attrs(id, config)?;
                for (field, value) in spec.generate()? {
                    attrs.insert(field, value);
                }
                attrs.insert("secret_name".to_string(), spec.name);
            }
            ResourceKind::ContainerTask => {
                attrs.insert("task_family".to_string(), format!("{}-{:04}", id, seq));
                attrs.insert("revision".to_string(), "1".to_string());
            }
            ResourceKind::Service => {
                attrs.insert("service_name".to_string(), format!("{}-{:04}", id, seq));
            }
            ResourceKind::LoadBalancer => {
                attrs.insert(
                    "dns_name".to_string(),
                    format!("{}-{:04}.elb.stratus.internal", id, seq),
                );
            }
            ResourceKind::Listener => {
                if let Some(port) = config.get("port").and_then(AttrValue::as_int) {
                    attrs.insert("listener_port".to_string(), port.to_string());
                }
            }
            ResourceKind::Output => {
                // Outputs are resolved by the engine, never provisioned.
            }
        }
        Ok(attrs)
    }
}

#[async_trait]
impl CloudAdapter for MemoryCloudAdapter {
    async fn create(
        &self,
        kind: ResourceKind,
        id: &str,
        config: &BTreeMap<String, AttrValue>,
    ) -> Result<CreatedResource> {
        let delay = self.create_delay.lock().unwrap().get(id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.log("create", id);

        if self.fail_create.lock().unwrap().contains(id) {
            return Err(StratusError::ProvisioningCall {
                id: id.to_string(),
                reason: "injected create failure".to_string(),
            });
        }

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let identity = format!("arn:stratus:{}/{}-{:04}", kind.as_str(), id, seq);
        let attrs = Self::synthesize_attrs(kind, id, seq, config)?;

        self.resources.lock().unwrap().insert(
            identity.clone(),
            StoredResource { node_id: id.to_string(), kind, attrs: attrs.clone() },
        );

        info!(identity = %identity, kind = %kind, "Created simulated resource");
        Ok(CreatedResource { identity, attrs })
    }

    async fn update(
        &self,
        identity: &str,
        config: &BTreeMap<String, AttrValue>,
    ) -> Result<BTreeMap<String, String>> {
        self.log("update", identity);

        let mut resources = self.resources.lock().unwrap();
        let stored = resources
            .get_mut(identity)
            .ok_or_else(|| StratusError::IdentityNotFound { identity: identity.to_string() })?;

        for (key, value) in config {
            if let Some(rendered) = value.render() {
                stored.attrs.insert(key.clone(), rendered);
            }
        }

        debug!(identity = %identity, "Updated simulated resource");
        Ok(stored.attrs.clone())
    }

    async fn delete(&self, identity: &str) -> Result<()> {
        self.log("delete", identity);

        let (node_id, kind) = {
            let resources = self.resources.lock().unwrap();
            resources
                .get(identity)
                .map(|r| (r.node_id.clone(), r.kind))
                .ok_or_else(|| StratusError::IdentityNotFound { identity: identity.to_string() })?
        };

        if self.fail_delete.lock().unwrap().contains(&node_id) {
            return Err(StratusError::ProvisioningCall {
                id: node_id,
                reason: "injected delete failure".to_string(),
            });
        }

        self.resources.lock().unwrap().remove(identity);
        info!(identity = %identity, kind = %kind, "Deleted simulated resource");
        Ok(())
    }

    async fn describe(&self, identity: &str) -> Result<BTreeMap<String, String>> {
        self.log("describe", identity);

        let resources = self.resources.lock().unwrap();
        resources
            .get(identity)
            .map(|r| r.attrs.clone())
            .ok_or_else(|| StratusError::IdentityNotFound { identity: identity.to_string() })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, AttrValue)]) -> BTreeMap<String, AttrValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_create_describe_delete() {
        let cloud = MemoryCloudAdapter::new();

        let created = cloud
            .create(
                ResourceKind::Network,
                "vpc",
                &config(&[("cidr", AttrValue::from("10.10.0.0/16"))]),
            )
            .await
            .unwrap();

        assert!(created.identity.starts_with("arn:stratus:network/vpc-"));
        assert_eq!(created.attrs["cidr"], "10.10.0.0/16");
        assert!(created.attrs.contains_key("network_id"));

        let described = cloud.describe(&created.identity).await.unwrap();
        assert_eq!(described, created.attrs);

        cloud.delete(&created.identity).await.unwrap();
        assert_eq!(cloud.live_count(), 0);

        let result = cloud.describe(&created.identity).await;
        assert!(matches!(result, Err(StratusError::IdentityNotFound { .. })));
    }

    #[tokio::test]
    async fn test_load_balancer_reports_dns_name() {
        let cloud = MemoryCloudAdapter::new();
        let created = cloud
            .create(
                ResourceKind::LoadBalancer,
                "alb",
                &config(&[("internet_facing", AttrValue::from(true))]),
            )
            .await
            .unwrap();

        let dns = &created.attrs["dns_name"];
        assert!(dns.starts_with("alb-"));
        assert!(dns.ends_with(".elb.stratus.internal"));
    }

    #[tokio::test]
    async fn test_secret_store_generates_fields() {
        let cloud = MemoryCloudAdapter::new();
        let created = cloud
            .create(
                ResourceKind::SecretStore,
                "creds",
                &config(&[
                    ("name", AttrValue::from("pgadmin-secret")),
                    ("generate_field", AttrValue::from("password")),
                    (
                        "template",
                        AttrValue::Map(BTreeMap::from([(
                            "email".to_string(),
                            AttrValue::from("hello@myorg.lab"),
                        )])),
                    ),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(created.attrs["email"], "hello@myorg.lab");
        let password = &created.attrs["password"];
        assert_eq!(password.len(), 32);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(password, "hello@myorg.lab");
    }

    #[tokio::test]
    async fn test_injected_create_failure() {
        let cloud = MemoryCloudAdapter::new();
        cloud.fail_create("vpc");

        let result = cloud
            .create(
                ResourceKind::Network,
                "vpc",
                &config(&[("cidr", AttrValue::from("10.10.0.0/16"))]),
            )
            .await;
        assert!(matches!(result, Err(StratusError::ProvisioningCall { .. })));
        assert_eq!(cloud.live_count(), 0);
    }

    #[tokio::test]
    async fn test_update_refreshes_attrs() {
        let cloud = MemoryCloudAdapter::new();
        let created = cloud
            .create(
                ResourceKind::Service,
                "service",
                &config(&[("desired_count", AttrValue::from(1i64))]),
            )
            .await
            .unwrap();

        let attrs = cloud
            .update(&created.identity, &config(&[("desired_count", AttrValue::from(3i64))]))
            .await
            .unwrap();
        assert_eq!(attrs["desired_count"], "3");
        // Provider-assigned attributes survive updates.
        assert!(attrs.contains_key("service_name"));
    }
}
