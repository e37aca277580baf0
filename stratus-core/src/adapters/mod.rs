//! Cloud provisioning adapter abstraction.
//!
//! The engine depends only on the `CloudAdapter` capability contract
//! (create/update/delete/describe), never on a specific provider's wire
//! format. Real providers implement this trait; the built-in memory adapter
//! simulates one for tests and dry runs.

use crate::error::{Result, StratusError};
use crate::types::resource::{AttrValue, ResourceKind};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

pub mod memory;

pub use memory::MemoryCloudAdapter;

/// Identity and attributes assigned by the provider on create.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedResource {
    /// Provider-assigned identity (ARN/ID).
    pub identity: String,

    /// Provider-reported attributes (DNS names, generated fields, ids).
    pub attrs: BTreeMap<String, String>,
}

/// Cloud adapter trait.
///
/// Configurations passed in are fully resolved: the engine substitutes all
/// symbolic references before any adapter call.
#[async_trait]
pub trait CloudAdapter: Send + Sync {
    /// Create a resource of `kind`, returning its identity and attributes.
    async fn create(
        &self,
        kind: ResourceKind,
        id: &str,
        config: &BTreeMap<String, AttrValue>,
    ) -> Result<CreatedResource>;

    /// Update an existing resource in place, returning refreshed attributes.
    async fn update(
        &self,
        identity: &str,
        config: &BTreeMap<String, AttrValue>,
    ) -> Result<BTreeMap<String, String>>;

    /// Delete a resource.
    async fn delete(&self, identity: &str) -> Result<()>;

    /// Fetch current attributes for a resource.
    async fn describe(&self, identity: &str) -> Result<BTreeMap<String, String>>;

    /// Adapter name (for logging/metrics).
    fn name(&self) -> &str;
}

/// Factory for creating cloud adapters.
pub struct AdapterFactory;

impl AdapterFactory {
    /// Create an adapter, optionally overriding the default by name.
    ///
    /// With no override the memory adapter is selected; it is the only
    /// backend shipped here, real providers plug in through the trait.
    #[instrument]
    pub fn create(adapter_override: Option<&str>) -> Result<Arc<dyn CloudAdapter>> {
        match adapter_override {
            None | Some("memory") => {
                let adapter = MemoryCloudAdapter::new();
                info!(adapter = adapter.name(), "Created cloud adapter");
                Ok(Arc::new(adapter))
            }
            Some(other) => Err(StratusError::UnknownAdapter { name: other.to_string() }),
        }
    }
}
