//! Output exporter.
//!
//! After a successful run, projects the named output bindings out of the
//! realized resource map. Every binding must resolve; a dangling binding
//! is an error, never a silently absent key.

use crate::error::{Result, StratusError};
use crate::types::resource::{OutputBinding, RealizedResource, ResourceStatus};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Resolve every binding against the realized map.
///
/// Returns the exported name/value pairs, sorted by name. Fails with
/// `MissingAttribute` if a bound node is absent, not Created, or lacks the
/// bound attribute.
#[instrument(skip_all, fields(bindings = bindings.len()))]
pub fn export_outputs(
    realized: &BTreeMap<String, RealizedResource>,
    bindings: &[OutputBinding],
) -> Result<BTreeMap<String, String>> {
    let mut outputs = BTreeMap::new();

    for binding in bindings {
        let resource = realized.get(&binding.node).ok_or_else(|| {
            StratusError::MissingAttribute {
                id: binding.node.clone(),
                attribute: binding.attribute.clone(),
            }
        })?;

        if resource.status != ResourceStatus::Created {
            return Err(StratusError::MissingAttribute {
                id: binding.node.clone(),
                attribute: binding.attribute.clone(),
            });
        }

        let value = resource.attr(&binding.attribute).ok_or_else(|| {
            StratusError::MissingAttribute {
                id: binding.node.clone(),
                attribute: binding.attribute.clone(),
            }
        })?;

        debug!(output = %binding.name, node = %binding.node, "Exported output");
        outputs.insert(binding.name.clone(), value.to_string());
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::resource::ResourceKind;

    fn realized_alb(status: ResourceStatus) -> BTreeMap<String, RealizedResource> {
        let mut alb = RealizedResource::pending("alb", ResourceKind::LoadBalancer);
        alb.status = status;
        alb.identity = Some("arn:stratus:load-balancer/alb-0001".to_string());
        alb.attrs
            .insert("dns_name".to_string(), "alb-0001.elb.stratus.internal".to_string());
        BTreeMap::from([("alb".to_string(), alb)])
    }

    fn binding(name: &str, node: &str, attribute: &str) -> OutputBinding {
        OutputBinding {
            name: name.to_string(),
            node: node.to_string(),
            attribute: attribute.to_string(),
        }
    }

    #[test]
    fn test_export_resolves_binding() {
        let realized = realized_alb(ResourceStatus::Created);
        let outputs =
            export_outputs(&realized, &[binding("alb-url", "alb", "dns_name")]).unwrap();
        assert_eq!(outputs["alb-url"], "alb-0001.elb.stratus.internal");
    }

    #[test]
    fn test_export_missing_attribute() {
        let realized = realized_alb(ResourceStatus::Created);
        let result = export_outputs(&realized, &[binding("alb-url", "alb", "zone_id")]);
        match result {
            Err(StratusError::MissingAttribute { id, attribute }) => {
                assert_eq!(id, "alb");
                assert_eq!(attribute, "zone_id");
            }
            other => panic!("Expected MissingAttribute, got {:?}", other),
        }
    }

    #[test]
    fn test_export_missing_node() {
        let realized = realized_alb(ResourceStatus::Created);
        let result = export_outputs(&realized, &[binding("db-url", "db", "endpoint")]);
        assert!(matches!(result, Err(StratusError::MissingAttribute { .. })));
    }

    #[test]
    fn test_export_requires_created_status() {
        let realized = realized_alb(ResourceStatus::Failed);
        let result = export_outputs(&realized, &[binding("alb-url", "alb", "dns_name")]);
        assert!(matches!(result, Err(StratusError::MissingAttribute { .. })));
    }
}
