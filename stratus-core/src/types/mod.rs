//! Shared domain types for stratus.

pub mod resource;
pub mod secret;

pub use resource::{
    AttrValue, OutputBinding, RealizedResource, ResourceKind, ResourceNode, ResourceStatus,
};
pub use secret::SecretSpec;
