//! stratus-core: declarative cloud topology provisioning.
//!
//! Resources are declared as a graph of typed nodes with explicit and
//! reference-implied dependency edges. A deterministic topological sort
//! produces the realization order, a diff against the last-known state
//! produces the plan, and the engine executes the plan against a pluggable
//! cloud adapter with reference substitution, per-call timeouts, and
//! reverse-order rollback on failure.

pub mod adapters;
pub mod engine;
pub mod error;
pub mod graph;
pub mod observability;
pub mod outputs;
pub mod plan;
pub mod state;
pub mod topology;
pub mod types;

pub use adapters::{AdapterFactory, CloudAdapter, CreatedResource, MemoryCloudAdapter};
pub use engine::{
    CancelHandle, EngineOptions, FailureReport, RealizationEngine, RollbackReport, RunReport,
    TeardownReport,
};
pub use error::{Result, StratusError};
pub use graph::ResourceGraph;
pub use outputs::export_outputs;
pub use plan::{plan, Operation, PlannedStep};
pub use state::{DeploymentState, RecordedResource};
pub use topology::TopologyParams;
pub use types::resource::{
    AttrValue, OutputBinding, RealizedResource, ResourceKind, ResourceNode, ResourceStatus,
};
pub use types::secret::SecretSpec;
