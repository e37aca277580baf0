//! Error types for stratus.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for stratus operations.
pub type Result<T> = std::result::Result<T, StratusError>;

/// Main error type for stratus.
#[derive(Error, Debug)]
pub enum StratusError {
    // Graph construction errors. These are fatal and surface before any
    // provisioning call is made.
    #[error("Duplicate resource id: {id}")]
    DuplicateId { id: String },

    #[error("Invalid configuration for {id}: {reason}")]
    InvalidConfig { id: String, reason: String },

    #[error("Missing dependency: resource '{id}' depends on '{dependency}' which does not exist")]
    MissingDependency { id: String, dependency: String },

    #[error("Dependency cycle detected involving: {}", members.join(", "))]
    CycleDetected { members: Vec<String> },

    // Realization errors. These trigger the rollback path.
    #[error("Provisioning call failed for {id}: {reason}")]
    ProvisioningCall { id: String, reason: String },

    #[error("Provisioning call for {id} timed out after {timeout_secs}s")]
    CallTimeout { id: String, timeout_secs: u64 },

    #[error("Run cancelled before {id} was realized")]
    Cancelled { id: String },

    // Rollback errors are reported per resource and never abort remaining
    // rollback steps.
    #[error("Rollback failed for {id}: {reason}")]
    RollbackFailed { id: String, reason: String },

    // Output export errors
    #[error("Resource {id} has no attribute '{attribute}'")]
    MissingAttribute { id: String, attribute: String },

    // Secret generation errors
    #[error("Secret generation failed: {reason}")]
    SecretGeneration { reason: String },

    // Adapter errors
    #[error("Unknown adapter '{name}'. Valid options: memory")]
    UnknownAdapter { name: String },

    #[error("Resource identity not found: {identity}")]
    IdentityNotFound { identity: String },

    // State store errors
    #[error("State record error: {reason}")]
    StateStore { reason: String },

    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StratusError {
    /// Create an Internal error from any error type.
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(err.to_string())
    }
}
