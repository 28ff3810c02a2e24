//! Error types for provisioning operations

use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::{ComputeNodeError, DependencyChain, LogicalId, LogicalIdError};

/// Failure reported by an external resource provider
///
/// Providers only know what went wrong with a single request; the executor
/// lifts these into [`ProvisioningError`] with the resource's logical name
/// and declared dependency chain attached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Requested address block overlaps an existing allocation
    #[error("allocation conflict: {0}")]
    AllocationConflict(String),

    /// Requested compute shape cannot be placed
    #[error("capacity unavailable: {0}")]
    CapacityUnavailable(String),

    /// Secret pointer could not be resolved
    #[error("credential resolution failed: {0}")]
    CredentialResolution(String),

    /// Referenced resource does not exist in the provider's inventory
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Any other provider-side failure
    #[error("provider failure: {0}")]
    Other(String),
}

/// Errors that abort a provisioning run
///
/// All variants are fatal to the run; none is retried locally.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Address block overlaps an existing network in the same account/region
    #[error("AllocationConflict on {resource} ({detail}); chain: {chain}")]
    AllocationConflict {
        resource: LogicalId,
        chain: DependencyChain,
        detail: String,
    },

    /// Compute shape cannot be placed in the target tier/domain
    #[error("CapacityUnavailable on {resource} ({detail}); chain: {chain}")]
    CapacityUnavailable {
        resource: LogicalId,
        chain: DependencyChain,
        detail: String,
    },

    /// External secret pointer could not be resolved at creation time
    #[error("CredentialResolutionError on {resource} ({detail}); chain: {chain}")]
    CredentialResolution {
        resource: LogicalId,
        chain: DependencyChain,
        detail: String,
    },

    /// Export name registered twice, or owned by another stack
    #[error("ExportCollision on export {name} (value from {resource}); chain: {chain}")]
    ExportCollision {
        name: String,
        resource: LogicalId,
        chain: DependencyChain,
    },

    /// Provider failure outside the fatal taxonomy
    #[error("Provider failure on {resource} ({source}); chain: {chain}")]
    Provider {
        resource: LogicalId,
        chain: DependencyChain,
        #[source]
        source: ProviderError,
    },

    /// Same logical identifier declared twice
    #[error("Resource declared twice: {0}")]
    DuplicateDeclaration(LogicalId),

    /// Declaration references a resource that was never declared
    #[error("{resource} references undeclared resource {missing}")]
    UnknownReference {
        resource: LogicalId,
        missing: LogicalId,
    },

    /// Predecessor edges form a cycle
    #[error("Dependency cycle involving {0}")]
    DependencyCycle(LogicalId),

    /// Run aborted by the operator between waves
    #[error("Provisioning aborted after {completed} completed resources")]
    Aborted { completed: usize },

    /// Invalid declared configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for provisioning operations
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

impl ProvisioningError {
    /// Lift a provider failure into a run-level error for `resource`
    pub fn from_provider(resource: LogicalId, chain: DependencyChain, err: ProviderError) -> Self {
        match err {
            ProviderError::AllocationConflict(detail) => Self::AllocationConflict {
                resource,
                chain,
                detail,
            },
            ProviderError::CapacityUnavailable(detail) => Self::CapacityUnavailable {
                resource,
                chain,
                detail,
            },
            ProviderError::CredentialResolution(detail) => Self::CredentialResolution {
                resource,
                chain,
                detail,
            },
            other => Self::Provider {
                resource,
                chain,
                source: other,
            },
        }
    }

    /// Logical name of the resource the error originated at, if any
    pub fn resource(&self) -> Option<&LogicalId> {
        match self {
            Self::AllocationConflict { resource, .. }
            | Self::CapacityUnavailable { resource, .. }
            | Self::CredentialResolution { resource, .. }
            | Self::ExportCollision { resource, .. }
            | Self::Provider { resource, .. }
            | Self::UnknownReference { resource, .. } => Some(resource),
            Self::DuplicateDeclaration(resource) | Self::DependencyCycle(resource) => {
                Some(resource)
            }
            Self::Aborted { .. } | Self::InvalidConfiguration(_) => None,
        }
    }

    /// Declared dependency chain leading to the failing resource, if any
    pub fn chain(&self) -> Option<&DependencyChain> {
        match self {
            Self::AllocationConflict { chain, .. }
            | Self::CapacityUnavailable { chain, .. }
            | Self::CredentialResolution { chain, .. }
            | Self::ExportCollision { chain, .. }
            | Self::Provider { chain, .. } => Some(chain),
            _ => None,
        }
    }
}

impl From<ConfigError> for ProvisioningError {
    fn from(err: ConfigError) -> Self {
        ProvisioningError::InvalidConfiguration(err.to_string())
    }
}

impl From<LogicalIdError> for ProvisioningError {
    fn from(err: LogicalIdError) -> Self {
        ProvisioningError::InvalidConfiguration(err.to_string())
    }
}

impl From<ComputeNodeError> for ProvisioningError {
    fn from(err: ComputeNodeError) -> Self {
        ProvisioningError::InvalidConfiguration(err.to_string())
    }
}
