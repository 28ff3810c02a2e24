//! Layered environment provisioning
//!
//! Declares a multi-tier environment (network, security matrix, bastion,
//! web and application nodes, encrypted database cluster) as an explicit
//! dependency graph, applies it in dependency order against a resource
//! provider, and publishes a stable set of cross-stack exports. A separate
//! delivery pipeline moves application changes from source control to the
//! tagged compute nodes.

pub mod builders;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod executor;
pub mod exports;
pub mod graph;
pub mod pipeline;
pub mod provider;
pub mod secrets;
pub mod stack;
pub mod state_machine;

// Re-export commonly used types
pub use config::{ConfigError, EnvironmentConfig, TopologyVariant};
pub use errors::{ProviderError, ProvisioningError, ProvisioningResult};
pub use executor::{AbortHandle, GraphExecutor, ProvisioningRun};
pub use exports::OutputContract;
pub use graph::ResourceGraph;
pub use pipeline::{DeliveryPipeline, PipelineError, PipelineStackBuilder};
pub use provider::{InMemoryProvider, ResourceProvider};
pub use stack::{BootPayloads, EnvironmentStack};
