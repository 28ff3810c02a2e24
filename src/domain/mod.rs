// Copyright (c) 2025 - Cowboy AI, Inc.
//! Layered Topology Domain Models
//!
//! Core domain concepts for a layered environment: logical identifiers,
//! address blocks, tiers, compute nodes, and the validation invariants the
//! builders rely on.
//!
//! # Value Objects with Invariants
//!
//! - [`LogicalId`] - Validated resource identifier
//! - [`DependencyChain`] - Ordered predecessor path reported with errors
//! - [`CidrBlock`] - Aligned IPv4 address block
//! - [`SubnetTier`] / [`SecurityTier`] - Isolation classes
//! - [`ResourceKind`] - Declared resource taxonomy
//!
//! # Entities
//!
//! - [`ComputeNode`] - Bastion, web or app instance with role and predecessors

pub mod compute_node;
pub mod invariants;
pub mod logical_id;
pub mod network;
pub mod resource_type;
pub mod tier;

pub use compute_node::{
    BootPayload, Capability, ComputeNode, ComputeNodeBuilder, ComputeNodeError, NodeKind,
    PayloadSource, RoleSpec, TAG_APPLICATION_NAME, TAG_INSTANCE_NAME, TAG_STAGE,
};
pub use invariants::{normalize_database_name, ValidationError, ValidationResult};
pub use logical_id::{DependencyChain, LogicalId, LogicalIdError};
pub use network::{ports, CidrBlock, NetworkError, Protocol};
pub use resource_type::ResourceKind;
pub use tier::{SecurityTier, SubnetTier};
