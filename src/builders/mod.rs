// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Builders
//!
//! Each builder declares one layer of the environment into a shared
//! [`crate::graph::ResourceGraph`]. Builders never call a provider; they
//! only produce declarations and the edges between them.
//!
//! ```text
//! NetworkTopologyBuilder → SecurityPolicyMatrix → ComputeProvisioner → DataTierProvisioner
//! ```

pub mod compute;
pub mod database;
pub mod network;
pub mod security;

pub use compute::ComputeProvisioner;
pub use database::{DataTierProvisioner, DatabaseCluster};
pub use network::{NetworkTopology, NetworkTopologyBuilder};
pub use security::{
    AllowEntry, AllowList, AllowSource, IngressRule, PolicyViolation, SecurityGroupHandle,
    SecurityPolicyMatrix,
};
