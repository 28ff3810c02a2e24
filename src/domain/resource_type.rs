// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Kind Taxonomy
//!
//! Defines the kinds of resources a layered environment declares. The kind
//! decides which attributes a provider publishes for the resource and how it
//! is reported in the orchestration log.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a declared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    // Network
    /// Virtual network with its subnet tiers
    Network,
    /// Managed egress (NAT) gateway
    EgressGateway,
    /// Network-wide traffic log
    FlowLog,

    // Security
    /// Security group
    SecurityGroup,
    /// Single ingress rule attached to a security group
    IngressRule,

    // Compute
    /// Identity-and-access role carrying managed capabilities
    Role,
    /// Compute instance (bastion, web, app)
    Instance,

    // Data
    /// Customer-managed encryption key
    EncryptionKey,
    /// Database cluster
    DatabaseCluster,

    // Delivery
    /// Artifact store shared by pipeline stages
    ArtifactStore,
    /// Build project
    BuildProject,
    /// Deployment application
    DeployApplication,
    /// Deployment group selecting instances by tag
    DeploymentGroup,
    /// Delivery pipeline
    Pipeline,
}

impl ResourceKind {
    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::EgressGateway => "egress_gateway",
            Self::FlowLog => "flow_log",
            Self::SecurityGroup => "security_group",
            Self::IngressRule => "ingress_rule",
            Self::Role => "role",
            Self::Instance => "instance",
            Self::EncryptionKey => "encryption_key",
            Self::DatabaseCluster => "database_cluster",
            Self::ArtifactStore => "artifact_store",
            Self::BuildProject => "build_project",
            Self::DeployApplication => "deploy_application",
            Self::DeploymentGroup => "deployment_group",
            Self::Pipeline => "pipeline",
        }
    }

    /// Whether the resource holds data that teardown must destroy explicitly
    pub fn is_stateful(&self) -> bool {
        matches!(self, Self::EncryptionKey | Self::DatabaseCluster)
    }

    /// Whether the resource runs workloads
    pub fn is_compute(&self) -> bool {
        matches!(self, Self::Instance)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
