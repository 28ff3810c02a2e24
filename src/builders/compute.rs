// Copyright (c) 2025 - Cowboy AI, Inc.
//! Compute Provisioner
//!
//! Declares bastion, web and application nodes. Each node gets its own role
//! resource carrying exactly the requested managed capabilities, is placed
//! in one subnet tier and one security group, and is tagged so the delivery
//! pipeline can select it later without knowing its identifier.
//!
//! Predecessors become explicit graph edges: a node is not started until
//! every predecessor has completed provisioning.

use std::collections::BTreeMap;

use crate::builders::security::SecurityGroupHandle;
use crate::config::EnvironmentConfig;
use crate::domain::{
    BootPayload, ComputeNode, LogicalId, NodeKind, RoleSpec, SubnetTier, TAG_APPLICATION_NAME,
    TAG_STAGE,
};
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::graph::{Declaration, InstanceSpec, ResourceGraph, RoleDeclaration};

/// Service principal compute roles are assumed by
pub const COMPUTE_PRINCIPAL: &str = "ec2.amazonaws.com";

/// Declares compute nodes into a resource graph
pub struct ComputeProvisioner<'a> {
    config: &'a EnvironmentConfig,
    network: LogicalId,
    nodes: BTreeMap<LogicalId, ComputeNode>,
}

impl<'a> ComputeProvisioner<'a> {
    pub fn new(config: &'a EnvironmentConfig, network: &LogicalId) -> Self {
        Self {
            config,
            network: network.clone(),
            nodes: BTreeMap::new(),
        }
    }

    /// Logical id of a node kind (`dev-Bastion-Host`, `dev-WebServer-Instance`)
    pub fn node_id(&self, kind: NodeKind) -> ProvisioningResult<LogicalId> {
        let base = LogicalId::new(self.config.scoped(kind.segment()))?;
        let suffix = match kind {
            NodeKind::Bastion => "Host",
            NodeKind::Web | NodeKind::App => "Instance",
        };
        Ok(base.child(suffix)?)
    }

    fn shape(&self, kind: NodeKind) -> &str {
        match kind {
            NodeKind::Bastion => &self.config.compute.bastion_shape,
            NodeKind::Web => &self.config.compute.web_shape,
            NodeKind::App => &self.config.compute.app_shape,
        }
    }

    fn application_tag(&self, kind: NodeKind) -> String {
        match kind {
            NodeKind::Bastion => self.config.scoped(kind.segment()),
            NodeKind::Web | NodeKind::App => self.config.deployment.application_name.clone(),
        }
    }

    /// Declare a node and its role
    ///
    /// Every predecessor must be a node declared earlier by this provisioner.
    #[allow(clippy::too_many_arguments)]
    pub fn provision(
        &mut self,
        graph: &mut ResourceGraph,
        kind: NodeKind,
        tier: SubnetTier,
        security_group: &SecurityGroupHandle,
        role: RoleSpec,
        boot_payload: Option<BootPayload>,
        predecessors: &[&ComputeNode],
    ) -> ProvisioningResult<ComputeNode> {
        let id = self.node_id(kind)?;
        let role_id = LogicalId::new(self.config.scoped(kind.segment()))?.child("Role")?;

        if self.nodes.contains_key(&id) {
            return Err(ProvisioningError::DuplicateDeclaration(id));
        }

        let mut builder = ComputeNode::builder(
            id.clone(),
            role_id.clone(),
            kind,
            security_group.id.clone(),
        )
        .tier(tier)
        .role(role.clone())
        .shape(self.shape(kind))
        .machine_image(&self.config.compute.machine_image)
        .key_name(self.config.compute.key_name.clone())
        .boot_payload(boot_payload)
        .tag(TAG_APPLICATION_NAME, self.application_tag(kind))
        .tag(TAG_STAGE, &self.config.deployment.stage);

        for predecessor in predecessors {
            if !self.nodes.contains_key(&predecessor.id) {
                return Err(ProvisioningError::UnknownReference {
                    resource: id,
                    missing: predecessor.id.clone(),
                });
            }
            builder = builder.predecessor(predecessor.id.clone());
        }

        let node = builder.build()?;

        graph.declare(
            role_id,
            Declaration::Role(RoleDeclaration {
                principal: COMPUTE_PRINCIPAL.to_string(),
                role,
            }),
            &[],
        )?;
        graph.declare(
            id.clone(),
            Declaration::Instance(InstanceSpec {
                network: self.network.clone(),
                node: node.clone(),
            }),
            &node.predecessors,
        )?;

        tracing::debug!(
            node = %id,
            tier = %tier,
            predecessors = node.predecessors.len(),
            "declared compute node"
        );

        self.nodes.insert(id, node.clone());
        Ok(node)
    }

    /// Nodes declared so far
    pub fn nodes(&self) -> impl Iterator<Item = &ComputeNode> {
        self.nodes.values()
    }

    pub fn node(&self, kind: NodeKind) -> Option<&ComputeNode> {
        self.nodes.values().find(|n| n.kind == kind)
    }
}
