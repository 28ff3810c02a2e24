// Copyright (c) 2025 - Cowboy AI, Inc.
//! Compute Node Entity
//!
//! A compute node is one bastion, web, or application instance together with
//! the role it assumes, the security group it belongs to, the opaque payload
//! it runs on first boot, and the predecessors it must not start before.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::{LogicalId, SubnetTier};

/// Tag carrying the instance's logical name
pub const TAG_INSTANCE_NAME: &str = "instance-name";
/// Tag carrying the application the instance serves
pub const TAG_APPLICATION_NAME: &str = "application-name";
/// Tag carrying the lifecycle stage (environment prefix)
pub const TAG_STAGE: &str = "stage";

/// Compute node validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComputeNodeError {
    #[error("Invalid tag key: {0}")]
    InvalidTagKey(String),

    #[error("Node {node} cannot be its own predecessor")]
    SelfPredecessor { node: LogicalId },

    #[error("Role of {node} grants no capabilities")]
    EmptyRole { node: LogicalId },

    #[error("Required tag missing on {node}: {tag}")]
    MissingTag { node: LogicalId, tag: &'static str },
}

/// Kind of compute node in the layered topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Management entry point in the public tier
    Bastion,
    /// Internet-facing web server
    Web,
    /// Application server behind the web tier
    App,
}

impl NodeKind {
    /// Name segment used in logical identifiers
    pub fn segment(&self) -> &'static str {
        match self {
            NodeKind::Bastion => "Bastion",
            NodeKind::Web => "WebServer",
            NodeKind::App => "AppServer",
        }
    }

    /// Subnet tier the node is placed in
    pub fn default_tier(&self) -> SubnetTier {
        match self {
            NodeKind::Bastion | NodeKind::Web => SubnetTier::Public,
            NodeKind::App => SubnetTier::PrivateWithEgress,
        }
    }

    /// Capabilities the node's role carries
    pub fn default_role(&self) -> RoleSpec {
        match self {
            NodeKind::Bastion => RoleSpec::new([Capability::RemoteManagement]),
            NodeKind::Web | NodeKind::App => {
                RoleSpec::new([Capability::RemoteManagement, Capability::DeploymentAgent])
            }
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Managed capability attached to a node's role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Remote management channel (session manager)
    RemoteManagement,
    /// Deployment agent able to pull and install build artifacts
    DeploymentAgent,
}

impl Capability {
    /// Managed policy granting this capability
    pub fn managed_policy(&self) -> &'static str {
        match self {
            Capability::RemoteManagement => "AmazonSSMManagedInstanceCore",
            Capability::DeploymentAgent => "service-role/AmazonEC2RoleforAWSCodeDeploy",
        }
    }
}

/// Identity-and-access role expressed as a capability set
///
/// A role never carries credentials, only managed capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleSpec {
    capabilities: BTreeSet<Capability>,
}

impl RoleSpec {
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Managed policies attached to the role, in capability order
    pub fn managed_policies(&self) -> Vec<&'static str> {
        self.capabilities.iter().map(Capability::managed_policy).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

/// Where a boot payload came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSource {
    Inline,
    File(PathBuf),
}

/// Opaque first-boot content delivered once to a node
///
/// The payload is never interpreted; it is handed to the provider together
/// with the instance declaration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootPayload {
    source: PayloadSource,
    content: String,
}

impl BootPayload {
    /// Payload given directly by the caller
    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            source: PayloadSource::Inline,
            content: content.into(),
        }
    }

    /// Load payload content from a file
    pub async fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        Ok(Self {
            source: PayloadSource::File(path.to_path_buf()),
            content,
        })
    }

    pub fn source(&self) -> &PayloadSource {
        &self.source
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl fmt::Debug for BootPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootPayload")
            .field("source", &self.source)
            .field("bytes", &self.content.len())
            .finish()
    }
}

/// Compute node entity
///
/// # Invariants
/// - Exactly one subnet tier and one security group
/// - The role grants at least one capability
/// - `instance-name`, `application-name` and `stage` tags are present
/// - A node never lists itself as a predecessor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeNode {
    /// Logical identifier of the instance
    pub id: LogicalId,

    /// Logical identifier of the role declared for the instance
    pub role_id: LogicalId,

    pub kind: NodeKind,

    pub tier: SubnetTier,

    /// Security group the instance is a member of
    pub security_group: LogicalId,

    pub role: RoleSpec,

    /// Instance shape (e.g. `t2.micro`)
    pub shape: String,

    pub machine_image: String,

    /// Key pair name for SSH access
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_payload: Option<BootPayload>,

    /// Nodes that must have completed provisioning before this one starts
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub predecessors: Vec<LogicalId>,

    pub tags: BTreeMap<String, String>,
}

impl ComputeNode {
    /// Builder pattern for fluent construction
    pub fn builder(
        id: LogicalId,
        role_id: LogicalId,
        kind: NodeKind,
        security_group: LogicalId,
    ) -> ComputeNodeBuilder {
        ComputeNodeBuilder::new(id, role_id, kind, security_group)
    }

    /// Get a tag value
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    fn is_valid_tag_key(key: &str) -> bool {
        !key.is_empty()
            && key.len() <= 128
            && key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    }

    /// Validate invariants for the current state
    pub fn validate(&self) -> Result<(), ComputeNodeError> {
        if self.predecessors.contains(&self.id) {
            return Err(ComputeNodeError::SelfPredecessor {
                node: self.id.clone(),
            });
        }

        if self.role.is_empty() {
            return Err(ComputeNodeError::EmptyRole {
                node: self.id.clone(),
            });
        }

        for key in self.tags.keys() {
            if !Self::is_valid_tag_key(key) {
                return Err(ComputeNodeError::InvalidTagKey(key.clone()));
            }
        }

        for tag in [TAG_INSTANCE_NAME, TAG_APPLICATION_NAME, TAG_STAGE] {
            if !self.tags.contains_key(tag) {
                return Err(ComputeNodeError::MissingTag {
                    node: self.id.clone(),
                    tag,
                });
            }
        }

        Ok(())
    }
}

/// Builder for ComputeNode with fluent API
pub struct ComputeNodeBuilder {
    node: ComputeNode,
}

impl ComputeNodeBuilder {
    fn new(id: LogicalId, role_id: LogicalId, kind: NodeKind, security_group: LogicalId) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(TAG_INSTANCE_NAME.to_string(), id.to_string());

        Self {
            node: ComputeNode {
                id,
                role_id,
                kind,
                tier: kind.default_tier(),
                security_group,
                role: kind.default_role(),
                shape: "t2.micro".to_string(),
                machine_image: "amazon-linux-2/x86_64".to_string(),
                key_name: None,
                boot_payload: None,
                predecessors: Vec::new(),
                tags,
            },
        }
    }

    pub fn tier(mut self, tier: SubnetTier) -> Self {
        self.node.tier = tier;
        self
    }

    pub fn role(mut self, role: RoleSpec) -> Self {
        self.node.role = role;
        self
    }

    pub fn shape(mut self, shape: impl Into<String>) -> Self {
        self.node.shape = shape.into();
        self
    }

    pub fn machine_image(mut self, image: impl Into<String>) -> Self {
        self.node.machine_image = image.into();
        self
    }

    pub fn key_name(mut self, key_name: Option<String>) -> Self {
        self.node.key_name = key_name;
        self
    }

    pub fn boot_payload(mut self, payload: Option<BootPayload>) -> Self {
        self.node.boot_payload = payload;
        self
    }

    /// Add a predecessor (duplicates are ignored)
    pub fn predecessor(mut self, id: LogicalId) -> Self {
        if !self.node.predecessors.contains(&id) {
            self.node.predecessors.push(id);
        }
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.node.tags.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<ComputeNode, ComputeNodeError> {
        self.node.validate()?;
        Ok(self.node)
    }
}
