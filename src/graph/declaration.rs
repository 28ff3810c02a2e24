// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource declarations
//!
//! A declaration is the provider-facing description of one resource. Every
//! reference to another resource is a [`LogicalId`]; [`Declaration::references`]
//! turns those into implicit predecessor edges.

use serde::{Deserialize, Serialize};

use crate::config::RepositoryConfig;
use crate::domain::{
    CidrBlock, ComputeNode, LogicalId, Protocol, ResourceKind, RoleSpec, SecurityTier, SubnetTier,
};
use crate::pipeline::{DeployStrategy, TagSelector};
use crate::secrets::SecretRef;

/// What happens to a resource when its environment is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    Destroy,
    Retain,
}

/// One subnet of the network layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub tier: SubnetTier,
    /// Index of the availability domain (0-based)
    pub availability_domain: u8,
    pub cidr: CidrBlock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub cidr: CidrBlock,
    pub availability_domains: u8,
    pub subnets: Vec<SubnetSpec>,
}

impl NetworkSpec {
    /// Subnets of one tier, ordered by availability domain
    pub fn subnets_in(&self, tier: SubnetTier) -> impl Iterator<Item = &SubnetSpec> {
        self.subnets.iter().filter(move |s| s.tier == tier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressGatewaySpec {
    pub network: LogicalId,
    /// Tier the gateway lives in
    pub placement: SubnetTier,
    /// Tier whose outbound traffic it carries
    pub serves: SubnetTier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowLogSpec {
    pub network: LogicalId,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupSpec {
    pub network: LogicalId,
    pub tier: SecurityTier,
    /// Provider-side group name (e.g. `BastionSecurityGroup`)
    pub name: String,
    pub description: String,
    pub allow_all_outbound: bool,
}

/// Origin of traffic an ingress rule admits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    /// Literal address block (`0.0.0.0/0` for the internet)
    Cidr(CidrBlock),
    /// Any member of the referenced security group
    Group(LogicalId),
}

impl RuleSource {
    pub fn internet() -> Self {
        RuleSource::Cidr(CidrBlock::anywhere())
    }
}

impl std::fmt::Display for RuleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleSource::Cidr(block) => write!(f, "{block}"),
            RuleSource::Group(id) => write!(f, "group:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRuleSpec {
    pub group: LogicalId,
    pub source: RuleSource,
    pub protocol: Protocol,
    pub port: u16,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDeclaration {
    /// Service principal allowed to assume the role
    pub principal: String,
    pub role: RoleSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub network: LogicalId,
    pub node: ComputeNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKeySpec {
    pub alias: String,
    pub description: String,
    pub rotation_enabled: bool,
    pub removal: RemovalPolicy,
}

/// Master credentials: a username and a pointer, never a password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsRef {
    pub username: String,
    pub secret: SecretRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterInstance {
    pub name: String,
    pub shape: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseClusterSpec {
    pub network: LogicalId,
    pub security_group: LogicalId,
    pub encryption_key: LogicalId,
    pub tier: SubnetTier,
    pub engine_version: String,
    pub writer: WriterInstance,
    pub min_capacity: f64,
    pub max_capacity: f64,
    pub credentials: CredentialsRef,
    /// Normalized default database name
    pub database_name: String,
    pub port: u16,
    pub removal: RemovalPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactStoreSpec {
    /// Existing store imported by reference
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProjectSpec {
    pub build_image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployApplicationSpec {
    pub application_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentGroupSpec {
    pub application: LogicalId,
    pub group_name: String,
    pub install_agent: bool,
    pub selector: TagSelector,
    pub strategy: DeployStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub pipeline_name: String,
    pub artifact_store: LogicalId,
    pub repository: RepositoryConfig,
    pub build_project: LogicalId,
    pub deployment_group: LogicalId,
}

/// Provider-facing description of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Declaration {
    Network(NetworkSpec),
    EgressGateway(EgressGatewaySpec),
    FlowLog(FlowLogSpec),
    SecurityGroup(SecurityGroupSpec),
    IngressRule(IngressRuleSpec),
    Role(RoleDeclaration),
    Instance(InstanceSpec),
    EncryptionKey(EncryptionKeySpec),
    DatabaseCluster(DatabaseClusterSpec),
    ArtifactStore(ArtifactStoreSpec),
    BuildProject(BuildProjectSpec),
    DeployApplication(DeployApplicationSpec),
    DeploymentGroup(DeploymentGroupSpec),
    Pipeline(PipelineSpec),
}

impl Declaration {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Declaration::Network(_) => ResourceKind::Network,
            Declaration::EgressGateway(_) => ResourceKind::EgressGateway,
            Declaration::FlowLog(_) => ResourceKind::FlowLog,
            Declaration::SecurityGroup(_) => ResourceKind::SecurityGroup,
            Declaration::IngressRule(_) => ResourceKind::IngressRule,
            Declaration::Role(_) => ResourceKind::Role,
            Declaration::Instance(_) => ResourceKind::Instance,
            Declaration::EncryptionKey(_) => ResourceKind::EncryptionKey,
            Declaration::DatabaseCluster(_) => ResourceKind::DatabaseCluster,
            Declaration::ArtifactStore(_) => ResourceKind::ArtifactStore,
            Declaration::BuildProject(_) => ResourceKind::BuildProject,
            Declaration::DeployApplication(_) => ResourceKind::DeployApplication,
            Declaration::DeploymentGroup(_) => ResourceKind::DeploymentGroup,
            Declaration::Pipeline(_) => ResourceKind::Pipeline,
        }
    }

    /// Resources this declaration refers to (implicit predecessors)
    pub fn references(&self) -> Vec<LogicalId> {
        match self {
            Declaration::Network(_)
            | Declaration::Role(_)
            | Declaration::EncryptionKey(_)
            | Declaration::ArtifactStore(_)
            | Declaration::BuildProject(_)
            | Declaration::DeployApplication(_) => Vec::new(),
            Declaration::EgressGateway(spec) => vec![spec.network.clone()],
            Declaration::FlowLog(spec) => vec![spec.network.clone()],
            Declaration::SecurityGroup(spec) => vec![spec.network.clone()],
            Declaration::IngressRule(spec) => {
                let mut refs = vec![spec.group.clone()];
                if let RuleSource::Group(peer) = &spec.source {
                    refs.push(peer.clone());
                }
                refs
            }
            Declaration::Instance(spec) => vec![
                spec.network.clone(),
                spec.node.security_group.clone(),
                spec.node.role_id.clone(),
            ],
            Declaration::DatabaseCluster(spec) => vec![
                spec.network.clone(),
                spec.security_group.clone(),
                spec.encryption_key.clone(),
            ],
            Declaration::DeploymentGroup(spec) => vec![spec.application.clone()],
            Declaration::Pipeline(spec) => vec![
                spec.artifact_store.clone(),
                spec.build_project.clone(),
                spec.deployment_group.clone(),
            ],
        }
    }

    /// Removal policy applied at teardown
    pub fn removal_policy(&self) -> RemovalPolicy {
        match self {
            Declaration::EncryptionKey(spec) => spec.removal,
            Declaration::DatabaseCluster(spec) => spec.removal,
            // Imported, not owned by the stack.
            Declaration::ArtifactStore(_) => RemovalPolicy::Retain,
            _ => RemovalPolicy::Destroy,
        }
    }
}
