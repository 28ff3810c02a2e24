// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-Memory Resource Provider
//!
//! Simulates one account/region. It enforces the same failure taxonomy a
//! real provider would surface:
//!
//! - overlapping network blocks → `AllocationConflict`
//! - shapes marked unavailable in a tier → `CapacityUnavailable`
//! - unresolvable credential pointers → `CredentialResolution`
//! - export names owned by another stack → `AllocationConflict`
//!
//! Boot payloads are delivered at most once per instance: re-creating an
//! existing instance returns it unchanged. Private addresses are handed out
//! from the subnet of the instance's tier.
//!
//! Credentials are resolved without holding the provider state, so the
//! calls of one wave overlap.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{
    attributes, AttributeValue, CreateRequest, ProvisionedResource, PublishedExport,
    ResourceProvider,
};
use crate::config::AccountScope;
use crate::domain::{CidrBlock, LogicalId, ResourceKind, SubnetTier};
use crate::errors::ProviderError;
use crate::graph::{Declaration, RuleSource};
use crate::pipeline::{InstanceInventory, InstanceRecord};
use crate::secrets::SecretStore;

type ResourceKey = (String, LogicalId);

/// Leading addresses of every subnet the provider keeps for itself
const RESERVED_HOSTS: u64 = 4;

#[derive(Debug, Clone)]
struct StoredResource {
    resource: ProvisionedResource,
    declaration: Declaration,
}

#[derive(Debug, Default)]
struct ProviderState {
    resources: BTreeMap<ResourceKey, StoredResource>,
    /// Export name → (owning stack, value)
    exports: BTreeMap<String, (String, AttributeValue)>,
    /// Boot payload deliveries per instance
    boot_deliveries: BTreeMap<ResourceKey, u32>,
    /// Next free host offset per subnet
    next_host: BTreeMap<CidrBlock, u64>,
    next_serial: u32,
}

impl ProviderState {
    fn serial(&mut self) -> u32 {
        self.next_serial += 1;
        self.next_serial
    }

    /// Hand out the next private address of the tier's subnet
    fn allocate_host(
        &mut self,
        stack: &str,
        network: &LogicalId,
        tier: SubnetTier,
    ) -> Result<Ipv4Addr, ProviderError> {
        let subnet = self
            .resources
            .get(&(stack.to_string(), network.clone()))
            .and_then(|stored| match &stored.declaration {
                Declaration::Network(spec) => spec.subnets_in(tier).next().map(|s| s.cidr),
                _ => None,
            })
            .ok_or_else(|| ProviderError::NotFound(format!("{network} has no {tier} subnet")))?;

        let next = self.next_host.entry(subnet).or_insert(RESERVED_HOSTS);
        // The last address of a subnet is never assigned.
        let address = subnet
            .host(*next)
            .filter(|_| *next + 1 < subnet.size())
            .ok_or_else(|| {
                ProviderError::CapacityUnavailable(format!("{subnet} has no free addresses"))
            })?;
        *next += 1;
        Ok(address)
    }

    fn networks(&self) -> impl Iterator<Item = (&ResourceKey, CidrBlock)> {
        self.resources
            .iter()
            .filter_map(|(key, stored)| match &stored.declaration {
                Declaration::Network(spec) => Some((key, spec.cidr)),
                _ => None,
            })
    }
}

/// Provider simulating one account/region in memory
#[derive(Clone)]
pub struct InMemoryProvider {
    scope: AccountScope,
    secrets: Arc<dyn SecretStore>,
    unavailable: Arc<HashSet<(String, SubnetTier)>>,
    state: Arc<Mutex<ProviderState>>,
}

impl InMemoryProvider {
    pub fn new(scope: AccountScope, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            scope,
            secrets,
            unavailable: Arc::new(HashSet::new()),
            state: Arc::new(Mutex::new(ProviderState::default())),
        }
    }

    /// Mark a shape as unplaceable in a tier
    pub fn with_unavailable_capacity(mut self, shape: impl Into<String>, tier: SubnetTier) -> Self {
        let mut unavailable = (*self.unavailable).clone();
        unavailable.insert((shape.into(), tier));
        self.unavailable = Arc::new(unavailable);
        self
    }

    pub fn scope(&self) -> &AccountScope {
        &self.scope
    }

    /// Look up a provisioned resource
    pub async fn resource(&self, stack: &str, id: &LogicalId) -> Option<ProvisionedResource> {
        self.state
            .lock()
            .await
            .resources
            .get(&(stack.to_string(), id.clone()))
            .map(|stored| stored.resource.clone())
    }

    /// Number of resources of a kind across all stacks
    pub async fn count_of_kind(&self, kind: ResourceKind) -> usize {
        self.state
            .lock()
            .await
            .resources
            .values()
            .filter(|stored| stored.resource.kind == kind)
            .count()
    }

    /// Number of resources a stack owns
    pub async fn stack_size(&self, stack: &str) -> usize {
        self.state
            .lock()
            .await
            .resources
            .keys()
            .filter(|(owner, _)| owner == stack)
            .count()
    }

    /// How often a boot payload was delivered to an instance
    pub async fn boot_deliveries(&self, stack: &str, id: &LogicalId) -> u32 {
        self.state
            .lock()
            .await
            .boot_deliveries
            .get(&(stack.to_string(), id.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// All exports currently published, by name
    pub async fn exports(&self) -> BTreeMap<String, AttributeValue> {
        self.state
            .lock()
            .await
            .exports
            .iter()
            .map(|(name, (_, value))| (name.clone(), value.clone()))
            .collect()
    }

    fn public_address(serial: u32) -> Ipv4Addr {
        let [_, _, hi, lo] = serial.to_be_bytes();
        Ipv4Addr::new(54, 160, hi, lo)
    }

    fn public_dns_name(&self, address: Ipv4Addr) -> String {
        let dashed = address.to_string().replace('.', "-");
        format!("ec2-{dashed}.{}.compute.amazonaws.com", self.scope.region)
    }

    /// Resolve the credentials a request needs; the value is dropped on return
    async fn check_credentials(&self, request: &CreateRequest) -> Result<(), ProviderError> {
        let Declaration::DatabaseCluster(spec) = &request.declaration else {
            return Ok(());
        };
        request.dependency_id(&spec.network)?;
        request.dependency_id(&spec.security_group)?;
        request.dependency_id(&spec.encryption_key)?;

        let secret = self
            .secrets
            .resolve(&spec.credentials.secret)
            .await
            .map_err(|e| ProviderError::CredentialResolution(e.to_string()))?;
        if secret.expose().is_empty() {
            return Err(ProviderError::CredentialResolution(format!(
                "{} resolved to an empty value",
                spec.credentials.secret
            )));
        }
        Ok(())
    }

    fn materialize(
        &self,
        state: &mut ProviderState,
        request: &CreateRequest,
    ) -> Result<ProvisionedResource, ProviderError> {
        let id = request.logical_id.clone();
        let kind = request.declaration.kind();
        let serial = state.serial();

        let resource = match &request.declaration {
            Declaration::Network(spec) => {
                let key = (request.stack.clone(), id.clone());
                if let Some((owner, existing)) = state
                    .networks()
                    .find(|(other, block)| *other != &key && block.overlaps(&spec.cidr))
                {
                    return Err(ProviderError::AllocationConflict(format!(
                        "{} overlaps {} of {} in {}/{}",
                        spec.cidr, existing, owner.1, self.scope.account, self.scope.region
                    )));
                }
                ProvisionedResource::new(id, kind, format!("vpc-{serial:08x}")).with_attribute(
                    attributes::CIDR,
                    AttributeValue::String(spec.cidr.to_string()),
                )
            }
            Declaration::EgressGateway(spec) => {
                request.dependency_id(&spec.network)?;
                ProvisionedResource::new(id, kind, format!("nat-{serial:08x}"))
            }
            Declaration::FlowLog(spec) => {
                request.dependency_id(&spec.network)?;
                ProvisionedResource::new(id, kind, format!("fl-{serial:08x}"))
            }
            Declaration::SecurityGroup(spec) => {
                request.dependency_id(&spec.network)?;
                ProvisionedResource::new(id, kind, format!("sg-{serial:08x}"))
            }
            Declaration::IngressRule(spec) => {
                request.dependency_id(&spec.group)?;
                if let RuleSource::Group(peer) = &spec.source {
                    request.dependency_id(peer)?;
                }
                ProvisionedResource::new(id, kind, format!("sgr-{serial:08x}"))
            }
            Declaration::Role(_) => ProvisionedResource::new(
                id.clone(),
                kind,
                format!("arn:aws:iam::{}:role/{}", self.scope.account, id),
            ),
            Declaration::Instance(spec) => {
                let node = &spec.node;
                if self
                    .unavailable
                    .contains(&(node.shape.clone(), node.tier))
                {
                    return Err(ProviderError::CapacityUnavailable(format!(
                        "{} cannot be placed in the {} tier",
                        node.shape, node.tier
                    )));
                }
                request.dependency_id(&spec.network)?;
                request.dependency_id(&node.security_group)?;
                request.dependency_id(&node.role_id)?;

                let private_ip = state.allocate_host(&request.stack, &spec.network, node.tier)?;
                let mut resource = ProvisionedResource::new(id, kind, format!("i-{serial:017x}"))
                    .with_attribute(
                        attributes::PRIVATE_IP,
                        AttributeValue::String(private_ip.to_string()),
                    );
                if node.tier.is_internet_reachable() {
                    let public = Self::public_address(serial);
                    resource = resource
                        .with_attribute(
                            attributes::PUBLIC_IP,
                            AttributeValue::String(public.to_string()),
                        )
                        .with_attribute(
                            attributes::PUBLIC_DNS_NAME,
                            AttributeValue::String(self.public_dns_name(public)),
                        );
                }
                if node.boot_payload.is_some() {
                    *state
                        .boot_deliveries
                        .entry((request.stack.clone(), request.logical_id.clone()))
                        .or_insert(0) += 1;
                }
                resource
            }
            Declaration::EncryptionKey(spec) => {
                let key_id = format!("{serial:08x}-0000-4000-8000-000000000000");
                ProvisionedResource::new(id, kind, key_id.clone())
                    .with_attribute(
                        attributes::ARN,
                        AttributeValue::String(format!(
                            "arn:aws:kms:{}:{}:key/{}",
                            self.scope.region, self.scope.account, key_id
                        )),
                    )
                    .with_attribute(attributes::ALIAS, AttributeValue::String(spec.alias.clone()))
            }
            Declaration::DatabaseCluster(spec) => {
                let cluster_id = format!("{}-{serial:04}", id.as_str().to_ascii_lowercase());
                let hostname = format!(
                    "{cluster_id}.cluster-c{serial:08x}.{}.rds.amazonaws.com",
                    self.scope.region
                );
                ProvisionedResource::new(id, kind, cluster_id)
                    .with_attribute(attributes::ENDPOINT_HOSTNAME, AttributeValue::String(hostname))
                    .with_attribute(
                        attributes::ENDPOINT_PORT,
                        AttributeValue::Number(i64::from(spec.port)),
                    )
            }
            Declaration::ArtifactStore(spec) => {
                ProvisionedResource::new(id, kind, spec.arn.clone())
                    .with_attribute(attributes::ARN, AttributeValue::String(spec.arn.clone()))
            }
            Declaration::BuildProject(_)
            | Declaration::DeployApplication(_)
            | Declaration::DeploymentGroup(_)
            | Declaration::Pipeline(_) => {
                for predecessor in request.declaration.references() {
                    request.dependency_id(&predecessor)?;
                }
                ProvisionedResource::new(id.clone(), kind, id.to_string())
            }
        };

        Ok(resource)
    }
}

#[async_trait]
impl ResourceProvider for InMemoryProvider {
    async fn create(&self, request: CreateRequest) -> Result<ProvisionedResource, ProviderError> {
        let key = (request.stack.clone(), request.logical_id.clone());
        if let Some(existing) = self.state.lock().await.resources.get(&key) {
            tracing::debug!(resource = %request.logical_id, "resource already exists");
            return Ok(existing.resource.clone());
        }

        self.check_credentials(&request).await?;

        let mut state = self.state.lock().await;
        if let Some(existing) = state.resources.get(&key) {
            return Ok(existing.resource.clone());
        }
        let resource = self.materialize(&mut state, &request)?;
        state.resources.insert(
            key,
            StoredResource {
                resource: resource.clone(),
                declaration: request.declaration,
            },
        );
        Ok(resource)
    }

    async fn destroy(&self, stack: &str, id: &LogicalId) -> Result<bool, ProviderError> {
        let mut state = self.state.lock().await;
        let key = (stack.to_string(), id.clone());
        state.boot_deliveries.remove(&key);
        Ok(state.resources.remove(&key).is_some())
    }

    async fn export_owner(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .exports
            .get(name)
            .map(|(owner, _)| owner.clone())
    }

    async fn publish_exports(
        &self,
        stack: &str,
        exports: &[PublishedExport],
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;

        // All-or-nothing: check every name before writing any.
        for export in exports {
            if let Some((owner, _)) = state.exports.get(&export.name) {
                if owner != stack {
                    return Err(ProviderError::AllocationConflict(format!(
                        "export {} is owned by {}",
                        export.name, owner
                    )));
                }
            }
        }
        for export in exports {
            state.exports.insert(
                export.name.clone(),
                (stack.to_string(), export.value.clone()),
            );
        }
        Ok(())
    }

    async fn withdraw_exports(&self, stack: &str) -> usize {
        let mut state = self.state.lock().await;
        let before = state.exports.len();
        state.exports.retain(|_, (owner, _)| owner != stack);
        before - state.exports.len()
    }

    async fn import_value(&self, name: &str) -> Option<AttributeValue> {
        self.state
            .lock()
            .await
            .exports
            .get(name)
            .map(|(_, value)| value.clone())
    }
}

#[async_trait]
impl InstanceInventory for InMemoryProvider {
    async fn instances(&self) -> Vec<InstanceRecord> {
        self.state
            .lock()
            .await
            .resources
            .iter()
            .filter_map(|((stack, _), stored)| match &stored.declaration {
                Declaration::Instance(spec) => Some(InstanceRecord {
                    stack: stack.clone(),
                    logical_id: spec.node.id.clone(),
                    physical_id: stored.resource.physical_id.clone(),
                    tags: spec.node.tags.clone(),
                    deployment_agent: spec
                        .node
                        .role
                        .has(crate::domain::Capability::DeploymentAgent),
                }),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NetworkSpec;
    use crate::secrets::InMemorySecretStore;

    fn provider() -> InMemoryProvider {
        InMemoryProvider::new(AccountScope::default(), Arc::new(InMemorySecretStore::new()))
    }

    fn network_request(stack: &str, id: &str, cidr: &str) -> CreateRequest {
        CreateRequest {
            stack: stack.to_string(),
            logical_id: LogicalId::new(id).unwrap(),
            declaration: Declaration::Network(NetworkSpec {
                cidr: CidrBlock::new(cidr).unwrap(),
                availability_domains: 1,
                subnets: Vec::new(),
            }),
            dependencies: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_overlapping_networks_conflict() {
        let provider = provider();
        provider
            .create(network_request("dev-VpcStack", "dev-Vpc", "10.0.0.0/16"))
            .await
            .unwrap();

        let result = provider
            .create(network_request("qa-VpcStack", "qa-Vpc", "10.0.128.0/17"))
            .await;
        assert!(matches!(result, Err(ProviderError::AllocationConflict(_))));

        provider
            .create(network_request("qa-VpcStack", "qa-Vpc", "10.1.0.0/16"))
            .await
            .unwrap();
        assert_eq!(provider.count_of_kind(ResourceKind::Network).await, 2);
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let provider = provider();
        let first = provider
            .create(network_request("dev-VpcStack", "dev-Vpc", "10.0.0.0/16"))
            .await
            .unwrap();
        let second = provider
            .create(network_request("dev-VpcStack", "dev-Vpc", "10.0.0.0/16"))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.stack_size("dev-VpcStack").await, 1);
    }

    #[tokio::test]
    async fn test_export_ownership() {
        let provider = provider();
        let export = PublishedExport {
            name: "dev-vpc-id".to_string(),
            value: AttributeValue::Identifier("vpc-1".to_string()),
        };

        provider
            .publish_exports("dev-VpcStack", std::slice::from_ref(&export))
            .await
            .unwrap();
        assert_eq!(
            provider.export_owner("dev-vpc-id").await.as_deref(),
            Some("dev-VpcStack")
        );
        assert!(provider
            .publish_exports("other-Stack", &[export])
            .await
            .is_err());

        assert_eq!(provider.withdraw_exports("dev-VpcStack").await, 1);
        assert!(provider.import_value("dev-vpc-id").await.is_none());
    }

    #[tokio::test]
    async fn test_destroy_reports_existence() {
        let provider = provider();
        provider
            .create(network_request("dev-VpcStack", "dev-Vpc", "10.0.0.0/16"))
            .await
            .unwrap();
        let id = LogicalId::new("dev-Vpc").unwrap();
        assert!(provider.destroy("dev-VpcStack", &id).await.unwrap());
        assert!(!provider.destroy("dev-VpcStack", &id).await.unwrap());
    }
}
