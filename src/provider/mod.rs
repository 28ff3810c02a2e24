// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Provider Port
//!
//! The executor never talks to a cloud API directly. It hands one
//! [`CreateRequest`] per resource to a [`ResourceProvider`] and gets back a
//! [`ProvisionedResource`] carrying the attributes later resources and
//! outputs resolve against.
//!
//! Providers are expected to be idempotent per `(stack, logical id)`:
//! creating the same resource twice returns the existing one.

pub mod memory;

pub use memory::InMemoryProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::{LogicalId, ResourceKind};
use crate::errors::ProviderError;
use crate::graph::Declaration;

/// Attribute keys reported by providers
pub mod attributes {
    /// Provider-assigned identifier
    pub const ID: &str = "id";
    pub const ARN: &str = "arn";
    pub const CIDR: &str = "cidr";
    pub const PRIVATE_IP: &str = "private_ip";
    pub const PUBLIC_IP: &str = "public_ip";
    pub const PUBLIC_DNS_NAME: &str = "public_dns_name";
    pub const ENDPOINT_HOSTNAME: &str = "endpoint_hostname";
    pub const ENDPOINT_PORT: &str = "endpoint_port";
    pub const ALIAS: &str = "alias";
}

/// Typed attribute or output value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    String(String),
    Number(i64),
    /// Provider-assigned identifier of another resource
    Identifier(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) | AttributeValue::Identifier(s) => f.write_str(s),
            AttributeValue::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A resource as it exists at the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedResource {
    pub logical_id: LogicalId,
    pub kind: ResourceKind,
    pub physical_id: String,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl ProvisionedResource {
    pub fn new(logical_id: LogicalId, kind: ResourceKind, physical_id: impl Into<String>) -> Self {
        let physical_id = physical_id.into();
        let mut attrs = BTreeMap::new();
        attrs.insert(
            attributes::ID.to_string(),
            AttributeValue::Identifier(physical_id.clone()),
        );
        Self {
            logical_id,
            kind,
            physical_id,
            attributes: attrs,
        }
    }

    pub fn with_attribute(mut self, key: &str, value: AttributeValue) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

/// One creation call
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub stack: String,
    pub logical_id: LogicalId,
    pub declaration: Declaration,
    /// Already provisioned predecessors, keyed by logical id
    pub dependencies: BTreeMap<LogicalId, ProvisionedResource>,
}

impl CreateRequest {
    /// Physical id of a provisioned predecessor
    pub fn dependency_id(&self, id: &LogicalId) -> Result<&str, ProviderError> {
        self.dependencies
            .get(id)
            .map(|r| r.physical_id.as_str())
            .ok_or_else(|| {
                ProviderError::NotFound(format!("{} requires {} to exist", self.logical_id, id))
            })
    }
}

/// A value published under a cross-stack export name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedExport {
    pub name: String,
    pub value: AttributeValue,
}

/// External resource provider
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Create (or return the already existing) resource
    async fn create(&self, request: CreateRequest) -> Result<ProvisionedResource, ProviderError>;

    /// Destroy a resource; returns whether it existed
    async fn destroy(&self, stack: &str, id: &LogicalId) -> Result<bool, ProviderError>;

    /// Stack that currently owns an export name, if any
    async fn export_owner(&self, name: &str) -> Option<String>;

    /// Publish a stack's exports; fails if another stack owns a name
    async fn publish_exports(
        &self,
        stack: &str,
        exports: &[PublishedExport],
    ) -> Result<(), ProviderError>;

    /// Withdraw every export owned by a stack; returns how many were removed
    async fn withdraw_exports(&self, stack: &str) -> usize;

    /// Read a published export
    async fn import_value(&self, name: &str) -> Option<AttributeValue>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisioned_resource_carries_id_attribute() {
        let resource = ProvisionedResource::new(
            LogicalId::new("dev-Vpc").unwrap(),
            ResourceKind::Network,
            "vpc-00000001",
        )
        .with_attribute(attributes::CIDR, AttributeValue::String("10.0.0.0/16".into()));

        assert_eq!(
            resource.attribute(attributes::ID),
            Some(&AttributeValue::Identifier("vpc-00000001".to_string()))
        );
        assert_eq!(
            resource.attribute(attributes::CIDR).map(ToString::to_string),
            Some("10.0.0.0/16".to_string())
        );
    }

    #[test]
    fn test_missing_dependency_is_not_found() {
        let request = CreateRequest {
            stack: "dev-VpcStack".to_string(),
            logical_id: LogicalId::new("dev-Bastion-Host").unwrap(),
            declaration: Declaration::BuildProject(crate::graph::BuildProjectSpec {
                build_image: "standard".to_string(),
            }),
            dependencies: BTreeMap::new(),
        };
        let missing = LogicalId::new("dev-Vpc").unwrap();
        assert!(matches!(
            request.dependency_id(&missing),
            Err(ProviderError::NotFound(_))
        ));
    }
}
