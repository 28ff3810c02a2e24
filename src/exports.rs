// Copyright (c) 2025 - Cowboy AI, Inc.
//! Output Contract
//!
//! Values an environment publishes once it is provisioned, in two classes:
//!
//! - **Informational**: shown to the operator (web server address, bastion
//!   DNS name). Keys are free text and never consumed by other stacks.
//! - **Exported**: published under `<prefix>-<name>` for other stacks to
//!   import. Export names are unique per account/region.
//!
//! Every output reads one attribute of one declared resource. Collisions are
//! detected when the export is declared, and again against the provider's
//! registry before the executor creates anything.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::invariants::validate_export_name;
use crate::domain::LogicalId;
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::graph::ResourceGraph;
use crate::provider::{AttributeValue, ProvisionedResource, PublishedExport};

/// One declared output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDeclaration {
    /// Display key (informational) or full export name (exported)
    pub key: String,
    pub description: String,
    /// Set for exported outputs
    pub export_name: Option<String>,
    pub resource: LogicalId,
    pub attribute: String,
}

impl OutputDeclaration {
    pub fn is_exported(&self) -> bool {
        self.export_name.is_some()
    }
}

/// An output with its provisioned value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOutput {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_name: Option<String>,
    pub value: AttributeValue,
}

/// Declared outputs of one environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputContract {
    prefix: String,
    outputs: Vec<OutputDeclaration>,
}

impl OutputContract {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            outputs: Vec::new(),
        }
    }

    /// Declare an operator-facing output
    pub fn informational(
        &mut self,
        key: &str,
        description: &str,
        resource: &LogicalId,
        attribute: &str,
    ) -> ProvisioningResult<()> {
        if self.outputs.iter().any(|o| o.key == key) {
            return Err(ProvisioningError::InvalidConfiguration(format!(
                "output {key} declared twice"
            )));
        }
        self.outputs.push(OutputDeclaration {
            key: key.to_string(),
            description: description.to_string(),
            export_name: None,
            resource: resource.clone(),
            attribute: attribute.to_string(),
        });
        Ok(())
    }

    /// Declare a cross-stack export named `<prefix>-<name>`
    ///
    /// Returns the full export name.
    pub fn export(
        &mut self,
        graph: &ResourceGraph,
        name: &str,
        resource: &LogicalId,
        attribute: &str,
    ) -> ProvisioningResult<String> {
        let export_name = format!("{}-{}", self.prefix, name);
        validate_export_name(&export_name)
            .map_err(|e| ProvisioningError::InvalidConfiguration(e.to_string()))?;

        if !graph.contains(resource) {
            return Err(ProvisioningError::InvalidConfiguration(format!(
                "export {export_name} reads undeclared resource {resource}"
            )));
        }

        if self
            .outputs
            .iter()
            .any(|o| o.export_name.as_deref() == Some(export_name.as_str()))
        {
            return Err(ProvisioningError::ExportCollision {
                name: export_name,
                resource: resource.clone(),
                chain: graph.dependency_chain(resource),
            });
        }

        self.outputs.push(OutputDeclaration {
            key: export_name.clone(),
            description: format!("{name} of {resource}"),
            export_name: Some(export_name.clone()),
            resource: resource.clone(),
            attribute: attribute.to_string(),
        });
        Ok(export_name)
    }

    pub fn outputs(&self) -> &[OutputDeclaration] {
        &self.outputs
    }

    /// Exported outputs only
    pub fn exports(&self) -> impl Iterator<Item = &OutputDeclaration> {
        self.outputs.iter().filter(|o| o.is_exported())
    }

    pub fn export_names(&self) -> Vec<&str> {
        self.exports()
            .filter_map(|o| o.export_name.as_deref())
            .collect()
    }

    /// Read every output from the provisioned resources
    pub fn resolve(
        &self,
        resources: &BTreeMap<LogicalId, ProvisionedResource>,
    ) -> ProvisioningResult<Vec<ResolvedOutput>> {
        self.outputs
            .iter()
            .map(|output| {
                let value = resources
                    .get(&output.resource)
                    .and_then(|r| r.attribute(&output.attribute))
                    .cloned()
                    .ok_or_else(|| {
                        ProvisioningError::InvalidConfiguration(format!(
                            "output {} needs attribute {} of {}, which was not reported",
                            output.key, output.attribute, output.resource
                        ))
                    })?;
                Ok(ResolvedOutput {
                    key: output.key.clone(),
                    export_name: output.export_name.clone(),
                    value,
                })
            })
            .collect()
    }

    /// Exported subset of resolved outputs, ready for publication
    pub fn publishable(resolved: &[ResolvedOutput]) -> Vec<PublishedExport> {
        resolved
            .iter()
            .filter_map(|output| {
                output.export_name.as_ref().map(|name| PublishedExport {
                    name: name.clone(),
                    value: output.value.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CidrBlock, ResourceKind};
    use crate::graph::{Declaration, NetworkSpec};
    use crate::provider::attributes;

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).unwrap()
    }

    fn graph() -> ResourceGraph {
        let mut graph = ResourceGraph::new("dev-VpcStack");
        graph
            .declare(
                id("dev-Vpc"),
                Declaration::Network(NetworkSpec {
                    cidr: CidrBlock::new("10.0.0.0/16").unwrap(),
                    availability_domains: 1,
                    subnets: Vec::new(),
                }),
                &[],
            )
            .unwrap();
        graph
    }

    #[test]
    fn test_export_names_are_prefixed() {
        let graph = graph();
        let mut contract = OutputContract::new("dev");
        let name = contract
            .export(&graph, "vpc-id", &id("dev-Vpc"), attributes::ID)
            .unwrap();
        assert_eq!(name, "dev-vpc-id");
        assert_eq!(contract.export_names(), vec!["dev-vpc-id"]);
    }

    #[test]
    fn test_duplicate_export_collides() {
        let graph = graph();
        let mut contract = OutputContract::new("dev");
        contract
            .export(&graph, "vpc-id", &id("dev-Vpc"), attributes::ID)
            .unwrap();

        let err = contract
            .export(&graph, "vpc-id", &id("dev-Vpc"), attributes::CIDR)
            .unwrap_err();
        match err {
            ProvisioningError::ExportCollision {
                name,
                resource,
                chain,
            } => {
                assert_eq!(name, "dev-vpc-id");
                assert_eq!(resource, id("dev-Vpc"));
                assert_eq!(chain.ids(), &[id("dev-Vpc")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_export_of_undeclared_resource_rejected() {
        let mut contract = OutputContract::new("dev");
        assert!(matches!(
            contract.export(&graph(), "db-cluster-id", &id("dev-Database-Cluster"), attributes::ID),
            Err(ProvisioningError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_resolve_reads_attributes() {
        let graph = graph();
        let mut contract = OutputContract::new("dev");
        contract
            .informational("VPC Block", "Address block", &id("dev-Vpc"), attributes::CIDR)
            .unwrap();
        contract
            .export(&graph, "vpc-id", &id("dev-Vpc"), attributes::ID)
            .unwrap();

        let mut resources = BTreeMap::new();
        resources.insert(
            id("dev-Vpc"),
            ProvisionedResource::new(id("dev-Vpc"), ResourceKind::Network, "vpc-1")
                .with_attribute(attributes::CIDR, AttributeValue::String("10.0.0.0/16".into())),
        );

        let resolved = contract.resolve(&resources).unwrap();
        assert_eq!(resolved.len(), 2);
        let published = OutputContract::publishable(&resolved);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].value, AttributeValue::Identifier("vpc-1".into()));
    }
}
