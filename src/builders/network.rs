// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Topology Builder
//!
//! Declares the environment's network: one address block carved into public,
//! private-with-egress, and isolated subnets in every availability domain,
//! a single egress gateway in the public tier serving the private tier, and
//! an optional network-wide traffic log.

use crate::config::EnvironmentConfig;
use crate::domain::{LogicalId, SubnetTier};
use crate::errors::ProvisioningResult;
use crate::graph::{
    Declaration, EgressGatewaySpec, FlowLogSpec, NetworkSpec, ResourceGraph, SubnetSpec,
};

/// Declared network and its companions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkTopology {
    pub network: LogicalId,
    pub egress_gateway: LogicalId,
    pub flow_log: Option<LogicalId>,
    pub spec: NetworkSpec,
}

impl NetworkTopology {
    /// Subnets of one tier, ordered by availability domain
    pub fn subnets(&self, tier: SubnetTier) -> Vec<&SubnetSpec> {
        self.spec.subnets_in(tier).collect()
    }
}

/// Builds the network layer of an environment
pub struct NetworkTopologyBuilder<'a> {
    config: &'a EnvironmentConfig,
}

impl<'a> NetworkTopologyBuilder<'a> {
    pub fn new(config: &'a EnvironmentConfig) -> Self {
        Self { config }
    }

    /// Subnet layout: tier by tier, one subnet per availability domain
    pub fn layout(&self) -> ProvisioningResult<NetworkSpec> {
        let network = &self.config.network;
        let blocks = network.cidr.carve(&self.config.subnet_masks()).map_err(|e| {
            crate::errors::ProvisioningError::InvalidConfiguration(e.to_string())
        })?;

        let domains = usize::from(network.availability_domains);
        let subnets = SubnetTier::ALL
            .iter()
            .flat_map(|tier| (0..domains).map(move |domain| (*tier, domain)))
            .zip(blocks)
            .map(|((tier, domain), cidr)| SubnetSpec {
                tier,
                availability_domain: domain as u8,
                cidr,
            })
            .collect();

        Ok(NetworkSpec {
            cidr: network.cidr,
            availability_domains: network.availability_domains,
            subnets,
        })
    }

    /// Declare the network, its egress gateway and flow log
    pub fn build(&self, graph: &mut ResourceGraph) -> ProvisioningResult<NetworkTopology> {
        let spec = self.layout()?;
        let network = LogicalId::new(self.config.scoped("Vpc"))?;

        graph.declare(network.clone(), Declaration::Network(spec.clone()), &[])?;

        let egress_gateway = network.child("EgressGateway")?;
        graph.declare(
            egress_gateway.clone(),
            Declaration::EgressGateway(EgressGatewaySpec {
                network: network.clone(),
                placement: SubnetTier::Public,
                serves: SubnetTier::PrivateWithEgress,
            }),
            &[],
        )?;

        let flow_log = if self.config.network.flow_logs {
            let id = LogicalId::new(self.config.scoped("VpcFlowLog"))?;
            graph.declare(
                id.clone(),
                Declaration::FlowLog(FlowLogSpec {
                    network: network.clone(),
                    destination: "cloud-watch-logs".to_string(),
                }),
                &[],
            )?;
            Some(id)
        } else {
            None
        };

        tracing::debug!(
            network = %network,
            cidr = %spec.cidr,
            subnets = spec.subnets.len(),
            "declared network topology"
        );

        Ok(NetworkTopology {
            network,
            egress_gateway,
            flow_log,
            spec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reference_layout() {
        let config = EnvironmentConfig::new("dev");
        let mut graph = ResourceGraph::new("dev-VpcStack");
        let topology = NetworkTopologyBuilder::new(&config).build(&mut graph).unwrap();

        let public: Vec<String> = topology
            .subnets(SubnetTier::Public)
            .iter()
            .map(|s| s.cidr.to_string())
            .collect();
        assert_eq!(public, vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24"]);

        let isolated: Vec<String> = topology
            .subnets(SubnetTier::PrivateIsolated)
            .iter()
            .map(|s| s.cidr.to_string())
            .collect();
        assert_eq!(isolated, vec!["10.0.6.0/28", "10.0.6.16/28", "10.0.6.32/28"]);

        assert_eq!(topology.network.as_str(), "dev-Vpc");
        assert_eq!(
            topology.flow_log.as_ref().map(LogicalId::as_str),
            Some("dev-VpcFlowLog")
        );
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_every_tier_spans_every_domain() {
        let config = EnvironmentConfig::new("dev");
        let spec = NetworkTopologyBuilder::new(&config).layout().unwrap();

        for tier in SubnetTier::ALL {
            let domains: Vec<u8> = spec.subnets_in(tier).map(|s| s.availability_domain).collect();
            assert_eq!(domains, vec![0, 1, 2]);
        }
    }

    #[test]
    fn test_flow_log_optional() {
        let mut config = EnvironmentConfig::new("dev");
        config.network.flow_logs = false;
        let mut graph = ResourceGraph::new("dev-VpcStack");
        let topology = NetworkTopologyBuilder::new(&config).build(&mut graph).unwrap();
        assert!(topology.flow_log.is_none());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_egress_gateway_depends_on_network() {
        let config = EnvironmentConfig::new("dev");
        let mut graph = ResourceGraph::new("dev-VpcStack");
        let topology = NetworkTopologyBuilder::new(&config).build(&mut graph).unwrap();
        assert_eq!(
            graph.predecessors(&topology.egress_gateway),
            vec![topology.network.clone()]
        );
    }
}
