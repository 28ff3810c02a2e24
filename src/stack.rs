// Copyright (c) 2025 - Cowboy AI, Inc.
//! Environment Stack
//!
//! Composes the builders into one environment, in control-flow order:
//!
//! ```text
//! network → security matrix → bastion → web, app → data tier → outputs
//! ```
//!
//! The result is a complete declaration (graph plus output contract) that an
//! executor can apply or tear down. Assembling a stack never touches a
//! provider.

use std::collections::BTreeMap;

use crate::builders::{
    AllowList, ComputeProvisioner, DataTierProvisioner, DatabaseCluster, NetworkTopology,
    NetworkTopologyBuilder, SecurityPolicyMatrix,
};
use crate::config::{EnvironmentConfig, TopologyVariant};
use crate::domain::{BootPayload, ComputeNode, NodeKind, SecurityTier};
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::events::OrchestrationLog;
use crate::executor::{GraphExecutor, ProvisioningRun};
use crate::exports::OutputContract;
use crate::graph::ResourceGraph;
use crate::provider::{attributes, ResourceProvider};

/// Informational output: public address of the web server
pub const OUTPUT_WEB_SERVER_IP: &str = "Web Server IP Address";
/// Informational output: public DNS name of the web server
pub const OUTPUT_WEB_SERVER_DNS: &str = "Web Server DNS Name";
/// Informational output: public DNS name of the bastion
pub const OUTPUT_BASTION_DNS: &str = "Bastion Host DNS Name";

/// First-boot payloads per node kind
#[derive(Debug, Clone, Default)]
pub struct BootPayloads {
    pub bastion: Option<BootPayload>,
    pub web: Option<BootPayload>,
    pub app: Option<BootPayload>,
}

impl BootPayloads {
    /// Load the payload files named in the configuration
    pub async fn load(config: &EnvironmentConfig) -> ProvisioningResult<Self> {
        async fn read(
            path: Option<&std::path::PathBuf>,
        ) -> ProvisioningResult<Option<BootPayload>> {
            match path {
                Some(path) => BootPayload::from_file(path).await.map(Some).map_err(|e| {
                    ProvisioningError::InvalidConfiguration(format!(
                        "boot payload {}: {e}",
                        path.display()
                    ))
                }),
                None => Ok(None),
            }
        }

        Ok(Self {
            bastion: None,
            web: read(config.compute.web_payload.as_ref()).await?,
            app: read(config.compute.app_payload.as_ref()).await?,
        })
    }

    fn take(&mut self, kind: NodeKind) -> Option<BootPayload> {
        match kind {
            NodeKind::Bastion => self.bastion.take(),
            NodeKind::Web => self.web.take(),
            NodeKind::App => self.app.take(),
        }
    }
}

/// Fully declared environment
#[derive(Debug, Clone)]
pub struct EnvironmentStack {
    config: EnvironmentConfig,
    graph: ResourceGraph,
    outputs: OutputContract,
    network: NetworkTopology,
    matrix: SecurityPolicyMatrix,
    nodes: BTreeMap<NodeKind, ComputeNode>,
    database: DatabaseCluster,
}

impl EnvironmentStack {
    /// Stack name an environment is provisioned as
    pub fn stack_name(config: &EnvironmentConfig) -> String {
        config.scoped("VpcStack")
    }

    /// Declare the whole environment
    pub fn assemble(
        config: EnvironmentConfig,
        mut payloads: BootPayloads,
    ) -> ProvisioningResult<Self> {
        config.validate()?;
        let mut graph = ResourceGraph::new(Self::stack_name(&config));

        let network = NetworkTopologyBuilder::new(&config).build(&mut graph)?;

        let allow_list = AllowList::standard(config.compute.app_port, config.database.port);
        let mut matrix = SecurityPolicyMatrix::new(&config, &network);
        let bastion_sg = matrix.create_group(SecurityTier::Bastion, "Bastion host access")?;
        let web_sg = matrix.create_group(SecurityTier::Web, "Web server access")?;
        let app_sg = matrix.create_group(SecurityTier::App, "Application server access")?;
        let db_sg = matrix.create_group(SecurityTier::Database, "Database cluster access")?;
        for tier in [SecurityTier::Bastion, SecurityTier::Web, SecurityTier::App] {
            matrix.apply_allow_list(&allow_list, tier)?;
        }

        let data = DataTierProvisioner::new(&config);
        let db_grants = vec![
            data.grant_access(&mut matrix, &db_sg, &bastion_sg)?,
            data.grant_access(&mut matrix, &db_sg, &app_sg)?,
        ];

        let violations = matrix.audit(&allow_list);
        if !violations.is_empty() {
            return Err(ProvisioningError::InvalidConfiguration(format!(
                "security matrix deviates from the allow-list: {violations:?}"
            )));
        }
        matrix.declare_into(&mut graph)?;

        let mut compute = ComputeProvisioner::new(&config, &network.network);
        let bastion = compute.provision(
            &mut graph,
            NodeKind::Bastion,
            NodeKind::Bastion.default_tier(),
            &bastion_sg,
            NodeKind::Bastion.default_role(),
            payloads.take(NodeKind::Bastion),
            &[],
        )?;
        let web = compute.provision(
            &mut graph,
            NodeKind::Web,
            NodeKind::Web.default_tier(),
            &web_sg,
            NodeKind::Web.default_role(),
            payloads.take(NodeKind::Web),
            &[&bastion],
        )?;
        let app = compute.provision(
            &mut graph,
            NodeKind::App,
            NodeKind::App.default_tier(),
            &app_sg,
            NodeKind::App.default_role(),
            payloads.take(NodeKind::App),
            &[&bastion],
        )?;

        let database = data.provision(
            &mut graph,
            &network,
            &db_sg,
            config.database.credentials_secret.clone(),
            &config.database_name(),
            &db_grants,
        )?;

        let mut outputs = OutputContract::new(&config.prefix);
        outputs.informational(
            OUTPUT_WEB_SERVER_IP,
            "Public address of the web server",
            &web.id,
            attributes::PUBLIC_IP,
        )?;
        outputs.informational(
            OUTPUT_WEB_SERVER_DNS,
            "Public DNS name of the web server",
            &web.id,
            attributes::PUBLIC_DNS_NAME,
        )?;
        outputs.informational(
            OUTPUT_BASTION_DNS,
            "Public DNS name of the bastion host",
            &bastion.id,
            attributes::PUBLIC_DNS_NAME,
        )?;

        outputs.export(&graph, "vpc-id", &network.network, attributes::ID)?;
        outputs.export(&graph, "db-cluster-id", &database.id, attributes::ID)?;
        outputs.export(
            &graph,
            "db-cluster-endpoint-hostname",
            &database.id,
            attributes::ENDPOINT_HOSTNAME,
        )?;
        outputs.export(
            &graph,
            "db-cluster-endpoint-port",
            &database.id,
            attributes::ENDPOINT_PORT,
        )?;
        outputs.export(
            &graph,
            "db-cluster-securitygroup-id",
            &db_sg.id,
            attributes::ID,
        )?;
        if config.variant == TopologyVariant::SingleTier {
            outputs.export(&graph, "web-server-instance-id", &web.id, attributes::ID)?;
            outputs.export(&graph, "app-server-instance-id", &app.id, attributes::ID)?;
        }

        graph.validate()?;
        tracing::info!(
            "📐 Declared {}: {} resources, {} outputs",
            graph.stack(),
            graph.len(),
            outputs.outputs().len()
        );

        let nodes = [bastion, web, app]
            .into_iter()
            .map(|node| (node.kind, node))
            .collect();

        Ok(Self {
            config,
            graph,
            outputs,
            network,
            matrix,
            nodes,
            database,
        })
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn outputs(&self) -> &OutputContract {
        &self.outputs
    }

    pub fn network(&self) -> &NetworkTopology {
        &self.network
    }

    pub fn matrix(&self) -> &SecurityPolicyMatrix {
        &self.matrix
    }

    pub fn node(&self, kind: NodeKind) -> Option<&ComputeNode> {
        self.nodes.get(&kind)
    }

    pub fn database(&self) -> &DatabaseCluster {
        &self.database
    }

    /// Provision the environment
    pub async fn apply<P: ResourceProvider>(
        &self,
        executor: &GraphExecutor<P>,
    ) -> ProvisioningResult<ProvisioningRun> {
        executor.apply(&self.graph, &self.outputs).await
    }

    /// Tear the environment down in reverse dependency order
    pub async fn teardown<P: ResourceProvider>(
        &self,
        executor: &GraphExecutor<P>,
    ) -> ProvisioningResult<OrchestrationLog> {
        executor.teardown(&self.graph).await
    }
}
