// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pipeline Stack
//!
//! The pipeline's own resources, declared as a separate stack next to the
//! environment: the imported artifact store, the build project, the deploy
//! application with its tag-selected deployment group, and the pipeline
//! wiring them together.

use crate::config::EnvironmentConfig;
use crate::domain::LogicalId;
use crate::errors::ProvisioningResult;
use crate::events::OrchestrationLog;
use crate::executor::{GraphExecutor, ProvisioningRun};
use crate::exports::OutputContract;
use crate::graph::{
    ArtifactStoreSpec, BuildProjectSpec, Declaration, DeployApplicationSpec, DeploymentGroupSpec,
    PipelineSpec, ResourceGraph,
};
use crate::provider::{attributes, ResourceProvider};

use super::targets::TagSelector;

/// Informational output: name of the delivery pipeline
pub const OUTPUT_PIPELINE_NAME: &str = "Pipeline Name";

/// Declared pipeline stack
#[derive(Debug, Clone)]
pub struct PipelineStack {
    graph: ResourceGraph,
    outputs: OutputContract,
    pipeline: LogicalId,
    deployment_group: LogicalId,
}

/// Declares the pipeline stack of an environment
pub struct PipelineStackBuilder<'a> {
    config: &'a EnvironmentConfig,
}

impl<'a> PipelineStackBuilder<'a> {
    pub fn new(config: &'a EnvironmentConfig) -> Self {
        Self { config }
    }

    /// Stack name the pipeline is provisioned as
    pub fn stack_name(&self) -> String {
        self.config.scoped("PipelineStack")
    }

    pub fn build(self) -> ProvisioningResult<PipelineStack> {
        self.config.validate()?;
        let config = self.config;
        let mut graph = ResourceGraph::new(self.stack_name());

        let store = LogicalId::new(config.scoped("ArtifactBucket"))?;
        graph.declare(
            store.clone(),
            Declaration::ArtifactStore(ArtifactStoreSpec {
                arn: config.pipeline.artifact_store.clone(),
            }),
            &[],
        )?;

        let project = LogicalId::new(config.scoped("JavaBuildProject"))?;
        graph.declare(
            project.clone(),
            Declaration::BuildProject(BuildProjectSpec {
                build_image: config.pipeline.build_image.clone(),
            }),
            &[],
        )?;

        let application = LogicalId::new(config.scoped("WebApp"))?;
        graph.declare(
            application.clone(),
            Declaration::DeployApplication(DeployApplicationSpec {
                application_name: application.to_string(),
            }),
            &[],
        )?;

        let deployment_group = LogicalId::new(config.scoped("ServerDeploymentGroup"))?;
        graph.declare(
            deployment_group.clone(),
            Declaration::DeploymentGroup(DeploymentGroupSpec {
                application: application.clone(),
                group_name: deployment_group.to_string(),
                install_agent: true,
                selector: TagSelector::from_config(&config.deployment),
                strategy: config.pipeline.deploy_strategy,
            }),
            &[],
        )?;

        let pipeline = LogicalId::new(config.scoped("WebAppPipeline"))?;
        graph.declare(
            pipeline.clone(),
            Declaration::Pipeline(PipelineSpec {
                pipeline_name: pipeline.to_string(),
                artifact_store: store,
                repository: config.pipeline.repository.clone(),
                build_project: project,
                deployment_group: deployment_group.clone(),
            }),
            &[],
        )?;

        let mut outputs = OutputContract::new(&config.prefix);
        outputs.informational(
            OUTPUT_PIPELINE_NAME,
            "Name of the delivery pipeline",
            &pipeline,
            attributes::ID,
        )?;

        graph.validate()?;
        tracing::info!("📐 Declared {}: {} resources", graph.stack(), graph.len());

        Ok(PipelineStack {
            graph,
            outputs,
            pipeline,
            deployment_group,
        })
    }
}

impl PipelineStack {
    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn pipeline(&self) -> &LogicalId {
        &self.pipeline
    }

    pub fn deployment_group(&self) -> &LogicalId {
        &self.deployment_group
    }

    pub async fn apply<P: ResourceProvider>(
        &self,
        executor: &GraphExecutor<P>,
    ) -> ProvisioningResult<ProvisioningRun> {
        executor.apply(&self.graph, &self.outputs).await
    }

    pub async fn teardown<P: ResourceProvider>(
        &self,
        executor: &GraphExecutor<P>,
    ) -> ProvisioningResult<OrchestrationLog> {
        executor.teardown(&self.graph).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceKind;

    #[test]
    fn test_pipeline_stack_resources() {
        let config = EnvironmentConfig::new("dev");
        let stack = PipelineStackBuilder::new(&config).build().unwrap();
        let graph = stack.graph();

        assert_eq!(graph.stack(), "dev-PipelineStack");
        assert_eq!(graph.len(), 5);
        assert_eq!(stack.pipeline().as_str(), "dev-WebAppPipeline");
        assert_eq!(graph.of_kind(ResourceKind::BuildProject).count(), 1);

        let waves = graph.waves().unwrap();
        assert!(waves.last().unwrap().contains(stack.pipeline()));
    }

    #[test]
    fn test_deployment_group_selects_by_environment_tags() {
        let config = EnvironmentConfig::new("dev");
        let stack = PipelineStackBuilder::new(&config).build().unwrap();

        match &stack.graph().get(stack.deployment_group()).unwrap().declaration {
            Declaration::DeploymentGroup(spec) => {
                assert!(spec.install_agent);
                assert_eq!(spec.selector, TagSelector::new("dev-WebServer-App", "dev"));
                assert_eq!(spec.group_name, "dev-ServerDeploymentGroup");
            }
            other => panic!("unexpected declaration: {other:?}"),
        }
    }
}
