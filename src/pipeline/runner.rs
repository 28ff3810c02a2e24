// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pipeline Runner
//!
//! Drives [`PipelineState`] against the external collaborators: source
//! control, the build service, and the deployment agent on each node.
//! Pushes are queued and executed one at a time; the state machine lock is
//! held for the whole execution so triggers never interleave.
//!
//! The repository token is resolved from the secret store right before the
//! fetch and dropped when the fetch returns.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::state::{PipelineEvent, PipelineState, StageAction};
use super::targets::{
    DeployStrategy, DeploymentReport, DeploymentTargets, InstanceInventory, InstanceRecord,
    NodeDeployment, NodeOutcome, TagSelector,
};
use super::{BuildArtifact, PipelineError, PipelineResult, PushEvent, SourceArtifact};
use crate::config::{EnvironmentConfig, RepositoryConfig};
use crate::secrets::{ResolvedSecret, SecretStore};
use crate::state_machine::{StateMachineWithHistory, Transition};

/// Source control collaborator
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetch `revision` and return the location of the source bundle
    async fn fetch(
        &self,
        repository: &RepositoryConfig,
        revision: &str,
        token: &ResolvedSecret,
    ) -> anyhow::Result<String>;
}

/// Build service collaborator
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Build the source bundle and return the location of the build output
    async fn build(&self, build_image: &str, source: &SourceArtifact) -> anyhow::Result<String>;
}

/// Deployment agent collaborator
#[async_trait]
pub trait DeploymentAgent: Send + Sync {
    /// Install the build artifact on one node
    async fn deploy(&self, node: &InstanceRecord, artifact: &BuildArtifact) -> anyhow::Result<()>;
}

/// External services a pipeline talks to
#[derive(Clone)]
pub struct PipelineCollaborators {
    pub secrets: Arc<dyn SecretStore>,
    pub source: Arc<dyn SourceProvider>,
    pub build: Arc<dyn BuildService>,
    pub agent: Arc<dyn DeploymentAgent>,
    pub inventory: Arc<dyn InstanceInventory>,
}

/// Completed execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub execution_id: Uuid,
    pub push: PushEvent,
    pub source: SourceArtifact,
    pub build: BuildArtifact,
    pub report: DeploymentReport,
}

type Outcome = PipelineResult<PipelineExecution>;

/// A push waiting for its execution, with the caller awaiting its outcome
struct QueuedPush {
    push: PushEvent,
    waiter: Option<oneshot::Sender<Outcome>>,
}

/// Source → Build → Deploy pipeline of one environment
pub struct DeliveryPipeline {
    name: String,
    repository: RepositoryConfig,
    build_image: String,
    strategy: DeployStrategy,
    selector: TagSelector,
    collaborators: PipelineCollaborators,
    queue: Mutex<VecDeque<QueuedPush>>,
    machine: Mutex<StateMachineWithHistory<PipelineState>>,
}

impl DeliveryPipeline {
    pub fn new(config: &EnvironmentConfig, collaborators: PipelineCollaborators) -> Self {
        Self {
            name: config.scoped("WebAppPipeline"),
            repository: config.pipeline.repository.clone(),
            build_image: config.pipeline.build_image.clone(),
            strategy: config.pipeline.deploy_strategy,
            selector: TagSelector::from_config(&config.deployment),
            collaborators,
            queue: Mutex::new(VecDeque::new()),
            machine: Mutex::new(StateMachineWithHistory::new(PipelineState::Idle)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selector(&self) -> &TagSelector {
        &self.selector
    }

    /// Check that a push concerns the watched repository and branch
    pub fn accepts(&self, push: &PushEvent) -> bool {
        push.owner == self.repository.owner
            && push.repository == self.repository.name
            && push.branch == self.repository.branch
    }

    /// Queue a push, returning its position in the queue
    pub async fn enqueue(&self, push: PushEvent) -> PipelineResult<usize> {
        self.admit(push, None).await
    }

    async fn admit(
        &self,
        push: PushEvent,
        waiter: Option<oneshot::Sender<Outcome>>,
    ) -> PipelineResult<usize> {
        if !self.accepts(&push) {
            tracing::debug!(
                pipeline = %self.name,
                branch = %push.branch,
                "ignoring push outside the watched branch"
            );
            return Err(PipelineError::Ignored {
                owner: push.owner,
                repository: push.repository,
                branch: push.branch,
            });
        }
        let mut queue = self.queue.lock().await;
        queue.push_back(QueuedPush { push, waiter });
        Ok(queue.len())
    }

    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Queue a push and return the outcome of its own execution
    ///
    /// Pushes queued ahead of it run first, in arrival order.
    pub async fn handle_push(&self, push: PushEvent) -> PipelineResult<PipelineExecution> {
        let revision = push.revision.clone();
        let (waiter, mut outcome) = oneshot::channel();
        self.admit(push, Some(waiter)).await?;

        loop {
            let mut machine = self.machine.lock().await;
            // Outcomes are sent while the machine lock is held, so this push
            // is either still queued or already answered.
            match outcome.try_recv() {
                Ok(result) => return result,
                Err(TryRecvError::Closed) => return Err(PipelineError::Abandoned { revision }),
                Err(TryRecvError::Empty) => {}
            }
            let Some(next) = self.queue.lock().await.pop_front() else {
                return Err(PipelineError::Abandoned { revision });
            };
            self.run_queued(&mut machine, next).await;
        }
    }

    /// Run every queued execution in arrival order
    pub async fn drain(&self) -> Vec<PipelineResult<PipelineExecution>> {
        let mut results = Vec::new();
        while let Some(result) = self.run_next().await {
            results.push(result);
        }
        results
    }

    /// Run the oldest queued push, if any
    ///
    /// A caller waiting in [`Self::handle_push`] for that push receives the
    /// outcome as well.
    pub async fn run_next(&self) -> Option<PipelineResult<PipelineExecution>> {
        let mut machine = self.machine.lock().await;
        let next = self.queue.lock().await.pop_front()?;
        Some(self.run_queued(&mut machine, next).await)
    }

    async fn run_queued(
        &self,
        machine: &mut StateMachineWithHistory<PipelineState>,
        queued: QueuedPush,
    ) -> Outcome {
        let result = self.execute(machine, queued.push).await;
        if let Some(waiter) = queued.waiter {
            if waiter.send(result.clone()).is_err() {
                tracing::debug!(pipeline = %self.name, "caller stopped waiting for its push");
            }
        }
        result
    }

    pub async fn state(&self) -> PipelineState {
        self.machine.lock().await.current_state().clone()
    }

    pub async fn history(&self) -> Vec<Transition<PipelineState, PipelineEvent>> {
        self.machine.lock().await.get_history().to_vec()
    }

    async fn execute(
        &self,
        machine: &mut StateMachineWithHistory<PipelineState>,
        push: PushEvent,
    ) -> PipelineResult<PipelineExecution> {
        let execution_id = Uuid::now_v7();
        tracing::info!(
            "🚀 {} execution {} for {}@{}",
            self.name,
            execution_id,
            push.branch,
            push.revision
        );

        step(machine, PipelineEvent::Trigger(push.clone()))?;

        let source = match self.fetch_source(&push).await {
            Ok(source) => source,
            Err(e) => {
                self.halt(machine, PipelineEvent::SourceFailed { reason: e.to_string() })?;
                return Err(e);
            }
        };
        step(machine, PipelineEvent::SourceCompleted(source))?;

        let source = match step(machine, PipelineEvent::StartBuild)? {
            StageAction::Build(source) => source,
            other => return Err(unexpected_action(other)),
        };
        let build = match self.build(&source).await {
            Ok(build) => build,
            Err(e) => {
                self.halt(machine, PipelineEvent::BuildFailed { reason: e.to_string() })?;
                return Err(e);
            }
        };
        step(machine, PipelineEvent::BuildCompleted(build))?;

        let build = match step(machine, PipelineEvent::StartDeploy)? {
            StageAction::Deploy(artifact) => artifact,
            other => return Err(unexpected_action(other)),
        };
        let report = self.deploy(&build).await;
        step(machine, PipelineEvent::DeployCompleted(report.clone()))?;

        if !report.is_success() || report.targets.is_empty() {
            tracing::error!(
                pipeline = %self.name,
                failed = report.failed().len(),
                skipped = report.skipped().len(),
                "deploy stage halted"
            );
            return Err(PipelineError::DeployFailure { report });
        }

        tracing::info!(
            "✅ {} deployed {} to {} nodes",
            self.name,
            build.revision,
            report.succeeded().len()
        );

        Ok(PipelineExecution {
            execution_id,
            push,
            source,
            build,
            report,
        })
    }

    fn halt(
        &self,
        machine: &mut StateMachineWithHistory<PipelineState>,
        event: PipelineEvent,
    ) -> PipelineResult<()> {
        step(machine, event)?;
        tracing::error!(pipeline = %self.name, state = %machine.current_state(), "pipeline halted");
        Ok(())
    }

    async fn fetch_source(&self, push: &PushEvent) -> PipelineResult<SourceArtifact> {
        let repository = format!("{}/{}", self.repository.owner, self.repository.name);
        let failure = |reason: String| PipelineError::SourceFetchFailure {
            repository: repository.clone(),
            reason,
        };

        let token = self
            .collaborators
            .secrets
            .resolve(&self.repository.token_secret)
            .await
            .map_err(|e| failure(e.to_string()))?;
        if token.expose().is_empty() {
            return Err(failure(format!(
                "access token {} is empty",
                self.repository.token_secret
            )));
        }

        let location = self
            .collaborators
            .source
            .fetch(&self.repository, &push.revision, &token)
            .await
            .map_err(|e| failure(format!("{e:#}")))?;
        drop(token);

        tracing::info!(stage = "source", revision = %push.revision, "📥 Fetched source");
        Ok(SourceArtifact::new(&push.revision, location))
    }

    async fn build(&self, source: &SourceArtifact) -> PipelineResult<BuildArtifact> {
        let location = self
            .collaborators
            .build
            .build(&self.build_image, source)
            .await
            .map_err(|e| PipelineError::BuildFailure {
                revision: source.revision.clone(),
                reason: format!("{e:#}"),
            })?;

        tracing::info!(stage = "build", revision = %source.revision, "🔨 Built artifact");
        Ok(BuildArtifact::from_source(source, location))
    }

    async fn deploy(&self, artifact: &BuildArtifact) -> DeploymentReport {
        let targets =
            DeploymentTargets::resolve(self.collaborators.inventory.as_ref(), &self.selector)
                .await;
        tracing::info!(
            stage = "deploy",
            selector = %self.selector,
            targets = ?targets.logical_ids(),
            "📦 Resolved deployment targets"
        );

        let results = match self.strategy {
            DeployStrategy::OneAtATime => {
                let mut results = Vec::with_capacity(targets.len());
                let mut halted = false;
                for node in &targets.nodes {
                    let outcome = if halted {
                        NodeOutcome::Skipped
                    } else {
                        self.deploy_node(node, artifact).await
                    };
                    if matches!(outcome, NodeOutcome::Failed { .. }) {
                        halted = true;
                    }
                    results.push(NodeDeployment {
                        node: node.logical_id.clone(),
                        outcome,
                    });
                }
                results
            }
            DeployStrategy::AllAtOnce => {
                let outcomes = futures::future::join_all(
                    targets
                        .nodes
                        .iter()
                        .map(|node| self.deploy_node(node, artifact)),
                )
                .await;
                targets
                    .nodes
                    .iter()
                    .zip(outcomes)
                    .map(|(node, outcome)| NodeDeployment {
                        node: node.logical_id.clone(),
                        outcome,
                    })
                    .collect()
            }
        };

        DeploymentReport {
            strategy: self.strategy,
            targets,
            results,
        }
    }

    async fn deploy_node(&self, node: &InstanceRecord, artifact: &BuildArtifact) -> NodeOutcome {
        if !node.deployment_agent {
            return NodeOutcome::Failed {
                reason: "no deployment agent installed".to_string(),
            };
        }
        match self.collaborators.agent.deploy(node, artifact).await {
            Ok(()) => {
                tracing::debug!(node = %node.logical_id, "deployed");
                NodeOutcome::Succeeded
            }
            Err(e) => {
                tracing::warn!(node = %node.logical_id, error = %e, "deployment failed");
                NodeOutcome::Failed {
                    reason: format!("{e:#}"),
                }
            }
        }
    }
}

fn step(
    machine: &mut StateMachineWithHistory<PipelineState>,
    event: PipelineEvent,
) -> PipelineResult<StageAction> {
    Ok(machine.transition_with_history(event, Utc::now())?)
}

fn unexpected_action(action: StageAction) -> PipelineError {
    PipelineError::Transition(crate::state_machine::TransitionError::PostconditionViolated(
        format!("unexpected stage action {action:?}"),
    ))
}
