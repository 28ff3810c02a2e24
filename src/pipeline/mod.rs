// Copyright (c) 2025 - Cowboy AI, Inc.
//! Delivery Pipeline
//!
//! Moves one change from the source repository to the running compute tier:
//!
//! ```text
//! push ─→ Source ─(source artifact)─→ Build ─(build artifact)─→ Deploy ─→ done
//! ```
//!
//! Each stage hands exactly one artifact to the next. A failed stage halts
//! the execution in that stage; nothing is retried and nothing is rolled
//! back. A new push re-enters at Source.
//!
//! # Invariants
//!
//! - Build never starts without a completed Source fetch
//! - Deploy never starts without a completed Build
//! - One execution is in flight per pipeline; further pushes queue in
//!   arrival order
//! - Deploy targets are resolved by tag when the stage runs

pub mod resources;
pub mod runner;
pub mod state;
pub mod targets;

pub use resources::{PipelineStack, PipelineStackBuilder};
pub use runner::{
    BuildService, DeliveryPipeline, DeploymentAgent, PipelineCollaborators, PipelineExecution,
    SourceProvider,
};
pub use state::{PipelineEvent, PipelineState, StageAction};
pub use targets::{
    DeployStrategy, DeploymentReport, DeploymentTargets, InstanceInventory, InstanceRecord,
    NodeDeployment, NodeOutcome, TagSelector,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::state_machine::TransitionError;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Source,
    Build,
    Deploy,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Change notification from source control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub owner: String,
    pub repository: String,
    pub branch: String,
    /// Commit the push points at
    pub revision: String,
}

impl PushEvent {
    pub fn new(
        owner: impl Into<String>,
        repository: impl Into<String>,
        branch: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repository: repository.into(),
            branch: branch.into(),
            revision: revision.into(),
        }
    }
}

/// Output of the Source stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArtifact {
    pub id: Uuid,
    pub revision: String,
    /// Opaque bundle reference in the artifact store
    pub location: String,
    pub created_at: DateTime<Utc>,
}

impl SourceArtifact {
    pub fn new(revision: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            revision: revision.into(),
            location: location.into(),
            created_at: Utc::now(),
        }
    }
}

/// Output of the Build stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    pub id: Uuid,
    /// Source artifact this was built from
    pub source: Uuid,
    pub revision: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

impl BuildArtifact {
    pub fn from_source(source: &SourceArtifact, location: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.id,
            revision: source.revision.clone(),
            location: location.into(),
            created_at: Utc::now(),
        }
    }
}

/// Pipeline-time errors
///
/// Each stage failure leaves the pipeline halted in that stage until the
/// next push.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("Source fetch failed for {repository}: {reason}")]
    SourceFetchFailure { repository: String, reason: String },

    #[error("Build failed for revision {revision}: {reason}")]
    BuildFailure { revision: String, reason: String },

    #[error("Deploy failed: {}", deploy_summary(.report))]
    DeployFailure { report: DeploymentReport },

    #[error("Pipeline transition rejected: {0}")]
    Transition(#[from] TransitionError),

    /// A queued push was dropped before it ran
    #[error("Execution of revision {revision} ended without a result")]
    Abandoned { revision: String },

    /// Push does not concern the watched branch
    #[error("Ignored push to {owner}/{repository}@{branch}")]
    Ignored {
        owner: String,
        repository: String,
        branch: String,
    },
}

fn deploy_summary(report: &DeploymentReport) -> String {
    if report.targets.is_empty() {
        return format!("no nodes match {}", report.targets.selector);
    }
    let failed: Vec<String> = report
        .results
        .iter()
        .filter_map(|r| match &r.outcome {
            NodeOutcome::Failed { reason } => Some(format!("{} ({reason})", r.node)),
            _ => None,
        })
        .collect();
    format!(
        "{} of {} nodes failed: {}",
        failed.len(),
        report.targets.len(),
        failed.join(", ")
    )
}

impl PipelineError {
    /// Stage the error halts the pipeline in, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::SourceFetchFailure { .. } => Some(Stage::Source),
            PipelineError::BuildFailure { .. } => Some(Stage::Build),
            PipelineError::DeployFailure { .. } => Some(Stage::Deploy),
            PipelineError::Transition(_)
            | PipelineError::Abandoned { .. }
            | PipelineError::Ignored { .. } => None,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LogicalId;

    #[test]
    fn test_build_artifact_tracks_its_source() {
        let source = SourceArtifact::new("abc123", "s3://artifacts/source.zip");
        let build = BuildArtifact::from_source(&source, "s3://artifacts/build.zip");
        assert_eq!(build.source, source.id);
        assert_eq!(build.revision, "abc123");
        assert_ne!(build.id, source.id);
    }

    #[test]
    fn test_deploy_failure_lists_failed_nodes() {
        let selector = TagSelector::new("dev-WebServer-App", "dev");
        let node = |id: &str| InstanceRecord {
            stack: "dev-VpcStack".to_string(),
            logical_id: LogicalId::new(id).unwrap(),
            physical_id: format!("i-{id}"),
            tags: Default::default(),
            deployment_agent: true,
        };
        let report = DeploymentReport {
            strategy: DeployStrategy::AllAtOnce,
            targets: DeploymentTargets {
                selector,
                nodes: vec![node("dev-AppServer-Instance"), node("dev-WebServer-Instance")],
            },
            results: vec![
                NodeDeployment {
                    node: LogicalId::new("dev-AppServer-Instance").unwrap(),
                    outcome: NodeOutcome::Failed {
                        reason: "agent timeout".to_string(),
                    },
                },
                NodeDeployment {
                    node: LogicalId::new("dev-WebServer-Instance").unwrap(),
                    outcome: NodeOutcome::Succeeded,
                },
            ],
        };

        let error = PipelineError::DeployFailure { report };
        assert_eq!(error.stage(), Some(Stage::Deploy));
        assert_eq!(
            error.to_string(),
            "Deploy failed: 1 of 2 nodes failed: dev-AppServer-Instance (agent timeout)"
        );
    }
}
