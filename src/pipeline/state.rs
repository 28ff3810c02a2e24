// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pipeline State Machine
//!
//! One pipeline execution as a Mealy machine. Outputs are [`StageAction`]s:
//! the runner performs the named stage and reports back with the next
//! event. An artifact lives in exactly one place at a time, either in the
//! ready state that produced it or in the action that consumes it.
//!
//! # States
//!
//! ```text
//!           Trigger           SourceCompleted          StartBuild
//! Idle ─────────────→ FetchingSource ─────→ SourceReady ─────→ Building
//!                                                                 │
//!                                                  BuildCompleted │
//!              DeployCompleted          StartDeploy               ↓
//! Succeeded ←──────────────── Deploying ←────────────────── BuildReady
//! ```
//!
//! Any `*Failed` event (or a deploy report with failed nodes) moves to
//! `Halted` in the current stage. `Trigger` from `Idle`, `Halted` or
//! `Succeeded` starts a new execution at Source.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::targets::DeploymentReport;
use super::{BuildArtifact, PushEvent, SourceArtifact, Stage};
use crate::state_machine::{StateMachine, TransitionError, TransitionResult};

/// State of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    FetchingSource { push: PushEvent },
    SourceReady { artifact: SourceArtifact },
    Building { source: SourceArtifact },
    BuildReady { artifact: BuildArtifact },
    Deploying { artifact: BuildArtifact },
    Succeeded { artifact: BuildArtifact },
    Halted { stage: Stage, reason: String },
}

impl PipelineState {
    fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::FetchingSource { .. } => "FetchingSource",
            PipelineState::SourceReady { .. } => "SourceReady",
            PipelineState::Building { .. } => "Building",
            PipelineState::BuildReady { .. } => "BuildReady",
            PipelineState::Deploying { .. } => "Deploying",
            PipelineState::Succeeded { .. } => "Succeeded",
            PipelineState::Halted { .. } => "Halted",
        }
    }

    /// Stage currently holding the execution
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Idle | PipelineState::Succeeded { .. } => None,
            PipelineState::FetchingSource { .. } | PipelineState::SourceReady { .. } => {
                Some(Stage::Source)
            }
            PipelineState::Building { .. } | PipelineState::BuildReady { .. } => {
                Some(Stage::Build)
            }
            PipelineState::Deploying { .. } => Some(Stage::Deploy),
            PipelineState::Halted { stage, .. } => Some(*stage),
        }
    }

    /// No execution is in flight
    pub fn is_at_rest(&self) -> bool {
        matches!(
            self,
            PipelineState::Idle | PipelineState::Succeeded { .. } | PipelineState::Halted { .. }
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Halted { stage, reason } => write!(f, "Halted({stage}: {reason})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Pipeline input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Trigger(PushEvent),
    SourceCompleted(SourceArtifact),
    SourceFailed { reason: String },
    StartBuild,
    BuildCompleted(BuildArtifact),
    BuildFailed { reason: String },
    StartDeploy,
    DeployCompleted(DeploymentReport),
    /// Deploy could not be attempted at all
    DeployFailed { reason: String },
}

/// What the runner must do after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageAction {
    FetchSource(PushEvent),
    Build(SourceArtifact),
    Deploy(BuildArtifact),
    /// Nothing to perform
    Hold,
}

impl StateMachine for PipelineState {
    type Input = PipelineEvent;
    type Output = StageAction;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use PipelineEvent::*;
        use PipelineState::*;

        match (self, input) {
            (Idle | Succeeded { .. } | Halted { .. }, Trigger(push)) => Ok((
                FetchingSource { push: push.clone() },
                StageAction::FetchSource(push.clone()),
            )),
            (_, Trigger(_)) => Err(TransitionError::BusinessRuleViolation(format!(
                "An execution is already in flight ({})",
                self.name()
            ))),

            (FetchingSource { .. }, SourceCompleted(artifact)) => Ok((
                SourceReady {
                    artifact: artifact.clone(),
                },
                StageAction::Hold,
            )),
            (FetchingSource { .. }, SourceFailed { reason }) => Ok((
                Halted {
                    stage: Stage::Source,
                    reason: reason.clone(),
                },
                StageAction::Hold,
            )),

            (SourceReady { artifact }, StartBuild) => Ok((
                Building {
                    source: artifact.clone(),
                },
                StageAction::Build(artifact.clone()),
            )),
            (Building { source }, BuildCompleted(artifact)) => {
                if artifact.source != source.id {
                    return Err(TransitionError::PostconditionViolated(format!(
                        "Build artifact {} was not built from source {}",
                        artifact.id, source.id
                    )));
                }
                Ok((
                    BuildReady {
                        artifact: artifact.clone(),
                    },
                    StageAction::Hold,
                ))
            }
            (Building { .. }, BuildFailed { reason }) => Ok((
                Halted {
                    stage: Stage::Build,
                    reason: reason.clone(),
                },
                StageAction::Hold,
            )),

            (BuildReady { artifact }, StartDeploy) => Ok((
                Deploying {
                    artifact: artifact.clone(),
                },
                StageAction::Deploy(artifact.clone()),
            )),
            (_, StartDeploy) => Err(TransitionError::PreconditionFailed(format!(
                "Deploy requires a completed build, pipeline is {}",
                self.name()
            ))),
            (_, StartBuild) => Err(TransitionError::PreconditionFailed(format!(
                "Build requires a completed source fetch, pipeline is {}",
                self.name()
            ))),

            (Deploying { artifact }, DeployCompleted(report)) => {
                if report.is_success() && !report.targets.is_empty() {
                    Ok((
                        Succeeded {
                            artifact: artifact.clone(),
                        },
                        StageAction::Hold,
                    ))
                } else {
                    Ok((
                        Halted {
                            stage: Stage::Deploy,
                            reason: format!(
                                "{} of {} nodes failed",
                                report.failed().len(),
                                report.targets.len()
                            ),
                        },
                        StageAction::Hold,
                    ))
                }
            }
            (Deploying { .. }, DeployFailed { reason }) => Ok((
                Halted {
                    stage: Stage::Deploy,
                    reason: reason.clone(),
                },
                StageAction::Hold,
            )),

            (from, event) => Err(TransitionError::InvalidTransition {
                from: from.name().to_string(),
                to: format!("{:?}", event),
            }),
        }
    }
}
