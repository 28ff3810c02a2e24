// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Pipeline Stage Ordering
//!
//! Arbitrary event sequences are fed to the pipeline state machine; only
//! accepted transitions are applied.

use layered_stack::pipeline::{
    BuildArtifact, DeployStrategy, DeploymentReport, DeploymentTargets, PipelineEvent,
    PipelineState, PushEvent, SourceArtifact, TagSelector,
};
use layered_stack::state_machine::StateMachine;
use proptest::prelude::*;

fn event(kind: u8, source: &SourceArtifact) -> PipelineEvent {
    match kind {
        0 => PipelineEvent::Trigger(PushEvent::new("owner", "repo", "main", "abc")),
        1 => PipelineEvent::SourceCompleted(source.clone()),
        2 => PipelineEvent::SourceFailed {
            reason: "unreachable".to_string(),
        },
        3 => PipelineEvent::StartBuild,
        4 => PipelineEvent::BuildCompleted(BuildArtifact::from_source(source, "app.war")),
        5 => PipelineEvent::BuildFailed {
            reason: "compile".to_string(),
        },
        6 => PipelineEvent::StartDeploy,
        _ => PipelineEvent::DeployCompleted(DeploymentReport {
            strategy: DeployStrategy::OneAtATime,
            targets: DeploymentTargets {
                selector: TagSelector::new("dev-WebServer-App", "dev"),
                nodes: Vec::new(),
            },
            results: Vec::new(),
        }),
    }
}

proptest! {
    /// Build only follows a completed source fetch, deploy only a completed build
    #[test]
    fn prop_stages_never_skip(kinds in prop::collection::vec(0u8..8, 0..40)) {
        let source = SourceArtifact::new("abc", "source.zip");
        let mut state = PipelineState::Idle;

        for kind in kinds {
            let input = event(kind, &source);
            if let Ok((next, _)) = state.transition(&input) {
                match &next {
                    PipelineState::Building { .. } => {
                        prop_assert!(matches!(state, PipelineState::SourceReady { .. }), "expected SourceReady");
                    }
                    PipelineState::Deploying { .. } => {
                        prop_assert!(matches!(state, PipelineState::BuildReady { .. }), "expected BuildReady");
                    }
                    PipelineState::FetchingSource { .. } => {
                        prop_assert!(state.is_at_rest());
                    }
                    _ => {}
                }
                state = next;
            }
        }
    }
}
