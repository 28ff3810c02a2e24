// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Lifecycle State Machine
//!
//! Tracks one declared resource through a provisioning run and its teardown.
//!
//! # State Machine Type
//!
//! This is a **Mealy Machine**: outputs depend on both state and input.
//!
//! # States
//!
//! - Declared: Part of the graph, no provider call yet
//! - Creating: Provider call in flight
//! - Ready: Provider reported success
//! - Failed: Provider reported failure (left in place, never rolled back)
//! - Destroyed: Removed by teardown (terminal)
//!
//! # Inputs
//!
//! - BeginCreate: Declared → Creating, Failed → Creating (re-run)
//! - CreateSucceeded: Creating → Ready
//! - CreateFailed: Creating → Failed
//! - Destroy: Declared | Ready | Failed → Destroyed
//! - Update: any state → same state

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// Lifecycle state of a declared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Declared,
    Creating,
    Ready,
    Failed,
    Destroyed,
}

impl ResourceState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResourceState::Destroyed)
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lifecycle command (FSM input)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleCommand {
    /// Provider call issued
    BeginCreate,

    /// Provider call returned a resource
    CreateSucceeded,

    /// Provider call returned an error
    CreateFailed,

    /// Resource removed during teardown
    Destroy,

    /// Stay in current state (resource already existed)
    Update,
}

/// Transition output with metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutput {
    /// Warnings generated during transition
    pub warnings: Vec<String>,

    /// Whether this is a critical transition
    pub is_critical: bool,
}

impl TransitionOutput {
    /// Create output with no warnings
    pub fn ok() -> Self {
        Self {
            warnings: Vec::new(),
            is_critical: false,
        }
    }

    /// Create output with warnings
    pub fn with_warnings(warnings: Vec<String>) -> Self {
        Self {
            warnings,
            is_critical: false,
        }
    }

    /// Create output for critical transition
    pub fn critical(warnings: Vec<String>) -> Self {
        Self {
            warnings,
            is_critical: true,
        }
    }
}

impl StateMachine for ResourceState {
    type Input = LifecycleCommand;
    type Output = TransitionOutput;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use LifecycleCommand::*;
        use ResourceState::*;

        match (self, input) {
            (state, Update) => Ok((*state, TransitionOutput::ok())),

            (Declared, BeginCreate) => Ok((Creating, TransitionOutput::ok())),
            (Failed, BeginCreate) => Ok((
                Creating,
                TransitionOutput::with_warnings(vec!["Retrying failed resource".to_string()]),
            )),

            (Creating, CreateSucceeded) => Ok((Ready, TransitionOutput::ok())),
            (Creating, CreateFailed) => Ok((
                Failed,
                TransitionOutput::critical(vec!["Provider call failed".to_string()]),
            )),

            (Ready, Destroy) => Ok((Destroyed, TransitionOutput::ok())),
            (Failed, Destroy) => Ok((
                Destroyed,
                TransitionOutput::with_warnings(vec![
                    "Destroying resource whose creation failed".to_string()
                ]),
            )),
            (Declared, Destroy) => Ok((
                Destroyed,
                TransitionOutput::with_warnings(vec!["Resource was never created".to_string()]),
            )),

            (Creating, Destroy) => Err(TransitionError::PreconditionFailed(
                "Cannot destroy a resource while its creation is in flight".to_string(),
            )),
            (Ready, BeginCreate) => Err(TransitionError::BusinessRuleViolation(
                "Already created".to_string(),
            )),
            (Destroyed, _) => Err(TransitionError::InvalidTransition {
                from: "Destroyed".to_string(),
                to: "any state".to_string(),
            }),
            (from, command) => Err(TransitionError::InvalidTransition {
                from: from.to_string(),
                to: format!("{:?}", command),
            }),
        }
    }

    fn valid_inputs(&self) -> Vec<Self::Input> {
        use LifecycleCommand::*;
        use ResourceState::*;

        match self {
            Declared => vec![BeginCreate, Destroy, Update],
            Creating => vec![CreateSucceeded, CreateFailed, Update],
            Ready => vec![Destroy, Update],
            Failed => vec![BeginCreate, Destroy, Update],
            Destroyed => vec![Update],
        }
    }
}
