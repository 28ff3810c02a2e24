// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Generic state machine types shared by the resource lifecycle and the
//! delivery pipeline. Transitions are pure functions: the caller performs
//! side effects only after a transition has been accepted.
//!
//! # Mealy Machines
//!
//! Output depends on both current state and input:
//! ```text
//! (State, Input) → (State, Output)
//! ```
//!
//! Both machines in this crate are Mealy machines:
//!
//! - [`resource_lifecycle::ResourceState`]: one declared resource during a run
//! - [`crate::pipeline::PipelineState`]: one delivery pipeline execution
//!
//! # Example
//!
//! ```rust
//! use layered_stack::state_machine::resource_lifecycle::{LifecycleCommand, ResourceState};
//! use layered_stack::state_machine::StateMachine;
//!
//! let (state, _) = ResourceState::Declared
//!     .transition(&LifecycleCommand::BeginCreate)
//!     .unwrap();
//! assert_eq!(state, ResourceState::Creating);
//!
//! // A resource that never started cannot complete.
//! assert!(!ResourceState::Declared.can_transition(&LifecycleCommand::CreateSucceeded));
//! ```

pub mod resource_lifecycle;

/// Result of a state transition
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Transition from current state to target state is not allowed
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Precondition not met for transition
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Postcondition violated after transition
    #[error("Postcondition violated: {0}")]
    PostconditionViolated(String),

    /// Business rule prevents transition
    #[error("Business rule violated: {0}")]
    BusinessRuleViolation(String),
}

/// Trait for finite state machines
///
/// Implement this trait to define a state machine with typed states,
/// inputs, and outputs.
pub trait StateMachine: Sized + Clone {
    /// Input type that triggers transitions
    type Input;

    /// Output type produced by transitions (use () if none)
    type Output;

    /// Attempt to transition to a new state given an input
    ///
    /// # Returns
    /// - Ok((new_state, output)) if transition is valid
    /// - Err(TransitionError) if transition is invalid
    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Check if a transition is valid without performing it
    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    /// Get all valid inputs from current state (if enumerable)
    fn valid_inputs(&self) -> Vec<Self::Input>
    where
        Self::Input: Clone,
    {
        // Default implementation returns empty vec
        // Override if Input is enumerable
        Vec::new()
    }
}

/// Transition metadata
///
/// Records information about a state transition for auditing.
#[derive(Debug, Clone)]
pub struct Transition<S, I> {
    /// State before transition
    pub from: S,

    /// State after transition
    pub to: S,

    /// Input that triggered transition
    pub input: I,

    /// Timestamp of transition
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<S, I> Transition<S, I> {
    /// Create a new transition record
    pub fn new(from: S, to: S, input: I, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            from,
            to,
            input,
            timestamp,
        }
    }
}

/// State machine with history
///
/// Wraps a state machine and tracks transition history.
#[derive(Debug, Clone)]
pub struct StateMachineWithHistory<FSM: StateMachine> {
    /// Current state
    pub current: FSM,

    /// Transition history
    pub history: Vec<Transition<FSM, FSM::Input>>,
}

impl<FSM: StateMachine> StateMachineWithHistory<FSM> {
    /// Create a new state machine with history tracking
    pub fn new(initial: FSM) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    /// Transition with history recording
    pub fn transition_with_history(
        &mut self,
        input: FSM::Input,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> TransitionResult<FSM::Output>
    where
        FSM::Input: Clone,
    {
        let from = self.current.clone();
        let (to, output) = self.current.transition(&input)?;

        // Record transition
        self.history
            .push(Transition::new(from, to.clone(), input, timestamp));

        self.current = to;
        Ok(output)
    }

    /// Get transition history
    pub fn get_history(&self) -> &[Transition<FSM, FSM::Input>] {
        &self.history
    }

    /// Get current state
    pub fn current_state(&self) -> &FSM {
        &self.current
    }
}
