// Copyright (c) 2025 - Cowboy AI, Inc.
//! Orchestration Events
//!
//! Append-only record of one provisioning (or teardown) run. Every provider
//! call produces a `Started` event before the call and exactly one terminal
//! event after it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{LogicalId, ResourceKind};

/// Phase of a resource within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ResourcePhase {
    Started,
    Completed,
    Failed { reason: String },
    Destroyed,
    /// Teardown left the resource in place under its removal policy
    Retained,
    /// Teardown found nothing to remove
    Absent,
}

impl ResourcePhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResourcePhase::Started)
    }
}

/// One entry of the orchestration log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationEvent {
    /// Position in the run, starting at 1
    pub sequence: u64,
    pub event_id: Uuid,
    /// Run the event belongs to
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub stack: String,
    pub resource: LogicalId,
    pub kind: ResourceKind,
    #[serde(flatten)]
    pub phase: ResourcePhase,
}

/// Ordered event log of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationLog {
    run_id: Uuid,
    stack: String,
    events: Vec<OrchestrationEvent>,
}

impl OrchestrationLog {
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            stack: stack.into(),
            events: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Append an event
    pub fn record(&mut self, resource: &LogicalId, kind: ResourceKind, phase: ResourcePhase) {
        let event = OrchestrationEvent {
            sequence: self.events.len() as u64 + 1,
            event_id: Uuid::now_v7(),
            run_id: self.run_id,
            timestamp: Utc::now(),
            stack: self.stack.clone(),
            resource: resource.clone(),
            kind,
            phase,
        };
        self.events.push(event);
    }

    pub fn events(&self) -> &[OrchestrationEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events of one resource in log order
    pub fn for_resource<'a>(
        &'a self,
        resource: &'a LogicalId,
    ) -> impl Iterator<Item = &'a OrchestrationEvent> + 'a {
        self.events.iter().filter(move |e| &e.resource == resource)
    }

    /// Sequence number of the first event matching a resource and phase
    pub fn sequence_of(&self, resource: &LogicalId, phase: &ResourcePhase) -> Option<u64> {
        self.for_resource(resource)
            .find(|e| &e.phase == phase)
            .map(|e| e.sequence)
    }

    /// True if `first` completed before `second` started
    pub fn completed_before(&self, first: &LogicalId, second: &LogicalId) -> bool {
        match (
            self.sequence_of(first, &ResourcePhase::Completed),
            self.sequence_of(second, &ResourcePhase::Started),
        ) {
            (Some(done), Some(started)) => done < started,
            _ => false,
        }
    }

    /// Resources that completed, in completion order
    pub fn completed(&self) -> Vec<&LogicalId> {
        self.with_phase(|p| matches!(p, ResourcePhase::Completed))
    }

    /// Resources that failed, in failure order
    pub fn failed(&self) -> Vec<&LogicalId> {
        self.with_phase(|p| matches!(p, ResourcePhase::Failed { .. }))
    }

    /// Resources destroyed by a teardown, in destruction order
    pub fn destroyed(&self) -> Vec<&LogicalId> {
        self.with_phase(|p| matches!(p, ResourcePhase::Destroyed))
    }

    /// Resources a teardown found missing
    pub fn absent(&self) -> Vec<&LogicalId> {
        self.with_phase(|p| matches!(p, ResourcePhase::Absent))
    }

    fn with_phase(&self, predicate: impl Fn(&ResourcePhase) -> bool) -> Vec<&LogicalId> {
        self.events
            .iter()
            .filter(|e| predicate(&e.phase))
            .map(|e| &e.resource)
            .collect()
    }
}
