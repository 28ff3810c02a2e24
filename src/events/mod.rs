// Copyright (c) 2025 - Cowboy AI, Inc.
//! Orchestration Events
//!
//! Events are immutable facts about what happened during a run. The
//! orchestration log is the observable record the ordering guarantees are
//! checked against: a resource's `Started` event never precedes the
//! `Completed` event of any of its predecessors.
//!
//! # Event Flow
//!
//! ```text
//! Wave N: Started(a) Started(b) → provider calls → Completed(a) Failed(b)
//! Wave N+1 only begins when every call of wave N has a terminal event
//! ```

pub mod orchestration;

pub use orchestration::{OrchestrationEvent, OrchestrationLog, ResourcePhase};
