// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deployment Targets
//!
//! The deploy stage never holds a list of hosts. It selects nodes by the
//! `application-name` and `stage` tags at the moment the stage runs, so the
//! targeted set is whatever matches then, and the resolved list is recorded
//! with the deployment for audit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::DeploymentConfig;
use crate::domain::{LogicalId, TAG_APPLICATION_NAME, TAG_STAGE};

/// Tag-based selector for deployment targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagSelector {
    pub application_name: String,
    pub stage: String,
}

impl TagSelector {
    pub fn new(application_name: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            stage: stage.into(),
        }
    }

    pub fn from_config(config: &DeploymentConfig) -> Self {
        Self::new(&config.application_name, &config.stage)
    }

    /// Check whether a node's tags satisfy the selector
    pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        tags.get(TAG_APPLICATION_NAME) == Some(&self.application_name)
            && tags.get(TAG_STAGE) == Some(&self.stage)
    }
}

impl fmt::Display for TagSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={},{}={}",
            TAG_APPLICATION_NAME, self.application_name, TAG_STAGE, self.stage
        )
    }
}

/// How artifacts are rolled out across the targeted nodes
///
/// There is no automatic rollback under either strategy: nodes that already
/// received the artifact keep it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployStrategy {
    /// Deploy node by node and skip the remainder after the first failure
    #[default]
    OneAtATime,
    /// Deploy to every node and report each outcome
    AllAtOnce,
}

/// Inventory entry of a running compute node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub stack: String,
    pub logical_id: LogicalId,
    pub physical_id: String,
    pub tags: BTreeMap<String, String>,
    /// Node runs a deployment agent able to install artifacts
    pub deployment_agent: bool,
}

/// Source of the running compute inventory
#[async_trait]
pub trait InstanceInventory: Send + Sync {
    async fn instances(&self) -> Vec<InstanceRecord>;
}

/// Nodes selected for one deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTargets {
    pub selector: TagSelector,
    pub nodes: Vec<InstanceRecord>,
}

impl DeploymentTargets {
    /// Resolve the selector against the current inventory
    ///
    /// Nodes are ordered by logical id so repeated resolutions are stable.
    pub async fn resolve(inventory: &dyn InstanceInventory, selector: &TagSelector) -> Self {
        let mut nodes: Vec<InstanceRecord> = inventory
            .instances()
            .await
            .into_iter()
            .filter(|record| selector.matches(&record.tags))
            .collect();
        nodes.sort_by(|a, b| a.logical_id.cmp(&b.logical_id));

        tracing::debug!(selector = %selector, count = nodes.len(), "resolved deployment targets");

        Self {
            selector: selector.clone(),
            nodes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn logical_ids(&self) -> Vec<LogicalId> {
        self.nodes.iter().map(|n| n.logical_id.clone()).collect()
    }
}

/// Per-node result of a deploy stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeOutcome {
    Succeeded,
    Failed { reason: String },
    /// Not attempted because an earlier node failed
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDeployment {
    pub node: LogicalId,
    pub outcome: NodeOutcome,
}

/// Outcome of one deploy stage across every targeted node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub strategy: DeployStrategy,
    pub targets: DeploymentTargets,
    pub results: Vec<NodeDeployment>,
}

impl DeploymentReport {
    pub fn is_success(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.outcome == NodeOutcome::Succeeded)
    }

    pub fn succeeded(&self) -> Vec<&LogicalId> {
        self.filter(|o| matches!(o, NodeOutcome::Succeeded))
    }

    pub fn failed(&self) -> Vec<&LogicalId> {
        self.filter(|o| matches!(o, NodeOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> Vec<&LogicalId> {
        self.filter(|o| matches!(o, NodeOutcome::Skipped))
    }

    fn filter(&self, predicate: impl Fn(&NodeOutcome) -> bool) -> Vec<&LogicalId> {
        self.results
            .iter()
            .filter(|r| predicate(&r.outcome))
            .map(|r| &r.node)
            .collect()
    }
}
