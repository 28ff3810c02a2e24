// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for layered-stack
//!
//! Deterministic environments, secret stores and pipeline collaborators
//! shared by the integration tests. Collaborators record every call so
//! tests can assert on what reached the outside world.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use layered_stack::config::RepositoryConfig;
use layered_stack::domain::LogicalId;
use layered_stack::pipeline::{
    BuildArtifact, BuildService, DeploymentAgent, InstanceInventory, InstanceRecord,
    PipelineCollaborators, SourceArtifact, SourceProvider,
};
use layered_stack::secrets::{InMemorySecretStore, ResolvedSecret, SecretStore};
use layered_stack::{BootPayloads, EnvironmentConfig, EnvironmentStack, InMemoryProvider};

pub const DB_SECRET: &str = "mysql-token";
pub const REPO_TOKEN_SECRET: &str = "github-token";
pub const REPO_OWNER: &str = "owner";
pub const REPO_NAME: &str = "repo";
pub const REPO_BRANCH: &str = "main";

/// Environment configuration watching `owner/repo@main`
pub fn config(prefix: &str) -> EnvironmentConfig {
    let mut config = EnvironmentConfig::new(prefix);
    config.pipeline.repository.owner = REPO_OWNER.to_string();
    config.pipeline.repository.name = REPO_NAME.to_string();
    config.pipeline.repository.branch = REPO_BRANCH.to_string();
    config
}

/// Secret store holding both the database and repository credentials
pub fn secrets() -> InMemorySecretStore {
    InMemorySecretStore::new()
        .with_secret(DB_SECRET, "s3cr3t-password")
        .with_secret(REPO_TOKEN_SECRET, "ghp_fixture")
}

/// Secret store missing one of the fixture secrets
pub fn secrets_without(name: &str) -> InMemorySecretStore {
    let mut store = InMemorySecretStore::new();
    for (secret, value) in [(DB_SECRET, "s3cr3t-password"), (REPO_TOKEN_SECRET, "ghp_fixture")] {
        if secret != name {
            store = store.with_secret(secret, value);
        }
    }
    store
}

pub fn provider(secrets: InMemorySecretStore) -> Arc<InMemoryProvider> {
    Arc::new(InMemoryProvider::new(
        config("dev").account,
        Arc::new(secrets),
    ))
}

pub fn assemble(config: EnvironmentConfig) -> EnvironmentStack {
    EnvironmentStack::assemble(config, BootPayloads::default()).expect("environment declares")
}

pub fn id(value: &str) -> LogicalId {
    LogicalId::new(value).expect("valid logical id")
}

/// Source control double; fails when no token is presented
#[derive(Default)]
pub struct RecordingSource {
    pub fetched: Mutex<Vec<String>>,
}

#[async_trait]
impl SourceProvider for RecordingSource {
    async fn fetch(
        &self,
        repository: &RepositoryConfig,
        revision: &str,
        token: &ResolvedSecret,
    ) -> anyhow::Result<String> {
        anyhow::ensure!(!token.expose().is_empty(), "unauthenticated");
        self.fetched.lock().await.push(revision.to_string());
        Ok(format!(
            "artifacts/{}/{}/{revision}/source.zip",
            repository.owner, repository.name
        ))
    }
}

/// Build service double; fails for revisions listed in `broken`
#[derive(Default)]
pub struct RecordingBuild {
    pub built: Mutex<Vec<SourceArtifact>>,
    pub broken: HashSet<String>,
}

impl RecordingBuild {
    pub fn failing_on(revision: &str) -> Self {
        Self {
            built: Mutex::new(Vec::new()),
            broken: [revision.to_string()].into_iter().collect(),
        }
    }
}

#[async_trait]
impl BuildService for RecordingBuild {
    async fn build(&self, _build_image: &str, source: &SourceArtifact) -> anyhow::Result<String> {
        self.built.lock().await.push(source.clone());
        if self.broken.contains(&source.revision) {
            anyhow::bail!("mvn package exited with status 1");
        }
        Ok(format!("artifacts/build/{}/app.war", source.revision))
    }
}

/// Deployment agent double; fails on the listed nodes
#[derive(Default)]
pub struct RecordingAgent {
    pub deployed: Mutex<Vec<(LogicalId, BuildArtifact)>>,
    pub unreachable: HashSet<LogicalId>,
}

impl RecordingAgent {
    pub fn unreachable(nodes: &[&LogicalId]) -> Self {
        Self {
            deployed: Mutex::new(Vec::new()),
            unreachable: nodes.iter().map(|n| (*n).clone()).collect(),
        }
    }

    pub async fn deployed_nodes(&self) -> Vec<LogicalId> {
        self.deployed
            .lock()
            .await
            .iter()
            .map(|(node, _)| node.clone())
            .collect()
    }
}

#[async_trait]
impl DeploymentAgent for RecordingAgent {
    async fn deploy(&self, node: &InstanceRecord, artifact: &BuildArtifact) -> anyhow::Result<()> {
        if self.unreachable.contains(&node.logical_id) {
            anyhow::bail!("agent on {} did not respond", node.physical_id);
        }
        self.deployed
            .lock()
            .await
            .push((node.logical_id.clone(), artifact.clone()));
        Ok(())
    }
}

pub struct Doubles {
    pub source: Arc<RecordingSource>,
    pub build: Arc<RecordingBuild>,
    pub agent: Arc<RecordingAgent>,
}

impl Doubles {
    pub fn new(build: RecordingBuild, agent: RecordingAgent) -> Self {
        Self {
            source: Arc::new(RecordingSource::default()),
            build: Arc::new(build),
            agent: Arc::new(agent),
        }
    }

    pub fn collaborators(
        &self,
        secrets: Arc<dyn SecretStore>,
        inventory: Arc<dyn InstanceInventory>,
    ) -> PipelineCollaborators {
        PipelineCollaborators {
            secrets,
            source: self.source.clone(),
            build: self.build.clone(),
            agent: self.agent.clone(),
            inventory,
        }
    }
}
