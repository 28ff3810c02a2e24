// Copyright (c) 2025 - Cowboy AI, Inc.
//! Graph Executor
//!
//! Turns a [`ResourceGraph`] into provider calls. Resources are created wave
//! by wave: every call of a wave runs concurrently, and the next wave starts
//! only when every call of the current one has returned.
//!
//! # Guarantees
//!
//! - A resource's `Started` event never precedes its predecessors' `Completed`
//! - Export names are checked against the provider before anything is created
//! - Exports are published only after every resource completed
//! - A failure stops the run after the current wave; completed resources are
//!   left in place (no rollback)
//! - Abort requests are honored between waves and consumed by the run they stop

use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::LogicalId;
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::events::{OrchestrationLog, ResourcePhase};
use crate::exports::{OutputContract, ResolvedOutput};
use crate::graph::{RemovalPolicy, ResourceGraph};
use crate::provider::{CreateRequest, ProvisionedResource, ResourceProvider};
use crate::state_machine::resource_lifecycle::{LifecycleCommand, ResourceState};
use crate::state_machine::StateMachine;

/// Cooperative abort signal shared with the operator
///
/// A request stops the next run that reaches a wave boundary and is cleared
/// by that run, so later runs on the same executor proceed.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the run to stop before its next wave
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous abort request
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Result of a successful provisioning run
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningRun {
    pub stack: String,
    pub log: OrchestrationLog,
    pub resources: BTreeMap<LogicalId, ProvisionedResource>,
    pub states: BTreeMap<LogicalId, ResourceState>,
    pub outputs: Vec<ResolvedOutput>,
}

impl ProvisioningRun {
    pub fn resource(&self, id: &LogicalId) -> Option<&ProvisionedResource> {
        self.resources.get(id)
    }

    /// Resolved output by display key or export name
    pub fn output(&self, key: &str) -> Option<&ResolvedOutput> {
        self.outputs.iter().find(|o| o.key == key)
    }
}

fn advance(
    states: &mut BTreeMap<LogicalId, ResourceState>,
    id: &LogicalId,
    command: LifecycleCommand,
) {
    let current = states.get(id).copied().unwrap_or(ResourceState::Declared);
    match current.transition(&command) {
        Ok((next, output)) => {
            for warning in output.warnings {
                if output.is_critical {
                    tracing::warn!(resource = %id, state = %next, "{warning}");
                } else {
                    tracing::debug!(resource = %id, state = %next, "{warning}");
                }
            }
            states.insert(id.clone(), next);
        }
        Err(e) => tracing::error!(resource = %id, error = %e, "rejected lifecycle transition"),
    }
}

/// Executes resource graphs against a provider
pub struct GraphExecutor<P: ResourceProvider> {
    provider: Arc<P>,
    abort: AbortHandle,
}

impl<P: ResourceProvider> GraphExecutor<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            abort: AbortHandle::new(),
        }
    }

    /// Handle that aborts runs of this executor
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Fail if another stack already owns one of the contract's export names
    async fn check_exports(
        &self,
        graph: &ResourceGraph,
        outputs: &OutputContract,
    ) -> ProvisioningResult<()> {
        for export in outputs.exports() {
            let Some(name) = export.export_name.as_deref() else {
                continue;
            };
            if let Some(owner) = self.provider.export_owner(name).await {
                if owner != graph.stack() {
                    return Err(ProvisioningError::ExportCollision {
                        name: name.to_string(),
                        resource: export.resource.clone(),
                        chain: graph.dependency_chain(&export.resource),
                    });
                }
            }
        }
        Ok(())
    }

    /// Provision every resource of the graph and publish its outputs
    pub async fn apply(
        &self,
        graph: &ResourceGraph,
        outputs: &OutputContract,
    ) -> ProvisioningResult<ProvisioningRun> {
        graph.validate()?;
        let waves = graph.waves()?;
        self.check_exports(graph, outputs).await?;

        let stack = graph.stack().to_string();
        let mut log = OrchestrationLog::new(&stack);
        let mut resources: BTreeMap<LogicalId, ProvisionedResource> = BTreeMap::new();
        let mut states: BTreeMap<LogicalId, ResourceState> = graph
            .iter()
            .map(|r| (r.id.clone(), ResourceState::Declared))
            .collect();

        tracing::info!(
            "🚀 Provisioning {} ({} resources in {} waves)",
            stack,
            graph.len(),
            waves.len()
        );

        for (index, wave) in waves.iter().enumerate() {
            if self.abort.is_aborted() {
                tracing::warn!("⛔ {} aborted before wave {}", stack, index + 1);
                self.abort.reset();
                return Err(ProvisioningError::Aborted {
                    completed: resources.len(),
                });
            }

            let mut requests = Vec::with_capacity(wave.len());
            for id in wave {
                let Some(declared) = graph.get(id) else {
                    continue;
                };
                let dependencies = declared
                    .predecessors()
                    .into_iter()
                    .filter_map(|p| resources.get(&p).map(|r| (p, r.clone())))
                    .collect();

                log.record(id, declared.kind(), ResourcePhase::Started);
                advance(&mut states, id, LifecycleCommand::BeginCreate);
                requests.push(CreateRequest {
                    stack: stack.clone(),
                    logical_id: id.clone(),
                    declaration: declared.declaration.clone(),
                    dependencies,
                });
            }

            tracing::debug!(wave = index + 1, size = requests.len(), "dispatching wave");
            let kinds: Vec<_> = requests
                .iter()
                .map(|r| (r.logical_id.clone(), r.declaration.kind()))
                .collect();
            let results =
                join_all(requests.into_iter().map(|request| self.provider.create(request))).await;

            let mut first_failure = None;
            for ((id, kind), result) in kinds.into_iter().zip(results) {
                match result {
                    Ok(resource) => {
                        log.record(&id, kind, ResourcePhase::Completed);
                        advance(&mut states, &id, LifecycleCommand::CreateSucceeded);
                        tracing::info!("✅ {} {} ready ({})", kind, id, resource.physical_id);
                        resources.insert(id, resource);
                    }
                    Err(err) => {
                        log.record(
                            &id,
                            kind,
                            ResourcePhase::Failed {
                                reason: err.to_string(),
                            },
                        );
                        advance(&mut states, &id, LifecycleCommand::CreateFailed);
                        tracing::error!("❌ {} {} failed: {}", kind, id, err);
                        if first_failure.is_none() {
                            let chain = graph.dependency_chain(&id);
                            first_failure = Some(ProvisioningError::from_provider(id, chain, err));
                        }
                    }
                }
            }

            if let Some(err) = first_failure {
                return Err(err);
            }
        }

        let resolved = outputs.resolve(&resources)?;
        let exports = OutputContract::publishable(&resolved);
        if let Err(err) = self.provider.publish_exports(&stack, &exports).await {
            // Another stack claimed a name while this one was provisioning.
            self.check_exports(graph, outputs).await?;
            return Err(ProvisioningError::InvalidConfiguration(format!(
                "publishing exports of {stack} failed: {err}"
            )));
        }

        tracing::info!(
            "🎉 {} provisioned: {} resources, {} exports",
            stack,
            resources.len(),
            exports.len()
        );

        Ok(ProvisioningRun {
            stack,
            log,
            resources,
            states,
            outputs: resolved,
        })
    }

    /// Remove every resource of the graph in reverse creation order
    ///
    /// Exports are withdrawn first. Resources whose removal policy is
    /// `Retain` are left in place.
    pub async fn teardown(&self, graph: &ResourceGraph) -> ProvisioningResult<OrchestrationLog> {
        let waves = graph.teardown_waves()?;
        let stack = graph.stack().to_string();
        let mut log = OrchestrationLog::new(&stack);

        let withdrawn = self.provider.withdraw_exports(&stack).await;
        tracing::info!("🧹 Tearing down {} ({} exports withdrawn)", stack, withdrawn);

        for wave in &waves {
            let mut targets = Vec::new();
            for id in wave {
                let Some(declared) = graph.get(id) else {
                    continue;
                };
                if declared.declaration.removal_policy() == RemovalPolicy::Retain {
                    log.record(id, declared.kind(), ResourcePhase::Retained);
                    continue;
                }
                targets.push((id.clone(), declared.kind()));
            }

            let results = join_all(
                targets
                    .iter()
                    .map(|(id, _)| self.provider.destroy(&stack, id)),
            )
            .await;

            for ((id, kind), result) in targets.into_iter().zip(results) {
                match result {
                    Ok(true) => log.record(&id, kind, ResourcePhase::Destroyed),
                    Ok(false) => {
                        tracing::debug!(resource = %id, "nothing to remove");
                        log.record(&id, kind, ResourcePhase::Absent);
                    }
                    Err(err) => {
                        let chain = graph.dependency_chain(&id);
                        return Err(ProvisioningError::from_provider(id, chain, err));
                    }
                }
            }
        }

        tracing::info!("🧹 {} torn down ({} resources destroyed)", stack, log.destroyed().len());
        Ok(log)
    }
}
