// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Dependency Graph
//!
//! Every environment is a set of declared resources connected by predecessor
//! edges. Edges come from two places:
//!
//! - **Implicit**: a declaration that references another resource by
//!   [`LogicalId`] (an instance referencing its security group)
//! - **Explicit**: predecessors handed to [`ResourceGraph::declare`] (the web
//!   and app nodes waiting for the bastion)
//!
//! References may be declared before the resource they point to. The graph is
//! checked as a whole when it is ordered: unknown references and cycles are
//! rejected before any provider call is made.
//!
//! # Invariants
//!
//! - Logical identifiers are unique within a graph
//! - A resource's wave index is strictly greater than every predecessor's
//! - Teardown visits resources in exactly the reverse creation order

pub mod declaration;

pub use declaration::{
    ArtifactStoreSpec, BuildProjectSpec, CredentialsRef, DatabaseClusterSpec, Declaration,
    DeployApplicationSpec, DeploymentGroupSpec, EgressGatewaySpec, EncryptionKeySpec,
    FlowLogSpec, IngressRuleSpec, InstanceSpec, NetworkSpec, PipelineSpec, RemovalPolicy,
    RoleDeclaration, RuleSource, SecurityGroupSpec, SubnetSpec, WriterInstance,
};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::{DependencyChain, LogicalId, ResourceKind};
use crate::errors::{ProvisioningError, ProvisioningResult};

/// A declared resource together with its explicit predecessors
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredResource {
    pub id: LogicalId,
    pub declaration: Declaration,
    /// Ordering-only edges given by the caller
    pub explicit_predecessors: Vec<LogicalId>,
}

impl DeclaredResource {
    pub fn kind(&self) -> ResourceKind {
        self.declaration.kind()
    }

    /// All predecessors: declaration references followed by explicit edges,
    /// without duplicates
    pub fn predecessors(&self) -> Vec<LogicalId> {
        let mut seen = BTreeSet::new();
        self.declaration
            .references()
            .into_iter()
            .chain(self.explicit_predecessors.iter().cloned())
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }
}

/// Declared resources of one stack
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    stack: String,
    resources: Vec<DeclaredResource>,
    index: HashMap<LogicalId, usize>,
}

impl ResourceGraph {
    /// Empty graph for the named stack
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            resources: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Name of the stack the graph is provisioned as
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Declare a resource
    ///
    /// Fails with [`ProvisioningError::DuplicateDeclaration`] if the logical
    /// identifier is already taken.
    pub fn declare(
        &mut self,
        id: LogicalId,
        declaration: Declaration,
        predecessors: &[LogicalId],
    ) -> ProvisioningResult<()> {
        if self.index.contains_key(&id) {
            return Err(ProvisioningError::DuplicateDeclaration(id));
        }

        let mut explicit = Vec::with_capacity(predecessors.len());
        for predecessor in predecessors {
            if !explicit.contains(predecessor) {
                explicit.push(predecessor.clone());
            }
        }

        tracing::debug!(
            stack = %self.stack,
            resource = %id,
            kind = %declaration.kind(),
            "declared resource"
        );

        self.index.insert(id.clone(), self.resources.len());
        self.resources.push(DeclaredResource {
            id,
            declaration,
            explicit_predecessors: explicit,
        });
        Ok(())
    }

    pub fn get(&self, id: &LogicalId) -> Option<&DeclaredResource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, id: &LogicalId) -> bool {
        self.index.contains_key(id)
    }

    /// Resources in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &DeclaredResource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources of one kind, in declaration order
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &DeclaredResource> {
        self.resources.iter().filter(move |r| r.kind() == kind)
    }

    /// Direct predecessors of a resource
    pub fn predecessors(&self, id: &LogicalId) -> Vec<LogicalId> {
        self.get(id)
            .map(DeclaredResource::predecessors)
            .unwrap_or_default()
    }

    /// Resources that directly depend on `id`
    pub fn dependents(&self, id: &LogicalId) -> Vec<LogicalId> {
        self.resources
            .iter()
            .filter(|r| r.predecessors().contains(id))
            .map(|r| r.id.clone())
            .collect()
    }

    /// Check every reference resolves to a declared resource
    pub fn validate(&self) -> ProvisioningResult<()> {
        for resource in &self.resources {
            for predecessor in resource.predecessors() {
                if !self.index.contains_key(&predecessor) {
                    return Err(ProvisioningError::UnknownReference {
                        resource: resource.id.clone(),
                        missing: predecessor,
                    });
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    fn to_petgraph(&self) -> ProvisioningResult<DiGraph<usize, ()>> {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..self.resources.len())
            .map(|i| graph.add_node(i))
            .collect();

        for (i, resource) in self.resources.iter().enumerate() {
            for predecessor in resource.predecessors() {
                let p = *self.index.get(&predecessor).ok_or_else(|| {
                    ProvisioningError::UnknownReference {
                        resource: resource.id.clone(),
                        missing: predecessor.clone(),
                    }
                })?;
                graph.add_edge(nodes[p], nodes[i], ());
            }
        }

        Ok(graph)
    }

    /// A creation order in which every resource follows its predecessors
    pub fn topological_order(&self) -> ProvisioningResult<Vec<LogicalId>> {
        let graph = self.to_petgraph()?;
        let sorted = toposort(&graph, None).map_err(|cycle| {
            ProvisioningError::DependencyCycle(self.resources[graph[cycle.node_id()]].id.clone())
        })?;
        Ok(sorted
            .into_iter()
            .map(|node| self.resources[graph[node]].id.clone())
            .collect())
    }

    /// Group resources into waves that can be created concurrently
    ///
    /// A resource lands in the first wave after all of its predecessors.
    /// Within a wave, resources keep declaration order.
    pub fn waves(&self) -> ProvisioningResult<Vec<Vec<LogicalId>>> {
        let order = self.topological_order()?;
        let mut level: HashMap<&LogicalId, usize> = HashMap::new();
        let mut waves: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

        for id in &order {
            let idx = self.index[id];
            let wave = self.resources[idx]
                .predecessors()
                .iter()
                .filter_map(|p| level.get(p).map(|l| l + 1))
                .max()
                .unwrap_or(0);
            level.insert(id, wave);
            waves.entry(wave).or_default().push(idx);
        }

        Ok(waves
            .into_values()
            .map(|mut members| {
                members.sort_unstable();
                members
                    .into_iter()
                    .map(|i| self.resources[i].id.clone())
                    .collect()
            })
            .collect())
    }

    /// Teardown order: the reverse of the wave order
    pub fn teardown_waves(&self) -> ProvisioningResult<Vec<Vec<LogicalId>>> {
        let mut waves = self.waves()?;
        waves.reverse();
        for wave in &mut waves {
            wave.reverse();
        }
        Ok(waves)
    }

    /// Transitive predecessors of `id` in creation order, ending with `id`
    ///
    /// Unknown references are skipped so the chain can be reported for
    /// partially declared graphs.
    pub fn dependency_chain(&self, id: &LogicalId) -> DependencyChain {
        let mut ancestors = BTreeSet::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            for predecessor in self.predecessors(&current) {
                if self.contains(&predecessor) && ancestors.insert(predecessor.clone()) {
                    stack.push(predecessor);
                }
            }
        }

        let mut chain: Vec<LogicalId> = match self.topological_order() {
            Ok(order) => order.into_iter().filter(|r| ancestors.contains(r)).collect(),
            Err(_) => self
                .resources
                .iter()
                .filter(|r| ancestors.contains(&r.id))
                .map(|r| r.id.clone())
                .collect(),
        };
        chain.retain(|r| r != id);
        chain.push(id.clone());
        DependencyChain::from_ids(chain)
    }
}
