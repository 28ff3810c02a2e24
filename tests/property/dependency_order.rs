// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Dependency Ordering
//!
//! Random acyclic graphs are generated by only letting a resource name
//! earlier resources as predecessors.

use layered_stack::domain::{Capability, LogicalId, RoleSpec};
use layered_stack::graph::{Declaration, ResourceGraph, RoleDeclaration};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn id(index: usize) -> LogicalId {
    LogicalId::new(format!("node-{index}")).expect("valid id")
}

fn role() -> Declaration {
    Declaration::Role(RoleDeclaration {
        principal: "ec2.amazonaws.com".to_string(),
        role: RoleSpec::new([Capability::RemoteManagement]),
    })
}

/// Adjacency: `edges[i]` lists the predecessors of node `i` (all `< i`)
fn dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..24).prop_flat_map(|size| {
        (0..size)
            .map(|i| {
                if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    prop::collection::btree_set(0..i, 0..=i.min(3))
                        .prop_map(|set: BTreeSet<usize>| set.into_iter().collect::<Vec<_>>())
                        .boxed()
                }
            })
            .collect::<Vec<_>>()
    })
}

fn build(edges: &[Vec<usize>]) -> ResourceGraph {
    let mut graph = ResourceGraph::new("prop-Stack");
    for (index, predecessors) in edges.iter().enumerate() {
        let predecessors: Vec<LogicalId> = predecessors.iter().map(|p| id(*p)).collect();
        graph
            .declare(id(index), role(), &predecessors)
            .expect("unique declaration");
    }
    graph
}

proptest! {
    /// Every predecessor sits in an earlier wave than its dependent
    #[test]
    fn prop_waves_respect_edges(edges in dag()) {
        let graph = build(&edges);
        let waves = graph.waves().expect("acyclic");
        let wave_of = |target: &LogicalId| {
            waves.iter().position(|w| w.contains(target)).expect("scheduled")
        };

        let scheduled: usize = waves.iter().map(Vec::len).sum();
        prop_assert_eq!(scheduled, edges.len());

        for (index, predecessors) in edges.iter().enumerate() {
            for p in predecessors {
                prop_assert!(wave_of(&id(*p)) < wave_of(&id(index)));
            }
        }
    }

    /// Teardown visits dependents before their predecessors
    #[test]
    fn prop_teardown_reverses_edges(edges in dag()) {
        let graph = build(&edges);
        let waves = graph.teardown_waves().expect("acyclic");
        let wave_of = |target: &LogicalId| {
            waves.iter().position(|w| w.contains(target)).expect("scheduled")
        };

        for (index, predecessors) in edges.iter().enumerate() {
            for p in predecessors {
                prop_assert!(wave_of(&id(index)) < wave_of(&id(*p)));
            }
        }
    }

    /// A dependency chain ends at its resource and contains every predecessor
    #[test]
    fn prop_chain_contains_predecessors(edges in dag()) {
        let graph = build(&edges);
        let last = id(edges.len() - 1);
        let chain = graph.dependency_chain(&last);

        prop_assert_eq!(chain.ids().last(), Some(&last));
        for p in &edges[edges.len() - 1] {
            prop_assert!(chain.contains(&id(*p)));
        }
    }
}
