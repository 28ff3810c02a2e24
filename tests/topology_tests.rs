// Copyright (c) 2025 - Cowboy AI, Inc.
//! Integration tests for environment provisioning
//!
//! These tests apply the assembled environment to the in-memory provider and
//! verify ordering, policy, export and failure guarantees end to end:
//! 1. Assemble the environment declaration
//! 2. Apply it through the executor
//! 3. Inspect the orchestration log, provider inventory and exports

mod fixtures;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use layered_stack::builders::AllowList;
use layered_stack::domain::{
    BootPayload, CidrBlock, LogicalId, NodeKind, SecurityTier, SubnetTier,
};
use layered_stack::events::ResourcePhase;
use layered_stack::graph::{Declaration, NetworkSpec, RuleSource};
use layered_stack::provider::{
    attributes, AttributeValue, CreateRequest, PublishedExport, ResourceProvider,
};
use layered_stack::secrets::{
    InMemorySecretStore, ResolvedSecret, SecretError, SecretRef, SecretStore,
};
use layered_stack::stack::{OUTPUT_BASTION_DNS, OUTPUT_WEB_SERVER_IP};
use layered_stack::{
    BootPayloads, EnvironmentStack, GraphExecutor, InMemoryProvider, ProvisioningError,
};

use fixtures::{assemble, config, id, provider, secrets};

/// Test: every predecessor completes before its dependent starts
#[tokio::test]
async fn test_predecessors_complete_before_dependents_start() {
    let stack = assemble(config("dev"));
    let provider = provider(secrets());
    let run = stack.apply(&GraphExecutor::new(provider)).await.unwrap();

    let bastion = &stack.node(NodeKind::Bastion).unwrap().id;
    for kind in [NodeKind::Web, NodeKind::App] {
        let node = &stack.node(kind).unwrap().id;
        assert!(
            run.log.completed_before(bastion, node),
            "{bastion} must complete before {node} starts"
        );
    }

    for declared in stack.graph().iter() {
        for predecessor in declared.predecessors() {
            assert!(
                run.log.completed_before(&predecessor, &declared.id),
                "{predecessor} must complete before {} starts",
                declared.id
            );
        }
    }
    assert_eq!(run.log.completed().len(), stack.graph().len());
}

/// Test: the matrix contains exactly the allow-listed rules
#[test]
fn test_security_matrix_matches_allow_list_exactly() {
    let config = config("dev");
    let stack = assemble(config.clone());
    let list = AllowList::standard(config.compute.app_port, config.database.port);

    assert!(stack.matrix().audit(&list).is_empty());

    let total_rules: usize = stack
        .matrix()
        .groups()
        .iter()
        .map(|g| stack.matrix().rules(&g.id).len())
        .sum();
    assert_eq!(total_rules, list.entries().len());
}

/// Test: the database admits bastion and app but no other group
#[test]
fn test_database_denies_groups_without_grant() {
    let config = config("dev");
    let stack = assemble(config.clone());
    let matrix = stack.matrix();
    let db = matrix.group(SecurityTier::Database).unwrap();
    let port = config.database.port;

    let source = |tier| matrix.group(tier).unwrap().as_source();
    assert!(matrix.admits(&db.id, &source(SecurityTier::App), port));
    assert!(matrix.admits(&db.id, &source(SecurityTier::Bastion), port));
    assert!(!matrix.admits(&db.id, &source(SecurityTier::Web), port));
    assert!(!matrix.admits(&db.id, &RuleSource::internet(), port));
    assert!(!matrix.admits(&db.id, &RuleSource::Group(id("qa-App-SecurityGroup")), port));
}

/// Test: applying publishes the export contract with provider values
#[tokio::test]
async fn test_exports_published_after_apply() {
    let stack = assemble(config("dev"));
    let provider = provider(secrets());
    let run = stack
        .apply(&GraphExecutor::new(provider.clone()))
        .await
        .unwrap();

    let vpc = run.resource(&stack.network().network).unwrap();
    assert_eq!(
        provider.import_value("dev-vpc-id").await,
        Some(AttributeValue::Identifier(vpc.physical_id.clone()))
    );
    assert_eq!(
        provider.import_value("dev-db-cluster-endpoint-port").await,
        Some(AttributeValue::Number(3306))
    );

    let exports = provider.exports().await;
    for name in stack.outputs().export_names() {
        assert!(exports.contains_key(name), "missing export {name}");
    }

    assert!(run.output(OUTPUT_WEB_SERVER_IP).is_some());
    let bastion_dns = run.output(OUTPUT_BASTION_DNS).unwrap();
    assert!(bastion_dns.value.to_string().ends_with(".compute.amazonaws.com"));
}

/// Test: an export name owned by another stack aborts before any creation
#[tokio::test]
async fn test_export_collision_creates_nothing() {
    let provider = provider(secrets());
    provider
        .publish_exports(
            "legacy-VpcStack",
            &[PublishedExport {
                name: "dev-vpc-id".to_string(),
                value: AttributeValue::String("vpc-legacy".to_string()),
            }],
        )
        .await
        .unwrap();

    let stack = assemble(config("dev"));
    let result = stack.apply(&GraphExecutor::new(provider.clone())).await;

    match result {
        Err(ProvisioningError::ExportCollision { name, resource, .. }) => {
            assert_eq!(name, "dev-vpc-id");
            assert_eq!(resource, stack.network().network);
        }
        other => panic!("expected ExportCollision, got {other:?}"),
    }
    assert_eq!(provider.stack_size("dev-VpcStack").await, 0);
}

/// Test: two environments with the same address block conflict
#[tokio::test]
async fn test_identical_address_blocks_conflict() {
    let provider = provider(secrets());
    let executor = GraphExecutor::new(provider.clone());

    assemble(config("dev")).apply(&executor).await.unwrap();
    let qa = assemble(config("qa"));
    let result = qa.apply(&executor).await;

    match result {
        Err(ProvisioningError::AllocationConflict { resource, chain, .. }) => {
            assert_eq!(resource, id("qa-Vpc"));
            assert!(chain.contains(&id("qa-Vpc")));
        }
        other => panic!("expected AllocationConflict, got {other:?}"),
    }

    assert!(provider.resource("qa-VpcStack", &id("qa-Vpc")).await.is_none());
    let exports = provider.exports().await;
    assert!(exports.keys().all(|name| !name.starts_with("qa-")));
    assert!(exports.contains_key("dev-vpc-id"));
}

/// Test: an unplaceable shape fails the node with its dependency chain
#[tokio::test]
async fn test_capacity_unavailable_names_node_and_chain() {
    let provider = Arc::new(
        InMemoryProvider::new(config("dev").account, Arc::new(secrets()))
            .with_unavailable_capacity("t2.micro", SubnetTier::PrivateWithEgress),
    );
    let stack = assemble(config("dev"));
    let result = stack.apply(&GraphExecutor::new(provider.clone())).await;

    let app = &stack.node(NodeKind::App).unwrap().id;
    let bastion = &stack.node(NodeKind::Bastion).unwrap().id;
    match result {
        Err(ProvisioningError::CapacityUnavailable { resource, chain, .. }) => {
            assert_eq!(&resource, app);
            assert!(chain.contains(bastion));
        }
        other => panic!("expected CapacityUnavailable, got {other:?}"),
    }

    // No rollback: the bastion stays, nothing is exported.
    assert!(provider.resource("dev-VpcStack", bastion).await.is_some());
    assert!(provider.exports().await.is_empty());
}

/// Test: a missing database secret fails the cluster
#[tokio::test]
async fn test_missing_database_secret_fails_cluster() {
    let provider = provider(fixtures::secrets_without(fixtures::DB_SECRET));
    let stack = assemble(config("dev"));
    let result = stack.apply(&GraphExecutor::new(provider)).await;

    match result {
        Err(err @ ProvisioningError::CredentialResolution { .. }) => {
            assert_eq!(err.resource(), Some(&stack.database().id));
            assert!(err.to_string().contains("dev-Database-Cluster"));
        }
        other => panic!("expected CredentialResolution, got {other:?}"),
    }
}

/// Test: abort before the first wave leaves nothing behind
#[tokio::test]
async fn test_abort_stops_between_waves() {
    let provider = provider(secrets());
    let executor = GraphExecutor::new(provider.clone());
    executor.abort_handle().abort();

    let result = assemble(config("dev")).apply(&executor).await;
    assert!(matches!(
        result,
        Err(ProvisioningError::Aborted { completed: 0 })
    ));
    assert_eq!(provider.stack_size("dev-VpcStack").await, 0);
}

/// Test: an abort stops one run only; the next apply on the executor proceeds
#[tokio::test]
async fn test_abort_is_consumed_by_the_run_it_stops() {
    let provider = provider(secrets());
    let executor = GraphExecutor::new(provider.clone());
    let stack = assemble(config("dev"));

    executor.abort_handle().abort();
    assert!(matches!(
        stack.apply(&executor).await,
        Err(ProvisioningError::Aborted { .. })
    ));
    assert!(!executor.abort_handle().is_aborted());

    let run = stack.apply(&executor).await.unwrap();
    assert_eq!(run.log.completed().len(), stack.graph().len());
}

/// Test: a prefix containing a hyphen provisions with default settings
#[tokio::test]
async fn test_hyphenated_prefix_provisions_with_defaults() {
    let stack = EnvironmentStack::assemble(config("dev-eu"), BootPayloads::default())
        .expect("hyphenated prefix declares");
    assert_eq!(stack.database().database_name, "dev_eudatabase");

    let provider = provider(secrets());
    stack.apply(&GraphExecutor::new(provider.clone())).await.unwrap();
    assert!(provider.import_value("dev-eu-vpc-id").await.is_some());
}

/// Test: tearing down a partial apply reports missing resources as absent
#[tokio::test]
async fn test_teardown_after_partial_apply_marks_missing_as_absent() {
    let provider = Arc::new(
        InMemoryProvider::new(config("dev").account, Arc::new(secrets()))
            .with_unavailable_capacity("t2.micro", SubnetTier::PrivateWithEgress),
    );
    let executor = GraphExecutor::new(provider.clone());
    let stack = assemble(config("dev"));
    assert!(stack.apply(&executor).await.is_err());

    let log = stack.teardown(&executor).await.unwrap();
    let app = &stack.node(NodeKind::App).unwrap().id;
    let bastion = &stack.node(NodeKind::Bastion).unwrap().id;
    assert!(log.absent().contains(&app));
    assert!(log.absent().contains(&&stack.database().id));
    assert!(log.destroyed().contains(&bastion));
    assert!(log
        .events()
        .iter()
        .all(|e| e.phase != ResourcePhase::Retained));
    assert_eq!(provider.stack_size("dev-VpcStack").await, 0);
}

/// Test: teardown removes every resource in reverse order
#[tokio::test]
async fn test_teardown_reverses_creation_order() {
    let stack = assemble(config("dev"));
    let provider = provider(secrets());
    let executor = GraphExecutor::new(provider.clone());
    stack.apply(&executor).await.unwrap();

    let log = stack.teardown(&executor).await.unwrap();
    let destroyed = log.destroyed();

    let position = |target: &LogicalId| destroyed.iter().position(|d| *d == target).unwrap();
    let cluster = &stack.database().id;
    let key = &stack.database().encryption_key;
    let network = &stack.network().network;
    assert!(position(cluster) < position(key));
    assert!(position(cluster) < position(network));

    assert_eq!(provider.stack_size("dev-VpcStack").await, 0);
    assert!(provider.exports().await.is_empty());
}

/// Test: re-applying does not deliver the boot payload again
#[tokio::test]
async fn test_boot_payload_delivered_at_most_once() {
    let payloads = BootPayloads {
        web: Some(BootPayload::inline("#!/bin/bash\nyum install -y httpd")),
        ..BootPayloads::default()
    };
    let stack = EnvironmentStack::assemble(config("dev"), payloads).unwrap();
    let provider = provider(secrets());
    let executor = GraphExecutor::new(provider.clone());

    stack.apply(&executor).await.unwrap();
    stack.apply(&executor).await.unwrap();

    let web = &stack.node(NodeKind::Web).unwrap().id;
    let app = &stack.node(NodeKind::App).unwrap().id;
    assert_eq!(provider.boot_deliveries("dev-VpcStack", web).await, 1);
    assert_eq!(provider.boot_deliveries("dev-VpcStack", app).await, 0);
}

/// Test: payload files are loaded from the configured paths
#[tokio::test]
async fn test_boot_payloads_load_from_assets() {
    let assets = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets");
    let mut config = config("dev");
    config.compute.web_payload = Some(assets.join("configure_web_server.sh"));
    config.compute.app_payload = Some(assets.join("configure_app_server.sh"));

    let payloads = BootPayloads::load(&config).await.unwrap();
    assert!(payloads.bastion.is_none());
    assert!(payloads.web.unwrap().content().contains("httpd"));
    assert!(payloads.app.unwrap().content().contains("tomcat"));
}

/// Test: a missing payload file is a configuration error
#[tokio::test]
async fn test_missing_payload_file_rejected() {
    let mut config = config("dev");
    config.compute.web_payload = Some(PathBuf::from("/nonexistent/configure_web_server.sh"));

    let result = BootPayloads::load(&config).await;
    assert!(matches!(
        result,
        Err(ProvisioningError::InvalidConfiguration(_))
    ));
}

/// Test: the web node gets a public address, the app node does not
#[tokio::test]
async fn test_only_public_tier_gets_public_address() {
    let stack = assemble(config("dev"));
    let run = stack
        .apply(&GraphExecutor::new(provider(secrets())))
        .await
        .unwrap();

    let web = run.resource(&stack.node(NodeKind::Web).unwrap().id).unwrap();
    let app = run.resource(&stack.node(NodeKind::App).unwrap().id).unwrap();
    assert!(web.attribute(attributes::PUBLIC_IP).is_some());
    assert!(app.attribute(attributes::PUBLIC_IP).is_none());
    assert!(app.attribute(attributes::PRIVATE_IP).is_some());
}

fn private_ip(run: &layered_stack::ProvisioningRun, id: &LogicalId) -> Ipv4Addr {
    match run.resource(id).unwrap().attribute(attributes::PRIVATE_IP) {
        Some(AttributeValue::String(ip)) => ip.parse().unwrap(),
        other => panic!("unexpected private address {other:?}"),
    }
}

/// Test: private addresses come from the subnet of each node's tier
#[tokio::test]
async fn test_private_addresses_come_from_tier_subnets() {
    let mut config = config("dev");
    config.network.cidr = CidrBlock::new("172.20.0.0/16").unwrap();
    let stack = assemble(config);
    let run = stack
        .apply(&GraphExecutor::new(provider(secrets())))
        .await
        .unwrap();

    let mut seen = Vec::new();
    for kind in [NodeKind::Bastion, NodeKind::Web, NodeKind::App] {
        let node = stack.node(kind).unwrap();
        let address = private_ip(&run, &node.id);
        let subnet = stack.network().subnets(node.tier)[0].cidr;
        assert!(
            subnet.contains(&CidrBlock::from_parts(address, 32).unwrap()),
            "{address} of {} is outside {subnet}",
            node.id
        );
        seen.push(address);
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 3);
}

/// Secret store that holds every resolution until released
struct GatedSecrets {
    inner: InMemorySecretStore,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl SecretStore for GatedSecrets {
    async fn resolve(&self, secret: &SecretRef) -> Result<ResolvedSecret, SecretError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.resolve(secret).await
    }
}

/// Test: a pending credential lookup does not hold up other creations
#[tokio::test]
async fn test_credential_lookup_does_not_block_provider() {
    let gate = Arc::new(GatedSecrets {
        inner: secrets(),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let provider = Arc::new(InMemoryProvider::new(config("dev").account, gate.clone()));
    let stack = assemble(config("dev"));
    let executor = GraphExecutor::new(provider.clone());

    let other_network = CreateRequest {
        stack: "qa-VpcStack".to_string(),
        logical_id: id("qa-Vpc"),
        declaration: Declaration::Network(NetworkSpec {
            cidr: CidrBlock::new("10.1.0.0/16").unwrap(),
            availability_domains: 1,
            subnets: Vec::new(),
        }),
        dependencies: BTreeMap::new(),
    };

    let concurrent = async {
        gate.entered.notified().await;
        let created =
            tokio::time::timeout(Duration::from_secs(5), provider.create(other_network)).await;
        gate.release.notify_one();
        created
    };
    let (applied, created) = tokio::join!(stack.apply(&executor), concurrent);

    assert!(applied.is_ok());
    assert!(matches!(created, Ok(Ok(_))));
    assert!(provider.resource("qa-VpcStack", &id("qa-Vpc")).await.is_some());
}
