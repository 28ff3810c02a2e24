// Copyright (c) 2025 - Cowboy AI, Inc.
//! Data Tier Provisioner
//!
//! Declares the encrypted database cluster in the isolated subnets: a
//! rotating encryption key, the cluster itself, and its master credentials
//! as a pointer into the secret store. The password is resolved by the
//! provider at creation time and never passes through this crate.
//!
//! Access is granted through the security matrix, and the cluster is gated
//! on those grants: it is not started before its ingress rules exist.

use crate::builders::network::NetworkTopology;
use crate::builders::security::{SecurityGroupHandle, SecurityPolicyMatrix};
use crate::config::EnvironmentConfig;
use crate::domain::{normalize_database_name, LogicalId, Protocol, SecurityTier, SubnetTier};
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::graph::{
    CredentialsRef, DatabaseClusterSpec, Declaration, EncryptionKeySpec, RemovalPolicy,
    ResourceGraph, WriterInstance,
};
use crate::secrets::SecretRef;

/// Declared database cluster
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseCluster {
    pub id: LogicalId,
    pub encryption_key: LogicalId,
    pub security_group: SecurityGroupHandle,
    pub database_name: String,
    pub port: u16,
}

/// Declares the data tier of an environment
pub struct DataTierProvisioner<'a> {
    config: &'a EnvironmentConfig,
    base: String,
}

impl<'a> DataTierProvisioner<'a> {
    pub fn new(config: &'a EnvironmentConfig) -> Self {
        Self {
            config,
            base: config.scoped("Database"),
        }
    }

    /// Let members of `from` reach the database port
    pub fn grant_access(
        &self,
        matrix: &mut SecurityPolicyMatrix,
        security_group: &SecurityGroupHandle,
        from: &SecurityGroupHandle,
    ) -> ProvisioningResult<LogicalId> {
        if security_group.tier != SecurityTier::Database {
            return Err(ProvisioningError::InvalidConfiguration(format!(
                "{} does not protect the database tier",
                security_group.id
            )));
        }
        let label = format!("Database access from {}", from.tier.segment().to_lowercase());
        matrix.allow(
            security_group,
            from.as_source(),
            Protocol::Tcp,
            self.config.database.port,
            &label,
        )
    }

    /// Declare the key and cluster
    ///
    /// `gated_by` lists resources (normally the cluster's ingress rules) that
    /// must complete before the cluster starts.
    pub fn provision(
        &self,
        graph: &mut ResourceGraph,
        network: &NetworkTopology,
        security_group: &SecurityGroupHandle,
        credentials: SecretRef,
        database_name: &str,
        gated_by: &[LogicalId],
    ) -> ProvisioningResult<DatabaseCluster> {
        if security_group.tier != SecurityTier::Database {
            return Err(ProvisioningError::InvalidConfiguration(format!(
                "{} does not protect the database tier",
                security_group.id
            )));
        }

        let database_name = normalize_database_name(database_name);
        crate::domain::invariants::validate_database_name(&database_name)
            .map_err(|e| ProvisioningError::InvalidConfiguration(e.to_string()))?;

        let base = LogicalId::new(self.base.clone())?;
        let key = base.child("RdsKey")?;
        graph.declare(
            key.clone(),
            Declaration::EncryptionKey(EncryptionKeySpec {
                alias: format!("{}/mysql/rds", self.base),
                description: format!("Encryption key for {} storage", self.base),
                rotation_enabled: true,
                removal: RemovalPolicy::Destroy,
            }),
            &[],
        )?;

        let database = &self.config.database;
        let id = base.child("Cluster")?;
        graph.declare(
            id.clone(),
            Declaration::DatabaseCluster(DatabaseClusterSpec {
                network: network.network.clone(),
                security_group: security_group.id.clone(),
                encryption_key: key.clone(),
                tier: SubnetTier::PrivateIsolated,
                engine_version: database.engine_version.clone(),
                writer: WriterInstance {
                    name: format!("{}-Writer", self.base),
                    shape: database.writer_shape.clone(),
                },
                min_capacity: database.min_capacity,
                max_capacity: database.max_capacity,
                credentials: CredentialsRef {
                    username: database.username.clone(),
                    secret: credentials,
                },
                database_name: database_name.clone(),
                port: database.port,
                removal: RemovalPolicy::Destroy,
            }),
            gated_by,
        )?;

        tracing::debug!(
            cluster = %id,
            database = %database_name,
            gates = gated_by.len(),
            "declared data tier"
        );

        Ok(DatabaseCluster {
            id,
            encryption_key: key,
            security_group: security_group.clone(),
            database_name,
            port: database.port,
        })
    }
}
