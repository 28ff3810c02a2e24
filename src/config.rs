// Copyright (c) 2025 - Cowboy AI, Inc.
//! Environment Configuration
//!
//! Every component constructor receives an explicit [`EnvironmentConfig`].
//! There is no ambient environment prefix: two environments in one process
//! are just two config values.
//!
//! Configuration can be built in code ([`EnvironmentConfig::new`]), parsed
//! from JSON, or loaded from `STACK_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::invariants::{
    validate_availability_domains, validate_capacity_range, validate_database_name,
    validate_environment_prefix,
};
use crate::domain::{normalize_database_name, ports, CidrBlock, NetworkError, ValidationError};
use crate::pipeline::DeployStrategy;
use crate::secrets::SecretRef;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid network configuration: {0}")]
    Network(#[from] NetworkError),

    #[error("Malformed configuration document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {var}: {reason}")]
    InvalidVariable { var: &'static str, reason: String },
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which export profile the environment publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyVariant {
    /// Network, database and security group exports only
    #[default]
    Standard,
    /// Each compute tier is one directly addressed instance, so the web and
    /// app instance identifiers join the export contract
    SingleTier,
}

/// Account and region the environment is provisioned into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountScope {
    pub account: String,
    pub region: String,
}

impl Default for AccountScope {
    fn default() -> Self {
        Self {
            account: "000000000000".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

/// Network topology settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Address block of the whole network
    pub cidr: CidrBlock,

    /// Number of availability domains every tier spans
    #[serde(default = "default_availability_domains")]
    pub availability_domains: u8,

    /// Prefix length of each public subnet
    #[serde(default = "default_public_mask")]
    pub public_mask: u8,

    /// Prefix length of each private-with-egress subnet
    #[serde(default = "default_public_mask")]
    pub private_mask: u8,

    /// Prefix length of each isolated subnet
    #[serde(default = "default_isolated_mask")]
    pub isolated_mask: u8,

    /// Record network-wide traffic logs
    #[serde(default = "default_true")]
    pub flow_logs: bool,
}

fn default_availability_domains() -> u8 {
    3
}

fn default_public_mask() -> u8 {
    24
}

fn default_isolated_mask() -> u8 {
    28
}

fn default_true() -> bool {
    true
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: CidrBlock::from_parts(std::net::Ipv4Addr::new(10, 0, 0, 0), 16)
                .unwrap_or_else(|_| CidrBlock::anywhere()),
            availability_domains: default_availability_domains(),
            public_mask: default_public_mask(),
            private_mask: default_public_mask(),
            isolated_mask: default_isolated_mask(),
            flow_logs: true,
        }
    }
}

/// Compute tier settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// Key pair name installed on every node
    pub key_name: Option<String>,
    pub bastion_shape: String,
    pub web_shape: String,
    pub app_shape: String,
    pub machine_image: String,
    /// Port the application tier serves on
    pub app_port: u16,
    /// First-boot payload of the web tier
    pub web_payload: Option<PathBuf>,
    /// First-boot payload of the app tier
    pub app_payload: Option<PathBuf>,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            key_name: None,
            bastion_shape: "t2.micro".to_string(),
            web_shape: "t2.micro".to_string(),
            app_shape: "t2.micro".to_string(),
            machine_image: "amazon-linux-2/x86_64".to_string(),
            app_port: ports::TOMCAT,
            web_payload: None,
            app_payload: None,
        }
    }
}

/// Data tier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub engine_version: String,
    pub writer_shape: String,
    pub min_capacity: f64,
    pub max_capacity: f64,
    pub username: String,
    /// Pointer to the stored master password
    pub credentials_secret: SecretRef,
    /// Database name before normalization (defaults to `<prefix>database`)
    pub name: Option<String>,
    pub port: u16,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine_version: "aurora-mysql-3.04.0".to_string(),
            writer_shape: "t3.medium".to_string(),
            min_capacity: 0.5,
            max_capacity: 2.0,
            username: "admin".to_string(),
            credentials_secret: SecretRef::new("mysql-token"),
            name: None,
            port: ports::MYSQL,
        }
    }
}

/// Source repository watched by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub owner: String,
    pub name: String,
    pub branch: String,
    /// Pointer to the stored access token
    pub token_secret: SecretRef,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            owner: "Connie-B".to_string(),
            name: "aws-simple-java-web-app".to_string(),
            branch: "main".to_string(),
            token_secret: SecretRef::new("github-token"),
        }
    }
}

/// Delivery pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub repository: RepositoryConfig,
    /// Existing artifact store shared by the stages
    pub artifact_store: String,
    pub build_image: String,
    #[serde(default)]
    pub deploy_strategy: DeployStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            repository: RepositoryConfig::default(),
            artifact_store: "arn:aws:s3:::mydev-artifacts-bucket".to_string(),
            build_image: "aws/codebuild/amazonlinux2-x86_64-standard:3.0".to_string(),
            deploy_strategy: DeployStrategy::default(),
        }
    }
}

/// Tag values deployment targets carry and the deploy stage selects on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub application_name: String,
    pub stage: String,
}

/// Complete configuration of one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Environment prefix (`dev`, `qa`, ...) scoping every name and export
    pub prefix: String,
    #[serde(default)]
    pub account: AccountScope,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub deployment: DeploymentConfig,
    #[serde(default)]
    pub variant: TopologyVariant,
}

impl EnvironmentConfig {
    /// Configuration with the documented defaults for `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            account: AccountScope::default(),
            network: NetworkConfig::default(),
            compute: ComputeConfig {
                key_name: Some(format!("{prefix}KeyPair")),
                ..ComputeConfig::default()
            },
            database: DatabaseConfig::default(),
            pipeline: PipelineConfig::default(),
            deployment: DeploymentConfig {
                application_name: format!("{prefix}-WebServer-App"),
                stage: prefix.clone(),
            },
            variant: TopologyVariant::default(),
            prefix,
        }
    }

    /// Parse a JSON configuration document and validate it
    pub fn from_json_str(document: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `STACK_*` environment variables
    ///
    /// Unset variables fall back to the defaults of [`EnvironmentConfig::new`].
    pub fn from_env() -> ConfigResult<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let prefix = var("STACK_ENV_PREFIX").unwrap_or_else(|| "dev".to_string());
        let mut config = Self::new(prefix);

        if let Some(account) = var("STACK_ACCOUNT") {
            config.account.account = account;
        }
        if let Some(region) = var("STACK_REGION") {
            config.account.region = region;
        }
        if let Some(cidr) = var("STACK_VPC_CIDR") {
            config.network.cidr =
                CidrBlock::new(&cidr).map_err(|e| ConfigError::InvalidVariable {
                    var: "STACK_VPC_CIDR",
                    reason: e.to_string(),
                })?;
        }
        if let Some(key_name) = var("STACK_KEY_NAME") {
            config.compute.key_name = Some(key_name);
        }
        if let Some(secret) = var("STACK_DB_SECRET") {
            config.database.credentials_secret = SecretRef::new(secret);
        }
        if let Some(owner) = var("STACK_GITHUB_OWNER") {
            config.pipeline.repository.owner = owner;
        }
        if let Some(repo) = var("STACK_GITHUB_REPO") {
            config.pipeline.repository.name = repo;
        }
        if let Some(branch) = var("STACK_GITHUB_BRANCH") {
            config.pipeline.repository.branch = branch;
        }
        if let Some(secret) = var("STACK_GITHUB_TOKEN_SECRET") {
            config.pipeline.repository.token_secret = SecretRef::new(secret);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        validate_environment_prefix(&self.prefix)?;
        validate_availability_domains(self.network.availability_domains)?;
        validate_capacity_range(self.database.min_capacity, self.database.max_capacity)?;
        validate_database_name(&self.database_name())?;

        // The tier layout must fit into the block before anything is declared.
        self.network.cidr.carve(&self.subnet_masks())?;

        if self.deployment.stage.is_empty() || self.deployment.application_name.is_empty() {
            return Err(ValidationError::BusinessRule(
                "deployment tag selector needs both application name and stage".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Normalized database name
    ///
    /// Without an explicit name the prefix is used with hyphens mapped to
    /// underscores, so every valid prefix yields a valid name.
    pub fn database_name(&self) -> String {
        let raw = self
            .database
            .name
            .clone()
            .unwrap_or_else(|| format!("{}database", self.prefix.replace('-', "_")));
        normalize_database_name(&raw)
    }

    /// Subnet masks in allocation order (tier by tier, one per domain)
    pub fn subnet_masks(&self) -> Vec<u8> {
        let domains = usize::from(self.network.availability_domains);
        [
            self.network.public_mask,
            self.network.private_mask,
            self.network.isolated_mask,
        ]
        .iter()
        .flat_map(|mask| std::iter::repeat(*mask).take(domains))
        .collect()
    }

    /// Prefix a name with the environment (`<prefix>-<name>`)
    pub fn scoped(&self, name: &str) -> String {
        format!("{}-{}", self.prefix, name)
    }
}
