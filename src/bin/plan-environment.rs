// Copyright (c) 2025 - Cowboy AI, Inc.
//! Environment Planner
//!
//! Declares the environment and pipeline stacks from `STACK_*` variables,
//! applies both to an in-memory account, and prints the provisioning order
//! and published exports as JSON.
//!
//! Run with: cargo run --bin plan-environment
//!
//! Optional:
//! - STACK_ENV_PREFIX, STACK_VPC_CIDR, ... (see `EnvironmentConfig::from_env`)
//! - STACK_CONFIG_FILE: JSON configuration document used instead of variables

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use layered_stack::pipeline::PipelineStackBuilder;
use layered_stack::secrets::InMemorySecretStore;
use layered_stack::{
    BootPayloads, EnvironmentConfig, EnvironmentStack, GraphExecutor, InMemoryProvider,
};

async fn load_config() -> Result<EnvironmentConfig> {
    match std::env::var("STACK_CONFIG_FILE") {
        Ok(path) => {
            let document = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {path}"))?;
            EnvironmentConfig::from_json_str(&document).with_context(|| format!("parsing {path}"))
        }
        Err(_) => EnvironmentConfig::from_env().context("loading STACK_* configuration"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Planning environment");

    let config = load_config().await?;
    info!("📋 Environment: {} in {}", config.prefix, config.account.region);

    let payloads = BootPayloads::load(&config)
        .await
        .context("loading boot payloads")?;
    let environment =
        EnvironmentStack::assemble(config.clone(), payloads).context("declaring environment")?;
    let pipeline = PipelineStackBuilder::new(&config)
        .build()
        .context("declaring pipeline stack")?;

    // Placeholder credentials: the in-memory account only checks that they resolve.
    let secrets = InMemorySecretStore::new()
        .with_secret(config.database.credentials_secret.name(), "planned")
        .with_secret(config.pipeline.repository.token_secret.name(), "planned");
    let provider = Arc::new(InMemoryProvider::new(
        config.account.clone(),
        Arc::new(secrets),
    ));
    let executor = GraphExecutor::new(provider.clone());

    let environment_run = environment
        .apply(&executor)
        .await
        .context("applying environment stack")?;
    let pipeline_run = pipeline
        .apply(&executor)
        .await
        .context("applying pipeline stack")?;

    let waves: Vec<Vec<String>> = environment
        .graph()
        .waves()
        .context("ordering environment")?
        .into_iter()
        .map(|wave| wave.into_iter().map(|id| id.to_string()).collect())
        .collect();

    let plan = json!({
        "environment": {
            "stack": environment_run.stack,
            "waves": waves,
            "orchestration": environment_run.log,
            "outputs": environment_run.outputs,
        },
        "pipeline": {
            "stack": pipeline_run.stack,
            "orchestration": pipeline_run.log,
            "outputs": pipeline_run.outputs,
        },
        "exports": provider.exports().await,
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&plan).context("rendering plan")?
    );

    info!("✅ Planned {} exports", provider.exports().await.len());
    Ok(())
}
