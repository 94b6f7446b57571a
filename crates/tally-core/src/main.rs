// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! Tally Core - Chat Poll Lifecycle Engine
//!
//! The standalone binary runs the engine with the logging notifier: useful
//! for smoke-testing a database and watching the sweep close questions.
//! Real deployments embed [`tally_core::runtime::EngineRuntime`] in a chat
//! front end and supply their own notifier.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use tally_core::config::Config;
use tally_core::runtime::EngineRuntime;
use tally_core::store::{SqliteStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tally_core=info".parse().unwrap()),
        )
        .init();

    info!("Starting Tally Core");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        sweep_interval_secs = config.sweep_interval.as_secs(),
        results_audience = ?config.results_audience,
        "Configuration loaded"
    );

    // Open the database; migrations run inside from_path
    info!("Opening database...");
    let path = config
        .database_url
        .strip_prefix("sqlite:")
        .unwrap_or(&config.database_url);
    let store = Arc::new(SqliteStore::from_path(path).await?);

    store.health_check().await?;
    info!("Database health check passed");

    let runtime = EngineRuntime::builder()
        .store(store)
        .sweep_interval(config.sweep_interval)
        .results_audience(config.results_audience)
        .build()?
        .start()
        .await?;

    info!("Tally Core initialized successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    runtime.shutdown().await?;
    info!("Shutdown complete");

    Ok(())
}
