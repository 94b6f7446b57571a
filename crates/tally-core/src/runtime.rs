// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! Embeddable runtime for the poll engine.
//!
//! This module provides [`EngineRuntime`] which allows embedding the engine
//! into an existing tokio application (typically a chat front end) instead
//! of running the standalone binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_core::runtime::EngineRuntime;
//! use tally_core::store::sqlite::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(SqliteStore::from_path("tally.db").await?);
//!
//!     let runtime = EngineRuntime::builder()
//!         .store(store)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... wire runtime.engine() into your chat handlers ...
//!
//!     // Graceful shutdown
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::engine::{PollEngine, ResultsAudience};
use crate::notify::{LogNotifier, Notifier};
use crate::store::Store;
use crate::sweep::run_sweep_with_shutdown;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Builder for creating an [`EngineRuntime`].
pub struct EngineRuntimeBuilder {
    store: Option<Arc<dyn Store>>,
    notifier: Option<Arc<dyn Notifier>>,
    sweep_interval: Duration,
    results_audience: ResultsAudience,
}

impl std::fmt::Debug for EngineRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRuntimeBuilder")
            .field("store", &self.store.as_ref().map(|_| "..."))
            .field("notifier", &self.notifier.as_ref().map(|_| "..."))
            .field("sweep_interval", &self.sweep_interval)
            .field("results_audience", &self.results_audience)
            .finish()
    }
}

impl Default for EngineRuntimeBuilder {
    fn default() -> Self {
        Self {
            store: None,
            notifier: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            results_audience: ResultsAudience::default(),
        }
    }
}

impl EngineRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the store (required).
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the notification sink.
    ///
    /// Default: [`LogNotifier`], which only logs deliveries.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Set the timer sweep period.
    ///
    /// Default: 30 seconds
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set who receives published results when a question closes.
    ///
    /// Default: every known participant
    pub fn results_audience(mut self, audience: ResultsAudience) -> Self {
        self.results_audience = audience;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<EngineRuntimeConfig> {
        let store = self.store.ok_or_else(|| anyhow::anyhow!("store is required"))?;

        Ok(EngineRuntimeConfig {
            store,
            notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            sweep_interval: self.sweep_interval,
            results_audience: self.results_audience,
        })
    }
}

/// Configuration for an [`EngineRuntime`].
pub struct EngineRuntimeConfig {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    sweep_interval: Duration,
    results_audience: ResultsAudience,
}

impl std::fmt::Debug for EngineRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRuntimeConfig")
            .field("store", &"...")
            .field("notifier", &"...")
            .field("sweep_interval", &self.sweep_interval)
            .field("results_audience", &self.results_audience)
            .finish()
    }
}

impl EngineRuntimeConfig {
    /// Start the runtime: rehydrate timers from stored deadlines, then
    /// spawn the sweep worker.
    pub async fn start(self) -> Result<EngineRuntime> {
        let engine = Arc::new(PollEngine::new(
            self.store,
            self.notifier,
            self.results_audience,
        ));

        engine.rehydrate_timers().await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweep_handle = tokio::spawn(run_sweep_with_shutdown(
            engine.clone(),
            self.sweep_interval,
            shutdown_rx,
        ));

        info!(
            sweep_interval_secs = self.sweep_interval.as_secs(),
            "EngineRuntime started"
        );

        Ok(EngineRuntime {
            engine,
            sweep_handle,
            shutdown_tx,
        })
    }
}

/// A running poll engine that can be embedded in an application.
///
/// The runtime manages:
/// - the background timer sweep that closes questions at their deadline
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct EngineRuntime {
    engine: Arc<PollEngine>,
    sweep_handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl EngineRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> EngineRuntimeBuilder {
        EngineRuntimeBuilder::new()
    }

    /// Get a handle to the engine for wiring into request handlers.
    pub fn engine(&self) -> &Arc<PollEngine> {
        &self.engine
    }

    /// Gracefully shut down the runtime.
    ///
    /// This signals the sweep worker to stop and waits for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        info!("EngineRuntime shutting down...");

        // Signal shutdown
        let _ = self.shutdown_tx.send(true);

        // Wait for the sweep task to complete
        match self.sweep_handle.await {
            Ok(()) => {
                info!("EngineRuntime shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("EngineRuntime sweep task panicked: {}", e);
                Err(anyhow::anyhow!("sweep task panicked: {}", e))
            }
        }
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        !self.sweep_handle.is_finished()
    }
}
