// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! Background timer sweep.
//!
//! Deadlines are coarse (whole hours), so a periodic sweep is enough: every
//! tick the worker asks the engine to fire due timers and re-evaluate those
//! questions. The engine lock makes a sweep pass and a concurrent answer
//! serialize; both closing the same question is impossible.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::engine::PollEngine;

/// Run the sweep loop until the shutdown signal flips to `true`.
///
/// A failed pass is logged and the loop keeps going; the next tick retries
/// against whatever state the store is in by then.
pub async fn run_sweep_with_shutdown(
    engine: Arc<PollEngine>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(interval_secs = interval.as_secs(), "timer sweep started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("timer sweep received shutdown signal");
                    break;
                }
            }

            _ = ticker.tick() => {
                match engine.sweep_due_timers().await {
                    Ok(0) => {}
                    Ok(fired) => debug!(fired, "sweep pass fired timers"),
                    Err(e) => error!("sweep pass failed: {}", e),
                }
            }
        }
    }

    info!("timer sweep stopped");
}
