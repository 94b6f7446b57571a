// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! Tally Core - Chat Poll Lifecycle Engine
//!
//! This crate drives community polls over a chat transport: moderators draft
//! questions, every participant gets each open question exactly once, votes
//! accumulate per variant, and questions close themselves when their
//! completion rules fire. All durable state lives in SQLite; the chat front
//! end only formats and ships [`notify::Notice`] values.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Chat Front End                          │
//! │          (command routing, message formatting)               │
//! └─────────────────────────────────────────────────────────────┘
//!        │  calls                                  ▲  Notice
//!        ▼                                         │
//! ┌───────────────────────┐              ┌─────────────────────┐
//! │      PollEngine       │─────────────▶│      Notifier       │
//! │  (This Crate)         │              │  (trait, app-owned) │
//! │  lifecycle + tally    │              └─────────────────────┘
//! └───────────────────────┘
//!        │                ▲
//!        ▼                │ sweep every N seconds
//! ┌───────────────────────┐
//! │        SQLite         │      ┌─────────────────────┐
//! │   (Durable Storage)   │      │    Timer Sweep      │
//! └───────────────────────┘      └─────────────────────┘
//! ```
//!
//! # Question State Machine
//!
//! ```text
//!      ┌──────────┐
//!      │ DRAFTING │───── discard ────▶ (deleted)
//!      └────┬─────┘
//!           │ commit
//!           ▼
//!      ┌──────────┐
//!      │   OPEN   │◀── votes, skips, deadline ticks
//!      └────┬─────┘
//!           │ completion rule fires / force close
//!           ▼
//!      ┌──────────┐
//!      │  CLOSED  │──── results published
//!      └──────────┘
//! ```
//!
//! A question closes as soon as any of these holds:
//!
//! | Rule | Condition |
//! |------|-----------|
//! | Maximum reached | `max_votes > 0` and the vote count reached it |
//! | Everyone done | no pending assignment remains |
//! | Deadline passed | a deadline was set, its timer fired, and the minimum is met |
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `TALLY_DATABASE_URL` | Yes | - | SQLite connection string or file path |
//! | `TALLY_SWEEP_INTERVAL_SECS` | No | `30` | Timer sweep period in seconds |
//! | `TALLY_RESULTS_AUDIENCE` | No | `all` | `all` or `respondents` |
//!
//! # Modules
//!
//! - [`config`]: Configuration from environment variables
//! - [`engine`]: The lifecycle controller and completion detection
//! - [`error`]: Error types with stable error codes
//! - [`migrations`]: Embedded schema migrations
//! - [`notify`]: Structured notices and the delivery trait
//! - [`rules`]: Completion-rule resolution and parsing
//! - [`runtime`]: Embeddable runtime (engine + sweep worker)
//! - [`session`]: Per-participant draft editing sessions
//! - [`store`]: Persistence trait and the SQLite backend
//! - [`sweep`]: Background timer sweep loop
//! - [`timers`]: In-memory deadline table

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// The poll lifecycle engine: drafts, queues, votes, completion.
pub mod engine;

/// Error types for engine operations.
pub mod error;

/// Embedded SQLite schema migrations.
pub mod migrations;

/// Structured notices and the notification sink trait.
pub mod notify;

pub(crate) mod queue;

/// Completion rules: resolution of partial triples and free-form parsing.
pub mod rules;

/// Embeddable runtime combining the engine with the sweep worker.
pub mod runtime;

/// Transient per-participant editing sessions.
pub mod session;

/// Persistence trait, record types, and the SQLite store.
pub mod store;

/// Background sweep loop that fires question deadlines.
pub mod sweep;

/// In-memory deadline table rebuilt from storage at startup.
pub mod timers;
