// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! Common test infrastructure for tally-core integration tests.
//!
//! Provides TestContext for setting up an in-memory store, a recording
//! notifier, and an engine wired to both.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use tally_core::engine::{PollEngine, ResultsAudience};
use tally_core::notify::{Notice, Notifier};
use tally_core::store::{SqliteStore, Store};

/// Notifier that records every delivery for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<(i64, Notice)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, chat_id: i64, notice: Notice) {
        self.deliveries.lock().unwrap().push((chat_id, notice));
    }
}

impl RecordingNotifier {
    /// All deliveries so far, in order.
    pub fn all(&self) -> Vec<(i64, Notice)> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Deliveries addressed to one chat, in order.
    pub fn for_chat(&self, chat_id: i64) -> Vec<Notice> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.deliveries.lock().unwrap().clear();
    }
}

/// Test context wiring an in-memory store and a recording notifier into
/// an engine.
pub struct TestContext {
    pub store: Arc<SqliteStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: PollEngine,
}

impl TestContext {
    /// Create a context publishing results to all participants.
    pub async fn new() -> Self {
        Self::with_audience(ResultsAudience::AllParticipants).await
    }

    /// Create a context with an explicit results audience.
    pub async fn with_audience(audience: ResultsAudience) -> Self {
        let store = Arc::new(
            SqliteStore::in_memory()
                .await
                .expect("Failed to open in-memory store"),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = PollEngine::new(store.clone(), notifier.clone(), audience);

        Self {
            store,
            notifier,
            engine,
        }
    }

    /// Register a participant and return their id.
    pub async fn participant(&self, chat_id: i64) -> i64 {
        self.engine
            .contact(chat_id)
            .await
            .expect("Failed to register participant")
            .id
    }

    /// Drive a draft through text, variants, and rules, then commit it.
    /// Returns the now-open question's id.
    pub async fn committed_question(
        &self,
        author_id: i64,
        text: &str,
        variants: &[&str],
        rules: (i64, i64, i64),
    ) -> i64 {
        let question_id = self
            .engine
            .start_draft(author_id)
            .await
            .expect("Failed to start draft");

        self.engine
            .set_draft_text(question_id, text)
            .await
            .expect("Failed to set draft text");

        let variants: Vec<String> = variants.iter().map(|v| v.to_string()).collect();
        self.engine
            .set_draft_variants(question_id, &variants)
            .await
            .expect("Failed to set draft variants");

        self.engine
            .set_draft_rules(question_id, rules.0, rules.1, rules.2)
            .await
            .expect("Failed to set draft rules");

        self.engine
            .commit_draft(question_id)
            .await
            .expect("Failed to commit draft");

        question_id
    }

    /// Question status as stored, e.g. "open".
    pub async fn question_status(&self, question_id: i64) -> Option<String> {
        self.store
            .get_question(question_id)
            .await
            .expect("Failed to load question")
            .map(|q| q.status)
    }

    /// Stored ready flag for a participant.
    pub async fn is_ready(&self, participant_id: i64) -> bool {
        self.store
            .get_participant(participant_id)
            .await
            .expect("Failed to load participant")
            .expect("Participant missing")
            .is_ready
    }

    /// Pending question ids for a participant, ascending.
    pub async fn pending(&self, participant_id: i64) -> Vec<i64> {
        self.store
            .pending_for_participant(participant_id)
            .await
            .expect("Failed to load pending assignments")
    }

    /// Vote counts per variant, in variant order.
    pub async fn vote_counts(&self, question_id: i64) -> Vec<i64> {
        self.store
            .variants(question_id)
            .await
            .expect("Failed to load variants")
            .into_iter()
            .map(|v| v.votes)
            .collect()
    }
}
