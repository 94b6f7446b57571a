// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! Persistence interface and backend for the poll engine.
//!
//! The [`Store`] trait is the only way the engine touches durable state.
//! Every method is a single atomic operation against one entity family;
//! cross-entity orchestration lives in the engine, under its lock.

pub mod sqlite;

pub use self::sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EngineError;

/// Lifecycle status of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionStatus {
    /// Being authored; not visible to participants.
    Drafting,
    /// Accepting answers.
    Open,
    /// Completion rule fired; no further answers accepted.
    Closed,
}

impl QuestionStatus {
    /// Stable string form stored in the `questions.status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drafting => "drafting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "drafting" => Some(Self::Drafting),
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Participant row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ParticipantRecord {
    /// Internal id.
    pub id: i64,
    /// Stable external chat identifier.
    pub chat_id: i64,
    /// True iff no pending assignment and no active editing session.
    pub is_ready: bool,
    /// Banned participants cannot author questions.
    #[sqlx(default)]
    pub banned: bool,
}

/// Question row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuestionRecord {
    /// Internal id; also the per-participant delivery order.
    pub id: i64,
    /// Author, NULL once the author row is removed.
    pub author: Option<i64>,
    /// Question text, NULL until set during drafting.
    pub text: Option<String>,
    /// Stored status string, see [`QuestionStatus`].
    pub status: String,
    /// Minimum answers before a fired deadline may close (0 = none).
    pub min_votes: Option<i64>,
    /// Answer count that closes immediately (0 = none).
    pub max_votes: Option<i64>,
    /// Relative deadline in hours, captured while drafting (0 = none).
    pub duration_hours: Option<i64>,
    /// Absolute deadline, written on commit.
    pub closes_at: Option<DateTime<Utc>>,
}

impl QuestionRecord {
    /// Decode the stored status, treating an unknown value as corruption.
    pub fn status(&self) -> Result<QuestionStatus, EngineError> {
        QuestionStatus::parse(&self.status).ok_or(EngineError::Storage {
            operation: "decode_status",
            details: format!("question {} has unknown status '{}'", self.id, self.status),
        })
    }

    /// True once `set_question_rules` ran at least once for this question.
    pub fn rules_set(&self) -> bool {
        self.min_votes.is_some()
    }
}

/// Answer variant row, ordered by `position` (0-based).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VariantRecord {
    /// Owning question.
    pub question_id: i64,
    /// Display order and the index used when recording an answer.
    pub position: i64,
    /// Variant text.
    pub text: String,
    /// Running vote count.
    pub votes: i64,
}

/// Persistence interface used by the engine.
#[allow(missing_docs)]
#[async_trait]
pub trait Store: Send + Sync {
    // ------------------------------------------------------------------
    // Participants
    // ------------------------------------------------------------------

    /// Fetch the participant for a chat id, creating the row on first
    /// contact. Safe to call on every inbound update.
    async fn ensure_participant(&self, chat_id: i64) -> Result<ParticipantRecord, EngineError>;

    async fn get_participant(&self, id: i64) -> Result<Option<ParticipantRecord>, EngineError>;

    async fn set_ready(&self, id: i64, ready: bool) -> Result<(), EngineError>;

    async fn set_banned(&self, id: i64) -> Result<(), EngineError>;

    /// Chat ids of every known participant (results broadcast).
    async fn all_chat_ids(&self) -> Result<Vec<i64>, EngineError>;

    /// Participants currently flagged ready.
    async fn ready_participants(&self) -> Result<Vec<ParticipantRecord>, EngineError>;

    // ------------------------------------------------------------------
    // Questions and variants
    // ------------------------------------------------------------------

    /// Create a new drafting question and return its id.
    async fn create_draft(&self, author: i64) -> Result<i64, EngineError>;

    /// The author's drafting question, if any. At most one exists.
    async fn drafting_question_for(&self, author: i64) -> Result<Option<i64>, EngineError>;

    async fn get_question(&self, id: i64) -> Result<Option<QuestionRecord>, EngineError>;

    async fn set_question_text(&self, id: i64, text: &str) -> Result<(), EngineError>;

    /// Replace the full variant set (delete + recreate, never a merge).
    async fn replace_variants(&self, question_id: i64, texts: &[String])
    -> Result<(), EngineError>;

    async fn set_question_rules(
        &self,
        id: i64,
        min_votes: i64,
        max_votes: i64,
        duration_hours: i64,
    ) -> Result<(), EngineError>;

    async fn set_question_status(&self, id: i64, status: QuestionStatus)
    -> Result<(), EngineError>;

    async fn set_closes_at(
        &self,
        id: i64,
        closes_at: Option<DateTime<Utc>>,
    ) -> Result<(), EngineError>;

    /// Delete the question row; variants, answers, and pending
    /// assignments cascade.
    async fn delete_question(&self, id: i64) -> Result<(), EngineError>;

    async fn open_questions(&self) -> Result<Vec<QuestionRecord>, EngineError>;

    /// The most recently closed questions, ascending by id.
    async fn last_closed_questions(&self, limit: i64) -> Result<Vec<QuestionRecord>, EngineError>;

    /// An author's most recently published (open or closed) questions,
    /// ascending by id.
    async fn questions_by_author(
        &self,
        author: i64,
        limit: i64,
    ) -> Result<Vec<QuestionRecord>, EngineError>;

    /// The most recently published (open or closed) questions, ascending
    /// by id.
    async fn last_published_questions(
        &self,
        limit: i64,
    ) -> Result<Vec<QuestionRecord>, EngineError>;

    /// Variants of a question ordered by position.
    async fn variants(&self, question_id: i64) -> Result<Vec<VariantRecord>, EngineError>;

    async fn variant_count(&self, question_id: i64) -> Result<i64, EngineError>;

    // ------------------------------------------------------------------
    // Answers
    // ------------------------------------------------------------------

    /// Record a vote: insert the answered record and bump the chosen
    /// variant's count, atomically.
    async fn record_vote(
        &self,
        question_id: i64,
        participant_id: i64,
        position: i64,
    ) -> Result<(), EngineError>;

    /// Record an explicit skip (answered record with no variant).
    async fn record_skip(&self, question_id: i64, participant_id: i64)
    -> Result<(), EngineError>;

    /// Number of answers that chose a variant (skips excluded).
    async fn vote_total(&self, question_id: i64) -> Result<i64, EngineError>;

    /// Chat ids of participants whose answer chose a variant.
    async fn respondent_chat_ids(&self, question_id: i64) -> Result<Vec<i64>, EngineError>;

    // ------------------------------------------------------------------
    // Pending assignments
    // ------------------------------------------------------------------

    /// Queue an open question for every known participant.
    async fn enqueue_for_all(&self, question_id: i64) -> Result<(), EngineError>;

    /// Queue every open question the participant has neither pending nor
    /// answered. Idempotent.
    async fn enqueue_open_for(&self, participant_id: i64) -> Result<(), EngineError>;

    /// The participant's next question: minimum pending question id.
    async fn next_pending(&self, participant_id: i64) -> Result<Option<i64>, EngineError>;

    /// Remove one assignment; returns false if it did not exist.
    async fn remove_pending(
        &self,
        participant_id: i64,
        question_id: i64,
    ) -> Result<bool, EngineError>;

    /// Drop every remaining assignment for a question.
    async fn clear_pending_for_question(&self, question_id: i64) -> Result<(), EngineError>;

    /// Participants still holding an assignment for this question.
    async fn pending_participants(
        &self,
        question_id: i64,
    ) -> Result<Vec<ParticipantRecord>, EngineError>;

    async fn pending_count(&self, question_id: i64) -> Result<i64, EngineError>;

    /// All pending question ids for a participant, ascending.
    async fn pending_for_participant(&self, participant_id: i64)
    -> Result<Vec<i64>, EngineError>;

    // ------------------------------------------------------------------
    // Misc
    // ------------------------------------------------------------------

    /// Cheap connectivity probe.
    async fn health_check(&self) -> Result<bool, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            QuestionStatus::Drafting,
            QuestionStatus::Open,
            QuestionStatus::Closed,
        ] {
            assert_eq!(QuestionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(QuestionStatus::parse("editing"), None);
    }

    #[test]
    fn unknown_status_is_storage_error() {
        let record = QuestionRecord {
            id: 1,
            author: None,
            text: None,
            status: "bogus".to_string(),
            min_votes: None,
            max_votes: None,
            duration_hours: None,
            closes_at: None,
        };
        assert!(matches!(
            record.status(),
            Err(EngineError::Storage { .. })
        ));
    }
}
