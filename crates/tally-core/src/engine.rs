// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! The poll lifecycle engine.
//!
//! [`PollEngine`] owns the question state machine (draft → open → closed),
//! vote recording, per-participant pending queues, editing sessions, and
//! completion detection. One `tokio::sync::Mutex` over [`SharedState`]
//! serializes every mutating operation together with the timer sweep, so
//! a deadline-driven sweep and a live answer can never disagree about
//! whether a question closed: whichever runs first closes it, the other
//! sees `Closed` and backs off.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::notify::{DraftField, Notice, Notifier, ResultsFacts, RuleProgress, VariantTally};
use crate::queue;
use crate::rules::CompletionRules;
use crate::session::{self, EditingSession, SessionTracker};
use crate::store::{ParticipantRecord, QuestionRecord, QuestionStatus, Store};
use crate::timers::TimerTable;

/// Who receives the published results of a closed question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultsAudience {
    /// Every known participant.
    #[default]
    AllParticipants,
    /// Only participants who chose a variant.
    Respondents,
}

impl FromStr for ResultsAudience {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::AllParticipants),
            "respondents" => Ok(Self::Respondents),
            other => Err(format!(
                "unknown results audience '{}' (expected 'all' or 'respondents')",
                other
            )),
        }
    }
}

/// What a piece of free-form input was applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputApplied {
    /// The draft's text was set.
    TextSet {
        /// The draft question.
        question_id: i64,
    },
    /// The draft's variant list was replaced.
    VariantsSet {
        /// The draft question.
        question_id: i64,
        /// Number of variants now on the draft.
        count: usize,
    },
    /// The draft's completion rules were set.
    RulesSet {
        /// The draft question.
        question_id: i64,
        /// The resolved rules.
        rules: CompletionRules,
    },
}

/// Result of recording an answer or a skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    /// True iff this interaction closed the question.
    pub question_closed: bool,
}

/// Listing entry for a published question: the running (or final) tally
/// plus, while the question is still open, its remaining-rule facts.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionDigest {
    /// Current lifecycle status (open or closed; drafts are never listed).
    pub status: QuestionStatus,
    /// Tally in the same shape results are published in.
    pub results: ResultsFacts,
    /// Remaining-rule facts; `Some` only while the question is open.
    pub progress: Option<RuleProgress>,
}

/// In-memory state shared between live operations and the sweep worker.
/// Only ever accessed through the engine's lock.
#[derive(Debug, Default)]
struct SharedState {
    timers: TimerTable,
    sessions: SessionTracker,
}

/// The lifecycle controller.
pub struct PollEngine {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    results_audience: ResultsAudience,
    shared: Mutex<SharedState>,
}

impl PollEngine {
    /// Create an engine over a store and a notification sink.
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        results_audience: ResultsAudience,
    ) -> Self {
        Self {
            store,
            notifier,
            results_audience,
            shared: Mutex::new(SharedState::default()),
        }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Participants
    // ------------------------------------------------------------------

    /// Register a chat identity on first contact (no-op afterwards) and
    /// return the participant.
    pub async fn contact(&self, chat_id: i64) -> Result<ParticipantRecord> {
        let _shared = self.shared.lock().await;
        self.store.ensure_participant(chat_id).await
    }

    /// Queue every currently open question the participant has neither
    /// answered nor been queued for, then advance them. Safe to call
    /// repeatedly; a second call leaves the assignment set unchanged.
    pub async fn onboard(&self, participant_id: i64) -> Result<()> {
        let shared = self.shared.lock().await;
        let participant = self.require_participant(participant_id).await?;

        self.store.enqueue_open_for(participant_id).await?;
        queue::advance_participant(
            self.store.as_ref(),
            self.notifier.as_ref(),
            &participant,
            shared.sessions.is_idle(participant_id),
        )
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Drafting
    // ------------------------------------------------------------------

    /// Start a new draft for an author. Fails if the author is banned or
    /// already has a draft in progress.
    pub async fn start_draft(&self, participant_id: i64) -> Result<i64> {
        let mut shared = self.shared.lock().await;
        let participant = self.require_participant(participant_id).await?;

        if participant.banned {
            return Err(EngineError::IllegalState {
                operation: "start_draft",
                reason: "participant is banned from authoring questions".to_string(),
            });
        }

        if let Some(existing) = self.store.drafting_question_for(participant_id).await? {
            return Err(EngineError::IllegalState {
                operation: "start_draft",
                reason: format!("draft {} is already in progress", existing),
            });
        }

        let question_id = self.store.create_draft(participant_id).await?;
        shared.sessions.set(participant_id, EditingSession::AwaitingText);
        self.store.set_ready(participant_id, false).await?;

        self.notifier
            .deliver(
                participant.chat_id,
                Notice::DraftPrompt {
                    field: DraftField::Text,
                },
            )
            .await;

        info!(question_id, author = participant_id, "draft started");
        Ok(question_id)
    }

    /// Enter the awaiting-text state for the participant's current draft.
    pub async fn begin_text_entry(&self, participant_id: i64) -> Result<()> {
        self.begin_entry(participant_id, EditingSession::AwaitingText, DraftField::Text)
            .await
    }

    /// Enter the awaiting-variants state for the participant's current draft.
    pub async fn begin_variant_entry(&self, participant_id: i64) -> Result<()> {
        self.begin_entry(
            participant_id,
            EditingSession::AwaitingVariants,
            DraftField::Variants,
        )
        .await
    }

    /// Enter the awaiting-rules state for the participant's current draft.
    pub async fn begin_rule_entry(&self, participant_id: i64) -> Result<()> {
        self.begin_entry(participant_id, EditingSession::AwaitingRules, DraftField::Rules)
            .await
    }

    async fn begin_entry(
        &self,
        participant_id: i64,
        state: EditingSession,
        field: DraftField,
    ) -> Result<()> {
        let mut shared = self.shared.lock().await;
        let participant = self.require_participant(participant_id).await?;

        if self.store.drafting_question_for(participant_id).await?.is_none() {
            shared.sessions.reset(participant_id);
            return Err(EngineError::IllegalState {
                operation: "edit_draft",
                reason: "no draft in progress".to_string(),
            });
        }

        shared.sessions.set(participant_id, state);
        self.store.set_ready(participant_id, false).await?;
        self.notifier
            .deliver(participant.chat_id, Notice::DraftPrompt { field })
            .await;

        Ok(())
    }

    /// Route free-form input through the participant's editing session.
    ///
    /// Valid input lands in the matching draft setter and returns the
    /// session to idle; input that fails validation keeps the session
    /// where it was. Input while idle, or while the draft has vanished,
    /// is an illegal state and resets the session.
    pub async fn apply_free_input(
        &self,
        participant_id: i64,
        input: &str,
    ) -> Result<InputApplied> {
        let mut shared = self.shared.lock().await;
        let participant = self.require_participant(participant_id).await?;

        let state = shared.sessions.get(participant_id);
        if state == EditingSession::Idle {
            return Err(EngineError::IllegalState {
                operation: "apply_input",
                reason: "no draft input expected".to_string(),
            });
        }

        let Some(question_id) = self.store.drafting_question_for(participant_id).await? else {
            shared.sessions.reset(participant_id);
            self.refresh_ready(&shared, &participant).await?;
            return Err(EngineError::IllegalState {
                operation: "apply_input",
                reason: "the draft being edited no longer exists".to_string(),
            });
        };

        let applied = match state {
            EditingSession::AwaitingText => {
                self.store.set_question_text(question_id, input).await?;
                InputApplied::TextSet { question_id }
            }
            EditingSession::AwaitingVariants => {
                let variants = session::parse_variants(input)?;
                self.store.replace_variants(question_id, &variants).await?;
                InputApplied::VariantsSet {
                    question_id,
                    count: variants.len(),
                }
            }
            EditingSession::AwaitingRules => {
                let rules = CompletionRules::parse(input)?;
                self.store
                    .set_question_rules(
                        question_id,
                        rules.min_votes,
                        rules.max_votes,
                        rules.duration_hours,
                    )
                    .await?;
                InputApplied::RulesSet { question_id, rules }
            }
            EditingSession::Idle => unreachable!("idle handled above"),
        };

        shared.sessions.reset(participant_id);
        self.refresh_ready(&shared, &participant).await?;

        Ok(applied)
    }

    /// Set the text of a drafting question.
    pub async fn set_draft_text(&self, question_id: i64, text: &str) -> Result<()> {
        let _shared = self.shared.lock().await;
        self.require_drafting(question_id).await?;
        self.store.set_question_text(question_id, text).await
    }

    /// Replace the variant set of a drafting question. The old set is
    /// deleted and recreated, never merged.
    pub async fn set_draft_variants(&self, question_id: i64, variants: &[String]) -> Result<()> {
        let _shared = self.shared.lock().await;
        self.require_drafting(question_id).await?;

        if variants.is_empty() {
            return Err(EngineError::InvalidInput {
                field: "variants",
                message: "variant list is empty".to_string(),
            });
        }

        self.store.replace_variants(question_id, variants).await
    }

    /// Set the completion rules of a drafting question from a raw
    /// `(min, max, hours)` triple; see [`CompletionRules::resolve`].
    pub async fn set_draft_rules(
        &self,
        question_id: i64,
        min_votes: i64,
        max_votes: i64,
        duration_hours: i64,
    ) -> Result<CompletionRules> {
        let _shared = self.shared.lock().await;
        self.require_drafting(question_id).await?;

        let rules = CompletionRules::resolve(min_votes, max_votes, duration_hours)?;
        self.store
            .set_question_rules(
                question_id,
                rules.min_votes,
                rules.max_votes,
                rules.duration_hours,
            )
            .await?;

        Ok(rules)
    }

    /// Commit a draft: open it, arm its deadline, and queue it for every
    /// known participant. Requires text, at least one variant, and rules.
    pub async fn commit_draft(&self, question_id: i64) -> Result<()> {
        let mut shared = self.shared.lock().await;
        let question = self.require_question(question_id).await?;

        if question.status()? != QuestionStatus::Drafting {
            return Err(EngineError::IllegalState {
                operation: "commit_draft",
                reason: format!("question {} is not in drafting state", question_id),
            });
        }

        let author = match question.author {
            Some(id) => self.store.get_participant(id).await?,
            None => None,
        };

        // A ban issued mid-draft voids the draft at commit time.
        if let Some(author) = author.as_ref().filter(|a| a.banned) {
            self.discard_locked(&mut shared, &question).await?;
            return Err(EngineError::IllegalState {
                operation: "commit_draft",
                reason: format!("author {} is banned", author.id),
            });
        }

        let has_text = question
            .text
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if !has_text {
            return Err(EngineError::IllegalState {
                operation: "commit_draft",
                reason: "the draft has no text".to_string(),
            });
        }

        if self.store.variant_count(question_id).await? == 0 {
            return Err(EngineError::IllegalState {
                operation: "commit_draft",
                reason: "the draft has no variants".to_string(),
            });
        }

        if !question.rules_set() {
            return Err(EngineError::IllegalState {
                operation: "commit_draft",
                reason: "the draft has no completion rules".to_string(),
            });
        }

        // Snapshot before enqueueing: these are the participants who get
        // the question delivered immediately.
        let ready_before = self.store.ready_participants().await?;

        self.store
            .set_question_status(question_id, QuestionStatus::Open)
            .await?;

        let duration_hours = question.duration_hours.unwrap_or(0);
        if duration_hours > 0 {
            let closes_at = Utc::now() + Duration::hours(duration_hours);
            self.store.set_closes_at(question_id, Some(closes_at)).await?;
            shared.timers.arm(question_id, closes_at);
        }

        self.store.enqueue_for_all(question_id).await?;

        if let Some(author) = author.as_ref() {
            shared.sessions.reset(author.id);
            self.notifier
                .deliver(author.chat_id, Notice::DraftCommitted { question_id })
                .await;
            queue::advance_participant(
                self.store.as_ref(),
                self.notifier.as_ref(),
                author,
                shared.sessions.is_idle(author.id),
            )
            .await?;
        }

        for participant in ready_before {
            if Some(participant.id) == question.author {
                continue;
            }
            self.store.set_ready(participant.id, false).await?;
            queue::post_question(
                self.store.as_ref(),
                self.notifier.as_ref(),
                question_id,
                &[participant.chat_id],
            )
            .await?;
        }

        info!(question_id, "question opened");
        Ok(())
    }

    /// Throw away a draft, cascading its variants.
    pub async fn discard_draft(&self, question_id: i64) -> Result<()> {
        let mut shared = self.shared.lock().await;
        let question = self.require_question(question_id).await?;

        if question.status()? != QuestionStatus::Drafting {
            return Err(EngineError::IllegalState {
                operation: "discard_draft",
                reason: format!("question {} is not in drafting state", question_id),
            });
        }

        self.discard_locked(&mut shared, &question).await?;

        if let Some(author_id) = question.author
            && let Some(author) = self.store.get_participant(author_id).await?
        {
            self.notifier
                .deliver(author.chat_id, Notice::DraftDiscarded { question_id })
                .await;
        }

        Ok(())
    }

    async fn discard_locked(
        &self,
        shared: &mut SharedState,
        question: &QuestionRecord,
    ) -> Result<()> {
        self.store.delete_question(question.id).await?;

        if let Some(author_id) = question.author {
            shared.sessions.reset(author_id);
            if let Some(author) = self.store.get_participant(author_id).await? {
                // Questions committed while the author was editing are
                // queued but were never posted to them; deliver the next
                // one now instead of just recomputing the ready flag.
                queue::advance_participant(
                    self.store.as_ref(),
                    self.notifier.as_ref(),
                    &author,
                    shared.sessions.is_idle(author_id),
                )
                .await?;
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Answering
    // ------------------------------------------------------------------

    /// Record an answer to the participant's current question.
    ///
    /// The question must be the participant's next pending question and
    /// the index must address an existing variant.
    pub async fn record_answer(
        &self,
        participant_id: i64,
        question_id: i64,
        variant_index: i64,
    ) -> Result<AnswerOutcome> {
        let mut shared = self.shared.lock().await;
        let (participant, question) = self
            .require_current_question(participant_id, question_id)
            .await?;

        let variant_count = self.store.variant_count(question_id).await?;
        if variant_index < 0 || variant_index >= variant_count {
            return Err(EngineError::InvalidInput {
                field: "variant_index",
                message: format!(
                    "index {} is out of range for {} variants",
                    variant_index, variant_count
                ),
            });
        }

        self.store
            .record_vote(question_id, participant_id, variant_index)
            .await?;
        self.store.remove_pending(participant_id, question_id).await?;

        let progress = self.rule_progress(&shared, &question).await?;
        self.notifier
            .deliver(
                participant.chat_id,
                Notice::AnswerAccepted {
                    question_id,
                    progress,
                },
            )
            .await;

        let closed = self.evaluate_completion(&mut shared, question_id).await?;

        queue::advance_participant(
            self.store.as_ref(),
            self.notifier.as_ref(),
            &participant,
            shared.sessions.is_idle(participant_id),
        )
        .await?;

        Ok(AnswerOutcome {
            question_closed: closed,
        })
    }

    /// Record an explicit skip of the participant's current question.
    /// Same preconditions as [`Self::record_answer`]; no vote count moves.
    pub async fn record_skip(
        &self,
        participant_id: i64,
        question_id: i64,
    ) -> Result<AnswerOutcome> {
        let mut shared = self.shared.lock().await;
        let (participant, _question) = self
            .require_current_question(participant_id, question_id)
            .await?;

        self.store.record_skip(question_id, participant_id).await?;
        self.store.remove_pending(participant_id, question_id).await?;

        self.notifier
            .deliver(participant.chat_id, Notice::QuestionSkipped { question_id })
            .await;

        let closed = self.evaluate_completion(&mut shared, question_id).await?;

        queue::advance_participant(
            self.store.as_ref(),
            self.notifier.as_ref(),
            &participant,
            shared.sessions.is_idle(participant_id),
        )
        .await?;

        Ok(AnswerOutcome {
            question_closed: closed,
        })
    }

    // ------------------------------------------------------------------
    // Moderation
    // ------------------------------------------------------------------

    /// Close an open question regardless of its completion rules.
    pub async fn force_close(&self, question_id: i64) -> Result<()> {
        let mut shared = self.shared.lock().await;
        let question = self.require_question(question_id).await?;

        if question.status()? != QuestionStatus::Open {
            return Err(EngineError::IllegalState {
                operation: "force_close",
                reason: format!("question {} is not open", question_id),
            });
        }

        self.close_question(&mut shared, &question).await
    }

    /// Remove a question entirely: retire any remaining assignments, then
    /// delete the row (variants and answers cascade). Works on drafts,
    /// open, and closed questions; no results are published.
    pub async fn remove_question(&self, question_id: i64) -> Result<()> {
        let mut shared = self.shared.lock().await;
        let question = self.require_question(question_id).await?;

        if question.status()? == QuestionStatus::Open {
            shared.timers.disarm(question_id);
            self.retire_pending(&mut shared, question_id).await?;
        }

        self.discard_locked(&mut shared, &question).await?;

        info!(question_id, "question removed");
        Ok(())
    }

    /// Ban the author of a question. Returns the banned participant id.
    pub async fn ban_author(&self, question_id: i64) -> Result<i64> {
        let _shared = self.shared.lock().await;
        let question = self.require_question(question_id).await?;

        let author = question.author.ok_or_else(|| EngineError::IllegalState {
            operation: "ban_author",
            reason: format!("question {} has no author", question_id),
        })?;

        self.store.set_banned(author).await?;
        info!(participant = author, question_id, "author banned");
        Ok(author)
    }

    // ------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------

    /// Aggregated results for a question.
    pub async fn results(&self, question_id: i64) -> Result<ResultsFacts> {
        let _shared = self.shared.lock().await;
        let question = self.require_question(question_id).await?;
        self.compute_results(&question).await
    }

    /// Results of the most recently closed questions, ascending by id.
    pub async fn last_closed_results(&self, limit: i64) -> Result<Vec<ResultsFacts>> {
        let _shared = self.shared.lock().await;
        let questions = self.store.last_closed_questions(limit).await?;

        let mut all = Vec::with_capacity(questions.len());
        for question in &questions {
            all.push(self.compute_results(question).await?);
        }

        Ok(all)
    }

    /// An author's most recently published questions, ascending by id.
    /// Drafts are excluded.
    pub async fn author_questions(
        &self,
        author_id: i64,
        limit: i64,
    ) -> Result<Vec<QuestionDigest>> {
        let _shared = self.shared.lock().await;
        self.require_participant(author_id).await?;

        let questions = self.store.questions_by_author(author_id, limit).await?;
        self.digest_questions(&questions).await
    }

    /// The most recently published questions regardless of author,
    /// ascending by id. Drafts are excluded.
    pub async fn recent_published(&self, limit: i64) -> Result<Vec<QuestionDigest>> {
        let _shared = self.shared.lock().await;
        let questions = self.store.last_published_questions(limit).await?;
        self.digest_questions(&questions).await
    }

    async fn digest_questions(&self, questions: &[QuestionRecord]) -> Result<Vec<QuestionDigest>> {
        let mut digests = Vec::with_capacity(questions.len());
        for question in questions {
            let status = question.status()?;
            let progress = if status == QuestionStatus::Open {
                Some(self.remaining_progress(question).await?)
            } else {
                None
            };
            digests.push(QuestionDigest {
                status,
                results: self.compute_results(question).await?,
                progress,
            });
        }

        Ok(digests)
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Rebuild the timer table from stored deadlines of open questions.
    /// Called once at process start. Returns the number of armed entries.
    pub async fn rehydrate_timers(&self) -> Result<usize> {
        let mut shared = self.shared.lock().await;

        let mut armed = 0usize;
        for question in self.store.open_questions().await? {
            if let Some(closes_at) = question.closes_at {
                shared.timers.arm(question.id, closes_at);
                armed += 1;
            }
        }

        info!(armed, "timer table rehydrated");
        Ok(armed)
    }

    /// One sweep pass: disarm every fired deadline and re-evaluate those
    /// questions' completion. Returns the number of fired entries.
    pub async fn sweep_due_timers(&self) -> Result<usize> {
        let mut shared = self.shared.lock().await;

        let due = shared.timers.due(Utc::now());
        for question_id in &due {
            shared.timers.disarm(*question_id);
            debug!(question_id, "deadline fired");
            self.evaluate_completion(&mut shared, *question_id).await?;
        }

        Ok(due.len())
    }

    // ------------------------------------------------------------------
    // Completion detection
    // ------------------------------------------------------------------

    /// Re-evaluate a question's completion rules and close it if any rule
    /// holds. Idempotent: a question that is no longer open is left alone.
    async fn evaluate_completion(
        &self,
        shared: &mut SharedState,
        question_id: i64,
    ) -> Result<bool> {
        let Some(question) = self.store.get_question(question_id).await? else {
            return Ok(false);
        };
        if question.status()? != QuestionStatus::Open {
            return Ok(false);
        }

        if !self.completion_eligible(shared, &question).await? {
            return Ok(false);
        }

        self.close_question(shared, &question).await?;
        Ok(true)
    }

    /// Whether any completion rule currently holds:
    /// enough votes for the maximum, an empty pending set, or a fired
    /// deadline with the minimum reached.
    async fn completion_eligible(
        &self,
        shared: &SharedState,
        question: &QuestionRecord,
    ) -> Result<bool> {
        let min = question.min_votes.unwrap_or(0);
        let max = question.max_votes.unwrap_or(0);
        let votes = self.store.vote_total(question.id).await?;

        if max > 0 && votes >= max {
            return Ok(true);
        }

        if self.store.pending_count(question.id).await? == 0 {
            return Ok(true);
        }

        if question.closes_at.is_some() && !shared.timers.is_armed(question.id) && votes >= min {
            return Ok(true);
        }

        Ok(false)
    }

    /// Close an open question: flip the status, retire every remaining
    /// assignment (notifying and advancing its holder), then publish the
    /// results to the configured audience.
    async fn close_question(
        &self,
        shared: &mut SharedState,
        question: &QuestionRecord,
    ) -> Result<()> {
        self.store
            .set_question_status(question.id, QuestionStatus::Closed)
            .await?;
        shared.timers.disarm(question.id);

        self.retire_pending(shared, question.id).await?;

        let results = self.compute_results(question).await?;
        let audience = match self.results_audience {
            ResultsAudience::AllParticipants => self.store.all_chat_ids().await?,
            ResultsAudience::Respondents => self.store.respondent_chat_ids(question.id).await?,
        };
        for chat_id in audience {
            self.notifier
                .deliver(chat_id, Notice::Results(results.clone()))
                .await;
        }

        info!(question_id = question.id, respondents = results.respondents, "question closed");
        Ok(())
    }

    /// Remove every remaining pending assignment for a question, telling
    /// each holder the question is outdated and moving them along.
    async fn retire_pending(&self, shared: &mut SharedState, question_id: i64) -> Result<()> {
        for holder in self.store.pending_participants(question_id).await? {
            self.store.remove_pending(holder.id, question_id).await?;
            self.notifier
                .deliver(holder.chat_id, Notice::QuestionOutdated { question_id })
                .await;
            queue::advance_participant(
                self.store.as_ref(),
                self.notifier.as_ref(),
                &holder,
                shared.sessions.is_idle(holder.id),
            )
            .await?;
        }

        self.store.clear_pending_for_question(question_id).await?;
        Ok(())
    }

    async fn compute_results(&self, question: &QuestionRecord) -> Result<ResultsFacts> {
        let variants = self.store.variants(question.id).await?;
        let total = self.store.vote_total(question.id).await?;

        let tallies = variants
            .into_iter()
            .map(|v| VariantTally {
                percent: if total > 0 { 100 * v.votes / total } else { 0 },
                text: v.text,
                votes: v.votes,
            })
            .collect();

        Ok(ResultsFacts {
            question_id: question.id,
            text: question.text.clone().unwrap_or_default(),
            respondents: total,
            tallies,
        })
    }

    /// Remaining-rule facts for an answer acknowledgement, or `None` when
    /// the question is already eligible to close.
    async fn rule_progress(
        &self,
        shared: &SharedState,
        question: &QuestionRecord,
    ) -> Result<Option<RuleProgress>> {
        if self.completion_eligible(shared, question).await? {
            return Ok(None);
        }

        Ok(Some(self.remaining_progress(question).await?))
    }

    async fn remaining_progress(&self, question: &QuestionRecord) -> Result<RuleProgress> {
        let votes = self.store.vote_total(question.id).await?;
        let min = question.min_votes.unwrap_or(0);
        let max = question.max_votes.unwrap_or(0);

        let hours_left = match question.closes_at {
            Some(closes_at) => {
                let seconds = (closes_at - Utc::now()).num_seconds();
                if seconds > 0 { (seconds + 3599) / 3600 } else { 0 }
            }
            None => 0,
        };

        Ok(RuleProgress {
            votes_to_min: (min - votes).max(0),
            votes_to_max: (max - votes).max(0),
            hours_left,
        })
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn require_participant(&self, participant_id: i64) -> Result<ParticipantRecord> {
        self.store
            .get_participant(participant_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "participant",
                id: participant_id,
            })
    }

    async fn require_question(&self, question_id: i64) -> Result<QuestionRecord> {
        self.store
            .get_question(question_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "question",
                id: question_id,
            })
    }

    async fn require_drafting(&self, question_id: i64) -> Result<QuestionRecord> {
        let question = self.require_question(question_id).await?;
        if question.status()? != QuestionStatus::Drafting {
            return Err(EngineError::IllegalState {
                operation: "edit_draft",
                reason: format!("question {} is not in drafting state", question_id),
            });
        }
        Ok(question)
    }

    /// Precondition shared by answer and skip: the question must be the
    /// participant's next pending question and still open.
    async fn require_current_question(
        &self,
        participant_id: i64,
        question_id: i64,
    ) -> Result<(ParticipantRecord, QuestionRecord)> {
        let participant = self.require_participant(participant_id).await?;
        let question = self.require_question(question_id).await?;

        if self.store.next_pending(participant_id).await? != Some(question_id) {
            return Err(EngineError::IllegalState {
                operation: "answer_question",
                reason: format!(
                    "question {} is not the participant's next pending question",
                    question_id
                ),
            });
        }

        if question.status()? != QuestionStatus::Open {
            return Err(EngineError::IllegalState {
                operation: "answer_question",
                reason: format!("question {} is not open", question_id),
            });
        }

        Ok((participant, question))
    }

    /// Recompute the stored ready flag from the two conditions that
    /// define it: an empty pending queue and an idle editing session.
    async fn refresh_ready(
        &self,
        shared: &SharedState,
        participant: &ParticipantRecord,
    ) -> Result<()> {
        let ready = self.store.next_pending(participant.id).await?.is_none()
            && shared.sessions.is_idle(participant.id);
        self.store.set_ready(participant.id, ready).await
    }
}
