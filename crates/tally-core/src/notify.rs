// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! Notification sink interface.
//!
//! The engine never builds user-facing strings. It computes structured
//! facts and hands them to a [`Notifier`]; the chat front end owns
//! translation and formatting. Delivery is best-effort and fire-and-forget:
//! nothing about a failed delivery flows back into the lifecycle.

use async_trait::async_trait;
use serde::Serialize;

/// Which draft field the engine is waiting for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DraftField {
    /// The question text.
    Text,
    /// The newline-separated variant list.
    Variants,
    /// The min/max/hours rule triple.
    Rules,
}

/// How far a still-open question is from completing, relative to its rules.
/// Values are clamped at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleProgress {
    /// Votes still needed to reach the minimum (0 = reached or unset).
    pub votes_to_min: i64,
    /// Votes still accepted before the maximum closes it (0 = unset).
    pub votes_to_max: i64,
    /// Whole hours until the deadline, rounded up (0 = no deadline).
    pub hours_left: i64,
}

/// Per-variant share of the final tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantTally {
    /// Variant text.
    pub text: String,
    /// Vote count.
    pub votes: i64,
    /// Integer percentage of all votes (0 when nobody voted).
    pub percent: i64,
}

/// Aggregated results of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultsFacts {
    /// Question id.
    pub question_id: i64,
    /// Question text.
    pub text: String,
    /// Number of participants whose answer chose a variant.
    pub respondents: i64,
    /// Tallies in variant order.
    pub tallies: Vec<VariantTally>,
}

/// Structured facts delivered to a participant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub enum Notice {
    /// An open question is ready for this participant to answer.
    QuestionPosted {
        /// Question id.
        question_id: i64,
        /// Question text.
        text: String,
        /// Variant texts in display order.
        variants: Vec<String>,
    },
    /// A question the participant was queued for closed before they
    /// answered it.
    QuestionOutdated {
        /// Question id.
        question_id: i64,
    },
    /// The participant's answer was recorded.
    AnswerAccepted {
        /// Question id.
        question_id: i64,
        /// Remaining-rule facts; `None` when the question is about to close.
        progress: Option<RuleProgress>,
    },
    /// The participant's skip was recorded.
    QuestionSkipped {
        /// Question id.
        question_id: i64,
    },
    /// The engine is waiting for the next draft field.
    DraftPrompt {
        /// Which field to send next.
        field: DraftField,
    },
    /// A draft went live.
    DraftCommitted {
        /// Question id.
        question_id: i64,
    },
    /// A draft was thrown away.
    DraftDiscarded {
        /// Question id.
        question_id: i64,
    },
    /// Final results of a closed question.
    Results(ResultsFacts),
}

/// Best-effort delivery of notices to a chat recipient.
///
/// Implementations must not block the engine on transport failures;
/// log and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notice to one recipient, identified by chat id.
    async fn deliver(&self, chat_id: i64, notice: Notice);
}

/// Notifier that logs deliveries through `tracing`. Used by the binary
/// when no chat transport is wired in, and handy in development.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, chat_id: i64, notice: Notice) {
        let payload = serde_json::to_string(&notice).unwrap_or_else(|_| format!("{:?}", notice));
        tracing::info!(chat_id, %payload, "notice delivered");
    }
}
