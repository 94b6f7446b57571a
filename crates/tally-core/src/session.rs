// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! Per-participant editing sessions.
//!
//! A session tracks which piece of a draft the participant is currently
//! entering, so free-form input can be routed to the right setter. The
//! whole map is transient: it lives behind the engine lock and is simply
//! empty after a restart, dropping in-progress editing context but nothing
//! durable.

use std::collections::HashMap;

use crate::error::EngineError;

/// Editing state for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditingSession {
    /// Not editing.
    #[default]
    Idle,
    /// Next free-form message is the question text.
    AwaitingText,
    /// Next free-form message is the newline-separated variant list.
    AwaitingVariants,
    /// Next free-form message is the rules triple.
    AwaitingRules,
}

/// Transient map of participant id to editing session.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: HashMap<i64, EditingSession>,
}

impl SessionTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session for a participant; absent means [`EditingSession::Idle`].
    pub fn get(&self, participant_id: i64) -> EditingSession {
        self.sessions
            .get(&participant_id)
            .copied()
            .unwrap_or_default()
    }

    /// Enter an awaiting state, overwriting any prior one.
    pub fn set(&mut self, participant_id: i64, session: EditingSession) {
        if session == EditingSession::Idle {
            self.sessions.remove(&participant_id);
        } else {
            self.sessions.insert(participant_id, session);
        }
    }

    /// Return the participant to idle.
    pub fn reset(&mut self, participant_id: i64) {
        self.sessions.remove(&participant_id);
    }

    /// True iff the participant has no active session.
    pub fn is_idle(&self, participant_id: i64) -> bool {
        self.get(participant_id) == EditingSession::Idle
    }
}

/// Parse a free-form variant list: one variant per line, blank lines
/// dropped. An empty result is rejected.
pub fn parse_variants(input: &str) -> Result<Vec<String>, EngineError> {
    let variants: Vec<String> = input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if variants.is_empty() {
        return Err(EngineError::InvalidInput {
            field: "variants",
            message: "variant list is empty".to_string(),
        });
    }

    Ok(variants)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_idle() {
        let tracker = SessionTracker::new();
        assert_eq!(tracker.get(1), EditingSession::Idle);
        assert!(tracker.is_idle(1));
    }

    #[test]
    fn awaiting_states_overwrite_each_other() {
        let mut tracker = SessionTracker::new();
        tracker.set(1, EditingSession::AwaitingText);
        tracker.set(1, EditingSession::AwaitingRules);
        assert_eq!(tracker.get(1), EditingSession::AwaitingRules);

        tracker.reset(1);
        assert!(tracker.is_idle(1));
    }

    #[test]
    fn setting_idle_clears_the_entry() {
        let mut tracker = SessionTracker::new();
        tracker.set(7, EditingSession::AwaitingVariants);
        tracker.set(7, EditingSession::Idle);
        assert!(tracker.is_idle(7));
    }

    #[test]
    fn sessions_are_independent_per_participant() {
        let mut tracker = SessionTracker::new();
        tracker.set(1, EditingSession::AwaitingText);
        tracker.set(2, EditingSession::AwaitingVariants);
        assert_eq!(tracker.get(1), EditingSession::AwaitingText);
        assert_eq!(tracker.get(2), EditingSession::AwaitingVariants);
    }

    #[test]
    fn variant_parsing_drops_blank_lines() {
        let variants = parse_variants("Yes\n\n  No  \nMaybe\n").unwrap();
        assert_eq!(variants, vec!["Yes", "No", "Maybe"]);
    }

    #[test]
    fn empty_variant_list_is_rejected() {
        assert!(parse_variants("").is_err());
        assert!(parse_variants("\n  \n").is_err());
    }
}
