// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! In-memory deadline table for open questions.
//!
//! One entry per open question with a deadline. The table is owned by the
//! engine's shared state and only ever touched under its lock; on restart
//! it is rebuilt from the stored `closes_at` values.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Question-id to absolute-deadline map.
#[derive(Debug, Default)]
pub struct TimerTable {
    entries: BTreeMap<i64, DateTime<Utc>>,
}

impl TimerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the deadline for a question.
    pub fn arm(&mut self, question_id: i64, deadline: DateTime<Utc>) {
        self.entries.insert(question_id, deadline);
    }

    /// Remove a question's entry; returns true if one was armed.
    pub fn disarm(&mut self, question_id: i64) -> bool {
        self.entries.remove(&question_id).is_some()
    }

    /// True iff the question still has an armed deadline.
    pub fn is_armed(&self, question_id: i64) -> bool {
        self.entries.contains_key(&question_id)
    }

    /// Question ids whose deadline is at or before `now`, ascending.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<i64> {
        self.entries
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of armed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True iff no entry is armed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn arm_and_disarm() {
        let mut table = TimerTable::new();
        let now = Utc::now();

        table.arm(1, now + Duration::hours(1));
        assert!(table.is_armed(1));
        assert!(table.disarm(1));
        assert!(!table.is_armed(1));
        assert!(!table.disarm(1));
    }

    #[test]
    fn due_returns_only_expired_entries_in_order() {
        let mut table = TimerTable::new();
        let now = Utc::now();

        table.arm(3, now - Duration::minutes(5));
        table.arm(1, now - Duration::hours(2));
        table.arm(2, now + Duration::hours(1));

        assert_eq!(table.due(now), vec![1, 3]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn rearming_overwrites_the_deadline() {
        let mut table = TimerTable::new();
        let now = Utc::now();

        table.arm(1, now - Duration::hours(1));
        table.arm(1, now + Duration::hours(1));
        assert!(table.due(now).is_empty());
    }
}
