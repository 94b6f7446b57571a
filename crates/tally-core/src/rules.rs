// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! Completion rules and their deterministic resolution.
//!
//! A moderator may give a partial rule set (min, or min+max, or
//! min+max+hours). Ambiguity is resolved here, once, so the rest of the
//! engine only ever sees a canonical triple.

use crate::error::EngineError;

/// Canonical completion rules for a question. Zero means "unconstrained"
/// for each field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionRules {
    /// Minimum answers before a fired deadline may close the question.
    pub min_votes: i64,
    /// Answer count that closes the question immediately.
    pub max_votes: i64,
    /// Relative deadline in hours, converted to an absolute time on commit.
    pub duration_hours: i64,
}

impl CompletionRules {
    /// Resolve a raw `(min, max, hours)` triple into canonical rules.
    ///
    /// Without a deadline an unset bound is filled from the other, and two
    /// set bounds collapse to the smaller so min and max agree. With a
    /// deadline, `min >= max > 0` clears the larger bound so the deadline
    /// governs closing. The all-zero triple carries no completion rule at
    /// all and is rejected.
    pub fn resolve(min_votes: i64, max_votes: i64, duration_hours: i64) -> Result<Self, EngineError> {
        if min_votes < 0 || max_votes < 0 || duration_hours < 0 {
            return Err(EngineError::InvalidInput {
                field: "rules",
                message: "rule values must not be negative".to_string(),
            });
        }

        if min_votes == 0 && max_votes == 0 && duration_hours == 0 {
            return Err(EngineError::InvalidInput {
                field: "rules",
                message: "at least one of min, max, or hours must be set".to_string(),
            });
        }

        let mut min = min_votes;
        let mut max = max_votes;

        if duration_hours == 0 {
            if min == 0 {
                min = max;
            } else if max == 0 {
                max = min;
            } else if min > max {
                min = max;
            } else {
                max = min;
            }
        } else if min >= max && max > 0 {
            min = 0;
        }

        Ok(Self {
            min_votes: min,
            max_votes: max,
            duration_hours,
        })
    }

    /// Parse free-form rule input: up to three whitespace-separated
    /// non-negative integers (`min`, `max`, `hours`), then resolve.
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        let mut values = [0i64; 3];
        let mut seen = 0usize;

        for token in input.split_whitespace().take(3) {
            values[seen] = token.parse().map_err(|_| EngineError::InvalidInput {
                field: "rules",
                message: format!("'{}' is not a non-negative number", token),
            })?;
            seen += 1;
        }

        if seen == 0 {
            return Err(EngineError::InvalidInput {
                field: "rules",
                message: "expected min, max, and hours values".to_string(),
            });
        }

        Self::resolve(values[0], values[1], values[2])
    }
}
