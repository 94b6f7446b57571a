// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! Error types for the poll lifecycle engine.
//!
//! Four categories (see the module docs in [`crate`]): invalid input and
//! illegal state are user-recoverable and never mutate anything; not-found
//! is an invariant violation; storage failures propagate to the caller
//! instead of taking the process down.

/// Result type using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by engine operations.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Malformed input: empty variant list, all-zero rules, an answer
    /// index outside the variant range.
    #[error("invalid input for '{field}': {message}")]
    InvalidInput {
        /// The input that failed validation.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// The operation is not valid in the entity's current state, e.g.
    /// committing a draft without variants or answering a question that is
    /// not the participant's next pending one.
    #[error("cannot {operation}: {reason}")]
    IllegalState {
        /// The operation that was rejected.
        operation: &'static str,
        /// Why the current state forbids it.
        reason: String,
    },

    /// An id that an invariant guarantees must exist was not found.
    /// Reaching this indicates a bug or external tampering, not user error.
    #[error("{entity} {id} not found")]
    NotFound {
        /// The entity kind ("question", "participant", ...).
        entity: &'static str,
        /// The missing id.
        id: i64,
    },

    /// The persistent store failed. Recoverable by the caller (retry or
    /// abort); never treated as fatal inside the engine.
    #[error("storage error during '{operation}': {details}")]
    Storage {
        /// The operation that failed.
        operation: &'static str,
        /// Error details from the driver.
        details: String,
    },
}

impl EngineError {
    /// Short machine-readable code, handy for routing user-facing
    /// rejection messages in the front end.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::IllegalState { .. } => "ILLEGAL_STATE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Storage { .. } => "STORAGE",
        }
    }

    /// True for errors a participant can fix by sending different input;
    /// false for invariant violations and storage failures.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::InvalidInput { .. } | Self::IllegalState { .. })
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Storage {
            operation: "query",
            details: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for EngineError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        EngineError::Storage {
            operation: "migrate",
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = EngineError::InvalidInput {
            field: "variants",
            message: "variant list is empty".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid input for 'variants': variant list is empty"
        );

        let err = EngineError::IllegalState {
            operation: "commit_draft",
            reason: "question 7 is not in drafting state".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot commit_draft: question 7 is not in drafting state"
        );

        let err = EngineError::NotFound {
            entity: "question",
            id: 42,
        };
        assert_eq!(err.to_string(), "question 42 not found");
    }

    #[test]
    fn codes_and_user_error_split() {
        let invalid = EngineError::InvalidInput {
            field: "rules",
            message: String::new(),
        };
        let storage = EngineError::Storage {
            operation: "query",
            details: String::new(),
        };
        assert_eq!(invalid.code(), "INVALID_INPUT");
        assert_eq!(storage.code(), "STORAGE");
        assert!(invalid.is_user_error());
        assert!(!storage.is_user_error());
    }
}
