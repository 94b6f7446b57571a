// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! SQLite-backed store implementation.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::EngineError;

use super::{ParticipantRecord, QuestionRecord, QuestionStatus, Store, VariantRecord};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store from an existing pool. Migrations must already have
    /// been applied (see [`crate::migrations`]).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a store from a database file path.
    ///
    /// Creates parent directories and the database file if missing,
    /// enables foreign keys, and runs all migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::Storage {
                operation: "create_dir",
                details: format!("failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| EngineError::Storage {
                operation: "connect",
                details: format!("failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        MIGRATOR.run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create an in-memory store with migrations applied. Test-friendly;
    /// the pool is pinned to a single connection so the database survives
    /// for the pool's lifetime.
    pub async fn in_memory() -> Result<Self, EngineError> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| EngineError::Storage {
                operation: "connect",
                details: format!("failed to open in-memory SQLite: {}", e),
            })?;

        MIGRATOR.run(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn ensure_participant(&self, chat_id: i64) -> Result<ParticipantRecord, EngineError> {
        sqlx::query(
            r#"
            INSERT INTO participants (chat_id) VALUES (?)
            ON CONFLICT (chat_id) DO NOTHING
            "#,
        )
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        let record = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT id, chat_id, is_ready, banned
            FROM participants
            WHERE chat_id = ?
            "#,
        )
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_participant(&self, id: i64) -> Result<Option<ParticipantRecord>, EngineError> {
        let record = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT id, chat_id, is_ready, banned
            FROM participants
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn set_ready(&self, id: i64, ready: bool) -> Result<(), EngineError> {
        sqlx::query("UPDATE participants SET is_ready = ? WHERE id = ?")
            .bind(ready)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_banned(&self, id: i64) -> Result<(), EngineError> {
        sqlx::query("UPDATE participants SET banned = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn all_chat_ids(&self) -> Result<Vec<i64>, EngineError> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT chat_id FROM participants ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn ready_participants(&self) -> Result<Vec<ParticipantRecord>, EngineError> {
        let records = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT id, chat_id, is_ready, banned
            FROM participants
            WHERE is_ready = 1
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn create_draft(&self, author: i64) -> Result<i64, EngineError> {
        let result = sqlx::query("INSERT INTO questions (author, status) VALUES (?, 'drafting')")
            .bind(author)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    async fn drafting_question_for(&self, author: i64) -> Result<Option<i64>, EngineError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM questions WHERE status = 'drafting' AND author = ?",
        )
        .bind(author)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_question(&self, id: i64) -> Result<Option<QuestionRecord>, EngineError> {
        let record = sqlx::query_as::<_, QuestionRecord>(
            r#"
            SELECT id, author, text, status, min_votes, max_votes, duration_hours, closes_at
            FROM questions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn set_question_text(&self, id: i64, text: &str) -> Result<(), EngineError> {
        sqlx::query("UPDATE questions SET text = ? WHERE id = ?")
            .bind(text)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn replace_variants(
        &self,
        question_id: i64,
        texts: &[String],
    ) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM variants WHERE question_id = ?")
            .bind(question_id)
            .execute(&mut *tx)
            .await?;

        for (position, text) in texts.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO variants (question_id, position, text, votes)
                VALUES (?, ?, ?, 0)
                "#,
            )
            .bind(question_id)
            .bind(position as i64)
            .bind(text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn set_question_rules(
        &self,
        id: i64,
        min_votes: i64,
        max_votes: i64,
        duration_hours: i64,
    ) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            UPDATE questions
            SET min_votes = ?, max_votes = ?, duration_hours = ?
            WHERE id = ?
            "#,
        )
        .bind(min_votes)
        .bind(max_votes)
        .bind(duration_hours)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_question_status(
        &self,
        id: i64,
        status: QuestionStatus,
    ) -> Result<(), EngineError> {
        sqlx::query("UPDATE questions SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_closes_at(
        &self,
        id: i64,
        closes_at: Option<DateTime<Utc>>,
    ) -> Result<(), EngineError> {
        sqlx::query("UPDATE questions SET closes_at = ? WHERE id = ?")
            .bind(closes_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_question(&self, id: i64) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM questions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn open_questions(&self) -> Result<Vec<QuestionRecord>, EngineError> {
        let records = sqlx::query_as::<_, QuestionRecord>(
            r#"
            SELECT id, author, text, status, min_votes, max_votes, duration_hours, closes_at
            FROM questions
            WHERE status = 'open'
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn last_closed_questions(&self, limit: i64) -> Result<Vec<QuestionRecord>, EngineError> {
        let records = sqlx::query_as::<_, QuestionRecord>(
            r#"
            SELECT id, author, text, status, min_votes, max_votes, duration_hours, closes_at
            FROM (
                SELECT * FROM questions
                WHERE status = 'closed'
                ORDER BY id DESC
                LIMIT ?
            )
            ORDER BY id ASC
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn questions_by_author(
        &self,
        author: i64,
        limit: i64,
    ) -> Result<Vec<QuestionRecord>, EngineError> {
        let records = sqlx::query_as::<_, QuestionRecord>(
            r#"
            SELECT id, author, text, status, min_votes, max_votes, duration_hours, closes_at
            FROM (
                SELECT * FROM questions
                WHERE author = ? AND status != 'drafting'
                ORDER BY id DESC
                LIMIT ?
            )
            ORDER BY id ASC
            "#,
        )
        .bind(author)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn last_published_questions(
        &self,
        limit: i64,
    ) -> Result<Vec<QuestionRecord>, EngineError> {
        let records = sqlx::query_as::<_, QuestionRecord>(
            r#"
            SELECT id, author, text, status, min_votes, max_votes, duration_hours, closes_at
            FROM (
                SELECT * FROM questions
                WHERE status != 'drafting'
                ORDER BY id DESC
                LIMIT ?
            )
            ORDER BY id ASC
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn variants(&self, question_id: i64) -> Result<Vec<VariantRecord>, EngineError> {
        let records = sqlx::query_as::<_, VariantRecord>(
            r#"
            SELECT question_id, position, text, votes
            FROM variants
            WHERE question_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn variant_count(&self, question_id: i64) -> Result<i64, EngineError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM variants WHERE question_id = ?")
                .bind(question_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn record_vote(
        &self,
        question_id: i64,
        participant_id: i64,
        position: i64,
    ) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO answers (participant_id, question_id, variant_position)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(participant_id)
        .bind(question_id)
        .bind(position)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query(
            r#"
            UPDATE variants
            SET votes = votes + 1
            WHERE question_id = ? AND position = ?
            "#,
        )
        .bind(question_id)
        .bind(position)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            return Err(EngineError::Storage {
                operation: "record_vote",
                details: format!(
                    "question {} has no variant at position {}",
                    question_id, position
                ),
            });
        }

        tx.commit().await?;

        Ok(())
    }

    async fn record_skip(
        &self,
        question_id: i64,
        participant_id: i64,
    ) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO answers (participant_id, question_id, variant_position)
            VALUES (?, ?, NULL)
            "#,
        )
        .bind(participant_id)
        .bind(question_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn vote_total(&self, question_id: i64) -> Result<i64, EngineError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM answers
            WHERE question_id = ? AND variant_position IS NOT NULL
            "#,
        )
        .bind(question_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn respondent_chat_ids(&self, question_id: i64) -> Result<Vec<i64>, EngineError> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT p.chat_id
            FROM answers a
            INNER JOIN participants p ON a.participant_id = p.id
            WHERE a.question_id = ? AND a.variant_position IS NOT NULL
            ORDER BY p.id
            "#,
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn enqueue_for_all(&self, question_id: i64) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO pending_assignments (participant_id, question_id)
            SELECT id, ? FROM participants
            "#,
        )
        .bind(question_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn enqueue_open_for(&self, participant_id: i64) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO pending_assignments (participant_id, question_id)
            SELECT ?1, q.id
            FROM questions q
            LEFT JOIN pending_assignments pq
                ON q.id = pq.question_id AND pq.participant_id = ?1
            LEFT JOIN answers aq
                ON q.id = aq.question_id AND aq.participant_id = ?1
            WHERE pq.participant_id IS NULL
              AND aq.participant_id IS NULL
              AND q.status = 'open'
            "#,
        )
        .bind(participant_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn next_pending(&self, participant_id: i64) -> Result<Option<i64>, EngineError> {
        let next = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MIN(question_id) FROM pending_assignments WHERE participant_id = ?",
        )
        .bind(participant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(next)
    }

    async fn remove_pending(
        &self,
        participant_id: i64,
        question_id: i64,
    ) -> Result<bool, EngineError> {
        let result = sqlx::query(
            "DELETE FROM pending_assignments WHERE participant_id = ? AND question_id = ?",
        )
        .bind(participant_id)
        .bind(question_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_pending_for_question(&self, question_id: i64) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM pending_assignments WHERE question_id = ?")
            .bind(question_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn pending_participants(
        &self,
        question_id: i64,
    ) -> Result<Vec<ParticipantRecord>, EngineError> {
        let records = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT p.id, p.chat_id, p.is_ready, p.banned
            FROM pending_assignments pa
            INNER JOIN participants p ON pa.participant_id = p.id
            WHERE pa.question_id = ?
            ORDER BY p.id
            "#,
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn pending_count(&self, question_id: i64) -> Result<i64, EngineError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM pending_assignments WHERE question_id = ?",
        )
        .bind(question_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn pending_for_participant(
        &self,
        participant_id: i64,
    ) -> Result<Vec<i64>, EngineError> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT question_id FROM pending_assignments
            WHERE participant_id = ?
            ORDER BY question_id ASC
            "#,
        )
        .bind(participant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn health_check(&self) -> Result<bool, EngineError> {
        let row: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;

        Ok(row == 1)
    }
}
