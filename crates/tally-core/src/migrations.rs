// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! Embedded database migrations.
//!
//! The `_sqlx_migrations` table doubles as the schema-version record;
//! migration files apply in order and already-applied ones are skipped,
//! so running this at every start is safe.

use sqlx::migrate::MigrateError;

/// SQLite migrator with all engine migrations embedded.
pub static SQLITE: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Run SQLite migrations against the given pool.
pub async fn run_sqlite(pool: &sqlx::SqlitePool) -> Result<(), MigrateError> {
    SQLITE.run(pool).await
}
