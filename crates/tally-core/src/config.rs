// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! Configuration loading from environment variables.

use std::time::Duration;

use crate::engine::ResultsAudience;

/// Tally engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL or database file path
    pub database_url: String,
    /// How often the timer sweep re-checks deadlines
    pub sweep_interval: Duration,
    /// Who receives published results when a question closes
    pub results_audience: ResultsAudience,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `TALLY_DATABASE_URL`: SQLite connection string or file path
    ///
    /// Optional (with defaults):
    /// - `TALLY_SWEEP_INTERVAL_SECS`: Timer sweep period in seconds (default: 30)
    /// - `TALLY_RESULTS_AUDIENCE`: `all` or `respondents` (default: all)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("TALLY_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("TALLY_DATABASE_URL"))?;

        let sweep_secs: u64 = std::env::var("TALLY_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("TALLY_SWEEP_INTERVAL_SECS", "must be a number of seconds")
            })?;
        if sweep_secs == 0 {
            return Err(ConfigError::Invalid(
                "TALLY_SWEEP_INTERVAL_SECS",
                "must be at least one second",
            ));
        }

        let results_audience: ResultsAudience = std::env::var("TALLY_RESULTS_AUDIENCE")
            .unwrap_or_else(|_| "all".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("TALLY_RESULTS_AUDIENCE", "must be 'all' or 'respondents'")
            })?;

        Ok(Self {
            database_url,
            sweep_interval: Duration::from_secs(sweep_secs),
            results_audience,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
