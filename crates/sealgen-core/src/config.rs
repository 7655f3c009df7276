// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

use crate::coordinator::LockSettings;

/// Sealgen configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// Interval between event log polls while waiting on another executor
    pub lock_poll_interval: Duration,
    /// Sleep after losing a race on the `start`/`retry` write
    pub lock_retry_backoff: Duration,
    /// Budget for both waiting and race retries
    pub lock_timeout: Duration,
    /// HTTP timeout for one TSA round-trip
    pub tsa_timeout: Duration,
    /// Database pool size
    pub db_max_connections: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `SEALGEN_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `SEALGEN_LOCK_POLL_INTERVAL_MS` (default: 1000)
    /// - `SEALGEN_LOCK_RETRY_BACKOFF_MS` (default: 2000)
    /// - `SEALGEN_LOCK_TIMEOUT_MS` (default: 90000)
    /// - `SEALGEN_TSA_TIMEOUT_SECS` (default: 30)
    /// - `SEALGEN_DB_MAX_CONNECTIONS` (default: 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("SEALGEN_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("SEALGEN_DATABASE_URL"))?;

        let lock_poll_interval = Duration::from_millis(positive_u64(
            "SEALGEN_LOCK_POLL_INTERVAL_MS",
            1000,
        )?);
        let lock_retry_backoff = Duration::from_millis(positive_u64(
            "SEALGEN_LOCK_RETRY_BACKOFF_MS",
            2000,
        )?);
        let lock_timeout = Duration::from_millis(positive_u64("SEALGEN_LOCK_TIMEOUT_MS", 90_000)?);
        let tsa_timeout = Duration::from_secs(positive_u64("SEALGEN_TSA_TIMEOUT_SECS", 30)?);

        let db_max_connections: u32 = std::env::var("SEALGEN_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "SEALGEN_DB_MAX_CONNECTIONS",
                "must be a positive integer",
            ))?;

        Ok(Self {
            database_url,
            lock_poll_interval,
            lock_retry_backoff,
            lock_timeout,
            tsa_timeout,
            db_max_connections,
        })
    }

    /// Coordinator timing derived from this configuration.
    pub fn lock_settings(&self) -> LockSettings {
        LockSettings {
            poll_interval: self.lock_poll_interval,
            retry_backoff: self.lock_retry_backoff,
            wait_timeout: self.lock_timeout,
            race_budget: self.lock_timeout,
        }
    }
}

fn positive_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<u64>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(var, "must be a positive integer")),
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
