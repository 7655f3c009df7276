// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for sealgen-core.
//!
//! Every variant carries a stable error code for the operational log.

use std::fmt;
use std::time::Duration;

use sealgen_signing::TimestampError;

use crate::lock::LockEventName;

/// Errors raised by [`crate::coordinator::LockCoordinator::ensure`].
#[derive(Debug)]
#[non_exhaustive]
pub enum CoordinatorError {
    /// The subject's precondition does not hold. Nothing was read or written.
    NotReady {
        /// The lock key.
        key: String,
    },

    /// Waiting on another executor ran out of budget, or observed its failure.
    WaitForCompleteTimeout {
        /// The lock key.
        key: String,
        /// Time spent waiting.
        waited: Duration,
        /// Whether the wait ended because a `fail` event appeared.
        observed_failure: bool,
    },

    /// Lost the `start`/`retry` race too many times.
    RaceRetryExceeded {
        /// The lock key.
        key: String,
        /// Cumulative backoff slept.
        waited: Duration,
    },

    /// The generator raised. A `fail` event has been recorded.
    GenerationFailed {
        /// The lock key.
        key: String,
        /// The generator's error.
        source: anyhow::Error,
    },

    /// Reading back an already generated artifact failed.
    FetchFailed {
        /// The lock key.
        key: String,
        /// The fetch error.
        source: anyhow::Error,
    },

    /// The event log store failed.
    Store(StoreError),
}

impl CoordinatorError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotReady { .. } => "NOT_READY",
            Self::WaitForCompleteTimeout { .. } => "WAIT_FOR_COMPLETE_TIMEOUT",
            Self::RaceRetryExceeded { .. } => "RACE_RETRY_EXCEEDED",
            Self::GenerationFailed { .. } => "GENERATION_FAILED",
            Self::FetchFailed { .. } => "FETCH_FAILED",
            Self::Store(err) => err.error_code(),
        }
    }

    /// The lock key this error concerns, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::NotReady { key }
            | Self::WaitForCompleteTimeout { key, .. }
            | Self::RaceRetryExceeded { key, .. }
            | Self::GenerationFailed { key, .. }
            | Self::FetchFailed { key, .. } => Some(key),
            Self::Store(StoreError::AlreadyLocked { key, .. }) => Some(key),
            Self::Store(_) => None,
        }
    }

    /// Timestamp failure anywhere in the generator's error chain.
    pub fn timestamp_error(&self) -> Option<&TimestampError> {
        match self {
            Self::GenerationFailed { source, .. } => source
                .chain()
                .find_map(|cause| cause.downcast_ref::<TimestampError>()),
            _ => None,
        }
    }
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady { key } => {
                write!(f, "Subject for '{}' is not ready for generation", key)
            }
            Self::WaitForCompleteTimeout {
                key,
                waited,
                observed_failure,
            } => {
                if *observed_failure {
                    write!(
                        f,
                        "Generation of '{}' failed while waiting ({} ms)",
                        key,
                        waited.as_millis()
                    )
                } else {
                    write!(
                        f,
                        "Timed out after {} ms waiting for '{}' to complete",
                        waited.as_millis(),
                        key
                    )
                }
            }
            Self::RaceRetryExceeded { key, waited } => {
                write!(
                    f,
                    "Gave up acquiring '{}' after {} ms of race backoff",
                    key,
                    waited.as_millis()
                )
            }
            Self::GenerationFailed { key, source } => {
                write!(f, "Generation of '{}' failed: {}", key, source)
            }
            Self::FetchFailed { key, source } => {
                write!(f, "Failed to fetch generated artifact for '{}': {}", key, source)
            }
            Self::Store(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::GenerationFailed { source, .. } | Self::FetchFailed { source, .. } => {
                Some(&**source)
            }
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for CoordinatorError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Errors from a [`crate::persistence::LockEventStore`].
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The uniqueness constraint rejected a `start` or `complete` write.
    #[error("lock '{key}' already has a '{event}' event")]
    AlreadyLocked {
        /// The lock key.
        key: String,
        /// The rejected event.
        event: LockEventName,
    },

    /// Database operation failed.
    #[error("Database error during '{operation}': {details}")]
    Database {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// A stored event name is not one of the four known names.
    #[error("unknown lock event name '{0}'")]
    InvalidEvent(String),
}

impl StoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyLocked { .. } => "ALREADY_LOCKED",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::InvalidEvent(_) => "INVALID_EVENT",
        }
    }

    /// Map a sqlx error from writing `event` for `key`.
    pub(crate) fn from_write(err: sqlx::Error, key: &str, event: LockEventName) -> Self {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::AlreadyLocked {
                key: key.to_string(),
                event,
            },
            other => Self::database("append", other),
        }
    }

    pub(crate) fn database(operation: &str, err: impl fmt::Display) -> Self {
        Self::Database {
            operation: operation.to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::database("query", err)
    }
}
