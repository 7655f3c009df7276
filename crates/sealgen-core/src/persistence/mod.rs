// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event log persistence.
//!
//! The store is a plain append-only table. Mutual exclusion comes entirely
//! from its partial unique index over `(key, event_name)` for `start` and
//! `complete`; a violation surfaces as [`StoreError::AlreadyLocked`].

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresLockEventStore;
pub use self::sqlite::SqliteLockEventStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::lock::{LockEvent, LockEventName};

/// Connect to the store named by `database_url`, running migrations.
///
/// `sqlite:` URLs open a SQLite database; anything else is treated as a
/// PostgreSQL connection string.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
) -> Result<Arc<dyn LockEventStore>, StoreError> {
    if database_url.starts_with("sqlite:") {
        let store = SqliteLockEventStore::connect(database_url, max_connections).await?;
        Ok(Arc::new(store))
    } else {
        let store = PostgresLockEventStore::connect(database_url, max_connections).await?;
        Ok(Arc::new(store))
    }
}

/// Lock event row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LockEventRecord {
    /// Database primary key, the per-key total order.
    pub id: i64,
    /// The lock key.
    pub key: String,
    /// Event name text.
    pub event_name: String,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<LockEventRecord> for LockEvent {
    type Error = StoreError;

    fn try_from(record: LockEventRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            event_name: record.event_name.parse()?,
            key: record.key,
            created_at: record.created_at,
        })
    }
}

/// Append-only lock event log.
///
/// Every read is a fresh query; implementations must not cache.
#[async_trait]
pub trait LockEventStore: Send + Sync {
    /// Append `event` for `key`.
    ///
    /// Returns [`StoreError::AlreadyLocked`] when a second `start` or
    /// `complete` is written for the same key.
    async fn append(&self, key: &str, event: LockEventName) -> Result<LockEvent, StoreError>;

    /// Append a `retry` for `key` unless a `complete` already exists.
    ///
    /// Returns `None` without writing when the key is complete, so no row can
    /// follow `complete`.
    async fn append_retry(&self, key: &str) -> Result<Option<LockEvent>, StoreError>;

    /// Whether a `complete` event exists for `key`.
    async fn fresh_complete_exists(&self, key: &str) -> Result<bool, StoreError>;

    /// All events for `key` in ascending id order.
    async fn list_events(&self, key: &str) -> Result<Vec<LockEvent>, StoreError>;

    /// The event with the highest id for `key`.
    async fn last_event(&self, key: &str) -> Result<Option<LockEvent>, StoreError>;
}
