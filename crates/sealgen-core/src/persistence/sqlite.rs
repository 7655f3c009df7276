// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed lock event store.

use std::path::Path;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::StoreError;
use crate::lock::{LockEvent, LockEventName};
use crate::migrations;

use super::{LockEventRecord, LockEventStore};

/// SQLite-backed lock event store.
#[derive(Clone)]
pub struct SqliteLockEventStore {
    pool: SqlitePool,
}

impl SqliteLockEventStore {
    /// Create a store from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a store from a file path.
    ///
    /// Creates parent directories and the database file if needed, then runs
    /// all migrations.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = SqliteLockEventStore::from_path(".data/sealgen.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::database(
                    "create_dir",
                    format!("Failed to create directory {:?}: {}", parent, e),
                )
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| {
                StoreError::database(
                    "connect",
                    format!("Failed to connect to SQLite at {:?}: {}", path, e),
                )
            })?;

        Self::migrated(pool).await
    }

    /// Connect to a `sqlite:` URL and run migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::database("connect", e))?;

        Self::migrated(pool).await
    }

    /// Private in-memory database with migrations applied.
    ///
    /// Uses a single connection so every query sees the same database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::database("connect", e))?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, StoreError> {
        migrations::run_sqlite(&pool)
            .await
            .map_err(|e| StoreError::database("migrate", format!("Failed to run migrations: {}", e)))?;
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl LockEventStore for SqliteLockEventStore {
    async fn append(&self, key: &str, event: LockEventName) -> Result<LockEvent, StoreError> {
        let record = sqlx::query_as::<_, LockEventRecord>(
            r#"
            INSERT INTO lock_events (key, event_name, created_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            RETURNING id, key, event_name, created_at
            "#,
        )
        .bind(key)
        .bind(event.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_write(e, key, event))?;

        record.try_into()
    }

    async fn append_retry(&self, key: &str) -> Result<Option<LockEvent>, StoreError> {
        let record = sqlx::query_as::<_, LockEventRecord>(
            r#"
            INSERT INTO lock_events (key, event_name, created_at)
            SELECT ?, 'retry', CURRENT_TIMESTAMP
            WHERE NOT EXISTS (
                SELECT 1 FROM lock_events
                WHERE key = ? AND event_name = 'complete'
            )
            RETURNING id, key, event_name, created_at
            "#,
        )
        .bind(key)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_write(e, key, LockEventName::Retry))?;

        record.map(LockEvent::try_from).transpose()
    }

    async fn fresh_complete_exists(&self, key: &str) -> Result<bool, StoreError> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM lock_events
            WHERE key = ? AND event_name = 'complete'
            "#,
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0 > 0)
    }

    async fn list_events(&self, key: &str) -> Result<Vec<LockEvent>, StoreError> {
        let records = sqlx::query_as::<_, LockEventRecord>(
            r#"
            SELECT id, key, event_name, created_at
            FROM lock_events
            WHERE key = ?
            ORDER BY id ASC
            "#,
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(LockEvent::try_from).collect()
    }

    async fn last_event(&self, key: &str) -> Result<Option<LockEvent>, StoreError> {
        let record = sqlx::query_as::<_, LockEventRecord>(
            r#"
            SELECT id, key, event_name, created_at
            FROM lock_events
            WHERE key = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        record.map(LockEvent::try_from).transpose()
    }
}
