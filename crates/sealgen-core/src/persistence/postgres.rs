// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed lock event store.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::StoreError;
use crate::lock::{LockEvent, LockEventName};
use crate::migrations;

use super::{LockEventRecord, LockEventStore};

/// PostgreSQL-backed lock event store.
#[derive(Clone)]
pub struct PostgresLockEventStore {
    pool: PgPool,
}

impl PostgresLockEventStore {
    /// Create a store from an existing, migrated pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, verify the connection and run migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::database("connect", e))?;

        migrations::run_postgres(&pool)
            .await
            .map_err(|e| StoreError::database("migrate", format!("Failed to run migrations: {}", e)))?;

        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LockEventStore for PostgresLockEventStore {
    async fn append(&self, key: &str, event: LockEventName) -> Result<LockEvent, StoreError> {
        let record = sqlx::query_as::<_, LockEventRecord>(
            r#"
            INSERT INTO lock_events (key, event_name, created_at)
            VALUES ($1, $2, NOW())
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
            SELECT $1, 'retry', NOW()
            WHERE NOT EXISTS (
                SELECT 1 FROM lock_events
                WHERE key = $1 AND event_name = 'complete'
            )
            RETURNING id, key, event_name, created_at
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_write(e, key, LockEventName::Retry))?;

        record.map(LockEvent::try_from).transpose()
    }

    async fn fresh_complete_exists(&self, key: &str) -> Result<bool, StoreError> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM lock_events
                WHERE key = $1 AND event_name = 'complete'
            )
            "#,
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.0)
    }

    async fn list_events(&self, key: &str) -> Result<Vec<LockEvent>, StoreError> {
        let records = sqlx::query_as::<_, LockEventRecord>(
            r#"
            SELECT id, key, event_name, created_at
            FROM lock_events
            WHERE key = $1
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
            WHERE key = $1
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
