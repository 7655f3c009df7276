// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sealgen Core - exactly-once artifact generation
//!
//! This crate runs expensive, side-effecting document generations (signed
//! result documents, audit trails, combined documents) at most once per
//! subject, even when several application processes ask for the same
//! artifact at the same time. Coordination goes through an append-only event
//! log in the application database; a partial unique index is the only
//! mutex.
//!
//! # Architecture
//!
//! ```text
//!   caller ──► LockCoordinator::ensure ──► ArtifactGenerator::generate
//!                 │        ▲                       │
//!                 │        │ poll                  ├──► DocumentRenderer
//!                 ▼        │                       ├──► SigningService ──► TSA
//!           ┌──────────────────┐                   └──► AttachmentStore
//!           │   lock_events    │
//!           │ (Postgres/SQLite)│
//!           └──────────────────┘
//! ```
//!
//! # Event Log
//!
//! | Event | Written by | Constraint |
//! |-------|------------|------------|
//! | `start` | first executor | unique per key |
//! | `retry` | executor taking over after a failure | none |
//! | `complete` | executor after the artifact is persisted | unique per key |
//! | `fail` | executor whose generation errored | none |
//!
//! # Lock State
//!
//! ```text
//!              start            complete
//!   ┌──────┐ ───────► ┌─────────────┐ ───────► ┌───────────┐
//!   │ IDLE │          │ IN_PROGRESS │          │ COMPLETED │
//!   └──────┘          └─────────────┘          └───────────┘
//!                       │        ▲
//!                   fail│        │retry
//!                       ▼        │
//!                     ┌────────────┐
//!                     │   FAILED   │
//!                     └────────────┘
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `SEALGEN_DATABASE_URL` | Yes | - | PostgreSQL or SQLite connection string |
//! | `SEALGEN_LOCK_POLL_INTERVAL_MS` | No | `1000` | Wait mode poll interval |
//! | `SEALGEN_LOCK_RETRY_BACKOFF_MS` | No | `2000` | Backoff after a lost race |
//! | `SEALGEN_LOCK_TIMEOUT_MS` | No | `90000` | Wait and race budget |
//! | `SEALGEN_TSA_TIMEOUT_SECS` | No | `30` | TSA HTTP timeout |
//! | `SEALGEN_DB_MAX_CONNECTIONS` | No | `10` | Database pool size |
//!
//! # Modules
//!
//! - [`config`]: Configuration from environment variables
//! - [`coordinator`]: The start/wait/retry/complete/fail protocol
//! - [`error`]: Error types with error codes
//! - [`generators`]: The three artifact generators and their collaborators
//! - [`lock`]: Lock keys, events and derived state
//! - [`migrations`]: Embedded schema migrations
//! - [`persistence`]: Event log stores for PostgreSQL and SQLite

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Database-backed lock coordinator.
pub mod coordinator;

/// Error types with error code mapping.
pub mod error;

/// Artifact generators and the collaborators they drive.
pub mod generators;

/// Lock keys, events and state.
pub mod lock;

/// Embedded database migrations.
pub mod migrations;

/// Event log persistence.
pub mod persistence;

pub use config::{Config, ConfigError};
pub use coordinator::{LockCoordinator, LockSettings};
pub use error::{CoordinatorError, StoreError};
pub use generators::{
    AccountSigner, ArtifactGenerator, AuditTrailGenerator, CombinedDocumentGenerator,
    GeneratorKind, ResultAttachmentsGenerator,
};
pub use lock::{LockEvent, LockEventName, LockKey, LockState};
pub use persistence::{LockEventStore, PostgresLockEventStore, SqliteLockEventStore};
