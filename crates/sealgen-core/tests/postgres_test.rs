// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL store tests.
//!
//! Skipped unless `TEST_DATABASE_URL` points at a PostgreSQL database.
//! Every test uses its own random key prefix so runs do not interfere.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::fast_settings;
use sealgen_core::{LockCoordinator, LockEventName, LockEventStore, PostgresLockEventStore, StoreError};

async fn store() -> PostgresLockEventStore {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL");
    PostgresLockEventStore::connect(&url, 10)
        .await
        .expect("Failed to connect to test database")
}

fn unique_key(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}:{nanos}")
}

#[tokio::test]
async fn test_postgres_unique_index_locks_start_and_complete() {
    skip_if_no_db!();
    let store = store().await;
    let key = unique_key("pg_unique");

    store.append(&key, LockEventName::Start).await.unwrap();
    let err = store.append(&key, LockEventName::Start).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyLocked { .. }));

    store.append(&key, LockEventName::Fail).await.unwrap();
    store.append(&key, LockEventName::Retry).await.unwrap();
    store.append(&key, LockEventName::Retry).await.unwrap();
    store.append(&key, LockEventName::Complete).await.unwrap();
    let err = store
        .append(&key, LockEventName::Complete)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "ALREADY_LOCKED");

    assert!(store.append_retry(&key).await.unwrap().is_none());

    assert!(store.fresh_complete_exists(&key).await.unwrap());
    assert_eq!(store.list_events(&key).await.unwrap().len(), 5);
    assert_eq!(
        store.last_event(&key).await.unwrap().unwrap().event_name,
        LockEventName::Complete
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_postgres_exactly_once_across_connections() {
    skip_if_no_db!();
    let coordinator = LockCoordinator::with_settings(Arc::new(store().await), fast_settings());
    let key = unique_key("pg_once");
    let generations = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let coordinator = coordinator.clone();
        let generations = generations.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .ensure(
                    &key,
                    true,
                    move || async move {
                        generations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, anyhow::Error>(())
                    },
                    || async { Ok(()) },
                )
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(generations.load(Ordering::SeqCst), 1);
    let names: Vec<_> = coordinator
        .store()
        .list_events(&key)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_name)
        .collect();
    assert_eq!(names, vec![LockEventName::Start, LockEventName::Complete]);
}
