// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lock coordinator.
//!
//! Runs an expensive generation at most once per key, no matter how many
//! callers ask for it concurrently, and recovers from executors that crashed
//! or failed mid-way. All coordination goes through the event log; the only
//! mutual exclusion is the store's unique index.
//!
//! # Protocol
//!
//! ```text
//!   ensure(key)
//!     │
//!     ├─ not ready ────────────────────────────► NotReady
//!     │
//!     ├─ 1. complete exists? ──── yes ─────────► fetch_existing()
//!     │
//!     ├─ 2. last event
//!     │      start / retry ────► wait mode ───► fetch_existing() | WaitForCompleteTimeout
//!     │      none ─────────────► write start ─┐
//!     │      fail ─────────────► write retry ─┤
//!     │                                        │ lost the race: back off, goto 1
//!     │                                        ▼
//!     └─ 3. generate() ── ok ──► write complete ► artifact
//!                      └─ err ─► write fail ───► GenerationFailed
//! ```
//!
//! Once a caller becomes the executor, generation and the `complete`/`fail`
//! write run on a spawned task. Dropping the `ensure` future stops the caller
//! from waiting but never leaves the key without an outcome.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::config::Config;
use crate::error::{CoordinatorError, StoreError};
use crate::generators::ArtifactGenerator;
use crate::lock::{LockEvent, LockEventName, LockKey, LockState};
use crate::persistence::{self, LockEventStore};

/// Coordinator timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    /// Interval between last-event polls in wait mode.
    pub poll_interval: Duration,
    /// Sleep after losing a `start`/`retry` race.
    pub retry_backoff: Duration,
    /// Cumulative wait budget in wait mode.
    pub wait_timeout: Duration,
    /// Cumulative backoff budget for race retries.
    pub race_budget: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            retry_backoff: Duration::from_secs(2),
            wait_timeout: Duration::from_secs(90),
            race_budget: Duration::from_secs(90),
        }
    }
}

/// Outcome of one attempt to become the executor.
enum Claim {
    /// A `complete` event exists.
    Completed,
    /// Another executor holds the key.
    Wait,
    /// This caller wrote `start` or `retry` and must generate.
    Acquired(LockEvent),
    /// Another caller won the write.
    Raced,
}

/// Database-backed single-writer, many-waiters coordinator.
#[derive(Clone)]
pub struct LockCoordinator {
    store: Arc<dyn LockEventStore>,
    settings: LockSettings,
}

impl LockCoordinator {
    /// Coordinator with the default timing.
    pub fn new(store: Arc<dyn LockEventStore>) -> Self {
        Self::with_settings(store, LockSettings::default())
    }

    /// Coordinator with explicit timing.
    pub fn with_settings(store: Arc<dyn LockEventStore>, settings: LockSettings) -> Self {
        Self { store, settings }
    }

    /// Connect to the configured database and use the configured timing.
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let store = persistence::connect(&config.database_url, config.db_max_connections).await?;
        Ok(Self::with_settings(store, config.lock_settings()))
    }

    /// The event log store.
    pub fn store(&self) -> &Arc<dyn LockEventStore> {
        &self.store
    }

    /// The timing in use.
    pub fn settings(&self) -> LockSettings {
        self.settings
    }

    /// Derived lock state of `key`.
    pub async fn state(&self, key: &str) -> Result<LockState, StoreError> {
        let events = self.store.list_events(key).await?;
        Ok(LockState::from_events(&events))
    }

    /// Return the artifact for `key`, generating it if nobody has yet.
    ///
    /// `generate` runs at most once across all concurrent callers of the same
    /// key and its result is returned unmodified. Every other caller gets the
    /// output of `fetch_existing`. Errors are logged with their error code
    /// before being returned; nothing is retried automatically.
    ///
    /// The generation future is spawned, hence the `Send + 'static` bounds.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn ensure<T, G, GFut, F, FFut>(
        &self,
        key: &str,
        ready: bool,
        generate: G,
        fetch_existing: F,
    ) -> Result<T, CoordinatorError>
    where
        T: Send + 'static,
        G: FnOnce() -> GFut,
        GFut: Future<Output = anyhow::Result<T>> + Send + 'static,
        F: FnOnce() -> FFut,
        FFut: Future<Output = anyhow::Result<T>>,
    {
        let result = self.run(key, ready, generate, fetch_existing).await;
        if let Err(err) = &result {
            error!(
                key = %key,
                error_code = err.error_code(),
                error = %err,
                "Artifact generation did not succeed"
            );
        }
        result
    }

    /// [`Self::ensure`] for one of the artifact generators.
    pub async fn ensure_generated<G>(
        &self,
        generator: &Arc<G>,
        subject: &Arc<G::Subject>,
    ) -> Result<G::Artifact, CoordinatorError>
    where
        G: ArtifactGenerator + ?Sized + 'static,
        G::Subject: 'static,
        G::Artifact: 'static,
    {
        let key = LockKey::new(generator.kind().prefix(), generator.subject_id(subject));
        let executor = Arc::clone(generator);
        let executor_subject = Arc::clone(subject);
        self.ensure(
            &key.to_string(),
            generator.is_ready(subject),
            move || async move { executor.generate(&executor_subject).await },
            || generator.fetch_existing(subject),
        )
        .await
    }

    async fn run<T, G, GFut, F, FFut>(
        &self,
        key: &str,
        ready: bool,
        generate: G,
        fetch_existing: F,
    ) -> Result<T, CoordinatorError>
    where
        T: Send + 'static,
        G: FnOnce() -> GFut,
        GFut: Future<Output = anyhow::Result<T>> + Send + 'static,
        F: FnOnce() -> FFut,
        FFut: Future<Output = anyhow::Result<T>>,
    {
        if !ready {
            return Err(CoordinatorError::NotReady {
                key: key.to_string(),
            });
        }

        let mut backoff_total = Duration::ZERO;
        let acquired = loop {
            match self.claim(key).await? {
                Claim::Completed => return fetch(key, fetch_existing).await,
                Claim::Wait => return self.wait_for_complete(key, fetch_existing).await,
                Claim::Acquired(event) => break event,
                Claim::Raced => {
                    backoff_total += self.settings.retry_backoff;
                    if backoff_total > self.settings.race_budget {
                        return Err(CoordinatorError::RaceRetryExceeded {
                            key: key.to_string(),
                            waited: backoff_total - self.settings.retry_backoff,
                        });
                    }
                    warn!(
                        backoff_ms = self.settings.retry_backoff.as_millis() as u64,
                        "Lost lock race, backing off"
                    );
                    tokio::time::sleep(self.settings.retry_backoff).await;
                }
            }
        };

        info!(event = %acquired.event_name, event_id = acquired.id, "Lock acquired, generating");
        self.execute(key, generate()).await
    }

    /// Steps 1-3: fast path, read the log, try to write `start`/`retry`.
    async fn claim(&self, key: &str) -> Result<Claim, StoreError> {
        if self.store.fresh_complete_exists(key).await? {
            debug!("Artifact already generated");
            return Ok(Claim::Completed);
        }

        let events = self.store.list_events(key).await?;
        match LockState::from_last(events.last().map(|e| e.event_name)) {
            LockState::Idle => {}
            LockState::Failed => return self.claim_retry(key).await,
            LockState::Completed => return Ok(Claim::Completed),
            LockState::InProgress => return Ok(Claim::Wait),
        }

        match self.store.append(key, LockEventName::Start).await {
            Ok(written) => Ok(Claim::Acquired(written)),
            Err(StoreError::AlreadyLocked { .. }) => Ok(Claim::Raced),
            Err(err) => Err(err),
        }
    }

    async fn claim_retry(&self, key: &str) -> Result<Claim, StoreError> {
        let Some(written) = self.store.append_retry(key).await? else {
            debug!("Completed before retry was written");
            return Ok(Claim::Completed);
        };

        if self.won_retry(key, &written).await? {
            Ok(Claim::Acquired(written))
        } else {
            Ok(Claim::Raced)
        }
    }

    /// `retry` rows are not covered by the unique index, so two callers that
    /// both saw the same `fail` can both write one. The earliest `retry` after
    /// that `fail` wins.
    async fn won_retry(&self, key: &str, written: &LockEvent) -> Result<bool, StoreError> {
        let events = self.store.list_events(key).await?;
        let last_fail = events
            .iter()
            .filter(|e| e.id < written.id && e.event_name == LockEventName::Fail)
            .map(|e| e.id)
            .max()
            .unwrap_or(0);

        Ok(!events.iter().any(|e| {
            e.event_name == LockEventName::Retry && e.id > last_fail && e.id < written.id
        }))
    }

    /// Wait mode: poll the last event until `complete`, `fail` or the budget runs out.
    async fn wait_for_complete<T, F, FFut>(
        &self,
        key: &str,
        fetch_existing: F,
    ) -> Result<T, CoordinatorError>
    where
        F: FnOnce() -> FFut,
        FFut: Future<Output = anyhow::Result<T>>,
    {
        debug!("Generation in progress elsewhere, waiting");
        let mut waited = Duration::ZERO;

        loop {
            tokio::time::sleep(self.settings.poll_interval).await;
            waited += self.settings.poll_interval;

            let last = self.store.last_event(key).await?.map(|e| e.event_name);
            match LockState::from_last(last) {
                LockState::Completed => {
                    debug!(waited_ms = waited.as_millis() as u64, "Generation completed elsewhere");
                    return fetch(key, fetch_existing).await;
                }
                LockState::Failed => {
                    if self.store.fresh_complete_exists(key).await? {
                        return fetch(key, fetch_existing).await;
                    }
                    return Err(CoordinatorError::WaitForCompleteTimeout {
                        key: key.to_string(),
                        waited,
                        observed_failure: true,
                    });
                }
                LockState::Idle | LockState::InProgress => {}
            }

            if waited > self.settings.wait_timeout {
                return Err(CoordinatorError::WaitForCompleteTimeout {
                    key: key.to_string(),
                    waited,
                    observed_failure: false,
                });
            }
        }
    }

    /// Steps 3 and 5 on their own task, so the outcome is recorded even when
    /// the caller stops waiting.
    async fn execute<T, GFut>(&self, key: &str, generation: GFut) -> Result<T, CoordinatorError>
    where
        T: Send + 'static,
        GFut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let task = tokio::spawn(
            record_outcome(self.store.clone(), key.to_string(), generation).in_current_span(),
        );

        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(CoordinatorError::GenerationFailed {
                key: key.to_string(),
                source: anyhow::Error::new(err).context("generation task was cancelled"),
            }),
        }
    }
}

async fn record_outcome<T, GFut>(
    store: Arc<dyn LockEventStore>,
    key: String,
    generation: GFut,
) -> Result<T, CoordinatorError>
where
    GFut: Future<Output = anyhow::Result<T>>,
{
    let outcome = AssertUnwindSafe(generation).catch_unwind().await;

    match outcome {
        Ok(Ok(artifact)) => match store.append(&key, LockEventName::Complete).await {
            Ok(_) => {
                info!("Generation completed");
                Ok(artifact)
            }
            Err(StoreError::AlreadyLocked { .. }) => {
                warn!("Complete event already recorded");
                Ok(artifact)
            }
            Err(err) => {
                record_failure(store.as_ref(), &key).await;
                Err(err.into())
            }
        },
        Ok(Err(source)) => {
            record_failure(store.as_ref(), &key).await;
            Err(CoordinatorError::GenerationFailed { key, source })
        }
        Err(panic) => {
            record_failure(store.as_ref(), &key).await;
            std::panic::resume_unwind(panic)
        }
    }
}

async fn record_failure(store: &dyn LockEventStore, key: &str) {
    if let Err(err) = store.append(key, LockEventName::Fail).await {
        error!(
            error_code = err.error_code(),
            error = %err,
            "Failed to record fail event"
        );
    }
}

async fn fetch<T, F, FFut>(key: &str, fetch_existing: F) -> Result<T, CoordinatorError>
where
    F: FnOnce() -> FFut,
    FFut: Future<Output = anyhow::Result<T>>,
{
    fetch_existing()
        .await
        .map_err(|source| CoordinatorError::FetchFailed {
            key: key.to_string(),
            source,
        })
}
