// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test utilities for sealgen-core integration tests.
//!
//! Provides in-memory doubles for the collaborators the generators drive:
//! a document engine, a renderer, attachment storage and the per-account
//! signing resolver.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use openssl::asn1::Asn1Time;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509Builder, X509NameBuilder};
use sealgen_core::generators::{
    AccountSigningResolver, AttachmentOwner, AttachmentStore, DocumentRenderer,
    RenderedDocument, StoredAttachment, Submission, Submitter,
};
use sealgen_core::{LockCoordinator, LockSettings, SqliteLockEventStore};
use sealgen_signing::{
    ByteRange, DocumentEngine, EngineError, SignRequest, SigningCredential, ValidationData,
    WriteOptions,
};

pub const SIGNED_MARKER: &[u8] = b"%SIGNED";
pub const UNSIGNED_DOCUMENT: &[u8] = b"%PDF-1.7\n%%EOF\n";

/// Helper macro to skip tests if TEST_DATABASE_URL is not set.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}

/// Millisecond timing so tests run fast.
pub fn fast_settings() -> LockSettings {
    LockSettings {
        poll_interval: Duration::from_millis(5),
        retry_backoff: Duration::from_millis(10),
        wait_timeout: Duration::from_secs(5),
        race_budget: Duration::from_secs(5),
    }
}

/// Coordinator over a fresh in-memory SQLite log.
pub async fn sqlite_coordinator(settings: LockSettings) -> LockCoordinator {
    let store = SqliteLockEventStore::in_memory()
        .await
        .expect("Failed to create in-memory store");
    LockCoordinator::with_settings(Arc::new(store), settings)
}

/// Self-signed credential, generated once per test binary.
pub fn test_credential() -> Arc<SigningCredential> {
    static CREDENTIAL: OnceLock<Arc<SigningCredential>> = OnceLock::new();
    CREDENTIAL
        .get_or_init(|| {
            let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
            let mut name = X509NameBuilder::new().unwrap();
            name.append_entry_by_text("CN", "Sealgen Core Signer").unwrap();
            let name = name.build();

            let mut builder = X509Builder::new().unwrap();
            builder.set_version(2).unwrap();
            builder.set_subject_name(&name).unwrap();
            builder.set_issuer_name(&name).unwrap();
            builder.set_pubkey(&key).unwrap();
            builder
                .set_not_before(&Asn1Time::days_from_now(0).unwrap())
                .unwrap();
            builder
                .set_not_after(&Asn1Time::days_from_now(30).unwrap())
                .unwrap();
            builder.sign(&key, MessageDigest::sha256()).unwrap();

            Arc::new(SigningCredential::new(builder.build(), key, Vec::new()).unwrap())
        })
        .clone()
}

pub fn submitter(id: i64, submission_id: i64, completed: bool) -> Submitter {
    Submitter {
        id,
        submission_id,
        account_id: 1,
        email: format!("signer{id}@example.com"),
        completed_at: completed.then(Utc::now),
    }
}

pub fn submission(id: i64, submitters: Vec<Submitter>) -> Submission {
    Submission {
        id,
        account_id: 1,
        submitters,
    }
}

/// Engine that records the sign reasons it was asked for.
pub struct RecordingEngine {
    reasons: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl DocumentEngine for RecordingEngine {
    async fn sign(
        &mut self,
        out: &mut Vec<u8>,
        request: &SignRequest<'_>,
        _options: WriteOptions,
    ) -> Result<(), EngineError> {
        self.reasons.lock().unwrap().push(request.reason.to_string());

        let mut document = UNSIGNED_DOCUMENT.to_vec();
        let len = document.len() as u64;
        let range = ByteRange::around_placeholder(len, len / 2, len / 2).unwrap();
        request.signer.sign_detached(&range.extract(&document)?)?;
        if let Some(timestamp) = request.timestamp {
            timestamp.timestamp(&document, range).await?;
        }

        document.extend_from_slice(SIGNED_MARKER);
        out.extend_from_slice(&document);
        Ok(())
    }

    async fn write(&mut self, out: &mut Vec<u8>, _options: WriteOptions) -> Result<(), EngineError> {
        out.extend_from_slice(UNSIGNED_DOCUMENT);
        Ok(())
    }

    fn validate(&mut self, _auto_correct: bool) -> Result<(), EngineError> {
        Ok(())
    }

    fn embed_validation_data(
        &mut self,
        _out: &mut Vec<u8>,
        _data: &ValidationData,
    ) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Renders a fixed list of files for any subject.
pub struct StaticRenderer {
    filenames: Vec<String>,
    delay: Duration,
    pub renders: AtomicUsize,
    pub reasons: Arc<Mutex<Vec<String>>>,
}

impl StaticRenderer {
    pub fn new(filenames: &[&str]) -> Self {
        Self {
            filenames: filenames.iter().map(|f| f.to_string()).collect(),
            delay: Duration::ZERO,
            renders: AtomicUsize::new(0),
            reasons: Arc::default(),
        }
    }

    /// Sleep this long in every render, widening race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().unwrap().clone()
    }

    async fn documents(&self) -> anyhow::Result<Vec<RenderedDocument>> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self
            .filenames
            .iter()
            .map(|filename| RenderedDocument {
                filename: filename.clone(),
                engine: Box::new(RecordingEngine {
                    reasons: self.reasons.clone(),
                }),
            })
            .collect())
    }
}

#[async_trait]
impl DocumentRenderer<Submitter> for StaticRenderer {
    async fn render(&self, _subject: &Submitter) -> anyhow::Result<Vec<RenderedDocument>> {
        self.documents().await
    }
}

#[async_trait]
impl DocumentRenderer<Submission> for StaticRenderer {
    async fn render(&self, _subject: &Submission) -> anyhow::Result<Vec<RenderedDocument>> {
        self.documents().await
    }
}

/// Attachment storage kept in memory.
#[derive(Default)]
pub struct MemoryAttachments {
    stored: Mutex<Vec<StoredAttachment>>,
}

impl MemoryAttachments {
    pub fn all(&self) -> Vec<StoredAttachment> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl AttachmentStore for MemoryAttachments {
    async fn store(
        &self,
        owner: AttachmentOwner,
        name: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> anyhow::Result<StoredAttachment> {
        let attachment = StoredAttachment {
            owner,
            name: name.to_string(),
            filename: filename.to_string(),
            data,
        };
        self.stored.lock().unwrap().push(attachment.clone());
        Ok(attachment)
    }

    async fn find(
        &self,
        owner: AttachmentOwner,
        name: &str,
    ) -> anyhow::Result<Vec<StoredAttachment>> {
        Ok(self
            .stored
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.owner == owner && a.name == name)
            .cloned()
            .collect())
    }

    async fn remove(&self, owner: AttachmentOwner, name: &str) -> anyhow::Result<usize> {
        let mut stored = self.stored.lock().unwrap();
        let before = stored.len();
        stored.retain(|a| !(a.owner == owner && a.name == name));
        Ok(before - stored.len())
    }
}

/// The same credential and TSA URL for every account.
#[derive(Default)]
pub struct StaticResolver {
    pub credential: Option<Arc<SigningCredential>>,
    pub tsa_url: Option<String>,
}

impl StaticResolver {
    pub fn signing() -> Self {
        Self {
            credential: Some(test_credential()),
            tsa_url: None,
        }
    }

    pub fn with_tsa(tsa_url: impl Into<String>) -> Self {
        Self {
            credential: Some(test_credential()),
            tsa_url: Some(tsa_url.into()),
        }
    }
}

#[async_trait]
impl AccountSigningResolver for StaticResolver {
    async fn credential(&self, _account_id: i64) -> anyhow::Result<Option<Arc<SigningCredential>>> {
        Ok(self.credential.clone())
    }

    async fn tsa_url(&self, _account_id: i64) -> anyhow::Result<Option<String>> {
        Ok(self.tsa_url.clone())
    }
}
