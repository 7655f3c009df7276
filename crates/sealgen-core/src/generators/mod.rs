// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Artifact generators.
//!
//! Each generator renders documents for one subject through an external
//! [`DocumentRenderer`], signs them with the owning account's credential and
//! persists them through an external [`AttachmentStore`]. The coordinator
//! decides whether [`ArtifactGenerator::generate`] or
//! [`ArtifactGenerator::fetch_existing`] runs.
//!
//! | Kind | Key prefix | Subject | Attachment | Sign reason |
//! |------|------------|---------|------------|-------------|
//! | Result attachments | `result_attachments` | submitter | `documents` | `Signed by <email>` |
//! | Audit trail | `audit_trail` | submission | `audit_trail` | `Audit log` |
//! | Combined document | `combined_document` | submitter | `combined_document` | `Combined document` |

pub mod audit;
pub mod combined;
pub mod result;

pub use self::audit::AuditTrailGenerator;
pub use self::combined::CombinedDocumentGenerator;
pub use self::result::ResultAttachmentsGenerator;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sealgen_signing::timestamp::DEFAULT_TSA_TIMEOUT;
use sealgen_signing::{
    DocumentEngine, SigningCredential, SigningParams, SigningService,
    build_signing_params_with_timeout,
};
use serde::Serialize;
use tracing::debug;

use crate::config::Config;

/// The three generated artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    /// Signed copies of the filled documents, per submitter.
    ResultAttachments,
    /// Audit trail of a whole submission.
    AuditTrail,
    /// All documents merged into one, per submitter.
    CombinedDocument,
}

impl GeneratorKind {
    /// Lock key prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::ResultAttachments => "result_attachments",
            Self::AuditTrail => "audit_trail",
            Self::CombinedDocument => "combined_document",
        }
    }

    /// Name the artifact is attached under.
    pub fn attachment_name(&self) -> &'static str {
        match self {
            Self::ResultAttachments => "documents",
            Self::AuditTrail => "audit_trail",
            Self::CombinedDocument => "combined_document",
        }
    }
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One signer of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitter {
    /// Submitter id.
    pub id: i64,
    /// Owning submission.
    pub submission_id: i64,
    /// Account owning the template, used to resolve signing credentials.
    pub account_id: i64,
    /// Email shown in the sign reason.
    pub email: String,
    /// When the submitter finished filling in the form.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Submitter {
    /// Whether the submitter has completed.
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// A submission and all of its submitters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Submission id.
    pub id: i64,
    /// Account owning the submission.
    pub account_id: i64,
    /// Every submitter of the submission.
    pub submitters: Vec<Submitter>,
}

impl Submission {
    /// Whether every submitter has completed.
    pub fn all_completed(&self) -> bool {
        self.submitters.iter().all(Submitter::is_completed)
    }
}

/// Record an attachment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentOwner {
    /// Attached to a submitter.
    Submitter(i64),
    /// Attached to a submission.
    Submission(i64),
}

/// A persisted attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    /// Owning record.
    pub owner: AttachmentOwner,
    /// Attachment name (`documents`, `audit_trail`, `combined_document`).
    pub name: String,
    /// File name of the blob.
    pub filename: String,
    /// File contents.
    pub data: Vec<u8>,
}

/// A rendered, not yet serialized, document.
pub struct RenderedDocument {
    /// File name to store the document under.
    pub filename: String,
    /// Engine holding the document.
    pub engine: Box<dyn DocumentEngine>,
}

impl fmt::Debug for RenderedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedDocument")
            .field("filename", &self.filename)
            .finish_non_exhaustive()
    }
}

/// Renders the documents of a subject.
#[async_trait]
pub trait DocumentRenderer<S: Sync + ?Sized>: Send + Sync {
    /// Compose the documents for `subject`.
    async fn render(&self, subject: &S) -> anyhow::Result<Vec<RenderedDocument>>;
}

/// Blob storage for generated artifacts.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Persist `data` under `name` for `owner`.
    async fn store(
        &self,
        owner: AttachmentOwner,
        name: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> anyhow::Result<StoredAttachment>;

    /// All attachments named `name` of `owner`, oldest first.
    async fn find(&self, owner: AttachmentOwner, name: &str)
    -> anyhow::Result<Vec<StoredAttachment>>;

    /// Delete every attachment named `name` of `owner`, returning how many went.
    async fn remove(&self, owner: AttachmentOwner, name: &str) -> anyhow::Result<usize>;
}

/// Per-account signing configuration.
#[async_trait]
pub trait AccountSigningResolver: Send + Sync {
    /// The account's signing credential, if it has one.
    async fn credential(&self, account_id: i64) -> anyhow::Result<Option<Arc<SigningCredential>>>;

    /// The account's TSA URL, if it has one.
    async fn tsa_url(&self, account_id: i64) -> anyhow::Result<Option<String>>;
}

/// Produces one kind of artifact for a subject.
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    /// What the artifact is generated for.
    type Subject: Send + Sync;
    /// What generation returns.
    type Artifact: Send;

    /// Kind of artifact, which also fixes the lock key prefix.
    fn kind(&self) -> GeneratorKind;

    /// Identifier of `subject` within the key space of this kind.
    fn subject_id(&self, subject: &Self::Subject) -> String;

    /// Whether `subject` may be generated for yet.
    fn is_ready(&self, subject: &Self::Subject) -> bool;

    /// Render, sign and persist the artifact.
    async fn generate(&self, subject: &Self::Subject) -> anyhow::Result<Self::Artifact>;

    /// Read back an already persisted artifact.
    async fn fetch_existing(&self, subject: &Self::Subject) -> anyhow::Result<Self::Artifact>;
}

/// Signs documents with the credential of their owning account.
#[derive(Clone)]
pub struct AccountSigner {
    resolver: Arc<dyn AccountSigningResolver>,
    service: SigningService,
    tsa_timeout: Duration,
}

impl AccountSigner {
    /// Signer with LTV enabled and the default TSA timeout.
    pub fn new(resolver: Arc<dyn AccountSigningResolver>) -> Self {
        Self {
            resolver,
            service: SigningService::new(),
            tsa_timeout: DEFAULT_TSA_TIMEOUT,
        }
    }

    /// Signer using the configured TSA timeout.
    pub fn from_config(resolver: Arc<dyn AccountSigningResolver>, config: &Config) -> Self {
        Self::new(resolver).with_tsa_timeout(config.tsa_timeout)
    }

    /// The HTTP timeout used for TSA round-trips.
    pub fn tsa_timeout(&self) -> Duration {
        self.tsa_timeout
    }

    /// Use a differently configured signing service.
    pub fn with_service(mut self, service: SigningService) -> Self {
        self.service = service;
        self
    }

    /// HTTP timeout for TSA round-trips.
    pub fn with_tsa_timeout(mut self, timeout: Duration) -> Self {
        self.tsa_timeout = timeout;
        self
    }

    /// Signing parameters for `account_id`, or `None` when it has no credential.
    pub async fn signing_params(
        &self,
        account_id: i64,
        reason: &str,
    ) -> anyhow::Result<Option<SigningParams>> {
        let Some(credential) = self.resolver.credential(account_id).await? else {
            debug!(account_id, "No signing credential, writing unsigned");
            return Ok(None);
        };
        let tsa_url = self.resolver.tsa_url(account_id).await?;
        let params = build_signing_params_with_timeout(
            credential,
            reason,
            tsa_url.as_deref(),
            self.tsa_timeout,
        )?;
        Ok(Some(params))
    }

    /// Serialize `engine`'s document, signed when the account has a credential.
    pub async fn sign(
        &self,
        account_id: i64,
        reason: &str,
        engine: &mut dyn DocumentEngine,
    ) -> anyhow::Result<Vec<u8>> {
        let params = self.signing_params(account_id, reason).await?;
        let bytes = self
            .service
            .sign(engine, params.as_ref())
            .await
            .with_context(|| format!("failed to sign document ({reason})"))?;
        Ok(bytes)
    }
}

impl fmt::Debug for AccountSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSigner")
            .field("service", &self.service)
            .field("tsa_timeout", &self.tsa_timeout)
            .finish_non_exhaustive()
    }
}

/// The single document a renderer must produce for one-file artifacts.
fn single_document(
    kind: GeneratorKind,
    documents: Vec<RenderedDocument>,
) -> anyhow::Result<RenderedDocument> {
    let count = documents.len();
    let mut documents = documents.into_iter();
    match (documents.next(), count) {
        (Some(document), 1) => Ok(document),
        _ => anyhow::bail!("{kind} renderer produced {count} documents, expected 1"),
    }
}

/// The single stored attachment of a one-file artifact.
async fn fetch_single(
    attachments: &dyn AttachmentStore,
    owner: AttachmentOwner,
    kind: GeneratorKind,
) -> anyhow::Result<StoredAttachment> {
    attachments
        .find(owner, kind.attachment_name())
        .await?
        .pop()
        .with_context(|| format!("no '{}' attachment for {:?}", kind.attachment_name(), owner))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitter(id: i64, completed: bool) -> Submitter {
        Submitter {
            id,
            submission_id: 1,
            account_id: 1,
            email: format!("s{id}@example.com"),
            completed_at: completed.then(Utc::now),
        }
    }

    #[test]
    fn test_kind_prefixes_and_attachment_names() {
        assert_eq!(GeneratorKind::ResultAttachments.prefix(), "result_attachments");
        assert_eq!(GeneratorKind::ResultAttachments.attachment_name(), "documents");
        assert_eq!(GeneratorKind::AuditTrail.prefix(), "audit_trail");
        assert_eq!(GeneratorKind::AuditTrail.attachment_name(), "audit_trail");
        assert_eq!(GeneratorKind::CombinedDocument.to_string(), "combined_document");
        assert_eq!(
            GeneratorKind::CombinedDocument.attachment_name(),
            "combined_document"
        );
    }

    #[test]
    fn test_submission_completion() {
        let mut submission = Submission {
            id: 1,
            account_id: 1,
            submitters: vec![submitter(1, true), submitter(2, false)],
        };
        assert!(!submission.all_completed());

        submission.submitters[1].completed_at = Some(Utc::now());
        assert!(submission.all_completed());
    }

    struct NoCredentials;

    #[async_trait]
    impl AccountSigningResolver for NoCredentials {
        async fn credential(&self, _account_id: i64) -> anyhow::Result<Option<Arc<SigningCredential>>> {
            Ok(None)
        }

        async fn tsa_url(&self, _account_id: i64) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_signer_from_config() {
        let config = Config {
            database_url: "sqlite::memory:".to_string(),
            lock_poll_interval: Duration::from_secs(1),
            lock_retry_backoff: Duration::from_secs(2),
            lock_timeout: Duration::from_secs(90),
            tsa_timeout: Duration::from_secs(12),
            db_max_connections: 1,
        };

        let signer = AccountSigner::from_config(Arc::new(NoCredentials), &config);

        assert_eq!(signer.tsa_timeout(), Duration::from_secs(12));
        assert!(signer.signing_params(1, "Audit log").await.unwrap().is_none());
    }

    #[test]
    fn test_single_document_requires_exactly_one() {
        let err = single_document(GeneratorKind::AuditTrail, Vec::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "audit_trail renderer produced 0 documents, expected 1"
        );
    }
}
