// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! All documents of a submission merged into one file.
//!
//! Keyed by submitter, since it is produced on behalf of the submitter that
//! requests it, but attached to the submission.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use super::{
    AccountSigner, ArtifactGenerator, AttachmentOwner, AttachmentStore, DocumentRenderer,
    GeneratorKind, StoredAttachment, Submitter, fetch_single, single_document,
};

/// Sign reason of the combined document.
pub const COMBINED_SIGN_REASON: &str = "Combined document";

/// Produces the signed combined document for a completed submitter.
pub struct CombinedDocumentGenerator {
    renderer: Arc<dyn DocumentRenderer<Submitter>>,
    attachments: Arc<dyn AttachmentStore>,
    signer: AccountSigner,
}

impl CombinedDocumentGenerator {
    /// Create a generator from its collaborators.
    pub fn new(
        renderer: Arc<dyn DocumentRenderer<Submitter>>,
        attachments: Arc<dyn AttachmentStore>,
        signer: AccountSigner,
    ) -> Self {
        Self {
            renderer,
            attachments,
            signer,
        }
    }
}

#[async_trait]
impl ArtifactGenerator for CombinedDocumentGenerator {
    type Subject = Submitter;
    type Artifact = StoredAttachment;

    fn kind(&self) -> GeneratorKind {
        GeneratorKind::CombinedDocument
    }

    fn subject_id(&self, submitter: &Submitter) -> String {
        submitter.id.to_string()
    }

    fn is_ready(&self, submitter: &Submitter) -> bool {
        submitter.is_completed()
    }

    async fn generate(&self, submitter: &Submitter) -> anyhow::Result<StoredAttachment> {
        let documents = self
            .renderer
            .render(submitter)
            .await
            .context("failed to render combined document")?;
        let mut document = single_document(self.kind(), documents)?;

        let data = self
            .signer
            .sign(submitter.account_id, COMBINED_SIGN_REASON, document.engine.as_mut())
            .await?;
        let attachment = self
            .attachments
            .store(
                AttachmentOwner::Submission(submitter.submission_id),
                self.kind().attachment_name(),
                &document.filename,
                data,
            )
            .await?;

        info!(
            submitter_id = submitter.id,
            submission_id = submitter.submission_id,
            "Combined document stored"
        );
        Ok(attachment)
    }

    async fn fetch_existing(&self, submitter: &Submitter) -> anyhow::Result<StoredAttachment> {
        fetch_single(
            self.attachments.as_ref(),
            AttachmentOwner::Submission(submitter.submission_id),
            self.kind(),
        )
        .await
    }
}
