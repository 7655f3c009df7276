// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Audit trail of a submission.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use super::{
    AccountSigner, ArtifactGenerator, AttachmentOwner, AttachmentStore, DocumentRenderer,
    GeneratorKind, StoredAttachment, Submission, fetch_single, single_document,
};

/// Sign reason of the audit trail document.
pub const AUDIT_SIGN_REASON: &str = "Audit log";

/// Produces the signed audit trail once every submitter has completed.
pub struct AuditTrailGenerator {
    renderer: Arc<dyn DocumentRenderer<Submission>>,
    attachments: Arc<dyn AttachmentStore>,
    signer: AccountSigner,
}

impl AuditTrailGenerator {
    /// Create a generator from its collaborators.
    pub fn new(
        renderer: Arc<dyn DocumentRenderer<Submission>>,
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
impl ArtifactGenerator for AuditTrailGenerator {
    type Subject = Submission;
    type Artifact = StoredAttachment;

    fn kind(&self) -> GeneratorKind {
        GeneratorKind::AuditTrail
    }

    fn subject_id(&self, submission: &Submission) -> String {
        submission.id.to_string()
    }

    fn is_ready(&self, submission: &Submission) -> bool {
        submission.all_completed()
    }

    async fn generate(&self, submission: &Submission) -> anyhow::Result<StoredAttachment> {
        let documents = self
            .renderer
            .render(submission)
            .await
            .context("failed to render audit trail")?;
        let mut document = single_document(self.kind(), documents)?;

        let data = self
            .signer
            .sign(submission.account_id, AUDIT_SIGN_REASON, document.engine.as_mut())
            .await?;
        let attachment = self
            .attachments
            .store(
                AttachmentOwner::Submission(submission.id),
                self.kind().attachment_name(),
                &document.filename,
                data,
            )
            .await?;

        info!(
            submission_id = submission.id,
            bytes = attachment.data.len(),
            "Audit trail stored"
        );
        Ok(attachment)
    }

    async fn fetch_existing(&self, submission: &Submission) -> anyhow::Result<StoredAttachment> {
        fetch_single(
            self.attachments.as_ref(),
            AttachmentOwner::Submission(submission.id),
            self.kind(),
        )
        .await
    }
}
