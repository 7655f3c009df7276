// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Signed result documents of one submitter.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{info, warn};

use super::{
    AccountSigner, ArtifactGenerator, AttachmentOwner, AttachmentStore, DocumentRenderer,
    GeneratorKind, StoredAttachment, Submitter,
};

/// Signs and stores every filled document of a completed submitter.
pub struct ResultAttachmentsGenerator {
    renderer: Arc<dyn DocumentRenderer<Submitter>>,
    attachments: Arc<dyn AttachmentStore>,
    signer: AccountSigner,
}

impl ResultAttachmentsGenerator {
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

    /// Sign reason embedded in every result document.
    pub fn sign_reason(submitter: &Submitter) -> String {
        format!("Signed by {}", submitter.email)
    }
}

#[async_trait]
impl ArtifactGenerator for ResultAttachmentsGenerator {
    type Subject = Submitter;
    type Artifact = Vec<StoredAttachment>;

    fn kind(&self) -> GeneratorKind {
        GeneratorKind::ResultAttachments
    }

    fn subject_id(&self, submitter: &Submitter) -> String {
        submitter.id.to_string()
    }

    fn is_ready(&self, submitter: &Submitter) -> bool {
        submitter.is_completed()
    }

    async fn generate(&self, submitter: &Submitter) -> anyhow::Result<Vec<StoredAttachment>> {
        let documents = self
            .renderer
            .render(submitter)
            .await
            .context("failed to render result documents")?;
        let reason = Self::sign_reason(submitter);
        let owner = AttachmentOwner::Submitter(submitter.id);

        let name = self.kind().attachment_name();

        let mut signed = Vec::with_capacity(documents.len());
        for mut document in documents {
            let data = self
                .signer
                .sign(submitter.account_id, &reason, document.engine.as_mut())
                .await?;
            signed.push((document.filename, data));
        }

        // Leftovers of an earlier attempt that failed after storing some files.
        let stale = self.attachments.remove(owner, name).await?;
        if stale > 0 {
            warn!(submitter_id = submitter.id, stale, "Removed stale result documents");
        }

        let mut stored = Vec::with_capacity(signed.len());
        for (filename, data) in signed {
            stored.push(self.attachments.store(owner, name, &filename, data).await?);
        }

        info!(
            submitter_id = submitter.id,
            documents = stored.len(),
            "Result documents stored"
        );
        Ok(stored)
    }

    async fn fetch_existing(&self, submitter: &Submitter) -> anyhow::Result<Vec<StoredAttachment>> {
        let owner = AttachmentOwner::Submitter(submitter.id);
        let stored = self
            .attachments
            .find(owner, self.kind().attachment_name())
            .await?;
        anyhow::ensure!(
            !stored.is_empty(),
            "no result documents stored for submitter {}",
            submitter.id
        );
        Ok(stored)
    }
}
