// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Signing service.
//!
//! Drives a [`DocumentEngine`] through the sign fallback cascade and, when a
//! timestamp was applied, the long-term validation step.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument};

use crate::engine::{ByteRange, DocumentEngine, SignRequest, ValidationData, WriteOptions};
use crate::error::{EngineError, SigningError, TimestampError};
use crate::params::SigningParams;
use crate::timestamp::{SignatureDictionary, TimeStampToken, TimestampCallback};

/// Signs generated documents.
#[derive(Debug, Clone, Copy)]
pub struct SigningService {
    enable_ltv: bool,
}

impl Default for SigningService {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningService {
    /// Service with LTV enablement on.
    pub const fn new() -> Self {
        Self { enable_ltv: true }
    }

    /// Service that never embeds validation data.
    pub const fn without_ltv() -> Self {
        Self { enable_ltv: false }
    }

    /// Serialize the engine's document, signed when `params` is present.
    ///
    /// Without params the document is written incrementally and unsigned.
    #[instrument(skip_all, fields(signed = params.is_some()))]
    pub async fn sign<E>(
        &self,
        engine: &mut E,
        params: Option<&SigningParams>,
    ) -> Result<Vec<u8>, SigningError>
    where
        E: DocumentEngine + ?Sized,
    {
        let mut out = Vec::new();

        let Some(params) = params else {
            engine.write(&mut out, WriteOptions::incremental()).await?;
            return Ok(out);
        };

        let recorder = params.timestamp.as_deref().map(TokenRecorder::new);
        let request = SignRequest {
            timestamp: recorder.as_ref().map(|r| r as &dyn TimestampCallback),
            ..params.sign_request()
        };

        self.sign_with_fallback(engine, &request, &mut out).await?;
        let token = recorder.and_then(TokenRecorder::into_token);
        self.maybe_enable_ltv(engine, params, token.as_deref(), &mut out)?;

        info!(
            bytes = out.len(),
            timestamped = params.uses_timestamp(),
            "Document signed"
        );
        Ok(out)
    }

    async fn sign_with_fallback<E>(
        &self,
        engine: &mut E,
        request: &SignRequest<'_>,
        out: &mut Vec<u8>,
    ) -> Result<(), EngineError>
    where
        E: DocumentEngine + ?Sized,
    {
        let options = WriteOptions::incremental();

        let err = match engine.sign(out, request, options).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_format_error() => err,
            Err(err) => return Err(err),
        };
        report_tier_failure(1, &err);
        out.clear();

        if err.is_malformed() {
            let err = match engine.sign(out, request, options.without_validation()).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_format_error() => err,
                Err(err) => return Err(err),
            };
            report_tier_failure(2, &err);
            out.clear();
        }

        engine.validate(true)?;
        engine
            .sign(out, request, options.without_validation())
            .await
            .inspect_err(|err| report_tier_failure(3, err))
    }

    fn maybe_enable_ltv<E>(
        &self,
        engine: &mut E,
        params: &SigningParams,
        token: Option<&[u8]>,
        out: &mut Vec<u8>,
    ) -> Result<(), SigningError>
    where
        E: DocumentEngine + ?Sized,
    {
        if !self.enable_ltv || !params.uses_timestamp() {
            debug!("Skipping LTV enablement");
            return Ok(());
        }

        let mut certificates = params.credential.certificates_der()?;
        if let Some(token) = token {
            let token = TimeStampToken::parse(token)
                .map_err(|e| SigningError::Ltv(TimestampError::from(e).into()))?;
            for certificate in token.certificates {
                if !certificates.contains(&certificate) {
                    certificates.push(certificate);
                }
            }
        }
        debug!(certificates = certificates.len(), "Embedding validation data");

        let data = ValidationData {
            certificates,
            revocation: Vec::new(),
        };
        engine
            .embed_validation_data(out, &data)
            .map_err(SigningError::Ltv)
    }
}

fn report_tier_failure(tier: u8, err: &EngineError) {
    error!(
        tier = tier,
        error = %err,
        error_code = err.error_code(),
        "Signing attempt failed"
    );
}

/// Passes timestamp requests through and keeps the last token for LTV.
struct TokenRecorder<'a> {
    inner: &'a dyn TimestampCallback,
    token: Mutex<Option<Vec<u8>>>,
}

impl<'a> TokenRecorder<'a> {
    fn new(inner: &'a dyn TimestampCallback) -> Self {
        Self {
            inner,
            token: Mutex::new(None),
        }
    }

    fn into_token(self) -> Option<Vec<u8>> {
        self.token.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<'a> TimestampCallback for TokenRecorder<'a> {
    async fn timestamp(
        &self,
        document: &[u8],
        byte_range: ByteRange,
    ) -> Result<Vec<u8>, TimestampError> {
        let token = self.inner.timestamp(document, byte_range).await?;
        if let Ok(mut slot) = self.token.lock() {
            *slot = Some(token.clone());
        }
        Ok(token)
    }

    fn signature_dictionary(&self) -> SignatureDictionary {
        self.inner.signature_dictionary()
    }
}
