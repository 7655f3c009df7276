// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Signing parameter construction.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::credential::SigningCredential;
use crate::engine::SignRequest;
use crate::error::TimestampError;
use crate::timestamp::{DEFAULT_TSA_TIMEOUT, TimestampCallback, TimestampClient};

/// Everything needed to sign one document.
#[derive(Clone)]
pub struct SigningParams {
    /// Certificate and key of the signer.
    pub credential: Arc<SigningCredential>,
    /// Reason written into the signature dictionary.
    pub reason: String,
    /// Timestamp token producer, present when the account has a TSA configured.
    pub timestamp: Option<Arc<dyn TimestampCallback>>,
}

impl SigningParams {
    /// Parameters without a timestamp.
    pub fn new(credential: Arc<SigningCredential>, reason: impl Into<String>) -> Self {
        Self {
            credential,
            reason: reason.into(),
            timestamp: None,
        }
    }

    /// Attach a timestamp callback.
    pub fn with_timestamp(mut self, timestamp: Arc<dyn TimestampCallback>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Whether a TSA will be contacted while signing.
    pub fn uses_timestamp(&self) -> bool {
        self.timestamp.is_some()
    }

    /// Borrowed request handed to the document engine.
    pub fn sign_request(&self) -> SignRequest<'_> {
        SignRequest {
            reason: &self.reason,
            signer: self.credential.as_ref(),
            timestamp: self.timestamp.as_deref(),
        }
    }
}

impl fmt::Debug for SigningParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningParams")
            .field("credential", &self.credential)
            .field("reason", &self.reason)
            .field("timestamp", &self.uses_timestamp())
            .finish()
    }
}

/// Build signing parameters, creating a TSA client when `tsa_url` is non-blank.
pub fn build_signing_params(
    credential: Arc<SigningCredential>,
    reason: impl Into<String>,
    tsa_url: Option<&str>,
) -> Result<SigningParams, TimestampError> {
    build_signing_params_with_timeout(credential, reason, tsa_url, DEFAULT_TSA_TIMEOUT)
}

/// [`build_signing_params`] with an explicit TSA HTTP timeout.
pub fn build_signing_params_with_timeout(
    credential: Arc<SigningCredential>,
    reason: impl Into<String>,
    tsa_url: Option<&str>,
    tsa_timeout: Duration,
) -> Result<SigningParams, TimestampError> {
    let params = SigningParams::new(credential, reason);
    match tsa_url.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => {
            let client = TimestampClient::with_timeout(url, tsa_timeout)?;
            Ok(params.with_timestamp(Arc::new(client)))
        }
        None => Ok(params),
    }
}
