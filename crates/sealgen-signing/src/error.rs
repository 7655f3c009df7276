// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for sealgen-signing.

use thiserror::Error;

use crate::asn1::Asn1Error;
use crate::timestamp::PkiStatus;

/// Errors raised by the Time-Stamp Protocol client.
///
/// All of these are fatal for the current signing attempt; the client never
/// retries on its own.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TimestampError {
    /// The configured TSA URL could not be parsed.
    #[error("invalid TSA URL '{url}': {reason}")]
    InvalidUrl {
        /// The URL as configured.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The HTTP request could not be completed.
    #[error("TSA request to {url} failed: {source}")]
    Transport {
        /// TSA endpoint (without credentials).
        url: String,
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// The TSA answered with a status other than 200.
    #[error("TSA {url} responded with HTTP {status}")]
    HttpStatus {
        /// TSA endpoint (without credentials).
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The TSA answered 200 with an empty body.
    #[error("TSA {url} returned an empty body")]
    EmptyBody {
        /// TSA endpoint (without credentials).
        url: String,
    },

    /// The response body is not a valid `TimeStampResp`.
    #[error("malformed timestamp response: {0}")]
    Malformed(#[from] Asn1Error),

    /// The TSA refused to issue a token.
    #[error("TSA rejected the request with status {status}: {detail}")]
    Rejected {
        /// PKIStatus reported by the TSA.
        status: PkiStatus,
        /// Free text from the TSA, if any.
        detail: String,
    },

    /// A granted response did not carry a token.
    #[error("timestamp response carries no token")]
    MissingToken,

    /// The token does not answer the request that was sent.
    #[error("timestamp token does not match the request: {0}")]
    Mismatch(&'static str),

    /// Reading the signed byte range failed.
    #[error("failed to read signed byte range: {0}")]
    Io(#[from] std::io::Error),
}

impl TimestampError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "TSA_INVALID_URL",
            Self::Transport { .. } => "TSA_TRANSPORT",
            Self::HttpStatus { .. } => "TSA_HTTP_STATUS",
            Self::EmptyBody { .. } => "TSA_EMPTY_BODY",
            Self::Malformed(_) => "TSA_MALFORMED_RESPONSE",
            Self::Rejected { .. } => "TSA_REJECTED",
            Self::MissingToken => "TSA_MISSING_TOKEN",
            Self::Mismatch(_) => "TSA_TOKEN_MISMATCH",
            Self::Io(_) => "TSA_IO",
        }
    }
}

/// Errors reported by a [`crate::engine::DocumentEngine`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The document structure is malformed (recoverable by skipping validation).
    #[error("malformed PDF: {0}")]
    Malformed(String),

    /// A harder structural problem (recoverable by auto-correcting validation).
    #[error("PDF structure error: {0}")]
    Structure(String),

    /// The timestamp callback failed.
    #[error("timestamp failed: {0}")]
    Timestamp(#[from] TimestampError),

    /// Creating the signature value failed.
    #[error("signature creation failed: {0}")]
    Signature(String),

    /// Writing the output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Malformed-structure error, handled by the second cascade tier.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }

    /// Any format or integrity error the fallback cascade may recover from.
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::Structure(_))
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "PDF_MALFORMED",
            Self::Structure(_) => "PDF_STRUCTURE",
            Self::Timestamp(err) => err.error_code(),
            Self::Signature(_) => "SIGNATURE_FAILED",
            Self::Io(_) => "ENGINE_IO",
        }
    }
}

/// Errors loading signing credentials.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CredentialError {
    /// OpenSSL rejected the key material.
    #[error("invalid key material: {0}")]
    Openssl(#[from] openssl::error::ErrorStack),

    /// The bundle contains no certificate.
    #[error("credential bundle has no certificate")]
    MissingCertificate,

    /// The bundle contains no private key.
    #[error("credential bundle has no private key")]
    MissingPrivateKey,

    /// The private key does not belong to the certificate.
    #[error("private key does not match the signing certificate")]
    KeyMismatch,
}

/// Errors from the signing service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SigningError {
    /// The document engine failed and no fallback tier recovered.
    #[error("document engine error: {0}")]
    Engine(#[from] EngineError),

    /// Credential material could not be used.
    #[error("signing credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Timestamp client construction failed.
    #[error("timestamp configuration error: {0}")]
    Timestamp(#[from] TimestampError),

    /// Embedding long-term validation data failed.
    #[error("LTV enablement failed: {0}")]
    Ltv(#[source] EngineError),
}

impl SigningError {
    /// Timestamp failure underlying this error, if any.
    pub fn timestamp_error(&self) -> Option<&TimestampError> {
        match self {
            Self::Engine(EngineError::Timestamp(err)) | Self::Timestamp(err) => Some(err),
            _ => None,
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Engine(err) => err.error_code(),
            Self::Credential(_) => "CREDENTIAL_INVALID",
            Self::Timestamp(err) => err.error_code(),
            Self::Ltv(_) => "LTV_FAILED",
        }
    }
}
