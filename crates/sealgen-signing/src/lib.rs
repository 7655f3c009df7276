// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sealgen Signing - document signatures and trusted timestamps
//!
//! This crate wraps generated documents with a PKCS#7 signature and, when the
//! owning account has a Time-Stamping Authority configured, embeds an RFC 3161
//! timestamp token obtained over HTTP.
//!
//! # Flow
//!
//! ```text
//!  SigningParams ──► SigningService::sign ──► DocumentEngine::sign
//!                          │                        │
//!                          │ fallback cascade       ├──► ContentSigner (PKCS#7)
//!                          │ LTV enablement         └──► TimestampCallback
//!                          ▼                                  │
//!                     signed bytes                  TimestampClient ──► TSA (HTTP)
//! ```
//!
//! The PDF engine itself is an external collaborator described by the
//! [`engine::DocumentEngine`] trait; this crate supplies everything that runs
//! around it: credentials, signature creation, the tiered repair fallback and
//! the timestamp protocol.
//!
//! # Sign Fallback Cascade
//!
//! | Tier | Trigger | Action |
//! |------|---------|--------|
//! | 1 | - | incremental sign, validation enabled |
//! | 2 | malformed PDF | incremental sign, validation disabled |
//! | 3 | structural error | auto-correcting validation, then sign without validation |
//!
//! # Modules
//!
//! - [`asn1`]: minimal DER codec for the RFC 3161 structures
//! - [`credential`]: certificate and private key material
//! - [`engine`]: the document engine contract
//! - [`error`]: error types
//! - [`params`]: signing parameter construction
//! - [`service`]: the signing service
//! - [`timestamp`]: the RFC 3161 client

#![deny(missing_docs)]

/// Minimal DER encoder/decoder for timestamp protocol messages.
pub mod asn1;

/// Signing certificates and private keys.
pub mod credential;

/// Contract of the external PDF document engine.
pub mod engine;

/// Error types for signing and timestamping.
pub mod error;

/// Signing parameter construction.
pub mod params;

/// Signing service with the repair fallback cascade and LTV step.
pub mod service;

/// RFC 3161 Time-Stamp Protocol client.
pub mod timestamp;

pub use credential::SigningCredential;
pub use engine::{
    ByteRange, ContentSigner, DocumentEngine, SignRequest, ValidationData, WriteOptions,
};
pub use error::{CredentialError, EngineError, SigningError, TimestampError};
pub use params::{SigningParams, build_signing_params, build_signing_params_with_timeout};
pub use service::SigningService;
pub use timestamp::{TimeStampToken, TimestampCallback, TimestampClient};
