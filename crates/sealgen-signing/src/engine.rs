// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Document engine contract.
//!
//! PDF composition, incremental writing and signature placeholder layout are
//! owned by an external engine. The signing service only drives it through
//! this trait and hands it the pieces it cannot produce itself: the signature
//! value ([`ContentSigner`]) and the timestamp token
//! ([`crate::timestamp::TimestampCallback`]).

use async_trait::async_trait;

use crate::error::EngineError;
use crate::timestamp::TimestampCallback;

/// The two spans of a file surrounding a signature placeholder.
///
/// Follows the incremental-signing convention: `[(offset0, len0), (offset1, len1)]`
/// where the gap between the spans is the placeholder itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    spans: [(u64, u64); 2],
}

impl ByteRange {
    /// Build a byte range from its two `(offset, length)` spans.
    pub const fn new(first: (u64, u64), second: (u64, u64)) -> Self {
        Self {
            spans: [first, second],
        }
    }

    /// Byte range covering everything in a file of `total_len` bytes except
    /// the placeholder `[placeholder_start, placeholder_end)`.
    ///
    /// `None` unless `placeholder_start <= placeholder_end <= total_len`.
    pub const fn around_placeholder(
        total_len: u64,
        placeholder_start: u64,
        placeholder_end: u64,
    ) -> Option<Self> {
        if placeholder_start > placeholder_end {
            return None;
        }
        match total_len.checked_sub(placeholder_end) {
            Some(tail) => Some(Self::new((0, placeholder_start), (placeholder_end, tail))),
            None => None,
        }
    }

    /// The `(offset, length)` spans.
    pub fn spans(&self) -> [(u64, u64); 2] {
        self.spans
    }

    /// Total number of bytes covered by both spans.
    pub fn covered_len(&self) -> u64 {
        self.spans[0].1 + self.spans[1].1
    }

    /// Concatenated contents of both spans within `document`.
    pub fn extract(&self, document: &[u8]) -> Result<Vec<u8>, EngineError> {
        let mut content = Vec::with_capacity(self.covered_len() as usize);
        for (offset, len) in self.spans {
            let start = offset as usize;
            let end = start
                .checked_add(len as usize)
                .filter(|end| *end <= document.len())
                .ok_or_else(|| {
                    EngineError::Structure(format!(
                        "byte range {}+{} exceeds document length {}",
                        offset,
                        len,
                        document.len()
                    ))
                })?;
            content.extend_from_slice(&document[start..end]);
        }
        Ok(content)
    }
}

/// Write behaviour for one engine output pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Append to the existing file instead of rewriting it.
    pub incremental: bool,
    /// Validate the document structure before writing.
    pub validate: bool,
}

impl WriteOptions {
    /// Incremental write with validation, the cheapest and default pass.
    pub const fn incremental() -> Self {
        Self {
            incremental: true,
            validate: true,
        }
    }

    /// The same options with validation turned off.
    pub const fn without_validation(self) -> Self {
        Self {
            validate: false,
            ..self
        }
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self::incremental()
    }
}

/// Produces the detached signature value embedded in the signature dictionary.
pub trait ContentSigner: Send + Sync {
    /// Sign the concatenated byte-range content, returning DER-encoded PKCS#7.
    fn sign_detached(&self, content: &[u8]) -> Result<Vec<u8>, EngineError>;
}

/// Everything the engine needs to apply one signature.
#[derive(Clone, Copy)]
pub struct SignRequest<'a> {
    /// Human-readable reason stored in the signature dictionary.
    pub reason: &'a str,
    /// Signature value producer.
    pub signer: &'a dyn ContentSigner,
    /// Timestamp token producer, present only when a TSA is configured.
    pub timestamp: Option<&'a dyn TimestampCallback>,
}

impl std::fmt::Debug for SignRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignRequest")
            .field("reason", &self.reason)
            .field("timestamp", &self.timestamp.is_some())
            .finish()
    }
}

/// Long-term validation material embedded after signing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationData {
    /// DER certificates of the signer chain and the TSA.
    pub certificates: Vec<Vec<u8>>,
    /// DER-encoded revocation responses or lists, when available.
    pub revocation: Vec<Vec<u8>>,
}

/// External PDF engine driven by the signing service.
#[async_trait]
pub trait DocumentEngine: Send {
    /// Write the document with an embedded signature into `out`.
    ///
    /// The engine lays out the placeholder, calls `request.signer` with the
    /// byte-range content and, if present, `request.timestamp` with the
    /// serialized file and the byte range.
    async fn sign(
        &mut self,
        out: &mut Vec<u8>,
        request: &SignRequest<'_>,
        options: WriteOptions,
    ) -> Result<(), EngineError>;

    /// Write the document without a signature.
    async fn write(&mut self, out: &mut Vec<u8>, options: WriteOptions)
    -> Result<(), EngineError>;

    /// Validate the document, repairing what can be repaired when `auto_correct` is set.
    fn validate(&mut self, auto_correct: bool) -> Result<(), EngineError>;

    /// Append validation data (DSS) to an already signed `out`.
    fn embed_validation_data(
        &mut self,
        out: &mut Vec<u8>,
        data: &ValidationData,
    ) -> Result<(), EngineError>;
}
