// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! DER encoding and decoding.
//!
//! Only the subset needed by the Time-Stamp Protocol is supported: single-byte
//! tags and definite lengths up to four octets.

use thiserror::Error;

/// Universal and context-specific tag bytes.
pub mod tag {
    /// BOOLEAN
    pub const BOOLEAN: u8 = 0x01;
    /// INTEGER
    pub const INTEGER: u8 = 0x02;
    /// BIT STRING
    pub const BIT_STRING: u8 = 0x03;
    /// OCTET STRING
    pub const OCTET_STRING: u8 = 0x04;
    /// NULL
    pub const NULL: u8 = 0x05;
    /// OBJECT IDENTIFIER
    pub const OBJECT_IDENTIFIER: u8 = 0x06;
    /// UTF8String
    pub const UTF8_STRING: u8 = 0x0c;
    /// GeneralizedTime
    pub const GENERALIZED_TIME: u8 = 0x18;
    /// SEQUENCE (constructed)
    pub const SEQUENCE: u8 = 0x30;
    /// SET (constructed)
    pub const SET: u8 = 0x31;

    /// Constructed context-specific tag `[n]`.
    pub const fn context(n: u8) -> u8 {
        0xa0 | n
    }
}

/// Encoded object identifier contents (without tag and length).
pub mod oid {
    /// id-sha512 (2.16.840.1.101.3.4.2.3)
    pub const SHA512: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03];
    /// id-signedData (1.2.840.113549.1.7.2)
    pub const SIGNED_DATA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];
    /// id-ct-TSTInfo (1.2.840.113549.1.9.16.1.4)
    pub const TST_INFO: &[u8] = &[
        0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x10, 0x01, 0x04,
    ];
}

/// DER decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Asn1Error {
    /// Input ended in the middle of a value.
    #[error("unexpected end of DER input")]
    Truncated,

    /// A different tag was found than the one required.
    #[error("expected tag 0x{expected:02x}, found 0x{found:02x}")]
    UnexpectedTag {
        /// Tag the decoder required.
        expected: u8,
        /// Tag present in the input.
        found: u8,
    },

    /// Length octets are not valid DER.
    #[error("unsupported DER length encoding")]
    InvalidLength,

    /// Bytes remained after the outermost value.
    #[error("trailing bytes after DER value")]
    TrailingData,

    /// The value could not be interpreted.
    #[error("invalid {0} value")]
    InvalidValue(&'static str),
}

/// One decoded tag-length-value triple, borrowing from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    /// The tag byte.
    pub tag: u8,
    /// The content octets.
    pub value: &'a [u8],
    /// The complete encoding including tag and length.
    pub encoded: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Reader over the contents of a constructed value.
    pub fn reader(&self) -> DerReader<'a> {
        DerReader::new(self.value)
    }
}

/// Sequential reader over concatenated DER values.
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    input: &'a [u8],
}

impl<'a> DerReader<'a> {
    /// Create a reader over `input`.
    pub fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    /// Whether all input has been consumed.
    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// Tag of the next value, if any.
    pub fn peek_tag(&self) -> Option<u8> {
        self.input.first().copied()
    }

    /// Read the next value regardless of its tag.
    pub fn read_any(&mut self) -> Result<Tlv<'a>, Asn1Error> {
        let (&tag, rest) = self.input.split_first().ok_or(Asn1Error::Truncated)?;
        if tag & 0x1f == 0x1f {
            return Err(Asn1Error::InvalidValue("multi-byte tag"));
        }

        let (&first, rest) = rest.split_first().ok_or(Asn1Error::Truncated)?;
        let (len, rest) = if first < 0x80 {
            (first as usize, rest)
        } else {
            let count = (first & 0x7f) as usize;
            if count == 0 || count > 4 {
                return Err(Asn1Error::InvalidLength);
            }
            if rest.len() < count {
                return Err(Asn1Error::Truncated);
            }
            let len = rest[..count]
                .iter()
                .fold(0usize, |acc, byte| (acc << 8) | *byte as usize);
            (len, &rest[count..])
        };

        if rest.len() < len {
            return Err(Asn1Error::Truncated);
        }

        let header_len = self.input.len() - rest.len();
        let encoded = &self.input[..header_len + len];
        let value = &rest[..len];
        self.input = &rest[len..];

        Ok(Tlv {
            tag,
            value,
            encoded,
        })
    }

    /// Read the next value, requiring `expected` as its tag.
    pub fn read(&mut self, expected: u8) -> Result<Tlv<'a>, Asn1Error> {
        let tlv = self.read_any()?;
        if tlv.tag != expected {
            return Err(Asn1Error::UnexpectedTag {
                expected,
                found: tlv.tag,
            });
        }
        Ok(tlv)
    }

    /// Read the next value only if it carries `expected` as its tag.
    pub fn read_optional(&mut self, expected: u8) -> Result<Option<Tlv<'a>>, Asn1Error> {
        if self.peek_tag() == Some(expected) {
            self.read(expected).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Require that no input remains.
    pub fn finish(self) -> Result<(), Asn1Error> {
        if self.input.is_empty() {
            Ok(())
        } else {
            Err(Asn1Error::TrailingData)
        }
    }
}

/// Decode a single top-level value spanning all of `input`.
pub fn decode_single(input: &[u8], expected: u8) -> Result<Tlv<'_>, Asn1Error> {
    let mut reader = DerReader::new(input);
    let tlv = reader.read(expected)?;
    reader.finish()?;
    Ok(tlv)
}

/// Interpret INTEGER contents as an unsigned value of at most 64 bits.
pub fn decode_u64(value: &[u8]) -> Result<u64, Asn1Error> {
    if value.is_empty() || value[0] & 0x80 != 0 {
        return Err(Asn1Error::InvalidValue("unsigned integer"));
    }
    let trimmed = match value {
        [0, rest @ ..] if !rest.is_empty() => rest,
        other => other,
    };
    if trimmed.len() > 8 {
        return Err(Asn1Error::InvalidValue("unsigned integer"));
    }
    Ok(trimmed
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | *byte as u64))
}

/// Interpret BOOLEAN contents.
pub fn decode_bool(value: &[u8]) -> Result<bool, Asn1Error> {
    match value {
        [0x00] => Ok(false),
        [0xff] => Ok(true),
        _ => Err(Asn1Error::InvalidValue("boolean")),
    }
}

/// Render OBJECT IDENTIFIER contents in dotted form.
pub fn oid_to_string(value: &[u8]) -> Result<String, Asn1Error> {
    let mut arcs: Vec<u64> = Vec::new();
    let mut current: u64 = 0;
    for (index, byte) in value.iter().enumerate() {
        current = current
            .checked_mul(128)
            .ok_or(Asn1Error::InvalidValue("object identifier"))?
            | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            if arcs.is_empty() {
                let first = (current / 40).min(2);
                arcs.push(first);
                arcs.push(current - first * 40);
            } else {
                arcs.push(current);
            }
            current = 0;
        } else if index == value.len() - 1 {
            return Err(Asn1Error::InvalidValue("object identifier"));
        }
    }
    if arcs.is_empty() {
        return Err(Asn1Error::InvalidValue("object identifier"));
    }
    Ok(arcs
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join("."))
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a value with the given tag.
pub fn encode(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 6);
    out.push(tag);
    encode_length(value.len(), &mut out);
    out.extend_from_slice(value);
    out
}

fn encode_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

/// SEQUENCE of already-encoded parts.
pub fn sequence(parts: &[Vec<u8>]) -> Vec<u8> {
    encode(tag::SEQUENCE, &parts.concat())
}

/// SET of already-encoded parts, in the given order.
pub fn set(parts: &[Vec<u8>]) -> Vec<u8> {
    encode(tag::SET, &parts.concat())
}

/// Explicitly tagged `[n]` wrapper around an encoded value.
pub fn explicit(n: u8, inner: &[u8]) -> Vec<u8> {
    encode(tag::context(n), inner)
}

/// Non-negative INTEGER.
pub fn integer_u64(value: u64) -> Vec<u8> {
    unsigned_integer(&value.to_be_bytes())
}

/// Non-negative INTEGER from big-endian magnitude bytes.
pub fn unsigned_integer(magnitude: &[u8]) -> Vec<u8> {
    let skip = magnitude.iter().take_while(|b| **b == 0).count();
    let significant = &magnitude[skip..];
    let mut content = Vec::with_capacity(significant.len() + 1);
    if significant.first().is_none_or(|b| b & 0x80 != 0) {
        content.push(0);
    }
    content.extend_from_slice(significant);
    encode(tag::INTEGER, &content)
}

/// BOOLEAN.
pub fn boolean(value: bool) -> Vec<u8> {
    encode(tag::BOOLEAN, &[if value { 0xff } else { 0x00 }])
}

/// OCTET STRING.
pub fn octet_string(value: &[u8]) -> Vec<u8> {
    encode(tag::OCTET_STRING, value)
}

/// OBJECT IDENTIFIER from encoded contents.
pub fn object_identifier(contents: &[u8]) -> Vec<u8> {
    encode(tag::OBJECT_IDENTIFIER, contents)
}

/// GeneralizedTime from its textual form (e.g. `20250101120000Z`).
pub fn generalized_time(value: &str) -> Vec<u8> {
    encode(tag::GENERALIZED_TIME, value.as_bytes())
}

/// UTF8String.
pub fn utf8_string(value: &str) -> Vec<u8> {
    encode(tag::UTF8_STRING, value.as_bytes())
}
