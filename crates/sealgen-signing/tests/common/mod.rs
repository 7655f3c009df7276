// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for sealgen-signing integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509Builder, X509NameBuilder};
use sealgen_signing::asn1::{self, oid};
use sealgen_signing::timestamp::{MessageImprint, SignatureDictionary, TimeStampRequest};
use sealgen_signing::{
    ByteRange, DocumentEngine, EngineError, SignRequest, SigningCredential, ValidationData,
    WriteOptions,
};
use wiremock::{Request, Respond, ResponseTemplate};

pub const DOCUMENT_HEAD: &[u8] = b"%PDF-1.7\n1 0 obj << /Type /Sig /Contents <";
pub const DOCUMENT_TAIL: &[u8] = b"> >> endobj\n%%EOF\n";
const PLACEHOLDER_LEN: usize = 32;

/// Self-signed credential, generated once per test binary.
pub fn test_credential() -> Arc<SigningCredential> {
    static CREDENTIAL: OnceLock<Arc<SigningCredential>> = OnceLock::new();
    CREDENTIAL
        .get_or_init(|| {
            let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
            let mut name = X509NameBuilder::new().unwrap();
            name.append_entry_by_text("CN", "Sealgen Integration Signer")
                .unwrap();
            let name = name.build();

            let mut builder = X509Builder::new().unwrap();
            builder.set_version(2).unwrap();
            let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
            builder.set_serial_number(&serial).unwrap();
            builder.set_subject_name(&name).unwrap();
            builder.set_issuer_name(&name).unwrap();
            builder.set_pubkey(&key).unwrap();
            builder
                .set_not_before(&Asn1Time::days_from_now(0).unwrap())
                .unwrap();
            builder
                .set_not_after(&Asn1Time::days_from_now(30).unwrap())
                .unwrap();
            builder.sign(&key, MessageDigest::sha256()).unwrap();

            Arc::new(SigningCredential::new(builder.build(), key, Vec::new()).unwrap())
        })
        .clone()
}

/// Document engine double.
///
/// Lays out a fixed document with a signature placeholder, calls the signer
/// and timestamp callback like a real engine would, and fails `sign` with the
/// scripted errors in order.
#[derive(Default)]
pub struct FakeEngine {
    pub sign_failures: VecDeque<EngineError>,
    pub sign_calls: Vec<WriteOptions>,
    pub write_calls: Vec<WriteOptions>,
    pub validate_calls: Vec<bool>,
    pub reasons: Vec<String>,
    pub signature: Option<Vec<u8>>,
    pub timestamp_token: Option<Vec<u8>>,
    pub timestamp_dictionary: Option<SignatureDictionary>,
    pub embedded: Option<ValidationData>,
}

impl FakeEngine {
    pub fn failing_with(failures: impl IntoIterator<Item = EngineError>) -> Self {
        Self {
            sign_failures: failures.into_iter().collect(),
            ..Self::default()
        }
    }

    fn layout() -> (Vec<u8>, ByteRange) {
        let mut document = DOCUMENT_HEAD.to_vec();
        let start = document.len() as u64;
        document.extend(std::iter::repeat_n(b'0', PLACEHOLDER_LEN));
        let end = document.len() as u64;
        document.extend_from_slice(DOCUMENT_TAIL);
        let range = ByteRange::around_placeholder(document.len() as u64, start, end).unwrap();
        (document, range)
    }
}

#[async_trait]
impl DocumentEngine for FakeEngine {
    async fn sign(
        &mut self,
        out: &mut Vec<u8>,
        request: &SignRequest<'_>,
        options: WriteOptions,
    ) -> Result<(), EngineError> {
        self.sign_calls.push(options);
        self.reasons.push(request.reason.to_string());

        // Partial output from a failed pass.
        out.extend_from_slice(b"partial");
        if let Some(err) = self.sign_failures.pop_front() {
            return Err(err);
        }
        out.clear();

        let (document, range) = Self::layout();
        let content = range.extract(&document)?;
        let signature = request.signer.sign_detached(&content)?;
        if let Some(timestamp) = request.timestamp {
            self.timestamp_dictionary = Some(timestamp.signature_dictionary());
            self.timestamp_token = Some(timestamp.timestamp(&document, range).await?);
        }

        out.extend_from_slice(&document);
        self.signature = Some(signature);
        Ok(())
    }

    async fn write(
        &mut self,
        out: &mut Vec<u8>,
        options: WriteOptions,
    ) -> Result<(), EngineError> {
        self.write_calls.push(options);
        out.extend_from_slice(DOCUMENT_HEAD);
        out.extend_from_slice(DOCUMENT_TAIL);
        Ok(())
    }

    fn validate(&mut self, auto_correct: bool) -> Result<(), EngineError> {
        self.validate_calls.push(auto_correct);
        Ok(())
    }

    fn embed_validation_data(
        &mut self,
        out: &mut Vec<u8>,
        data: &ValidationData,
    ) -> Result<(), EngineError> {
        out.extend_from_slice(b"\n% DSS\n");
        self.embedded = Some(data.clone());
        Ok(())
    }
}

/// Self-signed TSA certificate in DER, generated once per test binary.
pub fn tsa_certificate_der() -> Vec<u8> {
    static CERTIFICATE: OnceLock<Vec<u8>> = OnceLock::new();
    CERTIFICATE
        .get_or_init(|| {
            let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
            let mut name = X509NameBuilder::new().unwrap();
            name.append_entry_by_text("CN", "Sealgen Test TSA").unwrap();
            let name = name.build();

            let mut builder = X509Builder::new().unwrap();
            builder.set_version(2).unwrap();
            let serial = BigNum::from_u32(11).unwrap().to_asn1_integer().unwrap();
            builder.set_serial_number(&serial).unwrap();
            builder.set_subject_name(&name).unwrap();
            builder.set_issuer_name(&name).unwrap();
            builder.set_pubkey(&key).unwrap();
            builder
                .set_not_before(&Asn1Time::days_from_now(0).unwrap())
                .unwrap();
            builder
                .set_not_after(&Asn1Time::days_from_now(365).unwrap())
                .unwrap();
            builder.sign(&key, MessageDigest::sha256()).unwrap();
            builder.build().to_der().unwrap()
        })
        .clone()
}

/// DER `TimeStampToken` echoing `imprint` and `nonce`.
pub fn token_for(imprint: &MessageImprint, nonce: Option<u64>) -> Vec<u8> {
    token_with_certificates(imprint, nonce, &[])
}

/// DER `TimeStampToken` that also carries `certificates` in its `SignedData`.
pub fn token_with_certificates(
    imprint: &MessageImprint,
    nonce: Option<u64>,
    certificates: &[Vec<u8>],
) -> Vec<u8> {
    let mut tst_fields = vec![
        asn1::integer_u64(1),
        asn1::object_identifier(&[0x2a, 0x03, 0x04]),
        imprint.to_der(),
        asn1::integer_u64(1001),
        asn1::generalized_time("20250301093000Z"),
    ];
    if let Some(nonce) = nonce {
        tst_fields.push(asn1::integer_u64(nonce));
    }
    let tst_info = asn1::sequence(&tst_fields);
    let mut signed_fields = vec![
        asn1::integer_u64(3),
        asn1::set(&[asn1::sequence(&[asn1::object_identifier(oid::SHA512)])]),
        asn1::sequence(&[
            asn1::object_identifier(oid::TST_INFO),
            asn1::explicit(0, &asn1::octet_string(&tst_info)),
        ]),
    ];
    if !certificates.is_empty() {
        signed_fields.push(asn1::explicit(0, &certificates.concat()));
    }
    signed_fields.push(asn1::set(&[]));
    let signed_data = asn1::sequence(&signed_fields);
    asn1::sequence(&[
        asn1::object_identifier(oid::SIGNED_DATA),
        asn1::explicit(0, &signed_data),
    ])
}

/// Granted `TimeStampResp` wrapping `token`.
pub fn granted_response(token: Vec<u8>) -> Vec<u8> {
    asn1::sequence(&[asn1::sequence(&[asn1::integer_u64(0)]), token])
}

/// Wiremock responder acting as a TSA that grants every valid request.
pub struct TsaResponder;

impl Respond for TsaResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        match TimeStampRequest::from_der(&request.body) {
            Ok(parsed) => {
                let token = token_for(&parsed.message_imprint, parsed.nonce);
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/timestamp-reply")
                    .set_body_bytes(granted_response(token))
            }
            Err(_) => ResponseTemplate::new(400),
        }
    }
}

/// Like [`TsaResponder`], but the granted token carries the TSA certificate.
pub struct CertifyingTsaResponder;

impl Respond for CertifyingTsaResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        match TimeStampRequest::from_der(&request.body) {
            Ok(parsed) => {
                let token = token_with_certificates(
                    &parsed.message_imprint,
                    parsed.nonce,
                    &[tsa_certificate_der()],
                );
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/timestamp-reply")
                    .set_body_bytes(granted_response(token))
            }
            Err(_) => ResponseTemplate::new(400),
        }
    }
}
