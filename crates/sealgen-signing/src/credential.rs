// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Signing credentials.
//!
//! A credential is the signer certificate, its private key and the
//! intermediate/root chain. It is resolved per owning account; accounts
//! without one get unsigned output.

use std::fmt;

use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::stack::Stack;
use openssl::x509::{X509, X509Ref};

use crate::engine::ContentSigner;
use crate::error::{CredentialError, EngineError};

/// Certificate, private key and chain used to sign documents.
#[derive(Clone)]
pub struct SigningCredential {
    certificate: X509,
    private_key: PKey<Private>,
    chain: Vec<X509>,
}

impl SigningCredential {
    /// Assemble a credential, checking that the key belongs to the certificate.
    pub fn new(
        certificate: X509,
        private_key: PKey<Private>,
        chain: Vec<X509>,
    ) -> Result<Self, CredentialError> {
        if !certificate.public_key()?.public_eq(&private_key) {
            return Err(CredentialError::KeyMismatch);
        }
        Ok(Self {
            certificate,
            private_key,
            chain,
        })
    }

    /// Load from PEM: signer certificate, private key and an optional chain bundle.
    pub fn from_pem(
        certificate_pem: &[u8],
        private_key_pem: &[u8],
        chain_pem: &[u8],
    ) -> Result<Self, CredentialError> {
        let certificate = X509::from_pem(certificate_pem)?;
        let private_key = PKey::private_key_from_pem(private_key_pem)?;
        let chain = if chain_pem.iter().all(u8::is_ascii_whitespace) {
            Vec::new()
        } else {
            X509::stack_from_pem(chain_pem)?
        };
        Self::new(certificate, private_key, chain)
    }

    /// Load from a DER PKCS#12 bundle.
    pub fn from_pkcs12(der: &[u8], password: &str) -> Result<Self, CredentialError> {
        let parsed = Pkcs12::from_der(der)?.parse2(password)?;
        let certificate = parsed.cert.ok_or(CredentialError::MissingCertificate)?;
        let private_key = parsed.pkey.ok_or(CredentialError::MissingPrivateKey)?;
        let chain = parsed
            .ca
            .map(|stack| stack.into_iter().collect())
            .unwrap_or_default();
        Self::new(certificate, private_key, chain)
    }

    /// The signer certificate.
    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    /// The signer private key.
    pub fn private_key(&self) -> &PKeyRef<Private> {
        &self.private_key
    }

    /// Intermediate and root certificates.
    pub fn chain(&self) -> &[X509] {
        &self.chain
    }

    /// Common name of the signer certificate subject.
    pub fn subject_common_name(&self) -> Option<String> {
        self.certificate
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|name| name.to_string())
    }

    /// DER encodings of the signer certificate followed by the chain.
    pub fn certificates_der(&self) -> Result<Vec<Vec<u8>>, CredentialError> {
        std::iter::once(&self.certificate)
            .chain(self.chain.iter())
            .map(|cert| cert.to_der().map_err(CredentialError::from))
            .collect()
    }
}

impl ContentSigner for SigningCredential {
    fn sign_detached(&self, content: &[u8]) -> Result<Vec<u8>, EngineError> {
        let signature = || -> Result<Vec<u8>, openssl::error::ErrorStack> {
            let mut certs = Stack::new()?;
            for cert in &self.chain {
                certs.push(cert.clone())?;
            }
            let flags = Pkcs7Flags::DETACHED | Pkcs7Flags::BINARY;
            Pkcs7::sign(
                &self.certificate,
                &self.private_key,
                &certs,
                content,
                flags,
            )?
            .to_der()
        };
        signature().map_err(|e| EngineError::Signature(e.to_string()))
    }
}

impl fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredential")
            .field("subject", &self.subject_common_name())
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}
