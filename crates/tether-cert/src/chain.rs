// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Certificate chain representation and parsing.
//!
//! A [`CertificateChain`] is an ordered sequence of DER-encoded X.509
//! certificates, leaf first, as presented by a peer during a handshake.
//! Parsing uses `x509-parser`; the chain itself stores raw DER so it can
//! be handed to TLS stacks unchanged.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::error::{CertificateError, CertificateResult};

// =============================================================================
// CertificateChain
// =============================================================================

/// An ordered sequence of DER certificates, leaf first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateChain {
    ders: Vec<Vec<u8>>,
}

impl CertificateChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a chain from DER certificates, leaf first.
    pub fn from_ders(ders: Vec<Vec<u8>>) -> Self {
        Self { ders }
    }

    /// Parses a chain from concatenated PEM data, preserving order.
    pub fn from_pem(pem: &[u8]) -> CertificateResult<Self> {
        let mut ders = Vec::new();
        for (index, entry) in Pem::iter_from_buffer(pem).enumerate() {
            let entry =
                entry.map_err(|e| CertificateError::parsing(index, e.to_string()))?;
            ders.push(entry.contents);
        }
        Ok(Self { ders })
    }

    /// Appends a certificate to the chain.
    pub fn push(&mut self, der: Vec<u8>) {
        self.ders.push(der);
    }

    /// Returns the leaf (end-entity) certificate, if any.
    pub fn leaf(&self) -> Option<&[u8]> {
        self.ders.first().map(Vec::as_slice)
    }

    /// Returns the raw DER certificates, leaf first.
    pub fn ders(&self) -> &[Vec<u8>] {
        &self.ders
    }

    /// Returns the number of certificates in the chain.
    pub fn len(&self) -> usize {
        self.ders.len()
    }

    /// Returns `true` if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.ders.is_empty()
    }

    /// Parses every certificate into a summary, leaf first.
    pub fn summaries(&self) -> CertificateResult<Vec<CertificateSummary>> {
        self.ders
            .iter()
            .enumerate()
            .map(|(index, der)| summarize(der, index))
            .collect()
    }
}

// =============================================================================
// CertificateSummary
// =============================================================================

/// Parsed facts about one certificate.
#[derive(Debug, Clone)]
pub struct CertificateSummary {
    /// Subject DN.
    pub subject: String,
    /// Issuer DN.
    pub issuer: String,
    /// Serial number, hex-encoded.
    pub serial: String,
    /// Start of the validity window.
    pub not_before: DateTime<Utc>,
    /// End of the validity window.
    pub not_after: DateTime<Utc>,
    /// Whether subject and issuer are the same DN.
    pub is_self_signed: bool,
    /// SHA-256 thumbprint of the DER encoding, hex-encoded.
    pub thumbprint: String,
}

impl CertificateSummary {
    /// Days until the certificate expires (negative when already expired).
    pub fn days_until_expiration(&self) -> i64 {
        (self.not_after - Utc::now()).num_days()
    }

    /// Returns `true` if `at` falls inside the validity window.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.not_before && at <= self.not_after
    }
}

/// Parses a DER certificate into a [`CertificateSummary`].
///
/// `index` is the certificate's position in the presented chain and is
/// only used to label parse failures.
pub fn summarize(der: &[u8], index: usize) -> CertificateResult<CertificateSummary> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| CertificateError::parsing(index, e.to_string()))?;

    let not_before = asn1_to_utc(&cert.validity().not_before)
        .ok_or_else(|| CertificateError::parsing(index, "Unrepresentable notBefore"))?;
    let not_after = asn1_to_utc(&cert.validity().not_after)
        .ok_or_else(|| CertificateError::parsing(index, "Unrepresentable notAfter"))?;

    Ok(CertificateSummary {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial: cert.raw_serial_as_string(),
        not_before,
        not_after,
        is_self_signed: cert.subject().as_raw() == cert.issuer().as_raw(),
        thumbprint: thumbprint(der),
    })
}

/// Computes the SHA-256 thumbprint of a DER certificate, hex-encoded.
pub fn thumbprint(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    digest.iter().map(|b| format!("{:02X}", b)).collect()
}

fn asn1_to_utc(time: &ASN1Time) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.timestamp(), 0)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LEAF_PEM: &[u8] = include_bytes!("../testdata/leaf.pem");
    const ROOT_PEM: &[u8] = include_bytes!("../testdata/root.pem");
    const EXPIRED_PEM: &[u8] = include_bytes!("../testdata/expired.pem");

    fn der_of(pem: &[u8]) -> Vec<u8> {
        CertificateChain::from_pem(pem).unwrap().ders()[0].clone()
    }

    #[test]
    fn test_chain_from_pem() {
        let chain = CertificateChain::from_pem(LEAF_PEM).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(chain.leaf().is_some());
    }

    #[test]
    fn test_summarize_leaf() {
        let summary = summarize(&der_of(LEAF_PEM), 0).unwrap();
        assert!(summary.subject.contains("device.local"));
        assert!(summary.issuer.contains("Tether Test Root"));
        assert!(!summary.is_self_signed);
        assert_eq!(summary.thumbprint.len(), 64);
    }

    #[test]
    fn test_summarize_root_is_self_signed() {
        let summary = summarize(&der_of(ROOT_PEM), 0).unwrap();
        assert!(summary.is_self_signed);
        assert_eq!(summary.subject, summary.issuer);
    }

    #[test]
    fn test_expired_window() {
        let summary = summarize(&der_of(EXPIRED_PEM), 0).unwrap();
        assert!(!summary.is_valid_at(Utc::now()));
        assert!(summary.days_until_expiration() < 0);
    }

    #[test]
    fn test_garbage_der_fails_parsing() {
        let error = summarize(&[0xDE, 0xAD, 0xBE, 0xEF], 2).unwrap_err();
        assert!(matches!(error, CertificateError::Parsing { index: 2, .. }));
    }

    #[test]
    fn test_thumbprint_is_stable() {
        let der = der_of(LEAF_PEM);
        assert_eq!(thumbprint(&der), thumbprint(&der));
    }

    #[test]
    fn test_chain_ordering_preserved() {
        let mut chain = CertificateChain::new();
        chain.push(der_of(LEAF_PEM));
        chain.push(der_of(ROOT_PEM));

        let summaries = chain.summaries().unwrap();
        assert!(summaries[0].subject.contains("device.local"));
        assert!(summaries[1].subject.contains("Tether Test Root"));
    }
}
