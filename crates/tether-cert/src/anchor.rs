// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Trust anchor management.
//!
//! A [`TrustAnchorSet`] holds the root certificates that chain validation
//! terminates at. Anchors come from an independently configured root
//! store (PEM/DER files on disk or DER bytes handed in by the host) -
//! never implicitly from the peer's own presented chain.
//!
//! The one escape hatch is [`TrustAnchorSet::from_chain_tail`], which
//! trusts the terminal certificate of a presented chain. It exists for
//! lab bring-up against devices whose roots are not yet provisioned,
//! warns loudly at construction, and must be selected by name in
//! configuration; it is not reachable by default.

use std::path::Path;

use x509_parser::prelude::*;

use crate::chain::{thumbprint, CertificateChain};
use crate::error::{CertificateError, CertificateResult};

// =============================================================================
// TrustAnchor
// =============================================================================

/// One configured root certificate.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    der: Vec<u8>,
    subject: String,
    subject_raw: Vec<u8>,
    thumbprint: String,
}

impl TrustAnchor {
    /// Parses an anchor from DER bytes.
    pub fn from_der(der: Vec<u8>) -> CertificateResult<Self> {
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| CertificateError::parsing(0, e.to_string()))?;

        let subject = cert.subject().to_string();
        let subject_raw = cert.subject().as_raw().to_vec();
        drop(cert);

        let thumbprint = thumbprint(&der);

        Ok(Self {
            der,
            subject,
            subject_raw,
            thumbprint,
        })
    }

    /// Returns the anchor's DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the anchor's subject DN.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the raw DER encoding of the subject name.
    pub fn subject_raw(&self) -> &[u8] {
        &self.subject_raw
    }

    /// Returns the anchor's SHA-256 thumbprint.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }
}

// =============================================================================
// TrustAnchorSet
// =============================================================================

/// The configured set of roots that chains must terminate at.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchorSet {
    anchors: Vec<TrustAnchor>,
}

impl TrustAnchorSet {
    /// Creates an empty anchor set.
    ///
    /// An empty set trusts nothing: every chain validation against it
    /// fails with `NotTrusted`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds an anchor set from DER certificates.
    pub fn from_ders(ders: Vec<Vec<u8>>) -> CertificateResult<Self> {
        let anchors = ders
            .into_iter()
            .map(TrustAnchor::from_der)
            .collect::<CertificateResult<Vec<_>>>()?;
        Ok(Self { anchors })
    }

    /// Loads anchors from PEM or DER files.
    ///
    /// Files ending in `.pem` or `.crt` are parsed as (possibly
    /// concatenated) PEM; anything else is treated as a single DER
    /// certificate.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> CertificateResult<Self> {
        let mut set = Self::empty();

        for path in paths {
            let path = path.as_ref();
            let bytes = std::fs::read(path).map_err(|source| CertificateError::Io {
                path: path.to_path_buf(),
                source,
            })?;

            let is_pem = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("pem") | Some("crt")
            );

            if is_pem {
                let chain = CertificateChain::from_pem(&bytes)?;
                for der in chain.ders() {
                    set.add(TrustAnchor::from_der(der.clone())?);
                }
            } else {
                set.add(TrustAnchor::from_der(bytes)?);
            }
        }

        tracing::info!(anchors = set.len(), "Loaded trust anchor store");
        Ok(set)
    }

    /// Trusts the terminal certificate of a presented chain.
    ///
    /// Lab use only: this anchors trust in whatever the peer presented,
    /// which defeats chain validation as a security control. Production
    /// configurations must provision a real root store instead.
    pub fn from_chain_tail(chain: &CertificateChain) -> CertificateResult<Self> {
        let tail = chain
            .ders()
            .last()
            .ok_or(CertificateError::EmptyChain)?
            .clone();

        let anchor = TrustAnchor::from_der(tail)?;

        tracing::warn!(
            subject = %anchor.subject(),
            "Trusting the presented chain's own terminal certificate; \
             this is not a secure PKI policy and must not be used in production"
        );

        Ok(Self {
            anchors: vec![anchor],
        })
    }

    /// Adds an anchor to the set.
    pub fn add(&mut self, anchor: TrustAnchor) {
        self.anchors.push(anchor);
    }

    /// Returns the number of anchors.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Returns the anchors.
    pub fn anchors(&self) -> &[TrustAnchor] {
        &self.anchors
    }

    /// Returns `true` if a certificate with this thumbprint is an anchor.
    pub fn contains_thumbprint(&self, thumbprint: &str) -> bool {
        self.anchors.iter().any(|a| a.thumbprint() == thumbprint)
    }

    /// Finds the anchor whose subject matches the given raw DN, if any.
    pub fn find_by_subject_raw(&self, subject_raw: &[u8]) -> Option<&TrustAnchor> {
        self.anchors.iter().find(|a| a.subject_raw() == subject_raw)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT_PEM: &[u8] = include_bytes!("../testdata/root.pem");
    const LEAF_PEM: &[u8] = include_bytes!("../testdata/leaf.pem");

    fn der_of(pem: &[u8]) -> Vec<u8> {
        CertificateChain::from_pem(pem).unwrap().ders()[0].clone()
    }

    #[test]
    fn test_anchor_from_der() {
        let anchor = TrustAnchor::from_der(der_of(ROOT_PEM)).unwrap();
        assert!(anchor.subject().contains("Tether Test Root"));
        assert_eq!(anchor.thumbprint().len(), 64);
    }

    #[test]
    fn test_set_from_ders() {
        let set = TrustAnchorSet::from_ders(vec![der_of(ROOT_PEM)]).unwrap();
        assert_eq!(set.len(), 1);

        let root_thumb = thumbprint(&der_of(ROOT_PEM));
        assert!(set.contains_thumbprint(&root_thumb));
        assert!(!set.contains_thumbprint("0000"));
    }

    #[test]
    fn test_empty_set_trusts_nothing() {
        let set = TrustAnchorSet::empty();
        assert!(set.is_empty());
        assert!(set.find_by_subject_raw(b"anything").is_none());
    }

    #[test]
    fn test_from_chain_tail_uses_terminal_certificate() {
        let chain =
            CertificateChain::from_ders(vec![der_of(LEAF_PEM), der_of(ROOT_PEM)]);
        let set = TrustAnchorSet::from_chain_tail(&chain).unwrap();

        assert_eq!(set.len(), 1);
        assert!(set.anchors()[0].subject().contains("Tether Test Root"));
    }

    #[test]
    fn test_from_chain_tail_empty_chain() {
        let chain = CertificateChain::new();
        assert!(matches!(
            TrustAnchorSet::from_chain_tail(&chain),
            Err(CertificateError::EmptyChain)
        ));
    }

    #[test]
    fn test_anchor_from_garbage_fails() {
        assert!(TrustAnchor::from_der(vec![1, 2, 3]).is_err());
    }
}
