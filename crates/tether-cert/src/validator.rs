// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Chain and validity-window validation.
//!
//! The [`ChainValidator`] is the gate that secure connection engines run
//! before they may report `Connected`. It performs a PKIX-style walk over
//! the presented chain:
//!
//! 1. every certificate parses as X.509 and sits inside its validity window
//! 2. each certificate's issuer DN matches the next element's subject DN
//! 3. each signature verifies against the next element's public key
//! 4. the walk terminates at a certificate that either *is* a configured
//!    trust anchor or is signed by one
//!
//! Failures name the certificate that caused them. Warnings (imminent
//! expiry) are reported alongside a successful result.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use x509_parser::prelude::*;

use crate::anchor::TrustAnchorSet;
use crate::chain::{summarize, thumbprint, CertificateChain};
use crate::error::{CertificateError, CertificateResult};

// =============================================================================
// ValidationPolicy
// =============================================================================

/// Tunable checks applied during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Reject certificates past their `notAfter`.
    pub check_expiration: bool,
    /// Reject certificates before their `notBefore`.
    pub check_not_before: bool,
    /// Verify issuer signatures along the chain.
    pub check_signatures: bool,
    /// Allow a self-signed leaf when it is itself a configured anchor.
    pub allow_self_signed: bool,
    /// Accept a chain whose terminal certificate anchors nowhere, treating
    /// that certificate as its own anchor. Lab bring-up only: this defeats
    /// chain validation as a security control, warns on every use, and is
    /// never set by the stock policies.
    #[serde(default)]
    pub allow_chain_tail_anchor: bool,
    /// Warn when the leaf expires within this many days.
    pub expiration_warning_days: i64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            check_expiration: true,
            check_not_before: true,
            check_signatures: true,
            allow_self_signed: false,
            allow_chain_tail_anchor: false,
            expiration_warning_days: 30,
        }
    }
}

impl ValidationPolicy {
    /// The default policy for production connections.
    pub fn strict() -> Self {
        Self::default()
    }

    /// A relaxed policy for lab bring-up: self-signed device certificates
    /// are accepted when anchored explicitly.
    pub fn lab() -> Self {
        Self {
            allow_self_signed: true,
            expiration_warning_days: 7,
            ..Self::default()
        }
    }
}

// =============================================================================
// ChainReport
// =============================================================================

/// Result of a successful chain validation.
#[derive(Debug, Clone)]
pub struct ChainReport {
    /// Number of certificates walked.
    pub depth: usize,
    /// Subject DN of the leaf certificate.
    pub leaf_subject: String,
    /// Thumbprint of the leaf certificate.
    pub leaf_thumbprint: String,
    /// Non-fatal findings (imminent expiry and similar).
    pub warnings: Vec<String>,
}

// =============================================================================
// ChainValidator
// =============================================================================

/// Validates presented certificate chains against a configured root store.
#[derive(Debug, Clone)]
pub struct ChainValidator {
    anchors: TrustAnchorSet,
    policy: ValidationPolicy,
}

impl ChainValidator {
    /// Creates a validator with the default (strict) policy.
    pub fn new(anchors: TrustAnchorSet) -> Self {
        Self::with_policy(anchors, ValidationPolicy::default())
    }

    /// Creates a validator with a custom policy.
    pub fn with_policy(anchors: TrustAnchorSet, policy: ValidationPolicy) -> Self {
        Self { anchors, policy }
    }

    /// Returns the policy in force.
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Returns the configured anchors.
    pub fn anchors(&self) -> &TrustAnchorSet {
        &self.anchors
    }

    /// Validates the validity windows of individual certificates.
    ///
    /// Confirms every blob parses as X.509 and that the current time falls
    /// inside its `notBefore`/`notAfter` window. Fails on the first
    /// invalid certificate, naming it.
    pub fn validate_certificates(&self, certs: &[Vec<u8>]) -> CertificateResult<()> {
        let now = Utc::now();

        for (index, der) in certs.iter().enumerate() {
            let summary = summarize(der, index)?;

            if self.policy.check_expiration && now > summary.not_after {
                return Err(CertificateError::expired(summary.subject, summary.not_after));
            }

            if self.policy.check_not_before && now < summary.not_before {
                return Err(CertificateError::not_yet_valid(
                    summary.subject,
                    summary.not_before,
                ));
            }
        }

        Ok(())
    }

    /// Builds and validates a certification path for the presented chain.
    ///
    /// See the module documentation for the walk performed. Returns a
    /// [`ChainReport`] carrying any non-fatal warnings.
    pub fn validate_chain(&self, chain: &CertificateChain) -> CertificateResult<ChainReport> {
        if chain.is_empty() {
            return Err(CertificateError::EmptyChain);
        }

        // Window checks first: an expired certificate fails the chain
        // before any signature work.
        self.validate_certificates(chain.ders())?;

        let ders = chain.ders();
        let parsed: Vec<X509Certificate<'_>> = ders
            .iter()
            .enumerate()
            .map(|(index, der)| {
                X509Certificate::from_der(der)
                    .map(|(_, cert)| cert)
                    .map_err(|e| CertificateError::parsing(index, e.to_string()))
            })
            .collect::<CertificateResult<_>>()?;

        // Walk the intermediate links: issuer naming plus signature.
        for i in 0..parsed.len() - 1 {
            let cert = &parsed[i];
            let issuer = &parsed[i + 1];

            if cert.issuer().as_raw() != issuer.subject().as_raw() {
                return Err(CertificateError::IssuerMismatch {
                    subject: cert.subject().to_string(),
                    expected: cert.issuer().to_string(),
                    found: issuer.subject().to_string(),
                });
            }

            if self.policy.check_signatures {
                cert.verify_signature(Some(issuer.public_key())).map_err(|_| {
                    CertificateError::signature_invalid(
                        cert.subject().to_string(),
                        issuer.subject().to_string(),
                    )
                })?;
            }
        }

        self.anchor_terminal(&parsed, ders)?;

        let leaf = &parsed[0];
        let mut warnings = Vec::new();

        let leaf_summary = summarize(&ders[0], 0)?;
        if leaf_summary.days_until_expiration() <= self.policy.expiration_warning_days {
            warnings.push(format!(
                "Leaf certificate '{}' expires in {} days",
                leaf_summary.subject,
                leaf_summary.days_until_expiration()
            ));
        }

        let report = ChainReport {
            depth: parsed.len(),
            leaf_subject: leaf.subject().to_string(),
            leaf_thumbprint: thumbprint(&ders[0]),
            warnings,
        };

        tracing::debug!(
            leaf = %report.leaf_subject,
            depth = report.depth,
            warnings = report.warnings.len(),
            "Certificate chain validated"
        );

        Ok(report)
    }

    /// Anchors the terminal certificate of the walk in the root store.
    fn anchor_terminal(
        &self,
        parsed: &[X509Certificate<'_>],
        ders: &[Vec<u8>],
    ) -> CertificateResult<()> {
        let (terminal, terminal_der) = match (parsed.last(), ders.last()) {
            (Some(cert), Some(der)) => (cert, der),
            _ => return Err(CertificateError::EmptyChain),
        };
        let terminal_subject = terminal.subject().to_string();

        let is_self_signed = terminal.subject().as_raw() == terminal.issuer().as_raw();
        if is_self_signed && parsed.len() == 1 && !self.policy.allow_self_signed {
            // A lone self-signed certificate is only acceptable when the
            // policy says so AND it is itself an anchor.
            return Err(CertificateError::SelfSignedNotAllowed {
                subject: terminal_subject,
            });
        }

        // Case 1: the terminal certificate is itself a configured anchor.
        if self.anchors.contains_thumbprint(&thumbprint(terminal_der)) {
            return Ok(());
        }

        // Lab escape hatch: anchor on the presented chain itself.
        if self.policy.allow_chain_tail_anchor {
            tracing::warn!(
                subject = %terminal_subject,
                "Accepting chain anchored on its own terminal certificate; \
                 this is not a secure PKI policy"
            );
            return Ok(());
        }

        // Case 2: the terminal certificate is signed by a configured anchor.
        if let Some(anchor) = self.anchors.find_by_subject_raw(terminal.issuer().as_raw()) {
            if self.policy.check_signatures {
                let (_, anchor_cert) = X509Certificate::from_der(anchor.der())
                    .map_err(|e| CertificateError::parsing(0, e.to_string()))?;

                terminal
                    .verify_signature(Some(anchor_cert.public_key()))
                    .map_err(|_| {
                        CertificateError::signature_invalid(
                            terminal_subject.clone(),
                            anchor.subject().to_string(),
                        )
                    })?;
            }
            return Ok(());
        }

        Err(CertificateError::not_trusted(terminal_subject))
    }
}

// =============================================================================
// Tests
// =============================================================================
