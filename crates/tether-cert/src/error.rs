// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Certificate-specific error types.
//!
//! Every failing validation names the certificate that caused it, so a
//! rejected chain can be diagnosed without re-running the walk.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

// =============================================================================
// CertificateError
// =============================================================================

/// Errors raised by certificate parsing and validation.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The chain contained no certificates.
    #[error("Certificate chain is empty")]
    EmptyChain,

    /// A certificate could not be parsed as X.509 DER.
    #[error("Certificate at position {index} is not valid X.509: {message}")]
    Parsing {
        /// Zero-based position in the presented chain (0 = leaf).
        index: usize,
        /// Parser message.
        message: String,
    },

    /// A certificate's validity window has passed.
    #[error("Certificate '{subject}' expired at {not_after}")]
    Expired {
        /// Subject of the expired certificate.
        subject: String,
        /// End of the validity window.
        not_after: DateTime<Utc>,
    },

    /// A certificate's validity window has not started.
    #[error("Certificate '{subject}' is not valid before {not_before}")]
    NotYetValid {
        /// Subject of the certificate.
        subject: String,
        /// Start of the validity window.
        not_before: DateTime<Utc>,
    },

    /// A certificate's signature failed verification against its issuer.
    #[error("Signature of '{subject}' could not be verified against '{issuer}'")]
    SignatureInvalid {
        /// Subject of the failing certificate.
        subject: String,
        /// The issuer whose key was used.
        issuer: String,
    },

    /// A certificate names an issuer that the next chain element is not.
    #[error("Certificate '{subject}' names issuer '{expected}' but the chain presents '{found}'")]
    IssuerMismatch {
        /// Subject of the failing certificate.
        subject: String,
        /// Issuer DN the certificate names.
        expected: String,
        /// Subject DN of the next chain element.
        found: String,
    },

    /// The chain does not terminate at a configured trust anchor.
    #[error("Certificate '{subject}' does not chain to a configured trust anchor")]
    NotTrusted {
        /// Subject of the terminal certificate.
        subject: String,
    },

    /// A self-signed certificate was presented where policy forbids it.
    #[error("Self-signed certificate '{subject}' is not allowed by policy")]
    SelfSignedNotAllowed {
        /// Subject of the certificate.
        subject: String,
    },

    /// A trust anchor file could not be read.
    #[error("Failed to read trust anchor '{path}': {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl CertificateError {
    /// Creates a parsing error.
    pub fn parsing(index: usize, message: impl Into<String>) -> Self {
        Self::Parsing {
            index,
            message: message.into(),
        }
    }

    /// Creates an expired error.
    pub fn expired(subject: impl Into<String>, not_after: DateTime<Utc>) -> Self {
        Self::Expired {
            subject: subject.into(),
            not_after,
        }
    }

    /// Creates a not-yet-valid error.
    pub fn not_yet_valid(subject: impl Into<String>, not_before: DateTime<Utc>) -> Self {
        Self::NotYetValid {
            subject: subject.into(),
            not_before,
        }
    }

    /// Creates a signature error.
    pub fn signature_invalid(subject: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self::SignatureInvalid {
            subject: subject.into(),
            issuer: issuer.into(),
        }
    }

    /// Creates a not-trusted error.
    pub fn not_trusted(subject: impl Into<String>) -> Self {
        Self::NotTrusted {
            subject: subject.into(),
        }
    }

    /// Returns the subject of the certificate that failed, when one is known.
    pub fn failing_subject(&self) -> Option<&str> {
        match self {
            CertificateError::Expired { subject, .. }
            | CertificateError::NotYetValid { subject, .. }
            | CertificateError::SignatureInvalid { subject, .. }
            | CertificateError::IssuerMismatch { subject, .. }
            | CertificateError::NotTrusted { subject }
            | CertificateError::SelfSignedNotAllowed { subject } => Some(subject),
            _ => None,
        }
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            CertificateError::EmptyChain => "empty_chain",
            CertificateError::Parsing { .. } => "parsing",
            CertificateError::Expired { .. } => "expired",
            CertificateError::NotYetValid { .. } => "not_yet_valid",
            CertificateError::SignatureInvalid { .. } => "signature_invalid",
            CertificateError::IssuerMismatch { .. } => "issuer_mismatch",
            CertificateError::NotTrusted { .. } => "not_trusted",
            CertificateError::SelfSignedNotAllowed { .. } => "self_signed",
            CertificateError::Io { .. } => "io",
        }
    }
}

/// A Result type with CertificateError.
pub type CertificateResult<T> = Result<T, CertificateError>;

// =============================================================================
// Tests
// =============================================================================
