// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # tether-cert
//!
//! X.509 certificate-chain validation for TETHER's secure connection
//! engines.
//!
//! This crate is the gate in front of every TLS-backed connection: a
//! [`ChainValidator`] must accept the peer's presented chain before the
//! engine may report `Connected`.
//!
//! - **Chain**: DER chain representation, leaf first, with parsing
//! - **Anchor**: the independently configured trust anchor store
//! - **Validator**: PKIX-style path building plus validity-window checks
//!
//! ## Example
//!
//! ```rust,ignore
//! use tether_cert::{CertificateChain, ChainValidator, TrustAnchorSet};
//!
//! let anchors = TrustAnchorSet::from_files(&["roots/plant-ca.pem"])?;
//! let validator = ChainValidator::new(anchors);
//!
//! let chain = CertificateChain::from_ders(peer_chain);
//! let report = validator.validate_chain(&chain)?;
//! for warning in &report.warnings {
//!     tracing::warn!(%warning, "Certificate warning");
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod anchor;
pub mod chain;
pub mod error;
pub mod validator;

pub use anchor::{TrustAnchor, TrustAnchorSet};
pub use chain::{summarize, thumbprint, CertificateChain, CertificateSummary};
pub use error::{CertificateError, CertificateResult};
pub use validator::{ChainReport, ChainValidator, ValidationPolicy};
