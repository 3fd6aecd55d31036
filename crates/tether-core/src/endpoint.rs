// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Endpoint addressing.
//!
//! An [`Endpoint`] identifies a connection target as `scheme://host:port`
//! plus optional security parameters. Endpoints are immutable once
//! constructed and validated before use.
//!
//! # Supported Schemes
//!
//! | Scheme    | Transport                    | Default Port |
//! |-----------|------------------------------|--------------|
//! | `opc.tcp` | OPC UA binary                | 4840         |
//! | `opcs.tcp`| OPC UA over TLS              | 4843         |
//! | `https`   | TLS-secured host             | 443          |
//! | `tls`     | TLS-secured raw peer         | -            |
//! | `tcp`     | Raw TCP peer                 | -            |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConnectError;

// =============================================================================
// Scheme
// =============================================================================

/// The protocol scheme of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    /// OPC UA binary transport (`opc.tcp`).
    OpcTcp,
    /// OPC UA over TLS (`opcs.tcp`).
    OpcsTcp,
    /// HTTPS / TLS-secured host (`https`).
    Https,
    /// TLS-secured raw peer (`tls`).
    Tls,
    /// Raw TCP peer (`tcp`).
    Tcp,
}

impl Scheme {
    /// Returns the canonical scheme string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::OpcTcp => "opc.tcp",
            Scheme::OpcsTcp => "opcs.tcp",
            Scheme::Https => "https",
            Scheme::Tls => "tls",
            Scheme::Tcp => "tcp",
        }
    }

    /// Returns the default port for this scheme, if one is conventional.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Scheme::OpcTcp => Some(4840),
            Scheme::OpcsTcp => Some(4843),
            Scheme::Https => Some(443),
            Scheme::Tls | Scheme::Tcp => None,
        }
    }

    /// Returns `true` if this scheme requires the certificate gate before
    /// a connection may report `Connected`.
    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::OpcsTcp | Scheme::Https | Scheme::Tls)
    }
}

impl FromStr for Scheme {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opc.tcp" => Ok(Scheme::OpcTcp),
            "opcs.tcp" => Ok(Scheme::OpcsTcp),
            "https" => Ok(Scheme::Https),
            "tls" => Ok(Scheme::Tls),
            "tcp" => Ok(Scheme::Tcp),
            other => Err(ConnectError::validation(
                "scheme",
                format!("Unsupported scheme '{}'", other),
            )),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Endpoint
// =============================================================================

/// A validated, immutable connection target.
///
/// Constructed via [`Endpoint::parse`] or [`Endpoint::new`]; both validate
/// the host and port before returning.
///
/// # Example
///
/// ```
/// use tether_core::endpoint::{Endpoint, Scheme};
///
/// let endpoint = Endpoint::parse("opc.tcp://plc-01:4840").unwrap();
/// assert_eq!(endpoint.scheme(), Scheme::OpcTcp);
/// assert_eq!(endpoint.host(), "plc-01");
/// assert_eq!(endpoint.port(), 4840);
/// assert_eq!(endpoint.to_string(), "opc.tcp://plc-01:4840");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: u16,
    /// Security policy identifier (protocol-specific, e.g. `Basic256Sha256`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    security_policy: Option<String>,
    /// Security mode identifier (protocol-specific, e.g. `SignAndEncrypt`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    security_mode: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint from parts, validating the host.
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Result<Self, ConnectError> {
        let host = host.into();
        validate_host(&host)?;

        Ok(Self {
            scheme,
            host,
            port,
            security_policy: None,
            security_mode: None,
        })
    }

    /// Parses an endpoint from `scheme://host:port` form.
    ///
    /// The port is range-checked during parsing: values outside
    /// `[0, 65535]` (including negative values) are rejected with a
    /// `ConnectError::Validation`.
    pub fn parse(url: &str) -> Result<Self, ConnectError> {
        let (scheme_str, rest) = url.split_once("://").ok_or_else(|| {
            ConnectError::validation("url", format!("Missing '://' separator in '{}'", url))
        })?;

        let scheme: Scheme = scheme_str.parse()?;

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = parse_port(port_str)?;
                (host.to_string(), port)
            }
            None => {
                let port = scheme.default_port().ok_or_else(|| {
                    ConnectError::validation(
                        "port",
                        format!("No port given and scheme '{}' has no default", scheme),
                    )
                })?;
                (rest.to_string(), port)
            }
        };

        validate_host(&host)?;

        Ok(Self {
            scheme,
            host,
            port,
            security_policy: None,
            security_mode: None,
        })
    }

    /// Sets the security policy identifier.
    pub fn with_security_policy(mut self, policy: impl Into<String>) -> Self {
        self.security_policy = Some(policy.into());
        self
    }

    /// Sets the security mode identifier.
    pub fn with_security_mode(mut self, mode: impl Into<String>) -> Self {
        self.security_mode = Some(mode.into());
        self
    }

    /// Returns the scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Returns the host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the security policy identifier, if set.
    pub fn security_policy(&self) -> Option<&str> {
        self.security_policy.as_deref()
    }

    /// Returns the security mode identifier, if set.
    pub fn security_mode(&self) -> Option<&str> {
        self.security_mode.as_deref()
    }

    /// Returns the `host:port` authority string used for socket addressing.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// =============================================================================
// Validation Helpers
// =============================================================================

/// Parses a port string with explicit range checking.
///
/// Parses through `i64` first so that `-1` and `65536` both produce a
/// range-violation message rather than a generic parse failure.
fn parse_port(s: &str) -> Result<u16, ConnectError> {
    let value: i64 = s.trim().parse().map_err(|_| {
        ConnectError::validation("port", format!("'{}' is not a number", s))
    })?;

    if !(0..=65535).contains(&value) {
        return Err(ConnectError::validation(
            "port",
            format!("Port {} is outside the range [0, 65535]", value),
        ));
    }

    Ok(value as u16)
}

/// Validates a host name or address.
fn validate_host(host: &str) -> Result<(), ConnectError> {
    if host.is_empty() {
        return Err(ConnectError::validation("host", "Host must not be empty"));
    }

    if host.contains(char::is_whitespace) {
        return Err(ConnectError::validation(
            "host",
            format!("Host '{}' contains whitespace", host),
        ));
    }

    let valid = host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']'));

    if !valid {
        return Err(ConnectError::validation(
            "host",
            format!("Host '{}' contains invalid characters", host),
        ));
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
