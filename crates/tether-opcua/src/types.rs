// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA configuration types.
//!
//! This module defines the configuration value type for OPC UA engines and
//! the node addressing used by health probes and tunnel reads. Security
//! policy and mode are whitelisted enums: anything outside the table is a
//! validation failure before a socket is ever opened.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tether_core::connection::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_PING_TIMEOUT};
use tether_core::endpoint::{Endpoint, Scheme};
use tether_core::error::ConnectError;

// =============================================================================
// SecurityPolicy
// =============================================================================

/// Whitelisted OPC UA security policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SecurityPolicy {
    /// No message security.
    #[default]
    None,
    /// Basic256Sha256.
    Basic256Sha256,
    /// Aes128-Sha256-RsaOaep.
    Aes128Sha256RsaOaep,
    /// Aes256-Sha256-RsaPss.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Returns the policy URI suffix as used in endpoint descriptions.
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityPolicy::None => "None",
            SecurityPolicy::Basic256Sha256 => "Basic256Sha256",
            SecurityPolicy::Aes128Sha256RsaOaep => "Aes128_Sha256_RsaOaep",
            SecurityPolicy::Aes256Sha256RsaPss => "Aes256_Sha256_RsaPss",
        }
    }
}

impl FromStr for SecurityPolicy {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(SecurityPolicy::None),
            "Basic256Sha256" => Ok(SecurityPolicy::Basic256Sha256),
            "Aes128_Sha256_RsaOaep" | "Aes128Sha256RsaOaep" => {
                Ok(SecurityPolicy::Aes128Sha256RsaOaep)
            }
            "Aes256_Sha256_RsaPss" | "Aes256Sha256RsaPss" => {
                Ok(SecurityPolicy::Aes256Sha256RsaPss)
            }
            other => Err(ConnectError::validation(
                "security_policy",
                format!("'{}' is not a whitelisted security policy", other),
            )),
        }
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// SecurityMode
// =============================================================================

/// Whitelisted OPC UA message security modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SecurityMode {
    /// Messages are neither signed nor encrypted.
    #[default]
    None,
    /// Messages are signed.
    Sign,
    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns the canonical mode name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityMode::None => "None",
            SecurityMode::Sign => "Sign",
            SecurityMode::SignAndEncrypt => "SignAndEncrypt",
        }
    }

    /// Returns `true` if this mode requires a validated server certificate.
    pub fn requires_certificate(&self) -> bool {
        !matches!(self, SecurityMode::None)
    }
}

impl FromStr for SecurityMode {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(SecurityMode::None),
            "Sign" => Ok(SecurityMode::Sign),
            "SignAndEncrypt" => Ok(SecurityMode::SignAndEncrypt),
            other => Err(ConnectError::validation(
                "security_mode",
                format!("'{}' is not a whitelisted security mode", other),
            )),
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// NodeId
// =============================================================================

/// An OPC UA node identifier.
///
/// Parsed from the usual `ns=<namespace>;<type>=<value>` notation, or a
/// bare `i=<n>` / `s=<name>` in namespace 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index.
    pub namespace: u16,
    /// Identifier within the namespace.
    pub identifier: Identifier,
}

/// The identifier half of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identifier {
    /// Numeric identifier (`i=2259`).
    Numeric(u32),
    /// String identifier (`s=Line1.Temperature`).
    String(String),
}

impl NodeId {
    /// Creates a numeric node in namespace 0.
    pub fn numeric(id: u32) -> Self {
        Self {
            namespace: 0,
            identifier: Identifier::Numeric(id),
        }
    }

    /// Creates a string node in the given namespace.
    pub fn string(namespace: u16, name: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(name.into()),
        }
    }

    /// The server status node (`i=2259`), the conventional health-probe
    /// target.
    pub fn server_status() -> Self {
        Self::numeric(2259)
    }
}

impl FromStr for NodeId {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |msg: String| ConnectError::validation("node_id", msg);

        let (namespace, rest) = match s.strip_prefix("ns=") {
            Some(tail) => {
                let (ns, rest) = tail
                    .split_once(';')
                    .ok_or_else(|| invalid(format!("Missing ';' in '{}'", s)))?;
                let namespace: u16 = ns
                    .parse()
                    .map_err(|_| invalid(format!("Bad namespace '{}'", ns)))?;
                (namespace, rest)
            }
            None => (0, s),
        };

        let identifier = match rest.split_once('=') {
            Some(("i", value)) => Identifier::Numeric(
                value
                    .parse()
                    .map_err(|_| invalid(format!("Bad numeric id '{}'", value)))?,
            ),
            Some(("s", value)) if !value.is_empty() => Identifier::String(value.to_string()),
            _ => return Err(invalid(format!("Unrecognized identifier in '{}'", s))),
        };

        Ok(Self {
            namespace,
            identifier,
        })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        match &self.identifier {
            Identifier::Numeric(id) => write!(f, "i={}", id),
            Identifier::String(name) => write!(f, "s={}", name),
        }
    }
}

// =============================================================================
// NodeValue
// =============================================================================

/// A value read from a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// String value.
    Text(String),
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::Bool(v) => write!(f, "{}", v),
            NodeValue::Int(v) => write!(f, "{}", v),
            NodeValue::Float(v) => write!(f, "{}", v),
            NodeValue::Text(v) => write!(f, "{}", v),
        }
    }
}

// =============================================================================
// OpcUaConfig
// =============================================================================

/// Configuration for one OPC UA connection engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpcUaConfig {
    /// The server endpoint (`opc.tcp://` or `opcs.tcp://`).
    pub endpoint: Endpoint,

    /// Requested security policy.
    #[serde(default)]
    pub security_policy: SecurityPolicy,

    /// Requested message security mode.
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// Deadline for the whole connect sequence.
    #[serde(default = "default_connect_timeout", with = "duration_millis")]
    pub connect_timeout: Duration,

    /// Deadline for a single ping probe.
    #[serde(default = "default_ping_timeout", with = "duration_millis")]
    pub ping_timeout: Duration,

    /// Node read by the health probe.
    #[serde(default = "default_diagnostic_node")]
    pub diagnostic_node: NodeId,
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_ping_timeout() -> Duration {
    DEFAULT_PING_TIMEOUT
}

fn default_diagnostic_node() -> NodeId {
    NodeId::server_status()
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl OpcUaConfig {
    /// Creates a configuration with defaults for the given endpoint.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            security_policy: SecurityPolicy::default(),
            security_mode: SecurityMode::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            diagnostic_node: NodeId::server_status(),
        }
    }

    /// Sets the security policy.
    pub fn with_security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.security_policy = policy;
        self
    }

    /// Sets the security mode.
    pub fn with_security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = mode;
        self
    }

    /// Sets the connect deadline.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the ping deadline.
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Sets the diagnostic node read by health probes.
    pub fn with_diagnostic_node(mut self, node: NodeId) -> Self {
        self.diagnostic_node = node;
        self
    }

    /// Validates the configuration.
    ///
    /// Checks the endpoint scheme and the policy/mode pairing: a secured
    /// mode requires a non-`None` policy and vice versa.
    pub fn validate(&self) -> Result<(), ConnectError> {
        match self.endpoint.scheme() {
            Scheme::OpcTcp | Scheme::OpcsTcp => {}
            other => {
                return Err(ConnectError::validation(
                    "endpoint",
                    format!("Scheme '{}' is not an OPC UA scheme", other),
                ));
            }
        }

        match (self.security_mode, self.security_policy) {
            (SecurityMode::None, SecurityPolicy::None) => Ok(()),
            (SecurityMode::None, policy) => Err(ConnectError::validation(
                "security_mode",
                format!("Mode None cannot carry policy {}", policy),
            )),
            (mode, SecurityPolicy::None) => Err(ConnectError::validation(
                "security_policy",
                format!("Policy None cannot satisfy mode {}", mode),
            )),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::parse("opc.tcp://plc-01:4840").unwrap()
    }

    #[test]
    fn test_node_id_parsing() {
        let node: NodeId = "i=2259".parse().unwrap();
        assert_eq!(node, NodeId::numeric(2259));

        let node: NodeId = "ns=2;s=Line1.Temperature".parse().unwrap();
        assert_eq!(node, NodeId::string(2, "Line1.Temperature"));

        assert!("x=1".parse::<NodeId>().is_err());
        assert!("ns=2".parse::<NodeId>().is_err());
        assert!("ns=bad;i=1".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_node_id_display_roundtrip() {
        for text in ["i=2259", "ns=2;s=Tank.Level", "ns=4;i=99"] {
            let node: NodeId = text.parse().unwrap();
            assert_eq!(node.to_string(), text);
        }
    }

    #[test]
    fn test_security_whitelists() {
        assert!("Basic256Sha256".parse::<SecurityPolicy>().is_ok());
        assert!("Basic128Rsa15".parse::<SecurityPolicy>().is_err());

        assert!("SignAndEncrypt".parse::<SecurityMode>().is_ok());
        assert!("Encrypt".parse::<SecurityMode>().is_err());
    }

    #[test]
    fn test_mode_requires_certificate() {
        assert!(!SecurityMode::None.requires_certificate());
        assert!(SecurityMode::Sign.requires_certificate());
        assert!(SecurityMode::SignAndEncrypt.requires_certificate());
    }

    #[test]
    fn test_config_validation() {
        let config = OpcUaConfig::new(endpoint());
        assert!(config.validate().is_ok());

        let config = OpcUaConfig::new(endpoint())
            .with_security_mode(SecurityMode::Sign)
            .with_security_policy(SecurityPolicy::Basic256Sha256);
        assert!(config.validate().is_ok());

        // Mismatched pairings are rejected.
        let config = OpcUaConfig::new(endpoint()).with_security_mode(SecurityMode::Sign);
        assert!(config.validate().is_err());

        let config =
            OpcUaConfig::new(endpoint()).with_security_policy(SecurityPolicy::Basic256Sha256);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_non_opcua_scheme() {
        let config = OpcUaConfig::new(Endpoint::parse("tcp://host:502").unwrap());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_node_value_display() {
        assert_eq!(NodeValue::Int(7).to_string(), "7");
        assert_eq!(NodeValue::Float(2.5).to_string(), "2.5");
        assert_eq!(NodeValue::Bool(true).to_string(), "true");
        assert_eq!(NodeValue::Text("run".into()).to_string(), "run");
    }

    #[test]
    fn test_config_serde() {
        let config = OpcUaConfig::new(endpoint());
        let json = serde_json::to_string(&config).unwrap();
        let parsed: OpcUaConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.diagnostic_node, NodeId::server_status());
    }
}
