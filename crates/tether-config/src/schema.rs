// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema for the TETHER supervisor.
//!
//! # Schema Structure
//!
//! ```text
//! TetherConfig
//! ├── client: ClientConfig
//! ├── endpoints: Vec<EndpointEntry>
//! ├── retry: RetrySettings
//! ├── health: HealthSettings
//! ├── trust: TrustSettings
//! ├── tunnel: TunnelSettings
//! └── logging: LoggingSettings
//! ```
//!
//! The retry block carries the key/value names of the legacy deployment
//! (`initial_retry`, `max_retries`, `initial_wait`, `backoff_factor`,
//! `wait_time`); [`RetrySettings::to_policy`] converts it into the core
//! [`RetryPolicy`] once at startup.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tether_core::endpoint::{Endpoint, Scheme};
use tether_core::retry::{RetryPolicy, StrategyKind};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Constants
// =============================================================================

/// Default health probe interval in milliseconds.
pub const DEFAULT_HEALTH_INTERVAL_MS: u64 = 1000;

/// Default connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default ping timeout in milliseconds.
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 2_000;

/// Default tunnel worker pool size.
pub const DEFAULT_TUNNEL_WORKERS: usize = 8;

/// Default delayed backend retry in milliseconds.
pub const DEFAULT_BACKEND_RETRY_MS: u64 = 5_000;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TetherConfig {
    /// Client identification.
    pub client: ClientConfig,

    /// Connection endpoints to supervise.
    #[serde(default)]
    pub endpoints: Vec<EndpointEntry>,

    /// Retry policy, loaded once at startup.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Health monitor settings.
    #[serde(default)]
    pub health: HealthSettings,

    /// Trust anchor settings for secure endpoints.
    #[serde(default)]
    pub trust: TrustSettings,

    /// TCP tunnel settings.
    #[serde(default)]
    pub tunnel: TunnelSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl TetherConfig {
    /// Validates the configuration as a whole.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.client.id.is_empty() {
            return Err(ConfigError::missing_field("client.id"));
        }

        let mut seen = HashSet::new();
        for entry in &self.endpoints {
            if entry.id.is_empty() {
                return Err(ConfigError::missing_field("endpoints[].id"));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigError::validation(
                    "endpoints",
                    format!("Duplicate endpoint id '{}'", entry.id),
                ));
            }
            entry.validate()?;
        }

        self.retry.validate()?;
        self.health.validate()?;
        self.tunnel.validate(&seen)?;

        // Secure endpoints need somewhere to anchor trust. The chain-tail
        // escape hatch has to be opted into by name.
        let has_secure = self
            .endpoints
            .iter()
            .any(|e| e.parsed_endpoint().map(|ep| ep.scheme().is_secure()).unwrap_or(false));
        if has_secure && self.trust.roots.is_empty() && !self.trust.allow_chain_tail {
            return Err(ConfigError::validation(
                "trust.roots",
                "Secure endpoints are configured but no trust anchors are provided \
                 (set trust.allow_chain_tail = true only for lab use)",
            ));
        }

        Ok(())
    }

    /// Returns the endpoint entry with the given id.
    pub fn endpoint(&self, id: &str) -> Option<&EndpointEntry> {
        self.endpoints.iter().find(|e| e.id == id)
    }
}

// =============================================================================
// ClientConfig
// =============================================================================

/// Identification of this supervisor instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Unique client identifier.
    pub id: String,

    /// Human-readable name.
    #[serde(default)]
    pub name: String,
}

// =============================================================================
// EndpointEntry
// =============================================================================

/// One supervised connection endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointEntry {
    /// Unique endpoint identifier.
    pub id: String,

    /// Endpoint URL (`opc.tcp://host:4840`, `tls://host:8883`, ...).
    pub url: String,

    /// Security policy identifier (OPC UA endpoints).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_policy: Option<String>,

    /// Security mode identifier (OPC UA endpoints).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_mode: Option<String>,

    /// Connect deadline in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Ping deadline in milliseconds.
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_ping_timeout_ms() -> u64 {
    DEFAULT_PING_TIMEOUT_MS
}

impl EndpointEntry {
    /// Parses and validates the URL.
    pub fn parsed_endpoint(&self) -> ConfigResult<Endpoint> {
        let mut endpoint = Endpoint::parse(&self.url).map_err(|e| {
            ConfigError::validation(format!("endpoints.{}.url", self.id), e.to_string())
        })?;

        if let Some(policy) = &self.security_policy {
            endpoint = endpoint.with_security_policy(policy);
        }
        if let Some(mode) = &self.security_mode {
            endpoint = endpoint.with_security_mode(mode);
        }

        Ok(endpoint)
    }

    /// Returns the connect deadline.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the ping deadline.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        let endpoint = self.parsed_endpoint()?;

        // Security identifiers only make sense on OPC UA endpoints.
        if (self.security_policy.is_some() || self.security_mode.is_some())
            && !matches!(endpoint.scheme(), Scheme::OpcTcp | Scheme::OpcsTcp)
        {
            return Err(ConfigError::validation(
                format!("endpoints.{}", self.id),
                "security_policy/security_mode apply only to OPC UA endpoints",
            ));
        }

        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::validation(
                format!("endpoints.{}.connect_timeout_ms", self.id),
                "must be positive",
            ));
        }

        Ok(())
    }
}

// =============================================================================
// RetrySettings
// =============================================================================

/// Retry configuration keys, as loaded from the key/value source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    /// Attempt counter starting offset.
    #[serde(default)]
    pub initial_retry: u32,

    /// Maximum attempts per sequence.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial wait in milliseconds (exponential strategy).
    #[serde(default = "default_initial_wait")]
    pub initial_wait: u64,

    /// Backoff multiplier (exponential strategy).
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Fixed wait in milliseconds (linear strategy).
    #[serde(default = "default_wait_time")]
    pub wait_time: u64,

    /// Strategy kind: `exponential` or `linear`.
    #[serde(default)]
    pub strategy: StrategyKind,
}

fn default_max_retries() -> u32 {
    10
}

fn default_initial_wait() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_wait_time() -> u64 {
    3000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_retry: 0,
            max_retries: default_max_retries(),
            initial_wait: default_initial_wait(),
            backoff_factor: default_backoff_factor(),
            wait_time: default_wait_time(),
            strategy: StrategyKind::default(),
        }
    }
}

impl RetrySettings {
    /// Converts the settings into the immutable core policy.
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_retry: self.initial_retry,
            max_retries: self.max_retries,
            initial_wait: Duration::from_millis(self.initial_wait),
            backoff_factor: self.backoff_factor,
            wait_time: Duration::from_millis(self.wait_time),
            strategy: self.strategy,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.backoff_factor < 1.0 {
            return Err(ConfigError::validation(
                "retry.backoff_factor",
                "must be >= 1.0",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// HealthSettings
// =============================================================================

/// Health monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthSettings {
    /// Probe interval in milliseconds.
    #[serde(default = "default_health_interval")]
    pub interval_ms: u64,
}

fn default_health_interval() -> u64 {
    DEFAULT_HEALTH_INTERVAL_MS
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_HEALTH_INTERVAL_MS,
        }
    }
}

impl HealthSettings {
    /// Returns the probe interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.interval_ms == 0 {
            return Err(ConfigError::validation(
                "health.interval_ms",
                "must be positive",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// TrustSettings
// =============================================================================

/// Trust anchor configuration for secure endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustSettings {
    /// Root certificate files (PEM or DER).
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Trust the presented chain's own terminal certificate. Lab only.
    #[serde(default)]
    pub allow_chain_tail: bool,
}

// =============================================================================
// TunnelSettings
// =============================================================================

/// TCP tunnel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TunnelSettings {
    /// Whether the tunnel listener is started.
    #[serde(default)]
    pub enabled: bool,

    /// Bind address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Listen port.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Endpoint id the tunnel bridges to.
    #[serde(default)]
    pub target: String,

    /// Worker pool size.
    #[serde(default = "default_tunnel_workers")]
    pub max_workers: usize,

    /// Whether sessions share one pooled backend connection.
    #[serde(default = "default_true")]
    pub shared_backend: bool,

    /// Delayed backend retry in milliseconds (0 disables).
    #[serde(default = "default_backend_retry")]
    pub backend_retry_ms: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    5050
}

fn default_tunnel_workers() -> usize {
    DEFAULT_TUNNEL_WORKERS
}

fn default_true() -> bool {
    true
}

fn default_backend_retry() -> u64 {
    DEFAULT_BACKEND_RETRY_MS
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            target: String::new(),
            max_workers: default_tunnel_workers(),
            shared_backend: true,
            backend_retry_ms: default_backend_retry(),
        }
    }
}

impl TunnelSettings {
    /// Returns the delayed backend retry, `None` when disabled.
    pub fn backend_retry_delay(&self) -> Option<Duration> {
        (self.backend_retry_ms > 0).then(|| Duration::from_millis(self.backend_retry_ms))
    }

    fn validate(&self, endpoint_ids: &HashSet<&str>) -> ConfigResult<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.target.is_empty() {
            return Err(ConfigError::missing_field("tunnel.target"));
        }

        if !endpoint_ids.contains(self.target.as_str()) {
            return Err(ConfigError::validation(
                "tunnel.target",
                format!("'{}' is not a configured endpoint id", self.target),
            ));
        }

        if self.max_workers == 0 {
            return Err(ConfigError::validation(
                "tunnel.max_workers",
                "must be positive",
            ));
        }

        Ok(())
    }
}

// =============================================================================
// LoggingSettings
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (text, json, compact).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> TetherConfig {
        TetherConfig {
            client: ClientConfig {
                id: "gateway-01".into(),
                name: "Line 1 gateway".into(),
            },
            endpoints: vec![EndpointEntry {
                id: "plc".into(),
                url: "opc.tcp://plc-01:4840".into(),
                security_policy: None,
                security_mode: None,
                connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
                ping_timeout_ms: DEFAULT_PING_TIMEOUT_MS,
            }],
            retry: RetrySettings::default(),
            health: HealthSettings::default(),
            trust: TrustSettings::default(),
            tunnel: TunnelSettings::default(),
            logging: LoggingSettings::default(),
        }
    }

    #[test]
    fn test_minimal_config_validates() {
        assert!(minimal_config().validate().is_ok());
    }

    #[test]
    fn test_duplicate_endpoint_ids_rejected() {
        let mut config = minimal_config();
        config.endpoints.push(config.endpoints[0].clone());

        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_retry_defaults_match_legacy_keys() {
        let retry = RetrySettings::default();
        assert_eq!(retry.initial_retry, 0);
        assert_eq!(retry.max_retries, 10);
        assert_eq!(retry.initial_wait, 1000);
        assert_eq!(retry.backoff_factor, 2.0);
        assert_eq!(retry.wait_time, 3000);
    }

    #[test]
    fn test_retry_to_policy() {
        let policy = RetrySettings::default().to_policy();
        assert_eq!(policy.max_retries, 10);
        assert_eq!(policy.initial_wait, Duration::from_millis(1000));
        assert_eq!(policy.wait_time, Duration::from_millis(3000));
    }

    #[test]
    fn test_secure_endpoint_requires_anchors() {
        let mut config = minimal_config();
        config.endpoints.push(EndpointEntry {
            id: "hmi".into(),
            url: "tls://hmi-01:8883".into(),
            security_policy: None,
            security_mode: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            ping_timeout_ms: DEFAULT_PING_TIMEOUT_MS,
        });

        let error = config.validate().unwrap_err();
        assert!(matches!(error, ConfigError::Validation { field, .. } if field == "trust.roots"));

        // The lab escape hatch has to be opted into by name.
        config.trust.allow_chain_tail = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tunnel_target_must_exist() {
        let mut config = minimal_config();
        config.tunnel.enabled = true;
        config.tunnel.target = "nope".into();

        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("nope"));

        config.tunnel.target = "plc".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_security_identifiers_only_for_opcua() {
        let mut config = minimal_config();
        config.endpoints[0].url = "tcp://plc-01:502".into();
        config.endpoints[0].security_mode = Some("Sign".into());

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_factor_bounds() {
        let mut config = minimal_config();
        config.retry.backoff_factor = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tunnel_retry_delay() {
        let mut tunnel = TunnelSettings::default();
        assert!(tunnel.backend_retry_delay().is_some());

        tunnel.backend_retry_ms = 0;
        assert!(tunnel.backend_retry_delay().is_none());
    }
}
