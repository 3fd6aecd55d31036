// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The connection capability interface.
//!
//! Every protocol engine (OPC UA, TLS, raw TCP) implements the same
//! [`Connection`] trait over a [`ConnectionConfig`] value. Protocol
//! variation lives behind the trait, not in an inheritance hierarchy; the
//! supervision layer (retry, health, tunnel) composes against the trait
//! alone.
//!
//! # Lifecycle
//!
//! 1. Construct the engine from a validated [`ConnectionConfig`]
//! 2. `connect()` - opens the transport under a deadline
//! 3. `ping()` - lightweight liveness probes while connected
//! 4. `disconnect()` - idempotent release of the handle
//!
//! # Concurrency Contract
//!
//! All methods take `&self`; engines are shared via `Arc` between the
//! health monitor, the reconnector, and callers. Engines own a
//! [`StatusCell`] and route every status-changing sequence through its
//! operation guard, which serializes concurrent `connect`/`disconnect`
//! calls on one handle: the loser of the race blocks, then observes the
//! winner's outcome instead of opening a second transport.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::error::ConnectError;
use crate::state::{ConnectionStatus, MetricsSnapshot, StatusCell};

// =============================================================================
// ConnectionConfig
// =============================================================================

/// Default connect deadline.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default ping probe deadline.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration shared by all connection engines.
///
/// A plain value type: one struct for every protocol, with the
/// protocol-specific parts carried by the endpoint's scheme and security
/// identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// The connection target.
    pub endpoint: Endpoint,

    /// Deadline for the whole connect sequence (transport open, handshake,
    /// certificate gate, session establishment).
    #[serde(default = "default_connect_timeout", with = "duration_millis")]
    pub connect_timeout: Duration,

    /// Deadline for a single ping probe.
    #[serde(default = "default_ping_timeout", with = "duration_millis")]
    pub ping_timeout: Duration,
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_ping_timeout() -> Duration {
    DEFAULT_PING_TIMEOUT
}

impl ConnectionConfig {
    /// Creates a configuration with default deadlines.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
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
}

/// Duration (de)serialization as integer milliseconds.
pub(crate) mod duration_millis {
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

// =============================================================================
// Connection Trait
// =============================================================================

/// The capability interface implemented by every protocol engine.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Returns a human-readable name for logging.
    fn name(&self) -> &str;

    /// Returns the configured endpoint.
    fn endpoint(&self) -> &Endpoint;

    /// Returns the status cell owning this handle's state and metrics.
    ///
    /// The supervision layer uses this to flip the handle to
    /// `Reconnecting` under the operation guard; ordinary callers should
    /// prefer [`Connection::status`] and [`Connection::metrics`].
    fn cell(&self) -> &StatusCell;

    /// Establishes the connection.
    ///
    /// Validates the endpoint first (fail-fast `Validation` error), then
    /// opens the transport within the configured deadline. Secure schemes
    /// must pass the certificate gate before `Connected` is observable.
    ///
    /// Returns `Ok(true)` once connected. A concurrent call that finds the
    /// handle already connected (including one that waited out another
    /// caller's in-flight attempt) returns `Ok(true)` without opening a
    /// second transport.
    ///
    /// # Errors
    ///
    /// - `ConnectError::Validation` - malformed endpoint or parameters
    /// - `ConnectError::Timeout` - deadline exceeded
    /// - `ConnectError::Transport` - socket/TLS/protocol failure
    /// - `ConnectError::Certificate` - certificate gate rejected the peer
    async fn connect(&self) -> Result<bool, ConnectError>;

    /// Releases the connection.
    ///
    /// Idempotent: when no handle exists, returns `Ok(true)` immediately
    /// without error. Never fails for an already-disconnected handle.
    async fn disconnect(&self) -> Result<bool, ConnectError>;

    /// Probes liveness of the connection.
    ///
    /// Returns `Ok(false)` on a timeout or invalid response rather than
    /// an error; the only error case is `ConnectError::NotConnected` when
    /// no handle exists at all.
    async fn ping(&self) -> Result<bool, ConnectError>;

    /// Returns the current connection status.
    fn status(&self) -> ConnectionStatus {
        self.cell().status()
    }

    /// Returns a snapshot of the handle's quality metrics.
    fn metrics(&self) -> MetricsSnapshot {
        self.cell().metrics()
    }

    /// Returns `true` if currently connected.
    fn is_connected(&self) -> bool {
        self.status().is_connected()
    }
}

// =============================================================================
// Tests
// =============================================================================
