// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The opaque OPC UA transport seam.
//!
//! TETHER does not implement the OPC UA protocol stack. Opening a session
//! is treated as an opaque operation supplied by an external protocol
//! library; this module defines the [`OpcUaTransport`] trait that such a
//! library plugs into. The engine drives the trait, owns all lifecycle
//! and retry semantics, and never sees protocol encoding.
//!
//! [`SimTransport`](crate::sim::SimTransport) provides an in-process
//! implementation for tests and lab bring-up.

use async_trait::async_trait;

use tether_cert::CertificateChain;
use tether_core::error::ConnectError;

use crate::types::{NodeId, NodeValue, OpcUaConfig};

// =============================================================================
// SessionHandle
// =============================================================================

/// An opaque handle to an open OPC UA session.
///
/// The engine stores and returns this token; its meaning belongs entirely
/// to the transport that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    /// Transport-assigned session identifier.
    pub id: String,
}

impl SessionHandle {
    /// Creates a handle with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

// =============================================================================
// OpcUaTransport Trait
// =============================================================================

/// The operations an external OPC UA protocol library must supply.
///
/// # Contract
///
/// - `open_session` performs everything protocol-specific about
///   connecting (secure channel, session creation, activation) and
///   returns an opaque handle. The engine enforces the deadline around
///   the call; implementations do not need their own overall timeout.
/// - `fetch_server_certificate` is called *before* `open_session` when
///   the configured security mode requires a certificate, mirroring the
///   discovery step of the protocol. Returning `None` means the server
///   presented no certificate, which fails the gate for secured modes.
/// - `read_node` must fail with `ConnectError::Transport` when the
///   session is no longer usable; the engine maps that to a failed probe.
#[async_trait]
pub trait OpcUaTransport: Send + Sync {
    /// Returns the server's certificate chain, leaf first, if it has one.
    async fn fetch_server_certificate(
        &self,
        config: &OpcUaConfig,
    ) -> Result<Option<CertificateChain>, ConnectError>;

    /// Opens and activates a session.
    async fn open_session(&self, config: &OpcUaConfig) -> Result<SessionHandle, ConnectError>;

    /// Closes a session. Closing an unknown or already-closed session is
    /// a no-op.
    async fn close_session(&self, session: &SessionHandle) -> Result<(), ConnectError>;

    /// Reads a node's current value over an open session.
    async fn read_node(
        &self,
        session: &SessionHandle,
        node: &NodeId,
    ) -> Result<NodeValue, ConnectError>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_handle() {
        let a = SessionHandle::new("session-1");
        let b = SessionHandle::new("session-1");
        assert_eq!(a, b);
        assert_eq!(a.id, "session-1");
    }
}
