// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The OPC UA connection engine.
//!
//! [`OpcUaConnection`] implements the core [`Connection`] trait over the
//! opaque transport seam. It owns the lifecycle semantics:
//!
//! - endpoint and security-parameter validation before any I/O
//! - the certificate gate for secured modes, which must pass before
//!   `Connected` is observable
//! - the connect deadline
//! - serialized status transitions through the handle's [`StatusCell`]
//!
//! The protocol work itself (secure channel, session services, node
//! reads) is delegated to the configured [`OpcUaTransport`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::timeout;

use tether_cert::ChainValidator;
use tether_core::connection::Connection;
use tether_core::endpoint::Endpoint;
use tether_core::error::ConnectError;
use tether_core::state::{ConnectionStatus, StatusCell};

use crate::transport::{OpcUaTransport, SessionHandle};
use crate::types::{NodeId, NodeValue, OpcUaConfig};

// =============================================================================
// OpcUaConnection
// =============================================================================

/// An OPC UA connection engine over a pluggable transport.
pub struct OpcUaConnection {
    name: String,
    config: OpcUaConfig,
    transport: Arc<dyn OpcUaTransport>,
    validator: Option<Arc<ChainValidator>>,
    cell: StatusCell,
    session: parking_lot::Mutex<Option<SessionHandle>>,
}

impl OpcUaConnection {
    /// Creates an engine over the given transport.
    pub fn new(
        name: impl Into<String>,
        config: OpcUaConfig,
        transport: Arc<dyn OpcUaTransport>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            transport,
            validator: None,
            cell: StatusCell::new(),
            session: parking_lot::Mutex::new(None),
        }
    }

    /// Attaches the certificate validator gating secured connects.
    pub fn with_validator(mut self, validator: Arc<ChainValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &OpcUaConfig {
        &self.config
    }

    /// Reads a node's current value over the open session.
    ///
    /// # Errors
    ///
    /// - `ConnectError::NotConnected` - no session is open
    /// - `ConnectError::Transport` - the read failed or timed out
    pub async fn read(&self, node: &NodeId) -> Result<NodeValue, ConnectError> {
        let session = self
            .session
            .lock()
            .clone()
            .ok_or(ConnectError::NotConnected)?;

        timeout(
            self.config.ping_timeout,
            self.transport.read_node(&session, node),
        )
        .await
        .map_err(|_| ConnectError::timeout(self.config.ping_timeout))?
    }

    /// Runs the certificate gate when the security mode requires it.
    async fn run_certificate_gate(&self) -> Result<(), ConnectError> {
        if !self.config.security_mode.requires_certificate() {
            return Ok(());
        }

        let validator = self.validator.as_ref().ok_or_else(|| {
            ConnectError::validation(
                "validator",
                format!(
                    "Security mode {} requires a certificate validator",
                    self.config.security_mode
                ),
            )
        })?;

        let chain = self
            .transport
            .fetch_server_certificate(&self.config)
            .await?
            .ok_or_else(|| {
                ConnectError::certificate(
                    self.config.endpoint.to_string(),
                    "Server presented no certificate for a secured mode",
                )
            })?;

        let report = validator.validate_chain(&chain).map_err(|e| {
            ConnectError::certificate(
                e.failing_subject().unwrap_or("unknown").to_string(),
                e.to_string(),
            )
        })?;

        for warning in &report.warnings {
            tracing::warn!(endpoint = %self.config.endpoint, %warning, "Certificate warning");
        }

        tracing::debug!(
            endpoint = %self.config.endpoint,
            leaf = %report.leaf_subject,
            "Certificate gate passed"
        );

        Ok(())
    }

    async fn open_sequence(&self) -> Result<SessionHandle, ConnectError> {
        self.run_certificate_gate().await?;
        self.transport.open_session(&self.config).await
    }
}

#[async_trait]
impl Connection for OpcUaConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    fn cell(&self) -> &StatusCell {
        &self.cell
    }

    async fn connect(&self) -> Result<bool, ConnectError> {
        // Fail fast before taking the operation guard or touching I/O.
        self.config.validate()?;

        let guard = self.cell.begin().await;

        // A concurrent caller finished connecting while we waited on the
        // guard; adopt its outcome instead of opening a second session.
        if guard.status().is_connected() {
            return Ok(true);
        }

        guard
            .transition(ConnectionStatus::Connecting)
            .map_err(|e| ConnectError::validation("status", e.to_string()))?;

        // A stale session left over from a failed probe is closed before a
        // new one is opened, so reconnect cycles cannot leak transports.
        let stale = self.session.lock().take();
        if let Some(stale) = stale {
            if let Err(error) = self.transport.close_session(&stale).await {
                tracing::debug!(
                    endpoint = %self.config.endpoint,
                    error = %error,
                    "Stale session close failed"
                );
            }
        }

        match timeout(self.config.connect_timeout, self.open_sequence()).await {
            Ok(Ok(session)) => {
                // Stored before the next await point, so an abandoned
                // caller future cannot leak the session.
                *self.session.lock() = Some(session);

                guard
                    .transition(ConnectionStatus::Connected)
                    .map_err(|e| ConnectError::validation("status", e.to_string()))?;

                tracing::info!(
                    endpoint = %self.config.endpoint,
                    policy = %self.config.security_policy,
                    mode = %self.config.security_mode,
                    "OPC UA session established"
                );
                Ok(true)
            }
            Ok(Err(error)) => {
                let _ = guard.transition(ConnectionStatus::Error);
                tracing::warn!(
                    endpoint = %self.config.endpoint,
                    error = %error,
                    "OPC UA connect failed"
                );
                Err(error)
            }
            Err(_) => {
                let _ = guard.transition(ConnectionStatus::Error);
                tracing::warn!(
                    endpoint = %self.config.endpoint,
                    timeout_ms = self.config.connect_timeout.as_millis() as u64,
                    "OPC UA connect timed out"
                );
                Err(ConnectError::timeout(self.config.connect_timeout))
            }
        }
    }

    async fn disconnect(&self) -> Result<bool, ConnectError> {
        let guard = self.cell.begin().await;

        let session = match self.session.lock().take() {
            Some(session) => session,
            // Idempotent: nothing to release.
            None => return Ok(true),
        };

        let _ = guard.transition(ConnectionStatus::Disconnecting);

        let close_result = self.transport.close_session(&session).await;

        let _ = guard.transition(ConnectionStatus::Disconnected);

        match close_result {
            Ok(()) => {
                tracing::info!(endpoint = %self.config.endpoint, "OPC UA session closed");
                Ok(true)
            }
            Err(error) => {
                // The handle is released either way; the caller learns the
                // close did not complete cleanly.
                tracing::warn!(
                    endpoint = %self.config.endpoint,
                    error = %error,
                    "OPC UA session close reported an error"
                );
                Err(error)
            }
        }
    }

    async fn ping(&self) -> Result<bool, ConnectError> {
        let session = self
            .session
            .lock()
            .clone()
            .ok_or(ConnectError::NotConnected)?;

        let probe = self
            .transport
            .read_node(&session, &self.config.diagnostic_node);

        match timeout(self.config.ping_timeout, probe).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(error)) => {
                tracing::debug!(
                    endpoint = %self.config.endpoint,
                    error = %error,
                    "Ping read failed"
                );
                Ok(false)
            }
            Err(_) => {
                tracing::debug!(
                    endpoint = %self.config.endpoint,
                    "Ping timed out"
                );
                Ok(false)
            }
        }
    }
}

impl std::fmt::Debug for OpcUaConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpcUaConnection")
            .field("name", &self.name)
            .field("endpoint", &self.config.endpoint.to_string())
            .field("status", &self.cell.status())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
