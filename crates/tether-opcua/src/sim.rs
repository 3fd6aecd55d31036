// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-process OPC UA transport for tests and lab bring-up.
//!
//! [`SimTransport`] implements the transport seam entirely in memory:
//! a node table, switchable failure injection, and an optional server
//! certificate chain for exercising the certificate gate. It records
//! call counts so tests can assert single-flight behavior.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use tether_cert::CertificateChain;
use tether_core::error::ConnectError;

use crate::transport::{OpcUaTransport, SessionHandle};
use crate::types::{NodeId, NodeValue, OpcUaConfig};

// =============================================================================
// SimTransport
// =============================================================================

/// An in-memory transport backend.
#[derive(Debug, Default)]
pub struct SimTransport {
    /// Node table served to `read_node`.
    nodes: RwLock<HashMap<NodeId, NodeValue>>,

    /// Server certificate chain returned by discovery.
    server_chain: RwLock<Option<CertificateChain>>,

    /// Sessions currently open.
    open_sessions: RwLock<HashMap<String, ()>>,

    /// Fail every `open_session` call.
    fail_opens: AtomicBool,

    /// Fail the next `open_session` call only.
    fail_next_open: AtomicBool,

    /// Fail every `read_node` call.
    fail_reads: AtomicBool,

    /// Artificial latency applied to `open_session`.
    open_latency: RwLock<Duration>,

    /// Number of `open_session` calls that reached the transport.
    opens: AtomicU64,

    /// Number of `close_session` calls.
    closes: AtomicU64,

    /// Number of `read_node` calls.
    reads: AtomicU64,
}

impl SimTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a node value.
    pub fn set_node(&self, node: NodeId, value: NodeValue) {
        self.nodes.write().insert(node, value);
    }

    /// Sets the server certificate chain returned by discovery.
    pub fn set_server_chain(&self, chain: CertificateChain) {
        *self.server_chain.write() = Some(chain);
    }

    /// Makes every subsequent `open_session` fail.
    pub fn fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    /// Makes only the next `open_session` fail.
    pub fn fail_next_open(&self) {
        self.fail_next_open.store(true, Ordering::SeqCst);
    }

    /// Makes every subsequent `read_node` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Adds artificial latency to `open_session`.
    pub fn set_open_latency(&self, latency: Duration) {
        *self.open_latency.write() = latency;
    }

    /// Number of sessions opened.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of sessions closed.
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Number of node reads.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of sessions currently open.
    pub fn open_session_count(&self) -> usize {
        self.open_sessions.read().len()
    }
}

#[async_trait]
impl OpcUaTransport for SimTransport {
    async fn fetch_server_certificate(
        &self,
        _config: &OpcUaConfig,
    ) -> Result<Option<CertificateChain>, ConnectError> {
        Ok(self.server_chain.read().clone())
    }

    async fn open_session(&self, config: &OpcUaConfig) -> Result<SessionHandle, ConnectError> {
        let latency = *self.open_latency.read();
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }

        if self.fail_next_open.swap(false, Ordering::SeqCst)
            || self.fail_opens.load(Ordering::SeqCst)
        {
            return Err(ConnectError::transport(format!(
                "Simulated session failure for {}",
                config.endpoint
            )));
        }

        self.opens.fetch_add(1, Ordering::SeqCst);
        let handle = SessionHandle::new(Uuid::new_v4().to_string());
        self.open_sessions.write().insert(handle.id.clone(), ());

        Ok(handle)
    }

    async fn close_session(&self, session: &SessionHandle) -> Result<(), ConnectError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.open_sessions.write().remove(&session.id);
        Ok(())
    }

    async fn read_node(
        &self,
        session: &SessionHandle,
        node: &NodeId,
    ) -> Result<NodeValue, ConnectError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ConnectError::transport("Simulated read failure"));
        }

        if !self.open_sessions.read().contains_key(&session.id) {
            return Err(ConnectError::transport("Session is not open"));
        }

        self.nodes
            .read()
            .get(node)
            .cloned()
            .ok_or_else(|| ConnectError::transport(format!("Node {} does not exist", node)))
    }
}

// =============================================================================
// Tests
// =============================================================================
