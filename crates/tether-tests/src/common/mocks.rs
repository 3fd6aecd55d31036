// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Mock implementations for testing supervision components in isolation.
//!
//! ## Design Principles
//!
//! - Configurable behavior for different test scenarios
//! - Recording of interactions for verification
//! - Thread-safe for concurrent testing
//! - Easy error injection

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use tether_core::connection::{Connection, ConnectionConfig};
use tether_core::endpoint::Endpoint;
use tether_core::error::ConnectError;
use tether_core::state::{ConnectionStatus, StatusCell};
use tether_tunnel::Backend;

// =============================================================================
// MockConnection
// =============================================================================

/// A highly configurable mock connection engine.
pub struct MockConnection {
    config: ConnectionConfig,
    cell: StatusCell,

    /// Number of connect attempts that must fail before one succeeds.
    failures_before_success: AtomicU32,

    /// Fail every connect attempt.
    fail_all_connects: AtomicBool,

    /// Fail connects with a non-retryable certificate error.
    fail_with_certificate_error: AtomicBool,

    /// Artificial latency for the transport-open step.
    connect_latency: Mutex<Duration>,

    /// Ping result switch.
    ping_ok: AtomicBool,

    /// Whether a successful reconnect restores pings.
    reconnect_heals_ping: AtomicBool,

    /// Transport opens (successful connects that opened a resource).
    transport_opens: AtomicU64,

    /// Total connect attempts.
    connect_attempts: AtomicU64,

    /// Total ping probes served.
    ping_count: AtomicU64,
}

impl MockConnection {
    /// Creates a mock that connects on the first attempt.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            config: ConnectionConfig::new(endpoint),
            cell: StatusCell::new(),
            failures_before_success: AtomicU32::new(0),
            fail_all_connects: AtomicBool::new(false),
            fail_with_certificate_error: AtomicBool::new(false),
            connect_latency: Mutex::new(Duration::ZERO),
            ping_ok: AtomicBool::new(true),
            reconnect_heals_ping: AtomicBool::new(true),
            transport_opens: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
            ping_count: AtomicU64::new(0),
        }
    }

    /// Requires `n` failures before a connect succeeds.
    pub fn with_failures(self, n: u32) -> Self {
        self.failures_before_success.store(n, Ordering::SeqCst);
        self
    }

    /// Makes every connect fail.
    pub fn with_all_connects_failing(self) -> Self {
        self.fail_all_connects.store(true, Ordering::SeqCst);
        self
    }

    /// Makes connects fail with a non-retryable certificate error.
    pub fn with_certificate_failure(self) -> Self {
        self.fail_with_certificate_error.store(true, Ordering::SeqCst);
        self
    }

    /// Adds latency to the transport-open step.
    pub fn with_connect_latency(self, latency: Duration) -> Self {
        *self.connect_latency.lock() = latency;
        self
    }

    /// Switches the ping result at runtime.
    pub fn set_ping_ok(&self, ok: bool) {
        self.ping_ok.store(ok, Ordering::SeqCst);
    }

    /// Switches connect failure at runtime.
    pub fn set_fail_all_connects(&self, fail: bool) {
        self.fail_all_connects.store(fail, Ordering::SeqCst);
    }

    /// Controls whether a reconnect restores pings.
    pub fn set_reconnect_heals_ping(&self, heals: bool) {
        self.reconnect_heals_ping.store(heals, Ordering::SeqCst);
    }

    /// Number of transports actually opened.
    pub fn transport_opens(&self) -> u64 {
        self.transport_opens.load(Ordering::SeqCst)
    }

    /// Number of connect attempts observed.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Number of ping probes served.
    pub fn ping_count(&self) -> u64 {
        self.ping_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn name(&self) -> &str {
        "mock"
    }

    fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    fn cell(&self) -> &StatusCell {
        &self.cell
    }

    async fn connect(&self) -> Result<bool, ConnectError> {
        let guard = self.cell.begin().await;
        if guard.status().is_connected() {
            return Ok(true);
        }

        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        guard
            .transition(ConnectionStatus::Connecting)
            .map_err(|e| ConnectError::validation("status", e.to_string()))?;

        let latency = *self.connect_latency.lock();
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }

        if self.fail_with_certificate_error.load(Ordering::SeqCst) {
            let _ = guard.transition(ConnectionStatus::Error);
            return Err(ConnectError::certificate("CN=mock-peer", "not trusted"));
        }

        let must_fail = self.fail_all_connects.load(Ordering::SeqCst)
            || self
                .failures_before_success
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();

        if must_fail {
            let _ = guard.transition(ConnectionStatus::Error);
            return Err(ConnectError::transport("mock transport refused"));
        }

        self.transport_opens.fetch_add(1, Ordering::SeqCst);
        if self.reconnect_heals_ping.load(Ordering::SeqCst) {
            self.ping_ok.store(true, Ordering::SeqCst);
        }

        guard
            .transition(ConnectionStatus::Connected)
            .map_err(|e| ConnectError::validation("status", e.to_string()))?;
        Ok(true)
    }

    async fn disconnect(&self) -> Result<bool, ConnectError> {
        let guard = self.cell.begin().await;
        if !matches!(
            guard.status(),
            ConnectionStatus::Connected | ConnectionStatus::Error
        ) {
            return Ok(true);
        }

        let _ = guard.transition(ConnectionStatus::Disconnecting);
        let _ = guard.transition(ConnectionStatus::Disconnected);
        Ok(true)
    }

    async fn ping(&self) -> Result<bool, ConnectError> {
        if !self.is_connected() {
            return Err(ConnectError::NotConnected);
        }
        self.ping_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.ping_ok.load(Ordering::SeqCst))
    }
}

// =============================================================================
// MockBackend
// =============================================================================

/// An in-memory tunnel backend with a value table and error injection.
#[derive(Default)]
pub struct MockBackend {
    values: Mutex<HashMap<String, String>>,
    available: AtomicBool,
    fail_reads: AtomicBool,
    connects: AtomicU64,
    releases: AtomicU64,
}

impl MockBackend {
    /// Creates an available backend with no values.
    pub fn new() -> Self {
        let backend = Self::default();
        backend.available.store(true, Ordering::SeqCst);
        backend
    }

    /// Seeds a value.
    pub fn set_value(&self, id: impl Into<String>, value: impl Into<String>) {
        self.values.lock().insert(id.into(), value.into());
    }

    /// Makes `ensure_connected` report unavailability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Makes every read fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of `ensure_connected` calls.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of `release` calls.
    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn ensure_connected(&self) -> Result<bool, ConnectError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.available.load(Ordering::SeqCst))
    }

    async fn read_value(&self, id: &str) -> Result<String, ConnectError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ConnectError::transport("mock backend read failure"));
        }
        self.values
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| ConnectError::transport(format!("no such id: {}", id)))
    }

    async fn release(&self) -> Result<(), ConnectError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
