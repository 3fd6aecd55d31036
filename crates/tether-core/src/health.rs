// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Periodic liveness probing with failure-triggered reconnection.
//!
//! The [`HealthMonitor`] runs `ping()` against a handle on a fixed
//! interval. When a probe fails while the handle is `Connected`, the
//! monitor flips it to `Reconnecting` and triggers the handle's
//! [`Reconnector`] asynchronously against the last-known endpoint. The
//! reconnector's atomic in-flight flag gives the monitor its single-flight
//! guarantee: a probe failure while a sequence is already running joins
//! that sequence instead of launching a second one.
//!
//! Probe failures are never silently swallowed: every failure is traced
//! and counted in [`HealthStats`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::connection::Connection;
use crate::reconnect::Reconnector;
use crate::state::ConnectionStatus;

// =============================================================================
// HealthConfig
// =============================================================================

/// Default probe interval.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Health monitor configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Interval between probes.
    pub interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

impl HealthConfig {
    /// Creates a configuration with the given probe interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }
}

// =============================================================================
// HealthStats
// =============================================================================

/// Counters maintained by a running monitor.
#[derive(Debug, Default)]
pub struct HealthStats {
    probes: AtomicU64,
    healthy: AtomicU64,
    failures: AtomicU64,
    reconnects_triggered: AtomicU64,
}

impl HealthStats {
    /// Total probes attempted.
    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    /// Probes that reported a live connection.
    pub fn healthy(&self) -> u64 {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Probes that failed or timed out.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Reconnection sequences triggered by probe failures.
    pub fn reconnects_triggered(&self) -> u64 {
        self.reconnects_triggered.load(Ordering::Relaxed)
    }
}

// =============================================================================
// HealthMonitor
// =============================================================================

/// Supervises one connection handle with periodic pings.
pub struct HealthMonitor {
    config: HealthConfig,
    reconnector: Arc<Reconnector>,
    stats: Arc<HealthStats>,
}

impl HealthMonitor {
    /// Creates a monitor with the given configuration and reconnector.
    pub fn new(config: HealthConfig, reconnector: Arc<Reconnector>) -> Self {
        Self {
            config,
            reconnector,
            stats: Arc::new(HealthStats::default()),
        }
    }

    /// Returns the monitor's statistics handle.
    pub fn stats(&self) -> Arc<HealthStats> {
        Arc::clone(&self.stats)
    }

    /// Spawns the probe loop for a handle.
    ///
    /// The loop runs until the returned [`MonitorHandle`] is stopped or
    /// dropped.
    pub fn spawn(self, conn: Arc<dyn Connection>) -> MonitorHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let stats = Arc::clone(&self.stats);
        let reconnector = Arc::clone(&self.reconnector);
        let interval = self.config.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            tracing::debug!(endpoint = %conn.endpoint(), "Health monitor stopped");
                            break;
                        }
                    }
                }

                if !conn.status().is_connected() {
                    continue;
                }

                stats.probes.fetch_add(1, Ordering::Relaxed);

                match conn.ping().await {
                    Ok(true) => {
                        stats.healthy.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(false) => {
                        stats.failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            endpoint = %conn.endpoint(),
                            "Health probe failed, triggering reconnection"
                        );
                        Self::trigger_reconnect(&reconnector, &conn, &stats);
                    }
                    Err(error) => {
                        stats.failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            endpoint = %conn.endpoint(),
                            error = %error,
                            "Health probe errored, triggering reconnection"
                        );
                        Self::trigger_reconnect(&reconnector, &conn, &stats);
                    }
                }
            }
        });

        MonitorHandle {
            task: Some(task),
            stop_tx,
        }
    }

    /// Launches a reconnection sequence without blocking the probe loop.
    ///
    /// The reconnector's in-flight flag guarantees single-flight: if a
    /// sequence is already running for this handle, the spawned task joins
    /// it and exits with its outcome.
    fn trigger_reconnect(
        reconnector: &Arc<Reconnector>,
        conn: &Arc<dyn Connection>,
        stats: &Arc<HealthStats>,
    ) {
        if conn.status() == ConnectionStatus::Connected {
            stats.reconnects_triggered.fetch_add(1, Ordering::Relaxed);
        }

        let reconnector = Arc::clone(reconnector);
        let conn = Arc::clone(conn);
        tokio::spawn(async move {
            if let Err(error) = reconnector.reconnect(&conn).await {
                tracing::error!(
                    endpoint = %conn.endpoint(),
                    error = %error,
                    "Reconnection after failed probe did not recover the handle"
                );
            }
        });
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("interval", &self.config.interval)
            .finish()
    }
}

// =============================================================================
// MonitorHandle
// =============================================================================

/// Handle to a running probe loop.
pub struct MonitorHandle {
    task: Option<JoinHandle<()>>,
    stop_tx: watch::Sender<bool>,
}

impl MonitorHandle {
    /// Stops the probe loop and waits for it to finish.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Returns `true` if the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionConfig;
    use crate::endpoint::Endpoint;
    use crate::error::ConnectError;
    use crate::retry::ExponentialBackoff;
    use crate::state::StatusCell;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    /// Engine whose ping result is switchable at runtime.
    struct ProbeConnection {
        config: ConnectionConfig,
        cell: StatusCell,
        ping_ok: AtomicBool,
        reconnect_heals: AtomicBool,
    }

    impl ProbeConnection {
        async fn connected() -> Arc<Self> {
            let endpoint = Endpoint::parse("tcp://127.0.0.1:9000").unwrap();
            let conn = Arc::new(Self {
                config: ConnectionConfig::new(endpoint),
                cell: StatusCell::new(),
                ping_ok: AtomicBool::new(true),
                reconnect_heals: AtomicBool::new(true),
            });
            let guard = conn.cell.begin().await;
            guard.transition(ConnectionStatus::Connecting).unwrap();
            guard.transition(ConnectionStatus::Connected).unwrap();
            drop(guard);
            conn
        }
    }

    #[async_trait]
    impl Connection for ProbeConnection {
        fn name(&self) -> &str {
            "probe"
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
            guard
                .transition(ConnectionStatus::Connecting)
                .map_err(|e| ConnectError::transport(e.to_string()))?;

            if self.reconnect_heals.load(Ordering::SeqCst) {
                self.ping_ok.store(true, Ordering::SeqCst);
                guard
                    .transition(ConnectionStatus::Connected)
                    .map_err(|e| ConnectError::transport(e.to_string()))?;
                Ok(true)
            } else {
                guard
                    .transition(ConnectionStatus::Error)
                    .map_err(|e| ConnectError::transport(e.to_string()))?;
                Err(ConnectError::transport("refused"))
            }
        }

        async fn disconnect(&self) -> Result<bool, ConnectError> {
            Ok(true)
        }

        async fn ping(&self) -> Result<bool, ConnectError> {
            if !self.is_connected() {
                return Err(ConnectError::NotConnected);
            }
            Ok(self.ping_ok.load(Ordering::SeqCst))
        }
    }

    fn monitor(interval: Duration) -> HealthMonitor {
        let reconnector = Arc::new(Reconnector::new(Arc::new(ExponentialBackoff::simple(
            3,
            Duration::from_millis(5),
            2.0,
        ))));
        HealthMonitor::new(HealthConfig::with_interval(interval), reconnector)
    }

    #[tokio::test]
    async fn test_healthy_probes_counted() {
        let conn = ProbeConnection::connected().await;
        let monitor = monitor(Duration::from_millis(10));
        let stats = monitor.stats();

        let handle = monitor.spawn(conn.clone());
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.stop().await;

        assert!(stats.probes() >= 2);
        assert_eq!(stats.failures(), 0);
    }

    #[tokio::test]
    async fn test_failed_probe_triggers_reconnect() {
        let conn = ProbeConnection::connected().await;
        let monitor = monitor(Duration::from_millis(10));
        let stats = monitor.stats();

        conn.ping_ok.store(false, Ordering::SeqCst);

        let handle = monitor.spawn(conn.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;

        assert!(stats.failures() >= 1);
        assert!(stats.reconnects_triggered() >= 1);

        // The reconnection healed the handle.
        assert!(conn.status().is_connected());
    }

    #[tokio::test]
    async fn test_monitor_idle_when_disconnected() {
        let endpoint = Endpoint::parse("tcp://127.0.0.1:9000").unwrap();
        let conn = Arc::new(ProbeConnection {
            config: ConnectionConfig::new(endpoint),
            cell: StatusCell::new(),
            ping_ok: AtomicBool::new(true),
            reconnect_heals: AtomicBool::new(true),
        });

        let monitor = monitor(Duration::from_millis(10));
        let stats = monitor.stats();

        let handle = monitor.spawn(conn);
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        // No probes while the handle is not connected.
        assert_eq!(stats.probes(), 0);
    }
}
