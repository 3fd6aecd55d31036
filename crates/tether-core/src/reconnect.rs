// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Single-flight reconnection supervisor.
//!
//! The [`Reconnector`] drives a retry strategy against one connection
//! handle while guaranteeing at most one retry sequence in flight per
//! handle at a time. The guarantee is carried by an atomic in-flight flag
//! (compare-exchange acquire), not an unsynchronized boolean: concurrent
//! triggers that lose the race wait for the winning sequence and adopt its
//! outcome instead of starting a second sequence.
//!
//! A sequence:
//!
//! 1. flips the handle to `Reconnecting` (when the transition table allows)
//! 2. drives `Connection::connect` under the strategy's timing
//! 3. on success leaves the handle `Connected`
//! 4. on exhaustion flips the handle to `Failed`
//!
//! Validation and certificate failures abort the sequence immediately;
//! they are never auto-retried.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::connection::Connection;
use crate::error::{ConnectError, ReconnectError};
use crate::retry::RetryStrategy;
use crate::state::ConnectionStatus;

// =============================================================================
// Reconnector
// =============================================================================

/// Serializes reconnection sequences for a single handle.
pub struct Reconnector {
    strategy: Arc<dyn RetryStrategy>,
    in_flight: AtomicBool,
    finished: Notify,
    stats: ReconnectStats,
}

impl Reconnector {
    /// Creates a reconnector around a retry strategy.
    pub fn new(strategy: Arc<dyn RetryStrategy>) -> Self {
        Self {
            strategy,
            in_flight: AtomicBool::new(false),
            finished: Notify::new(),
            stats: ReconnectStats::default(),
        }
    }

    /// Returns `true` if a sequence is currently running.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Returns the reconnection statistics.
    pub fn stats(&self) -> &ReconnectStats {
        &self.stats
    }

    /// Runs a reconnection sequence, or joins the one already in flight.
    ///
    /// Returns `Ok(true)` once the handle is connected, `Ok(false)` when
    /// the sequence exhausted its attempts, and `Err(_)` when a
    /// non-retryable error aborted it.
    pub async fn reconnect(&self, conn: &Arc<dyn Connection>) -> Result<bool, ConnectError> {
        loop {
            if self
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return self.run_sequence(conn).await;
            }

            // Register interest before re-checking the flag so a finishing
            // leader cannot slip between the check and the wait.
            let notified = self.finished.notified();
            if !self.in_flight.load(Ordering::Acquire) {
                continue;
            }

            tracing::debug!(
                endpoint = %conn.endpoint(),
                "Reconnection already in flight, waiting for its outcome"
            );
            notified.await;
            self.stats.joined.fetch_add(1, Ordering::Relaxed);
            return Ok(conn.status().is_connected());
        }
    }

    /// Like [`Reconnector::reconnect`], but reports exhaustion through the
    /// error channel for callers that require a typed failure.
    pub async fn reconnect_or_error(
        &self,
        conn: &Arc<dyn Connection>,
    ) -> Result<(), ReconnectError> {
        match self.reconnect(conn).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ReconnectError::exhausted(self.strategy_attempts())),
            Err(error) => Err(ReconnectError::aborted(error)),
        }
    }

    fn strategy_attempts(&self) -> u32 {
        // The strategy bounds the sequence; attempt numbers above the bound
        // never run, so the bound itself is the attempt count on exhaustion.
        let mut attempts = 0u32;
        while self.strategy.delay_before(attempts + 1).is_some() {
            attempts += 1;
        }
        attempts + 1
    }

    async fn run_sequence(&self, conn: &Arc<dyn Connection>) -> Result<bool, ConnectError> {
        // The flag is released on every exit path, including panics in the
        // driven future, so a poisoned sequence cannot wedge the handle.
        let _release = InFlightRelease {
            flag: &self.in_flight,
            notify: &self.finished,
        };

        self.stats.sequences.fetch_add(1, Ordering::Relaxed);
        self.mark_reconnecting(conn).await;

        tracing::info!(
            endpoint = %conn.endpoint(),
            strategy = %self.strategy.name(),
            "Starting reconnection sequence"
        );

        let conn_ref = Arc::clone(conn);
        let result = crate::retry::drive(&*self.strategy, move || {
            let conn = Arc::clone(&conn_ref);
            async move { conn.connect().await }
        })
        .await;

        match &result {
            Ok(true) => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                tracing::info!(endpoint = %conn.endpoint(), "Reconnection succeeded");
            }
            Ok(false) => {
                self.stats.exhausted.fetch_add(1, Ordering::Relaxed);
                self.mark_failed(conn).await;
                tracing::warn!(endpoint = %conn.endpoint(), "Reconnection exhausted");
            }
            Err(error) => {
                self.stats.aborted.fetch_add(1, Ordering::Relaxed);
                self.mark_failed(conn).await;
                tracing::error!(
                    endpoint = %conn.endpoint(),
                    error = %error,
                    "Reconnection aborted by non-retryable error"
                );
            }
        }

        result
    }

    /// Flips the handle to `Reconnecting` where the table allows it.
    async fn mark_reconnecting(&self, conn: &Arc<dyn Connection>) {
        let guard = conn.cell().begin().await;
        if guard.status().can_transition_to(ConnectionStatus::Reconnecting) {
            if let Err(error) = guard.transition(ConnectionStatus::Reconnecting) {
                tracing::warn!(error = %error, "Could not mark handle Reconnecting");
            }
        }
    }

    /// Flips the handle to `Failed` where the table allows it.
    async fn mark_failed(&self, conn: &Arc<dyn Connection>) {
        let guard = conn.cell().begin().await;
        if guard.status().can_transition_to(ConnectionStatus::Failed) {
            if let Err(error) = guard.transition(ConnectionStatus::Failed) {
                tracing::warn!(error = %error, "Could not mark handle Failed");
            }
        }
    }
}

impl std::fmt::Debug for Reconnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconnector")
            .field("strategy", &self.strategy.name())
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

/// Clears the in-flight flag and wakes waiters when the sequence ends.
struct InFlightRelease<'a> {
    flag: &'a AtomicBool,
    notify: &'a Notify,
}

impl Drop for InFlightRelease<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }
}

// =============================================================================
// ReconnectStats
// =============================================================================

/// Counters for reconnection sequences.
#[derive(Debug, Default)]
pub struct ReconnectStats {
    sequences: AtomicU64,
    succeeded: AtomicU64,
    exhausted: AtomicU64,
    aborted: AtomicU64,
    joined: AtomicU64,
}

impl ReconnectStats {
    /// Number of sequences started.
    pub fn sequences(&self) -> u64 {
        self.sequences.load(Ordering::Relaxed)
    }

    /// Number of sequences that ended connected.
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Number of sequences that exhausted their attempts.
    pub fn exhausted(&self) -> u64 {
        self.exhausted.load(Ordering::Relaxed)
    }

    /// Number of sequences aborted by non-retryable errors.
    pub fn aborted(&self) -> u64 {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Number of callers that joined an in-flight sequence.
    pub fn joined(&self) -> u64 {
        self.joined.load(Ordering::Relaxed)
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
    use crate::retry::ExponentialBackoff;
    use crate::state::StatusCell;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Engine whose connect succeeds after a configurable number of failures.
    struct FlakyConnection {
        config: ConnectionConfig,
        cell: StatusCell,
        failures_remaining: std::sync::atomic::AtomicU32,
        opens: AtomicU64,
    }

    impl FlakyConnection {
        fn new(failures: u32) -> Arc<dyn Connection> {
            let endpoint = Endpoint::parse("tcp://127.0.0.1:9000").unwrap();
            Arc::new(Self {
                config: ConnectionConfig::new(endpoint),
                cell: StatusCell::new(),
                failures_remaining: std::sync::atomic::AtomicU32::new(failures),
                opens: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl Connection for FlakyConnection {
        fn name(&self) -> &str {
            "flaky"
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

            if self.failures_remaining.load(Ordering::SeqCst) > 0 {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
                guard
                    .transition(ConnectionStatus::Error)
                    .map_err(|e| ConnectError::transport(e.to_string()))?;
                return Err(ConnectError::transport("refused"));
            }

            self.opens.fetch_add(1, Ordering::SeqCst);
            guard
                .transition(ConnectionStatus::Connected)
                .map_err(|e| ConnectError::transport(e.to_string()))?;
            Ok(true)
        }

        async fn disconnect(&self) -> Result<bool, ConnectError> {
            Ok(true)
        }

        async fn ping(&self) -> Result<bool, ConnectError> {
            Ok(self.is_connected())
        }
    }

    fn reconnector(max_retries: u32) -> Arc<Reconnector> {
        Arc::new(Reconnector::new(Arc::new(ExponentialBackoff::simple(
            max_retries,
            Duration::from_millis(10),
            2.0,
        ))))
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_succeeds_after_failures() {
        let conn = FlakyConnection::new(2);
        let reconnector = reconnector(5);

        let result = reconnector.reconnect(&conn).await.unwrap();
        assert!(result);
        assert!(conn.status().is_connected());
        assert_eq!(reconnector.stats().succeeded(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_exhaustion_marks_failed() {
        let conn = FlakyConnection::new(100);
        let reconnector = reconnector(3);

        let result = reconnector.reconnect(&conn).await.unwrap();
        assert!(!result);
        assert_eq!(conn.status(), ConnectionStatus::Failed);
        assert_eq!(reconnector.stats().exhausted(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_or_error_exhaustion() {
        let conn = FlakyConnection::new(100);
        let reconnector = reconnector(3);

        let error = reconnector.reconnect_or_error(&conn).await.unwrap_err();
        assert!(matches!(error, ReconnectError::Exhausted { attempts: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_triggers_share_one_sequence() {
        let conn = FlakyConnection::new(2);
        let reconnector = reconnector(5);

        let (a, b) = tokio::join!(
            reconnector.reconnect(&conn),
            reconnector.reconnect(&conn),
        );

        assert!(a.unwrap());
        assert!(b.unwrap());

        // Only one sequence ran; the other trigger joined it.
        assert_eq!(reconnector.stats().sequences(), 1);
        assert_eq!(reconnector.stats().joined(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_flag_clears() {
        let conn = FlakyConnection::new(0);
        let reconnector = reconnector(3);

        reconnector.reconnect(&conn).await.unwrap();
        assert!(!reconnector.is_in_flight());
    }
}
