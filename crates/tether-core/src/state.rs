// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection status machine and per-handle quality metrics.
//!
//! This module defines the [`ConnectionStatus`] enum with its transition
//! table, the cumulative [`QualityMetrics`] counters, and the
//! [`StatusCell`] that owns both for a single connection handle.
//!
//! # Ownership Model
//!
//! Every engine owns exactly one `StatusCell` per handle. All
//! status-changing operation sequences acquire the cell's operation lock
//! first, so a handle has at most one in-flight `connect`/`disconnect`/
//! reconnect at any time and metrics are only mutated inside that critical
//! section. Readers access the current status and metric snapshots without
//! taking the operation lock.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::StateError;

// =============================================================================
// ConnectionStatus
// =============================================================================

/// The status of a connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Status has not been established yet.
    #[default]
    Unknown,
    /// A connection attempt is in progress.
    Connecting,
    /// The handle is connected and operational.
    Connected,
    /// A graceful disconnect is in progress.
    Disconnecting,
    /// The handle is disconnected.
    Disconnected,
    /// A reconnection sequence is in progress.
    Reconnecting,
    /// The last operation failed; the handle may recover.
    Error,
    /// Recovery was exhausted; manual intervention is required.
    Failed,
}

impl ConnectionStatus {
    /// Returns `true` if the handle is connected and operational.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if the handle is in a transitional state.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting | Self::Reconnecting)
    }

    /// Returns `true` if the handle is in a failure state.
    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Error | Self::Failed)
    }

    /// Returns the valid target statuses from this status.
    ///
    /// This table is the single source of truth for status transitions;
    /// [`StatusCell`] enforces it on every change.
    pub fn valid_transitions(&self) -> &'static [ConnectionStatus] {
        use ConnectionStatus::*;
        match self {
            Unknown => &[Connecting, Disconnected],
            Connecting => &[Connected, Error, Disconnected],
            Connected => &[Disconnecting, Reconnecting, Error],
            Disconnecting => &[Disconnected, Error],
            Disconnected => &[Connecting, Reconnecting],
            Reconnecting => &[Connecting, Failed, Disconnected],
            Error => &[Connecting, Reconnecting, Disconnecting, Disconnected, Failed],
            Failed => &[Connecting, Disconnected],
        }
    }

    /// Returns `true` if a transition to `next` is valid.
    pub fn can_transition_to(&self, next: ConnectionStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "Unknown",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting",
            Self::Disconnected => "Disconnected",
            Self::Reconnecting => "Reconnecting",
            Self::Error => "Error",
            Self::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// QualityMetrics
// =============================================================================

/// Cumulative quality counters for one connection handle.
///
/// Counters are monotonic and never reset; they persist across reconnect
/// cycles on the same handle and are only cleared by recreating the handle.
/// Writes happen exclusively inside the owning cell's transition path;
/// external monitors read snapshots.
#[derive(Debug, Default)]
pub struct QualityMetrics {
    connect_count: AtomicU64,
    disconnect_count: AtomicU64,
    error_count: AtomicU64,
    reconnect_count: AtomicU64,
    failed_count: AtomicU64,
    last_connected_at: AtomicI64,
    last_disconnected_at: AtomicI64,
    last_error_at: AtomicI64,
}

impl QualityMetrics {
    /// Creates empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_transition(&self, to: ConnectionStatus) {
        let now = Utc::now().timestamp_millis();
        match to {
            ConnectionStatus::Connected => {
                self.connect_count.fetch_add(1, Ordering::Relaxed);
                self.last_connected_at.store(now, Ordering::Relaxed);
            }
            ConnectionStatus::Disconnected => {
                self.disconnect_count.fetch_add(1, Ordering::Relaxed);
                self.last_disconnected_at.store(now, Ordering::Relaxed);
            }
            ConnectionStatus::Error => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                self.last_error_at.store(now, Ordering::Relaxed);
            }
            ConnectionStatus::Reconnecting => {
                self.reconnect_count.fetch_add(1, Ordering::Relaxed);
            }
            ConnectionStatus::Failed => {
                self.failed_count.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// Returns a serializable snapshot of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_count: self.connect_count.load(Ordering::Relaxed),
            disconnect_count: self.disconnect_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            reconnect_count: self.reconnect_count.load(Ordering::Relaxed),
            failed_count: self.failed_count.load(Ordering::Relaxed),
            last_connected_at: timestamp_of(&self.last_connected_at),
            last_disconnected_at: timestamp_of(&self.last_disconnected_at),
            last_error_at: timestamp_of(&self.last_error_at),
        }
    }
}

fn timestamp_of(cell: &AtomicI64) -> Option<DateTime<Utc>> {
    let millis = cell.load(Ordering::Relaxed);
    if millis == 0 {
        None
    } else {
        DateTime::from_timestamp_millis(millis)
    }
}

/// A point-in-time view of [`QualityMetrics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Number of successful connects.
    pub connect_count: u64,
    /// Number of completed disconnects.
    pub disconnect_count: u64,
    /// Number of operations that ended in error.
    pub error_count: u64,
    /// Number of reconnection sequences started.
    pub reconnect_count: u64,
    /// Number of exhausted recovery sequences.
    pub failed_count: u64,
    /// When the handle last became connected.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// When the handle last became disconnected.
    pub last_disconnected_at: Option<DateTime<Utc>>,
    /// When the handle last recorded an error.
    pub last_error_at: Option<DateTime<Utc>>,
}

// =============================================================================
// StatusCell
// =============================================================================

/// The single-writer owner of a handle's status and metrics.
///
/// Status-changing sequences call [`StatusCell::begin`] to acquire the
/// operation guard; transitions are only possible through the guard, which
/// enforces the transition table and updates metrics atomically with the
/// status change.
///
/// # Example
///
/// ```rust,ignore
/// use tether_core::state::{ConnectionStatus, StatusCell};
///
/// let cell = StatusCell::new();
/// let guard = cell.begin().await;
/// guard.transition(ConnectionStatus::Connecting)?;
/// guard.transition(ConnectionStatus::Connected)?;
/// drop(guard);
/// assert!(cell.status().is_connected());
/// ```
#[derive(Debug)]
pub struct StatusCell {
    status: parking_lot::RwLock<ConnectionStatus>,
    metrics: QualityMetrics,
    op_lock: Mutex<()>,
}

impl StatusCell {
    /// Creates a new cell in the `Unknown` status.
    pub fn new() -> Self {
        Self {
            status: parking_lot::RwLock::new(ConnectionStatus::Unknown),
            metrics: QualityMetrics::new(),
            op_lock: Mutex::new(()),
        }
    }

    /// Returns the current status without blocking on in-flight operations.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    /// Returns a snapshot of the quality metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Acquires the operation guard, serializing status-changing sequences.
    ///
    /// Holding the guard is the only way to transition the status, which
    /// gives the handle its exactly-one-in-flight-operation invariant:
    /// a concurrent caller blocks here until the current sequence finishes
    /// and then observes its outcome via [`StatusCell::status`].
    pub async fn begin(&self) -> OperationGuard<'_> {
        let guard = self.op_lock.lock().await;
        OperationGuard {
            cell: self,
            _guard: guard,
        }
    }

    /// Attempts to acquire the operation guard without waiting.
    pub fn try_begin(&self) -> Option<OperationGuard<'_>> {
        self.op_lock.try_lock().ok().map(|guard| OperationGuard {
            cell: self,
            _guard: guard,
        })
    }

    fn transition_locked(&self, to: ConnectionStatus) -> Result<ConnectionStatus, StateError> {
        let mut status = self.status.write();
        let from = *status;

        if !from.can_transition_to(to) {
            return Err(StateError::new(from, to));
        }

        *status = to;
        drop(status);

        self.metrics.record_transition(to);

        tracing::trace!(from = %from, to = %to, "Status transition");
        Ok(from)
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// OperationGuard
// =============================================================================

/// Exclusive access to a handle's status for one operation sequence.
pub struct OperationGuard<'a> {
    cell: &'a StatusCell,
    _guard: MutexGuard<'a, ()>,
}

impl OperationGuard<'_> {
    /// Returns the current status.
    pub fn status(&self) -> ConnectionStatus {
        self.cell.status()
    }

    /// Transitions the status, enforcing the transition table.
    ///
    /// Returns the previous status on success. Metrics are updated inside
    /// the same critical section as the status change.
    pub fn transition(&self, to: ConnectionStatus) -> Result<ConnectionStatus, StateError> {
        self.cell.transition_locked(to)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use ConnectionStatus::*;

        assert!(Unknown.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Connecting));
        assert!(Reconnecting.can_transition_to(Failed));
        assert!(Error.can_transition_to(Connecting));

        // Transitions that must be rejected.
        assert!(!Unknown.can_transition_to(Connected));
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Failed.can_transition_to(Reconnecting));
    }

    #[test]
    fn test_status_predicates() {
        assert!(ConnectionStatus::Connected.is_connected());
        assert!(ConnectionStatus::Connecting.is_transitioning());
        assert!(ConnectionStatus::Reconnecting.is_transitioning());
        assert!(ConnectionStatus::Error.is_failed());
        assert!(ConnectionStatus::Failed.is_failed());
        assert!(!ConnectionStatus::Disconnected.is_failed());
    }

    #[tokio::test]
    async fn test_cell_transitions_update_metrics() {
        let cell = StatusCell::new();

        {
            let guard = cell.begin().await;
            guard.transition(ConnectionStatus::Connecting).unwrap();
            guard.transition(ConnectionStatus::Connected).unwrap();
        }
        {
            let guard = cell.begin().await;
            guard.transition(ConnectionStatus::Disconnecting).unwrap();
            guard.transition(ConnectionStatus::Disconnected).unwrap();
        }

        let snapshot = cell.metrics();
        assert_eq!(snapshot.connect_count, 1);
        assert_eq!(snapshot.disconnect_count, 1);
        assert_eq!(snapshot.error_count, 0);
        assert!(snapshot.last_connected_at.is_some());
        assert!(snapshot.last_disconnected_at.is_some());
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected() {
        let cell = StatusCell::new();
        let guard = cell.begin().await;

        let error = guard.transition(ConnectionStatus::Connected).unwrap_err();
        assert_eq!(error.from, ConnectionStatus::Unknown);
        assert_eq!(error.to, ConnectionStatus::Connected);

        // The status is unchanged after a rejected transition.
        assert_eq!(guard.status(), ConnectionStatus::Unknown);
    }

    #[tokio::test]
    async fn test_counters_are_monotonic_across_cycles() {
        let cell = StatusCell::new();

        for _ in 0..3 {
            let guard = cell.begin().await;
            guard.transition(ConnectionStatus::Connecting).unwrap();
            guard.transition(ConnectionStatus::Connected).unwrap();
            guard.transition(ConnectionStatus::Disconnecting).unwrap();
            guard.transition(ConnectionStatus::Disconnected).unwrap();
        }

        let snapshot = cell.metrics();
        assert_eq!(snapshot.connect_count, 3);
        assert_eq!(snapshot.disconnect_count, 3);
    }

    #[tokio::test]
    async fn test_try_begin_contends() {
        let cell = StatusCell::new();
        let guard = cell.begin().await;

        assert!(cell.try_begin().is_none());
        drop(guard);
        assert!(cell.try_begin().is_some());
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = QualityMetrics::new();
        metrics.record_transition(ConnectionStatus::Connected);

        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("connect_count"));
    }
}
