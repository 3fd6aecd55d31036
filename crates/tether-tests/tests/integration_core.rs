// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Integration tests for the connection core: status machine, retry
//! timing, single-flight guarantees, health monitoring, and process
//! lifecycle supervision.

use std::sync::Arc;
use std::time::Duration;

use tether_core::connection::Connection;
use tether_core::error::{ConnectError, ReconnectError};
use tether_core::health::{HealthConfig, HealthMonitor};
use tether_core::process::{ProcessRecord, ProcessState};
use tether_core::reconnect::Reconnector;
use tether_core::retry::{ExponentialBackoff, LinearRetry, RetryStrategy};
use tether_core::state::ConnectionStatus;

use tether_tests::common::{fast_exponential, fast_linear, sim_endpoint, MockConnection};

// =============================================================================
// Status Machine
// =============================================================================

#[tokio::test]
async fn test_status_follows_table_through_full_lifecycle() {
    let conn = MockConnection::new(sim_endpoint());

    assert_eq!(conn.status(), ConnectionStatus::Unknown);

    conn.connect().await.unwrap();
    assert_eq!(conn.status(), ConnectionStatus::Connected);

    conn.disconnect().await.unwrap();
    assert_eq!(conn.status(), ConnectionStatus::Disconnected);

    // Reconnect from Disconnected.
    conn.connect().await.unwrap();
    assert_eq!(conn.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_invalid_transitions_rejected_from_every_state() {
    use ConnectionStatus::*;

    let all = [
        Unknown,
        Connecting,
        Connected,
        Disconnecting,
        Disconnected,
        Reconnecting,
        Error,
        Failed,
    ];

    for from in all {
        for to in all {
            let in_table = from.valid_transitions().contains(&to);
            assert_eq!(
                from.can_transition_to(to),
                in_table,
                "table disagreement for {} -> {}",
                from,
                to
            );
        }
    }

    // Spot checks for transitions the table must forbid.
    assert!(!Disconnected.can_transition_to(Connected));
    assert!(!Failed.can_transition_to(Reconnecting));
    assert!(!Unknown.can_transition_to(Reconnecting));
}

#[tokio::test]
async fn test_metrics_accumulate_across_cycles() {
    let conn = MockConnection::new(sim_endpoint()).with_failures(1);

    // One failed attempt, then two full connect/disconnect cycles.
    let _ = conn.connect().await;
    conn.connect().await.unwrap();
    conn.disconnect().await.unwrap();
    conn.connect().await.unwrap();
    conn.disconnect().await.unwrap();

    let metrics = conn.metrics();
    assert_eq!(metrics.connect_count, 2);
    assert_eq!(metrics.disconnect_count, 2);
    assert_eq!(metrics.error_count, 1);
    assert!(metrics.last_connected_at.is_some());
    assert!(metrics.last_error_at.is_some());
}

// =============================================================================
// Idempotence & Single-Flight
// =============================================================================

#[tokio::test]
async fn test_consecutive_disconnects_both_true() {
    let conn = MockConnection::new(sim_endpoint());
    conn.connect().await.unwrap();

    assert!(conn.disconnect().await.unwrap());
    assert!(conn.disconnect().await.unwrap());
}

#[tokio::test]
async fn test_concurrent_connects_open_one_transport() {
    let conn = Arc::new(
        MockConnection::new(sim_endpoint()).with_connect_latency(Duration::from_millis(50)),
    );

    let a = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move { conn.connect().await })
    };
    let b = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move { conn.connect().await })
    };

    assert!(a.await.unwrap().unwrap());
    assert!(b.await.unwrap().unwrap());

    // The second caller observed the first's outcome instead of opening
    // a second transport.
    assert_eq!(conn.transport_opens(), 1);
    assert_eq!(conn.metrics().connect_count, 1);
}

// =============================================================================
// Retry Timing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_exponential_attempts_at_expected_offsets() {
    let strategy = ExponentialBackoff::new(fast_exponential(3));
    let start = tokio::time::Instant::now();
    let offsets = parking_lot::Mutex::new(Vec::new());

    let result = strategy
        .execute(|| {
            offsets.lock().push(start.elapsed());
            async { Err(ConnectError::transport("down")) }
        })
        .await
        .unwrap();

    assert!(!result);

    // max_retries=3, initial=100ms, factor=2 -> attempts at 0, 100, 300.
    let offsets = offsets.into_inner();
    assert_eq!(offsets.len(), 3);
    assert_eq!(offsets[0], Duration::ZERO);
    assert_eq!(offsets[1], Duration::from_millis(100));
    assert_eq!(offsets[2], Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_linear_attempts_at_expected_offsets() {
    let strategy = LinearRetry::new(fast_linear(3));
    let start = tokio::time::Instant::now();
    let offsets = parking_lot::Mutex::new(Vec::new());

    let result = strategy
        .execute(|| {
            offsets.lock().push(start.elapsed());
            async { Err(ConnectError::transport("down")) }
        })
        .await
        .unwrap();

    assert!(!result);

    // Fixed 100ms delay -> attempts at 0, 100, 200.
    let offsets = offsets.into_inner();
    assert_eq!(offsets.len(), 3);
    assert_eq!(offsets[0], Duration::ZERO);
    assert_eq!(offsets[1], Duration::from_millis(100));
    assert_eq!(offsets[2], Duration::from_millis(200));
}

#[test]
fn test_backoff_delays_strictly_increase() {
    let strategy = ExponentialBackoff::new(fast_exponential(6));

    let mut previous = Duration::ZERO;
    for attempt in 1..6 {
        let delay = strategy.delay_before(attempt).unwrap();
        assert!(delay > previous);
        previous = delay;
    }
}

#[test]
fn test_linear_delays_constant() {
    let strategy = LinearRetry::new(fast_linear(5));

    for attempt in 1..5 {
        assert_eq!(
            strategy.delay_before(attempt),
            Some(Duration::from_millis(100))
        );
    }
    assert_eq!(strategy.delay_before(5), None);
}

// =============================================================================
// Reconnection Supervisor
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_reconnector_recovers_flaky_connection() {
    let conn: Arc<dyn Connection> =
        Arc::new(MockConnection::new(sim_endpoint()).with_failures(2));
    let reconnector = Reconnector::new(Arc::new(ExponentialBackoff::new(fast_exponential(5))));

    assert!(reconnector.reconnect(&conn).await.unwrap());
    assert!(conn.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_reconnector_exhaustion_reports_false_and_failed() {
    let conn: Arc<dyn Connection> =
        Arc::new(MockConnection::new(sim_endpoint()).with_all_connects_failing());
    let reconnector = Reconnector::new(Arc::new(ExponentialBackoff::new(fast_exponential(3))));

    assert!(!reconnector.reconnect(&conn).await.unwrap());
    assert_eq!(conn.status(), ConnectionStatus::Failed);

    let error = reconnector.reconnect_or_error(&conn).await.unwrap_err();
    assert!(matches!(error, ReconnectError::Exhausted { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_reconnector_aborts_on_certificate_failure() {
    let conn: Arc<dyn Connection> =
        Arc::new(MockConnection::new(sim_endpoint()).with_certificate_failure());
    let reconnector = Reconnector::new(Arc::new(ExponentialBackoff::new(fast_exponential(5))));

    let error = reconnector.reconnect(&conn).await.unwrap_err();
    assert!(matches!(error, ConnectError::Certificate { .. }));
    assert_eq!(reconnector.stats().aborted(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnector_single_flight_under_concurrency() {
    let mock = Arc::new(
        MockConnection::new(sim_endpoint())
            .with_failures(2)
            .with_connect_latency(Duration::from_millis(10)),
    );
    let conn: Arc<dyn Connection> = mock.clone();
    let reconnector = Arc::new(Reconnector::new(Arc::new(ExponentialBackoff::new(
        fast_exponential(5),
    ))));

    let (a, b, c) = tokio::join!(
        reconnector.reconnect(&conn),
        reconnector.reconnect(&conn),
        reconnector.reconnect(&conn),
    );

    assert!(a.unwrap());
    assert!(b.unwrap());
    assert!(c.unwrap());

    // Exactly one retry sequence ran.
    assert_eq!(reconnector.stats().sequences(), 1);
    assert_eq!(reconnector.stats().joined(), 2);
    assert_eq!(mock.transport_opens(), 1);
}

// =============================================================================
// Health Monitoring
// =============================================================================

#[tokio::test]
async fn test_health_monitor_recovers_failed_connection() {
    let mock = Arc::new(MockConnection::new(sim_endpoint()));
    mock.connect().await.unwrap();

    let conn: Arc<dyn Connection> = mock.clone();
    let reconnector = Arc::new(Reconnector::new(Arc::new(ExponentialBackoff::new(
        fast_exponential(5).with_initial_wait(Duration::from_millis(5)),
    ))));

    let monitor = HealthMonitor::new(
        HealthConfig::with_interval(Duration::from_millis(10)),
        reconnector,
    );
    let stats = monitor.stats();
    let handle = monitor.spawn(conn.clone());

    // Break the ping; a reconnect heals it.
    mock.set_ping_ok(false);
    tokio::time::sleep(Duration::from_millis(150)).await;
    handle.stop().await;

    assert!(stats.failures() >= 1);
    assert!(stats.reconnects_triggered() >= 1);
    assert!(conn.is_connected());
    assert!(mock.ping_count() >= 1);
}

#[tokio::test]
async fn test_health_monitor_single_flight_reconnects() {
    let mock = Arc::new(MockConnection::new(sim_endpoint()));
    mock.connect().await.unwrap();

    // Every reconnect attempt fails, so one sequence spans the whole
    // test window while failing probes keep landing.
    mock.set_fail_all_connects(true);

    let conn: Arc<dyn Connection> = mock.clone();
    let reconnector = Arc::new(Reconnector::new(Arc::new(ExponentialBackoff::new(
        fast_exponential(4).with_initial_wait(Duration::from_millis(50)),
    ))));

    let monitor = HealthMonitor::new(
        HealthConfig::with_interval(Duration::from_millis(5)),
        Arc::clone(&reconnector),
    );
    let handle = monitor.spawn(conn);

    mock.set_ping_ok(false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.stop().await;

    // Probes kept failing, but only one sequence was ever in flight.
    assert_eq!(reconnector.stats().sequences(), 1);
}

// =============================================================================
// Process Lifecycle
// =============================================================================

#[test]
fn test_supervised_record_walks_the_table() {
    let mut record = ProcessRecord::new("connect-attempt");

    record
        .transition(ProcessState::Initialized, "resources allocated")
        .unwrap();
    record.transition(ProcessState::Ready, "validated").unwrap();
    record.transition(ProcessState::Running, "attempt started").unwrap();
    record
        .transition(ProcessState::Terminated, "attempt finished")
        .unwrap();

    assert!(record.state().is_terminal());
    assert_eq!(record.history().len(), 4);
}

#[test]
fn test_rejected_transitions_recorded_with_reason() {
    let mut record = ProcessRecord::new("tunnel-session");

    assert!(record
        .transition(ProcessState::Running, "skipping setup")
        .is_err());
    assert!(record
        .transition(ProcessState::Zombie, "nonsense jump")
        .is_err());

    assert_eq!(record.state(), ProcessState::Created);
    assert_eq!(record.history().len(), 2);
    assert!(record.history().iter().all(|e| !e.accepted));
    assert_eq!(record.history()[0].reason, "skipping setup");
}
