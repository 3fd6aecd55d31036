// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # tether-core
//!
//! Core connection lifecycle and supervision primitives for TETHER, the
//! industrial connectivity supervisor.
//!
//! This crate provides the protocol-agnostic half of the system:
//!
//! - **Endpoint**: validated `scheme://host:port` addressing
//! - **State**: the connection status machine and per-handle quality metrics
//! - **Connection**: the capability trait implemented by every engine
//! - **Retry**: exponential-backoff and linear retry strategies
//! - **Reconnect**: the single-flight reconnection supervisor
//! - **Health**: periodic liveness probing with failure-triggered recovery
//! - **Process**: the generic process-lifecycle supervisor
//! - **Error**: the unified error hierarchy
//!
//! Protocol engines (OPC UA, TLS, raw TCP) live in sibling crates and plug
//! into this one through the [`Connection`](connection::Connection) trait.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether_core::health::{HealthConfig, HealthMonitor};
//! use tether_core::reconnect::Reconnector;
//! use tether_core::retry::RetryPolicy;
//!
//! let policy = RetryPolicy::default();
//! let reconnector = Arc::new(Reconnector::new(policy.build_strategy().into()));
//!
//! engine.connect().await?;
//!
//! let monitor = HealthMonitor::new(HealthConfig::default(), reconnector);
//! let handle = monitor.spawn(engine.clone());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod endpoint;
pub mod error;
pub mod state;

// =============================================================================
// Connection & Supervision Modules
// =============================================================================

pub mod connection;
pub mod health;
pub mod process;
pub mod reconnect;
pub mod retry;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use endpoint::{Endpoint, Scheme};
pub use error::{
    ConnectError, ConnectResult, ProcessStateError, ReconnectError, ReconnectResult, StateError,
    TetherError, TetherResult,
};
pub use state::{ConnectionStatus, MetricsSnapshot, QualityMetrics, StatusCell};

pub use connection::{Connection, ConnectionConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PING_TIMEOUT};
pub use health::{HealthConfig, HealthMonitor, HealthStats, MonitorHandle};
pub use process::{
    DependencyKind, DependencyState, ProcessDependency, ProcessRecord, ProcessState,
    TransitionEntry, validate_transition,
};
pub use reconnect::{ReconnectStats, Reconnector};
pub use retry::{drive, ExponentialBackoff, LinearRetry, RetryPolicy, RetryStrategy, StrategyKind};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
