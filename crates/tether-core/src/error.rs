// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Unified error hierarchy for TETHER.
//!
//! This module defines the error types shared by all connection engines and
//! the supervision layer:
//!
//! - Distinguishes between retryable and non-retryable failures
//! - Provides factory constructors for common cases
//! - Supports error chaining for traceability
//! - Maps errors to stable discriminants for logging/metrics
//!
//! # Error Hierarchy
//!
//! ```text
//! TetherError (root)
//! ├── ConnectError    - Endpoint validation, transport, timeout, certificates
//! ├── ReconnectError  - Retry sequence failures
//! ├── StateError      - Illegal connection status transitions
//! └── ProcessStateError - Illegal process lifecycle transitions
//! ```
//!
//! # Examples
//!
//! ```
//! use tether_core::error::{ConnectError, TetherError};
//! use std::time::Duration;
//!
//! let error = ConnectError::timeout(Duration::from_secs(10));
//! assert!(error.is_retryable());
//!
//! let root: TetherError = error.into();
//! assert!(root.is_retryable());
//! ```

use std::time::Duration;
use thiserror::Error;

use crate::process::ProcessState;
use crate::state::ConnectionStatus;

// =============================================================================
// TetherError - Root Error Type
// =============================================================================

/// The root error type for TETHER.
///
/// All errors in the connection core can be converted to this type, providing
/// a unified error handling interface for hosting processes.
#[derive(Debug, Error)]
pub enum TetherError {
    /// Connection establishment or operation error.
    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    /// Reconnection sequence error.
    #[error("Reconnection error: {0}")]
    Reconnect(#[from] ReconnectError),

    /// Connection status transition error.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Process lifecycle transition error.
    #[error("Process error: {0}")]
    Process(#[from] ProcessStateError),
}

impl TetherError {
    /// Returns `true` if this error is retryable.
    ///
    /// Retryable errors are transient failures that may succeed on a
    /// subsequent attempt under a retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            TetherError::Connect(e) => e.is_retryable(),
            TetherError::Reconnect(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns the error category as a string for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            TetherError::Connect(_) => "connect",
            TetherError::Reconnect(_) => "reconnect",
            TetherError::State(_) => "state",
            TetherError::Process(_) => "process",
        }
    }
}

// =============================================================================
// ConnectError
// =============================================================================

/// Errors raised by connection engines.
///
/// Validation and certificate failures are fail-fast: they are never
/// auto-retried by a retry strategy. Transport and timeout failures are
/// surfaced to the caller; only an explicit reconnection sequence retries
/// them.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Endpoint or parameter validation failed.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// The operation deadline expired.
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        /// The deadline that was exceeded.
        duration: Duration,
    },

    /// Socket, TLS, or protocol-level failure.
    #[error("Transport failure: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Certificate chain or validity-window failure.
    ///
    /// Raised by the certificate gate before a secure connection may report
    /// `Connected`. Never retried.
    #[error("Certificate rejected for '{subject}': {message}")]
    Certificate {
        /// Subject of the failing certificate.
        subject: String,
        /// Error message.
        message: String,
    },

    /// No handle is connected.
    #[error("No active connection")]
    NotConnected,
}

impl ConnectError {
    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transport error with an underlying source.
    pub fn transport_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a certificate error.
    pub fn certificate(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Certificate {
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    ///
    /// Validation and certificate failures are permanent for a given
    /// endpoint configuration and must fail fast.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectError::Timeout { .. }
                | ConnectError::Transport { .. }
                | ConnectError::NotConnected
        )
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            ConnectError::Validation { .. } => "validation",
            ConnectError::Timeout { .. } => "timeout",
            ConnectError::Transport { .. } => "transport",
            ConnectError::Certificate { .. } => "certificate",
            ConnectError::NotConnected => "not_connected",
        }
    }

    /// Adds endpoint context to the error message.
    pub fn with_endpoint(self, endpoint: &str) -> Self {
        match self {
            ConnectError::Transport { message, source } => ConnectError::Transport {
                message: format!("[{}] {}", endpoint, message),
                source,
            },
            other => other,
        }
    }
}

impl Clone for ConnectError {
    fn clone(&self) -> Self {
        match self {
            ConnectError::Validation { field, message } => ConnectError::Validation {
                field: field.clone(),
                message: message.clone(),
            },
            ConnectError::Timeout { duration } => ConnectError::Timeout {
                duration: *duration,
            },
            ConnectError::Transport { message, .. } => ConnectError::Transport {
                message: message.clone(),
                source: None,
            },
            ConnectError::Certificate { subject, message } => ConnectError::Certificate {
                subject: subject.clone(),
                message: message.clone(),
            },
            ConnectError::NotConnected => ConnectError::NotConnected,
        }
    }
}

// =============================================================================
// ReconnectError
// =============================================================================

/// Errors raised by the reconnection supervisor.
#[derive(Debug, Error, Clone)]
pub enum ReconnectError {
    /// All retry attempts were exhausted without success.
    #[error("Reconnection exhausted after {attempts} attempts")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// The sequence was aborted by a non-retryable error.
    #[error("Reconnection aborted: {source}")]
    Aborted {
        /// The non-retryable error that ended the sequence.
        #[source]
        source: ConnectError,
    },
}

impl ReconnectError {
    /// Creates an exhausted error.
    pub fn exhausted(attempts: u32) -> Self {
        Self::Exhausted { attempts }
    }

    /// Creates an aborted error.
    pub fn aborted(source: ConnectError) -> Self {
        Self::Aborted { source }
    }

    /// Returns `true` if this error is retryable.
    ///
    /// Exhaustion may be retried by a fresh sequence; an aborted sequence
    /// hit a permanent failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconnectError::Exhausted { .. })
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            ReconnectError::Exhausted { .. } => "exhausted",
            ReconnectError::Aborted { .. } => "aborted",
        }
    }
}

// =============================================================================
// StateError
// =============================================================================

/// An illegal connection status transition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid status transition {from} -> {to}")]
pub struct StateError {
    /// The current status.
    pub from: ConnectionStatus,
    /// The rejected target status.
    pub to: ConnectionStatus,
}

impl StateError {
    /// Creates a new state error.
    pub fn new(from: ConnectionStatus, to: ConnectionStatus) -> Self {
        Self { from, to }
    }
}

// =============================================================================
// ProcessStateError
// =============================================================================

/// Errors raised by the process lifecycle supervisor.
#[derive(Debug, Error, Clone)]
pub enum ProcessStateError {
    /// The requested transition is not in the transition table.
    #[error("Invalid lifecycle transition {from} -> {to}")]
    InvalidTransition {
        /// The current state.
        from: ProcessState,
        /// The rejected target state.
        to: ProcessState,
    },

    /// A hard dependency is not satisfied.
    #[error("Dependency '{dependency}' is {state}, cannot proceed to Running")]
    DependencyUnsatisfied {
        /// The dependency name.
        dependency: String,
        /// Its current state description.
        state: String,
    },
}

impl ProcessStateError {
    /// Creates an invalid transition error.
    pub fn invalid_transition(from: ProcessState, to: ProcessState) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Creates a dependency error.
    pub fn dependency_unsatisfied(
        dependency: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self::DependencyUnsatisfied {
            dependency: dependency.into(),
            state: state.into(),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// A Result type with TetherError.
pub type TetherResult<T> = Result<T, TetherError>;

/// A Result type with ConnectError.
pub type ConnectResult<T> = Result<T, ConnectError>;

/// A Result type with ReconnectError.
pub type ReconnectResult<T> = Result<T, ReconnectError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_retryable() {
        assert!(ConnectError::timeout(Duration::from_secs(10)).is_retryable());
        assert!(ConnectError::transport("refused").is_retryable());
        assert!(ConnectError::NotConnected.is_retryable());

        assert!(!ConnectError::validation("port", "out of range").is_retryable());
        assert!(!ConnectError::certificate("CN=plc", "expired").is_retryable());
    }

    #[test]
    fn test_connect_error_types() {
        assert_eq!(
            ConnectError::validation("host", "empty").error_type(),
            "validation"
        );
        assert_eq!(
            ConnectError::timeout(Duration::from_secs(1)).error_type(),
            "timeout"
        );
        assert_eq!(ConnectError::NotConnected.error_type(), "not_connected");
    }

    #[test]
    fn test_connect_error_with_endpoint() {
        let error = ConnectError::transport("refused").with_endpoint("opc.tcp://plc:4840");
        match error {
            ConnectError::Transport { message, .. } => {
                assert!(message.contains("opc.tcp://plc:4840"));
            }
            _ => panic!("Expected Transport"),
        }
    }

    #[test]
    fn test_reconnect_error() {
        let error = ReconnectError::exhausted(3);
        assert!(error.is_retryable());
        assert_eq!(error.error_type(), "exhausted");

        let error = ReconnectError::aborted(ConnectError::certificate("CN=x", "not trusted"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_root_error_conversion() {
        let error = ConnectError::timeout(Duration::from_secs(5));
        let root: TetherError = error.into();

        assert!(root.is_retryable());
        assert_eq!(root.error_type(), "connect");
    }

    #[test]
    fn test_connect_error_clone_drops_source() {
        let error = ConnectError::transport_with(
            "refused",
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        );
        let cloned = error.clone();
        match cloned {
            ConnectError::Transport { source, .. } => assert!(source.is_none()),
            _ => panic!("Expected Transport"),
        }
    }
}
