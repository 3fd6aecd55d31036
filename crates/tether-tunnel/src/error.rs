// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Tunnel-specific error types.

use std::net::SocketAddr;

use thiserror::Error;

// =============================================================================
// TunnelError
// =============================================================================

/// Errors raised by the TCP tunnel server.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The listener could not bind.
    #[error("Failed to bind tunnel listener on {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Accepting a client connection failed.
    #[error("Failed to accept tunnel client: {source}")]
    Accept {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// I/O with a connected client failed.
    #[error("Client {peer} I/O failure: {source}")]
    ClientIo {
        /// The client's address.
        peer: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The tunnel is already serving.
    #[error("Tunnel is already running")]
    AlreadyRunning,
}

impl TunnelError {
    /// Creates a bind error.
    pub fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }

    /// Creates an accept error.
    pub fn accept(source: std::io::Error) -> Self {
        Self::Accept { source }
    }

    /// Creates a client I/O error.
    pub fn client_io(peer: SocketAddr, source: std::io::Error) -> Self {
        Self::ClientIo { peer, source }
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            TunnelError::Bind { .. } => "bind",
            TunnelError::Accept { .. } => "accept",
            TunnelError::ClientIo { .. } => "client_io",
            TunnelError::AlreadyRunning => "already_running",
        }
    }
}

/// A Result type with TunnelError.
pub type TunnelResult<T> = Result<T, TunnelError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types() {
        let error = TunnelError::bind(
            "0.0.0.0:5050",
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        );
        assert_eq!(error.error_type(), "bind");
        assert!(error.to_string().contains("0.0.0.0:5050"));
    }
}
