// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Binary-level error types.

use thiserror::Error;

use tether_config::ConfigError;
use tether_tunnel::TunnelError;

// =============================================================================
// BinError
// =============================================================================

/// Errors surfaced by the supervisor binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The runtime could not be assembled.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// The tunnel server failed.
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),
}

impl BinError {
    /// Creates an initialization error.
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization(message.into())
    }

    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BinError::Config(_) => 2,
            BinError::Initialization(_) => 3,
            BinError::Tunnel(_) => 4,
        }
    }
}

/// A Result type with BinError.
pub type BinResult<T> = Result<T, BinError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::initialization("nope").exit_code(), 3);
        assert_eq!(
            BinError::from(ConfigError::missing_field("client.id")).exit_code(),
            2
        );
    }
}
