// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The backend seam the tunnel dispatches into.
//!
//! The tunnel does not know which protocol engine serves its reads; it
//! talks to a [`Backend`], which the hosting process implements over a
//! concrete engine (in practice an OPC UA connection). Keeping the seam
//! here lets the tunnel crate stay free of protocol dependencies and lets
//! tests drive the tunnel with an in-memory table.

use async_trait::async_trait;

use tether_core::error::ConnectError;

// =============================================================================
// Backend Trait
// =============================================================================

/// A managed backend connection serving tunnel reads.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Ensures the backend connection is established.
    ///
    /// Called when a client session starts and when a delayed backend
    /// retry fires. Implementations typically delegate to the engine's
    /// `connect`, which already serializes concurrent calls.
    async fn ensure_connected(&self) -> Result<bool, ConnectError>;

    /// Reads the value behind `id` and renders it for the wire.
    async fn read_value(&self, id: &str) -> Result<String, ConnectError>;

    /// Releases the backend session.
    ///
    /// Called on client disconnect when the backend is not shared between
    /// sessions. Shared backends ignore this.
    async fn release(&self) -> Result<(), ConnectError>;
}
