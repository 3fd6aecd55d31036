// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # tether-opcua
//!
//! OPC UA connection engine for TETHER.
//!
//! The protocol stack itself is an external collaborator: this crate
//! defines the opaque [`OpcUaTransport`] seam it plugs into and the
//! [`OpcUaConnection`] engine that owns lifecycle, deadlines, the
//! certificate gate, and status transitions on top of it.
//!
//! - **Types**: `OpcUaConfig`, whitelisted security policy/mode, `NodeId`
//! - **Transport**: the session seam (`open_session`/`read_node`/...)
//! - **Sim**: an in-process transport for tests and lab bring-up
//! - **Engine**: the `Connection` implementation
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether_opcua::{OpcUaConfig, OpcUaConnection, SimTransport};
//! use tether_core::{Connection, Endpoint};
//!
//! let config = OpcUaConfig::new(Endpoint::parse("opc.tcp://plc-01:4840")?);
//! let engine = OpcUaConnection::new("plc-01", config, Arc::new(SimTransport::new()));
//!
//! engine.connect().await?;
//! let alive = engine.ping().await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod engine;
pub mod sim;
pub mod transport;
pub mod types;

pub use engine::OpcUaConnection;
pub use sim::SimTransport;
pub use transport::{OpcUaTransport, SessionHandle};
pub use types::{
    Identifier, NodeId, NodeValue, OpcUaConfig, SecurityMode, SecurityPolicy,
};
