// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # tether-tunnel
//!
//! TCP tunnel bridging external clients to a managed backend connection.
//!
//! External tooling speaks a line-oriented text protocol (`READ:<id>`);
//! the tunnel parses each request, dispatches it to the configured
//! [`Backend`] through a bounded worker pool, and relays the result.
//! Every client session is supervised as a process-lifecycle instance.
//!
//! - **Protocol**: the command grammar and fixed reply strings
//! - **Backend**: the seam a hosting process implements over an engine
//! - **Session**: one client bridged to the backend, with cascade close
//! - **Server**: the accept loop, registry, and delayed backend retry
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether_tunnel::{TcpTunnel, TunnelConfig};
//!
//! let tunnel = Arc::new(TcpTunnel::new(TunnelConfig::default(), backend));
//! let handle = tunnel.spawn().await?;
//! // ... later
//! handle.stop().await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod backend;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;

pub use backend::Backend;
pub use error::{TunnelError, TunnelResult};
pub use protocol::{
    format_backend_error, format_unknown, format_value, parse_command, Command, UnknownCommand,
    DEFAULT_LISTEN_PORT,
};
pub use server::{SessionInfo, TcpTunnel, TunnelConfig, TunnelHandle, TunnelStats};
pub use session::{SessionOutcome, TunnelSession};
