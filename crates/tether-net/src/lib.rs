// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # tether-net
//!
//! TLS and raw TCP connection engines for TETHER.
//!
//! - **Tcp**: plain TCP peer with a one-byte round-trip liveness probe
//! - **Tls**: rustls-backed engine whose `Connected` status is gated on
//!   the certificate validator accepting the peer's presented chain
//!
//! Both implement the core [`Connection`](tether_core::Connection) trait
//! and compose with the same retry, health, and tunnel machinery as the
//! OPC UA engine.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod tcp;
pub mod tls;

pub use tcp::TcpConnection;
pub use tls::TlsConnection;
