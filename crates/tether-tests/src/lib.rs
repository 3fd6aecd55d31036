// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # TETHER Integration Tests
//!
//! Integration tests for the TETHER connectivity supervisor, plus the
//! shared utilities they are built from.
//!
//! ## Module Structure
//!
//! - [`common`]: shared test utilities
//!   - `mocks`: configurable mock connection and tunnel backend
//!   - `fixtures`: endpoints, configs, and certificate fixtures
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p tether-tests
//!
//! # Run a specific suite
//! cargo test -p tether-tests --test integration_core
//! cargo test -p tether-tests --test integration_tunnel
//! cargo test -p tether-tests --test integration_config
//! ```
//!
//! ## Test Categories
//!
//! ### Core Tests (`integration_core.rs`)
//! - Status transition table and metrics
//! - Retry timing (exponential and linear, under paused time)
//! - Single-flight connect and reconnection
//! - Health monitor recovery
//! - Process lifecycle supervision
//!
//! ### Tunnel Tests (`integration_tunnel.rs`)
//! - Wire protocol round trips over real sockets
//! - Backend failure and cascade close behavior
//!
//! ### Config Tests (`integration_config.rs`)
//! - Format loading and env overrides
//! - Validation rules and port boundaries

pub mod common;
