// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # tether-bin
//!
//! The TETHER supervisor binary: CLI parsing, logging initialization,
//! runtime wiring, and graceful shutdown coordination.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

pub use cli::{Cli, Commands, LogFormat, RunArgs};
pub use error::{BinError, BinResult};
pub use runtime::{
    ManagedEndpoint, RunningSupervisor, RuntimeBuilder, StopReport, SupervisorRuntime,
};
pub use shutdown::ShutdownCoordinator;
