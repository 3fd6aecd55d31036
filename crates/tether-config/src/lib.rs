// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # tether-config
//!
//! Configuration schema and loading for the TETHER supervisor.
//!
//! Configuration is loaded once at startup from a YAML/TOML/JSON file
//! (dispatched by extension), with environment-variable overrides for the
//! retry keys, and is immutable thereafter.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tether_config::load_config;
//!
//! let config = load_config("tether.yaml")?;
//! let policy = config.retry.to_policy();
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_env_overrides, load_config, parse_config, ConfigFormat};
pub use schema::{
    ClientConfig, EndpointEntry, HealthSettings, LoggingSettings, RetrySettings, TetherConfig,
    TrustSettings, TunnelSettings,
};
