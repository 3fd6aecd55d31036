// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading.
//!
//! Loads [`TetherConfig`] from YAML, TOML, or JSON (dispatched by file
//! extension), applies environment-variable overrides for the retry
//! keys, and validates the result. Configuration is loaded once at
//! startup; nothing here supports live reloads.
//!
//! # Environment Overrides
//!
//! | Variable                  | Overrides              |
//! |---------------------------|------------------------|
//! | `TETHER_INITIAL_RETRY`    | `retry.initial_retry`  |
//! | `TETHER_MAX_RETRIES`      | `retry.max_retries`    |
//! | `TETHER_INITIAL_WAIT_MS`  | `retry.initial_wait`   |
//! | `TETHER_BACKOFF_FACTOR`   | `retry.backoff_factor` |
//! | `TETHER_WAIT_TIME_MS`     | `retry.wait_time`      |
//! | `TETHER_RETRY_STRATEGY`   | `retry.strategy`       |

use std::path::Path;

use tether_core::retry::StrategyKind;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::TetherConfig;

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML (`.yaml`, `.yml`).
    Yaml,
    /// TOML (`.toml`).
    Toml,
    /// JSON (`.json`).
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path's extension.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            _ => Err(ConfigError::UnknownFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Loads, overrides, and validates a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<TetherConfig> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut config = parse_config(&content, format, path)?;
    apply_env_overrides(&mut config)?;
    config.validate()?;

    tracing::info!(
        path = %path.display(),
        endpoints = config.endpoints.len(),
        strategy = %config.retry.strategy,
        "Configuration loaded"
    );

    Ok(config)
}

/// Parses configuration content in the given format.
pub fn parse_config(
    content: &str,
    format: ConfigFormat,
    path: &Path,
) -> ConfigResult<TetherConfig> {
    match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| ConfigError::parse(path, e.to_string())),
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::parse(path, e.to_string()))
        }
        ConfigFormat::Json => serde_json::from_str(content)
            .map_err(|e| ConfigError::parse(path, e.to_string())),
    }
}

// =============================================================================
// Environment Overrides
// =============================================================================

/// Applies retry-key overrides from the environment.
pub fn apply_env_overrides(config: &mut TetherConfig) -> ConfigResult<()> {
    if let Some(value) = read_env("TETHER_INITIAL_RETRY")? {
        config.retry.initial_retry = parse_env("TETHER_INITIAL_RETRY", &value)?;
    }
    if let Some(value) = read_env("TETHER_MAX_RETRIES")? {
        config.retry.max_retries = parse_env("TETHER_MAX_RETRIES", &value)?;
    }
    if let Some(value) = read_env("TETHER_INITIAL_WAIT_MS")? {
        config.retry.initial_wait = parse_env("TETHER_INITIAL_WAIT_MS", &value)?;
    }
    if let Some(value) = read_env("TETHER_BACKOFF_FACTOR")? {
        config.retry.backoff_factor = parse_env("TETHER_BACKOFF_FACTOR", &value)?;
    }
    if let Some(value) = read_env("TETHER_WAIT_TIME_MS")? {
        config.retry.wait_time = parse_env("TETHER_WAIT_TIME_MS", &value)?;
    }
    if let Some(value) = read_env("TETHER_RETRY_STRATEGY")? {
        config.retry.strategy = match value.to_lowercase().as_str() {
            "exponential" => StrategyKind::Exponential,
            "linear" => StrategyKind::Linear,
            other => {
                return Err(ConfigError::validation(
                    "TETHER_RETRY_STRATEGY",
                    format!("'{}' is not a strategy (exponential|linear)", other),
                ));
            }
        };
    }

    Ok(())
}

fn read_env(name: &str) -> ConfigResult<Option<String>> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(Some(value)),
        _ => Ok(None),
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> ConfigResult<T> {
    value.parse().map_err(|_| {
        ConfigError::validation(name, format!("'{}' cannot be parsed", value))
    })
}

// =============================================================================
// Tests
// =============================================================================
