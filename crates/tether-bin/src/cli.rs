// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! Subcommands:
//!
//! - `run`: start the supervisor (default)
//! - `validate`: validate a configuration file and exit
//! - `version`: show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// TETHER - resilient connectivity supervisor for industrial endpoints.
///
/// Establishes, monitors, and resiliently maintains connections to
/// automation endpoints (OPC UA servers, TLS-secured hosts, raw TCP
/// peers), with bounded retry behavior and certificate-gated security.
#[derive(Parser, Debug)]
#[command(
    name = "tether",
    author = "Sylvex <contact@sylvex.io>",
    version,
    about = "Resilient connectivity supervisor for industrial endpoints",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "tether.yaml",
        env = "TETHER_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        default_value = "info",
        env = "TETHER_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json, compact)
    #[arg(long, default_value = "text", env = "TETHER_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the supervisor (default when no subcommand is given)
    Run(RunArgs),

    /// Validate the configuration file and exit
    Validate,

    /// Show version information
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Development mode: OPC UA endpoints run against the in-process
    /// simulated transport instead of a protocol library backend
    #[arg(long)]
    pub dev: bool,

    /// Skip the initial connect of all endpoints at startup
    #[arg(long)]
    pub skip_connect: bool,
}

// =============================================================================
// LogFormat
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LogFormat {
    /// Human-readable text (default).
    #[default]
    Text,
    /// JSON lines for log aggregation.
    Json,
    /// Minimal single-line output.
    Compact,
}

// =============================================================================
// Tests
// =============================================================================
