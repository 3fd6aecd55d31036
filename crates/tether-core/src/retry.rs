// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Retry strategies for connection recovery.
//!
//! This module provides the timing half of the reconnection engine: a
//! [`RetryPolicy`] loaded once at startup and two interchangeable
//! strategies driven by it.
//!
//! # Built-in Strategies
//!
//! - [`ExponentialBackoff`]: attempt *i* (0-indexed) waits
//!   `initial_wait * backoff_factor^i` before retrying
//! - [`LinearRetry`]: fixed `wait_time` between attempts
//!
//! Both stop after `max_retries` attempts and report exhaustion as
//! `Ok(false)` - exhaustion is an expected outcome of a bounded policy,
//! not an exception. Non-retryable errors (validation, certificate) abort
//! the sequence immediately through the error channel.
//!
//! Delays are awaited on the tokio timer; a retry sequence never blocks
//! the calling thread.
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_core::retry::{ExponentialBackoff, RetryPolicy, RetryStrategy};
//!
//! let strategy = ExponentialBackoff::new(RetryPolicy::default());
//!
//! let connected = strategy
//!     .execute(|| async { engine.connect().await })
//!     .await?;
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::connection::duration_millis;
use crate::error::ConnectError;

// =============================================================================
// RetryPolicy
// =============================================================================

/// Default number of attempts in a retry sequence.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default initial wait for exponential backoff.
pub const DEFAULT_INITIAL_WAIT: Duration = Duration::from_millis(1000);

/// Default backoff multiplier.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Default fixed wait for the linear strategy.
pub const DEFAULT_WAIT_TIME: Duration = Duration::from_millis(3000);

/// Which timing algorithm a sequence uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Geometrically growing delays.
    #[default]
    Exponential,
    /// Constant delay between attempts.
    Linear,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Exponential => write!(f, "exponential"),
            StrategyKind::Linear => write!(f, "linear"),
        }
    }
}

/// Retry configuration, loaded once at startup and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempt counter starting offset (carried from persisted state).
    #[serde(default)]
    pub initial_retry: u32,

    /// Maximum number of attempts in one sequence (0 = no attempts).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay before the first retry (exponential strategy).
    #[serde(default = "default_initial_wait", with = "duration_millis")]
    pub initial_wait: Duration,

    /// Multiplier applied per attempt (exponential strategy).
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Fixed delay between attempts (linear strategy).
    #[serde(default = "default_wait_time", with = "duration_millis")]
    pub wait_time: Duration,

    /// Which strategy this policy selects.
    #[serde(default)]
    pub strategy: StrategyKind,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_wait() -> Duration {
    DEFAULT_INITIAL_WAIT
}

fn default_backoff_factor() -> f64 {
    DEFAULT_BACKOFF_FACTOR
}

fn default_wait_time() -> Duration {
    DEFAULT_WAIT_TIME
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_retry: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_wait: DEFAULT_INITIAL_WAIT,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            wait_time: DEFAULT_WAIT_TIME,
            strategy: StrategyKind::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the initial wait.
    pub fn with_initial_wait(mut self, wait: Duration) -> Self {
        self.initial_wait = wait;
        self
    }

    /// Sets the backoff factor.
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Sets the fixed wait time.
    pub fn with_wait_time(mut self, wait: Duration) -> Self {
        self.wait_time = wait;
        self
    }

    /// Sets the strategy kind.
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Builds the strategy this policy selects.
    pub fn build_strategy(&self) -> Box<dyn RetryStrategy> {
        match self.strategy {
            StrategyKind::Exponential => Box::new(ExponentialBackoff::new(self.clone())),
            StrategyKind::Linear => Box::new(LinearRetry::new(self.clone())),
        }
    }
}

// =============================================================================
// RetryStrategy Trait
// =============================================================================

/// A bounded retry timing algorithm.
///
/// Implementations decide the delay before each upcoming attempt;
/// the provided [`execute`](RetryStrategy::execute) driver owns the loop.
#[async_trait]
pub trait RetryStrategy: Send + Sync {
    /// Returns the strategy name for logging/metrics.
    fn name(&self) -> &str;

    /// Returns the delay to wait before attempt number `attempt`
    /// (1-based: the first retry after the initial attempt is `1`).
    ///
    /// Returns `None` when the sequence is exhausted.
    fn delay_before(&self, attempt: u32) -> Option<Duration>;

    /// Drives an operation under this strategy.
    ///
    /// Convenience wrapper around [`drive`] for concrete strategy values;
    /// trait objects call [`drive`] directly.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` on the first successful attempt
    /// - `Ok(false)` when all attempts are exhausted
    /// - `Err(_)` when a non-retryable error aborts the sequence
    async fn execute<F, Fut>(&self, operation: F) -> Result<bool, ConnectError>
    where
        Self: Sized,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<bool, ConnectError>> + Send,
    {
        drive(self, operation).await
    }
}

/// Drives an operation under a retry strategy.
///
/// The first attempt runs immediately; subsequent attempts wait
/// [`RetryStrategy::delay_before`] on the tokio timer - the calling
/// thread is never blocked.
pub async fn drive<F, Fut>(
    strategy: &dyn RetryStrategy,
    mut operation: F,
) -> Result<bool, ConnectError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<bool, ConnectError>> + Send,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(true) => return Ok(true),
            Ok(false) => {
                tracing::debug!(
                    strategy = %strategy.name(),
                    attempt = attempt,
                    "Attempt reported no connection"
                );
            }
            Err(error) if !error.is_retryable() => {
                tracing::warn!(
                    strategy = %strategy.name(),
                    attempt = attempt,
                    error = %error,
                    "Non-retryable error, aborting sequence"
                );
                return Err(error);
            }
            Err(error) => {
                tracing::debug!(
                    strategy = %strategy.name(),
                    attempt = attempt,
                    error = %error,
                    "Attempt failed"
                );
            }
        }

        attempt += 1;
        match strategy.delay_before(attempt) {
            Some(delay) => {
                tracing::debug!(
                    strategy = %strategy.name(),
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling retry"
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                tracing::warn!(
                    strategy = %strategy.name(),
                    attempts = attempt,
                    "Retry attempts exhausted"
                );
                return Ok(false);
            }
        }
    }
}

// =============================================================================
// ExponentialBackoff
// =============================================================================

/// Geometrically growing delays: attempt *i* (0-indexed) waits
/// `initial_wait * backoff_factor^i`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    policy: RetryPolicy,
}

impl ExponentialBackoff {
    /// Creates a backoff strategy from a policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Creates a simple backoff strategy.
    pub fn simple(max_retries: u32, initial_wait: Duration, factor: f64) -> Self {
        Self::new(
            RetryPolicy::new()
                .with_max_retries(max_retries)
                .with_initial_wait(initial_wait)
                .with_backoff_factor(factor),
        )
    }
}

#[async_trait]
impl RetryStrategy for ExponentialBackoff {
    fn name(&self) -> &str {
        "exponential_backoff"
    }

    fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.policy.max_retries {
            return None;
        }

        let base = self.policy.initial_wait.as_millis() as f64;
        let factor = self.policy.backoff_factor;
        let millis = base * factor.powi(attempt.saturating_sub(1) as i32);

        Some(Duration::from_millis(millis as u64))
    }
}

// =============================================================================
// LinearRetry
// =============================================================================

/// Constant delay between attempts, decrementing a remaining-attempts
/// counter derived from `max_retries`.
#[derive(Debug, Clone)]
pub struct LinearRetry {
    policy: RetryPolicy,
}

impl LinearRetry {
    /// Creates a linear strategy from a policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Creates a simple linear strategy.
    pub fn simple(max_retries: u32, wait_time: Duration) -> Self {
        Self::new(
            RetryPolicy::new()
                .with_max_retries(max_retries)
                .with_wait_time(wait_time)
                .with_strategy(StrategyKind::Linear),
        )
    }
}

#[async_trait]
impl RetryStrategy for LinearRetry {
    fn name(&self) -> &str {
        "linear_retry"
    }

    fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.policy.max_retries {
            return None;
        }
        Some(self.policy.wait_time)
    }
}

// =============================================================================
// Tests
// =============================================================================
