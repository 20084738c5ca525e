//! Exponential backoff with jitter.
//!
//! Shared by the retry executor (per-call retries) and the connection state
//! machine (reconnect scheduling). The base delay for attempt `n` (1-based) is
//!
//! ```text
//! min(max_delay, initial_delay * multiplier^(n-1))
//! ```
//!
//! and, when jitter is enabled, is scaled by a random factor in `[0.75, 1.25]`
//! so clients that failed together do not retry together.

use std::time::Duration;
use thiserror::Error;

/// Maximum relative deviation applied by jitter (±25%).
pub const JITTER_FACTOR: f64 = 0.25;

/// Invalid retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// `max_attempts` was zero.
    #[error("max_attempts must be at least 1")]
    NoAttempts,
    /// The multiplier was below 1 or not finite.
    #[error("backoff multiplier must be a finite value >= 1")]
    InvalidMultiplier,
    /// `initial_delay` exceeds `max_delay`.
    #[error("initial delay exceeds max delay")]
    InitialAboveMax,
}

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the un-jittered delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Whether to apply ±25% random jitter.
    pub jitter: bool,
}

impl RetryPolicy {
    /// 3 attempts, 500 ms base.
    pub const fn quick() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// 3 attempts, 1 s base.
    pub const fn standard() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// 5 attempts, 2 s base.
    pub const fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(2000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Unbounded attempts, 1 s base, 30 s cap. Used for reconnects.
    pub const fn reconnect() -> Self {
        Self {
            max_attempts: u32::MAX,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Check that the policy can produce a sensible schedule.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::NoAttempts);
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(PolicyError::InvalidMultiplier);
        }
        if self.initial_delay > self.max_delay {
            return Err(PolicyError::InitialAboveMax);
        }
        Ok(())
    }

    /// Whether another attempt may follow the given (1-based) attempt.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Un-jittered delay before retrying after `attempt` (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let initial_ms = self.initial_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let delay_ms = (initial_ms * self.backoff_multiplier.powi(exponent)).min(max_ms);
        Duration::from_millis(delay_ms as u64)
    }

    /// Delay before retrying after `attempt`, with jitter if enabled.
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.jitter {
            self.delay_with_unit(attempt, random_unit())
        } else {
            self.base_delay(attempt)
        }
    }

    /// Delay with an explicit jitter sample `unit` in `[0, 1]`.
    ///
    /// `0` maps to -25%, `0.5` to the base delay, `1` to +25%.
    pub fn delay_with_unit(&self, attempt: u32, unit: f64) -> Duration {
        let unit = unit.clamp(0.0, 1.0);
        let factor = 1.0 + (unit * 2.0 - 1.0) * JITTER_FACTOR;
        let base_ms = self.base_delay(attempt).as_millis() as f64;
        Duration::from_millis((base_ms * factor).round() as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Uniform sample in `[0, 1)`. Falls back to the midpoint (no jitter) if
/// the OS RNG is unavailable.
fn random_unit() -> f64 {
    let mut bytes = [0u8; 8];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => (u64::from_le_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64,
        Err(_) => 0.5,
    }
}
