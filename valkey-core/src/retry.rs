//! Exponential backoff for connection and discovery retries.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff parameters.
///
/// Attempt `n` (0-based) waits `factor * exponent_base^n` milliseconds,
/// shifted by up to `jitter_percent` percent either way. After
/// `num_of_retries` retries the failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryStrategy {
    pub num_of_retries: u32,
    /// Base delay in milliseconds.
    pub factor: u32,
    pub exponent_base: u32,
    pub jitter_percent: u32,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            num_of_retries: 3,
            factor: 10,
            exponent_base: 2,
            jitter_percent: 20,
        }
    }
}

/// Upper bound on a single backoff delay.
const MAX_DELAY_MS: u64 = 60_000;

impl RetryStrategy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            num_of_retries: 0,
            ..Self::default()
        }
    }

    /// The delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = u64::from(self.factor)
            .saturating_mul(u64::from(self.exponent_base).saturating_pow(attempt))
            .min(MAX_DELAY_MS);
        let jitter = base * u64::from(self.jitter_percent.min(100)) / 100;
        let ms = if jitter == 0 {
            base
        } else {
            rand::thread_rng().gen_range(base - jitter..=base + jitter)
        };
        Duration::from_millis(ms)
    }
}
