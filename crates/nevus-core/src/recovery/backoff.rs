//! Backoff strategies for retry operations

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for backoff timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Base delay unit
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Add random jitter to prevent thundering herd
    pub jitter: bool,
    /// Maximum jitter ratio (0.0 - 1.0)
    pub jitter_ratio: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
            jitter_ratio: 0.2,
        }
    }
}

/// Which backoff curve to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base * multiplier^attempt, capped at max_delay
    Exponential,
}

/// Backoff strategy trait
pub trait BackoffStrategy: Send + Sync {
    /// Get the delay before retrying after the given attempt (0-indexed)
    fn delay_for_attempt(&self, attempt: u32) -> Duration;
}

/// Linearly increasing backoff: base, 2*base, 3*base, ...
///
/// This is the policy used for identity-provider calls.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    config: BackoffConfig,
}

impl LinearBackoff {
    /// Create a linear backoff with the given config
    pub fn with_config(config: BackoffConfig) -> Self {
        Self { config }
    }
}

impl BackoffStrategy for LinearBackoff {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let raw = self.config.base_delay.saturating_mul(attempt.saturating_add(1));
        apply_jitter(raw.min(self.config.max_delay), &self.config)
    }
}

/// Exponential backoff with a cap
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
}

impl ExponentialBackoff {
    /// Create an exponential backoff with default config
    pub fn new() -> Self {
        Self::with_config(BackoffConfig::default())
    }

    /// Create an exponential backoff with custom config
    pub fn with_config(config: BackoffConfig) -> Self {
        Self { config }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.config.multiplier.powi(attempt.min(24) as i32);
        let secs = self.config.base_delay.as_secs_f64() * factor;
        let raw = Duration::from_secs_f64(secs.min(self.config.max_delay.as_secs_f64()));
        apply_jitter(raw, &self.config)
    }
}

fn apply_jitter(delay: Duration, config: &BackoffConfig) -> Duration {
    if !config.jitter || delay.is_zero() {
        return delay;
    }
    let range = delay.as_secs_f64() * config.jitter_ratio.clamp(0.0, 1.0);
    let offset = rand::thread_rng().gen_range(-range..=range);
    Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
}
