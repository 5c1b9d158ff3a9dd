//! Retry policy for transient failures
//!
//! Wraps a fallible async operation with bounded, classified retries.
//! Only errors classified as transient are retried; permanent errors fail
//! on the first attempt.

use super::backoff::{BackoffConfig, BackoffKind, BackoffStrategy, ExponentialBackoff, LinearBackoff};
use super::{classify_error, ErrorClass};
use crate::error::{NevusError, NevusResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Configuration for retry behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (first try included)
    pub max_attempts: u32,
    /// Maximum total time to spend across attempts and sleeps
    #[serde(with = "humantime_serde")]
    pub max_duration: Duration,
    /// Whether to retry errors of unknown class
    pub retry_unknown: bool,
    /// Backoff curve
    pub backoff_kind: BackoffKind,
    /// Backoff timing
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_duration: Duration::from_secs(60),
            retry_unknown: false,
            backoff_kind: BackoffKind::Exponential,
            backoff: BackoffConfig::default(),
        }
    }
}

impl RetryConfig {
    /// Create a new RetryConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy for identity-provider calls: 3 attempts, linearly increasing
    /// delay (1s, 2s, 3s), transient errors only.
    pub fn for_identity_provider() -> Self {
        Self {
            max_attempts: 3,
            max_duration: Duration::from_secs(60),
            retry_unknown: false,
            backoff_kind: BackoffKind::Linear,
            backoff: BackoffConfig {
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(10),
                multiplier: 1.0,
                jitter: false,
                jitter_ratio: 0.0,
            },
        }
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            max_duration: Duration::from_secs(60),
            retry_unknown: false,
            backoff_kind: BackoffKind::Linear,
            backoff: BackoffConfig {
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                multiplier: 1.0,
                jitter: false,
                jitter_ratio: 0.0,
            },
        }
    }

    /// Set max attempts
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set max total duration
    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = duration;
        self
    }

    /// Set the base delay unit
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.backoff.base_delay = delay;
        self
    }

    /// Set whether unknown-class errors are retried
    pub fn with_retry_unknown(mut self, retry: bool) -> Self {
        self.retry_unknown = retry;
        self
    }

    /// Build the backoff strategy for this config
    pub fn create_backoff(&self) -> Box<dyn BackoffStrategy> {
        match self.backoff_kind {
            BackoffKind::Linear => Box::new(LinearBackoff::with_config(self.backoff.clone())),
            BackoffKind::Exponential => {
                Box::new(ExponentialBackoff::with_config(self.backoff.clone()))
            }
        }
    }
}

/// Result of a retry operation
#[derive(Debug)]
pub enum RetryResult<T> {
    /// Operation succeeded
    Success(T),
    /// Operation failed and no further attempt is allowed
    Failed {
        /// The last error observed
        error: NevusError,
        /// Total attempts made
        attempts: u32,
        /// Total time spent
        elapsed: Duration,
    },
    /// Operation was cancelled
    Cancelled,
}

impl<T> RetryResult<T> {
    /// Check if the result is successful
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Get the success value, if any
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(v) => Some(v),
            _ => None,
        }
    }

    /// Convert to a Result, losing attempt metadata
    pub fn into_result(self) -> NevusResult<T> {
        match self {
            Self::Success(v) => Ok(v),
            Self::Failed { error, .. } => Err(error),
            Self::Cancelled => Err(NevusError::Cancelled),
        }
    }
}

/// Retry policy for async operations
pub struct RetryPolicy {
    config: RetryConfig,
    backoff: Box<dyn BackoffStrategy>,
}

impl RetryPolicy {
    /// Create a policy with the default config
    pub fn new() -> Self {
        Self::with_config(RetryConfig::default())
    }

    /// Create a policy with a custom config
    pub fn with_config(config: RetryConfig) -> Self {
        let backoff = config.create_backoff();
        Self { config, backoff }
    }

    /// Check if an error should be retried after the given attempt (0-indexed)
    pub fn should_retry(&self, error: &NevusError, attempt: u32) -> bool {
        if attempt + 1 >= self.config.max_attempts {
            return false;
        }
        match classify_error(error) {
            ErrorClass::Transient => true,
            ErrorClass::Permanent => false,
            ErrorClass::Unknown => self.config.retry_unknown,
        }
    }

    /// Execute an operation with retries.
    ///
    /// The cancellation token is observed between attempts and during
    /// backoff sleeps; cancellation abandons the operation.
    pub async fn execute<T, F, Fut>(
        &self,
        mut operation: F,
        cancel_token: Option<CancellationToken>,
    ) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = NevusResult<T>>,
    {
        let start = std::time::Instant::now();
        let mut attempt: u32 = 0;

        loop {
            if let Some(ref token) = cancel_token {
                if token.is_cancelled() {
                    return RetryResult::Cancelled;
                }
            }

            match operation().await {
                Ok(value) => return RetryResult::Success(value),
                Err(error) => {
                    let out_of_time = start.elapsed() >= self.config.max_duration;
                    if out_of_time || !self.should_retry(&error, attempt) {
                        return RetryResult::Failed {
                            error,
                            attempts: attempt + 1,
                            elapsed: start.elapsed(),
                        };
                    }

                    let delay = self.backoff.delay_for_attempt(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient error: {}",
                        error
                    );
                    attempt += 1;

                    if let Some(ref token) = cancel_token {
                        tokio::select! {
                            _ = token.cancelled() => return RetryResult::Cancelled,
                            _ = sleep(delay) => {}
                        }
                    } else {
                        sleep(delay).await;
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}
