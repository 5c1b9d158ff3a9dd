//! Session and client configuration

use nevus_core::cache::CacheConfig;
use nevus_core::error::NevusResult;
use nevus_core::recovery::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the session manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Provider-defined credential lifetime; expiry is computed client-side
    #[serde(with = "humantime_serde")]
    pub token_lifetime: Duration,

    /// Sessions expiring within this margin are refreshed proactively
    #[serde(with = "humantime_serde")]
    pub refresh_margin: Duration,

    /// Age limit for the in-memory snapshot and verification verdict
    #[serde(with = "humantime_serde")]
    pub snapshot_ttl: Duration,

    /// Deadline for a full verification pass
    #[serde(with = "humantime_serde")]
    pub verify_timeout: Duration,

    /// Deadline for a verification pass in fast mode
    #[serde(with = "humantime_serde")]
    pub verify_timeout_fast: Duration,

    /// Deadline for background snapshot warm-up
    #[serde(with = "humantime_serde")]
    pub preload_timeout: Duration,

    /// Debounce before a corrupt persisted session is cleaned up
    #[serde(with = "humantime_serde")]
    pub cleanup_delay: Duration,

    /// Tolerated clock skew when judging stored timestamps
    #[serde(with = "humantime_serde")]
    pub clock_skew_tolerance: Duration,

    /// Retry policy for identity-provider calls
    pub retry: RetryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_lifetime: Duration::from_secs(3600),
            refresh_margin: Duration::from_secs(5 * 60),
            snapshot_ttl: Duration::from_secs(30),
            verify_timeout: Duration::from_secs(20),
            verify_timeout_fast: Duration::from_secs(8),
            preload_timeout: Duration::from_secs(5),
            cleanup_delay: Duration::from_secs(2),
            clock_skew_tolerance: Duration::from_secs(30),
            retry: RetryConfig::for_identity_provider(),
        }
    }
}

impl SessionConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the credential lifetime
    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    /// Set the snapshot/verdict cache TTL
    pub fn with_snapshot_ttl(mut self, ttl: Duration) -> Self {
        self.snapshot_ttl = ttl;
        self
    }

    /// Set the verification deadlines
    pub fn with_verify_timeouts(mut self, normal: Duration, fast: Duration) -> Self {
        self.verify_timeout = normal;
        self.verify_timeout_fast = fast;
        self
    }

    /// Set the corruption-cleanup debounce
    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    /// Set the retry policy for provider calls
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Top-level configuration for the Nevus client libraries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NevusConfig {
    /// Session manager settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Record cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

impl NevusConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> NevusResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let config = SessionConfig::default();
        assert_eq!(config.token_lifetime, Duration::from_secs(3600));
        assert_eq!(config.refresh_margin, Duration::from_secs(300));
        assert_eq!(config.snapshot_ttl, Duration::from_secs(30));
        assert_eq!(config.verify_timeout, Duration::from_secs(20));
        assert_eq!(config.verify_timeout_fast, Duration::from_secs(8));
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = NevusConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: NevusConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            restored.session.verify_timeout,
            config.session.verify_timeout
        );
        assert_eq!(restored.cache.memory_capacity, config.cache.memory_capacity);
    }

    #[test]
    fn humantime_fields_accept_shorthand() {
        let json = r#"{
            "session": {
                "token_lifetime": "1h",
                "refresh_margin": "5m",
                "snapshot_ttl": "30s",
                "verify_timeout": "20s",
                "verify_timeout_fast": "8s",
                "preload_timeout": "5s",
                "cleanup_delay": "2s",
                "clock_skew_tolerance": "30s",
                "retry": {
                    "max_attempts": 3,
                    "max_duration": "1m",
                    "retry_unknown": false,
                    "backoff_kind": "linear",
                    "backoff": {
                        "base_delay": "1s",
                        "max_delay": "10s",
                        "multiplier": 1.0,
                        "jitter": false,
                        "jitter_ratio": 0.0
                    }
                }
            }
        }"#;
        let config: NevusConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.session.token_lifetime, Duration::from_secs(3600));
    }
}
