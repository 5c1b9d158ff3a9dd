//! Error recovery for remote calls
//!
//! - Error classification (transient vs permanent), driven by error variant
//! - Backoff strategies
//! - Retry policy with cooperative cancellation

pub mod backoff;
pub mod retry;

pub use backoff::{BackoffConfig, BackoffKind, BackoffStrategy, ExponentialBackoff, LinearBackoff};
pub use retry::{RetryConfig, RetryPolicy, RetryResult};

use crate::error::NevusError;

/// Error classification for recovery decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient errors that may succeed on retry
    Transient,
    /// Permanent errors that will not succeed on retry
    Permanent,
    /// Unknown errors, retried only when the policy allows it
    Unknown,
}

/// Classify an error into a recovery class.
///
/// Classification keys on the error variant. Every `Network` kind and every
/// timeout counts as transient; crypto, malformed data, bad input, and
/// provider rejection are permanent. Message text is never inspected.
pub fn classify_error(error: &NevusError) -> ErrorClass {
    match error {
        NevusError::Network { .. } | NevusError::Timeout { .. } => ErrorClass::Transient,
        NevusError::Io { .. } => ErrorClass::Transient,
        NevusError::Crypto { .. }
        | NevusError::Json { .. }
        | NevusError::InvalidInput { .. }
        | NevusError::Auth { .. }
        | NevusError::Keystore { .. }
        | NevusError::NotFound { .. }
        | NevusError::Cancelled => ErrorClass::Permanent,
        NevusError::Storage { .. } | NevusError::Cache { .. } | NevusError::Other { .. } => {
            ErrorClass::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkErrorKind;

    #[test]
    fn network_errors_are_transient() {
        for kind in [
            NetworkErrorKind::Dns,
            NetworkErrorKind::ConnectTimeout,
            NetworkErrorKind::ResponseTimeout,
            NetworkErrorKind::ConnectionRefused,
            NetworkErrorKind::ConnectionReset,
            NetworkErrorKind::HostUnreachable,
            NetworkErrorKind::Interrupted,
        ] {
            let err = NevusError::network(kind, "boom");
            assert_eq!(classify_error(&err), ErrorClass::Transient);
        }
    }

    #[test]
    fn auth_and_data_errors_are_permanent() {
        assert_eq!(
            classify_error(&NevusError::auth("user mismatch")),
            ErrorClass::Permanent
        );
        assert_eq!(
            classify_error(&NevusError::crypto("bad tag")),
            ErrorClass::Permanent
        );
        assert_eq!(
            classify_error(&NevusError::json("trailing garbage")),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn storage_errors_are_unknown() {
        assert_eq!(
            classify_error(&NevusError::storage("disk weirdness")),
            ErrorClass::Unknown
        );
    }
}
