//! Core error types for the Nevus client

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Nevus operations
pub type NevusResult<T> = Result<T, NevusError>;

/// Transport-level failure kinds.
///
/// Lower-level backends (identity providers, remote stores) report the kind
/// of transport failure explicitly. Recovery code classifies on this enum
/// rather than scanning exception messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorKind {
    /// Name resolution failed
    Dns,
    /// Could not establish a connection in time
    ConnectTimeout,
    /// Connection established but the response never arrived
    ResponseTimeout,
    /// Remote endpoint refused the connection
    ConnectionRefused,
    /// Connection dropped mid-exchange
    ConnectionReset,
    /// Route to host unavailable
    HostUnreachable,
    /// Transfer interrupted by the platform
    Interrupted,
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NetworkErrorKind::Dns => "dns",
            NetworkErrorKind::ConnectTimeout => "connect timeout",
            NetworkErrorKind::ResponseTimeout => "response timeout",
            NetworkErrorKind::ConnectionRefused => "connection refused",
            NetworkErrorKind::ConnectionReset => "connection reset",
            NetworkErrorKind::HostUnreachable => "host unreachable",
            NetworkErrorKind::Interrupted => "interrupted",
        };
        write!(f, "{}", s)
    }
}

/// Main error type for the Nevus client
#[derive(Error, Debug, Clone)]
pub enum NevusError {
    /// Persistent key-value storage errors
    #[error("storage error: {message}")]
    Storage {
        message: String,
        context: Option<String>,
    },

    /// Keystore unavailable or key material errors
    #[error("keystore error: {message}")]
    Keystore {
        message: String,
        context: Option<String>,
    },

    /// Cipher failures (encryption, decryption, tampered data)
    #[error("crypto error: {message}")]
    Crypto { message: String },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        path: Option<String>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// Transport failures talking to a remote service
    #[error("network error ({kind}): {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    /// The identity provider rejected the user or credential
    #[error("authentication error: {message}")]
    Auth { message: String },

    /// Invalid input errors
    #[error("invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },

    /// Operation exceeded its deadline
    #[error("operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Operation was cancelled
    #[error("operation was cancelled")]
    Cancelled,

    /// Record cache errors
    #[error("cache error: {message}")]
    Cache { message: String },

    /// Resource not found
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Generic error
    #[error("error: {message}")]
    Other { message: String },
}

impl From<std::io::Error> for NevusError {
    fn from(err: std::io::Error) -> Self {
        NevusError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for NevusError {
    fn from(err: serde_json::Error) -> Self {
        NevusError::Json {
            message: err.to_string(),
        }
    }
}
