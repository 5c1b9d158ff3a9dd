//! Session data structures
//!
//! `SessionData` is the locally cached record asserting which user is
//! authenticated and until when their credential remains valid. It is an
//! immutable value object: refresh produces a new instance, never a
//! mutation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Longest plausible platform user identifier
const MAX_USER_ID_LEN: usize = 128;

/// Timestamps further than this from the current instant are corrupt
const MAX_TIMESTAMP_DRIFT_DAYS: i64 = 365;

/// Sessions expiring within this margin are refreshed proactively
pub fn expiry_margin() -> Duration {
    Duration::minutes(5)
}

/// Identity provider that authenticated the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthProvider {
    /// Email and password
    #[serde(rename = "password")]
    Password,
    /// Google federated sign-in
    #[serde(rename = "google.com")]
    Google,
    /// Apple federated sign-in
    #[serde(rename = "apple.com")]
    Apple,
    /// Anonymous guest account
    #[serde(rename = "anonymous")]
    Anonymous,
}

impl AuthProvider {
    /// The provider tag as stored on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Password => "password",
            AuthProvider::Google => "google.com",
            AuthProvider::Apple => "apple.com",
            AuthProvider::Anonymous => "anonymous",
        }
    }
}

impl std::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated snapshot of the authenticated session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Stable platform identifier for the user
    pub user_id: String,

    /// Account email, when the provider exposes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Display name, when the provider exposes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Absolute expiry instant of the cached credential
    pub token_expiry: DateTime<Utc>,

    /// Instant the credential was last obtained or renewed
    pub last_refresh: DateTime<Utc>,

    /// Which provider authenticated the user
    pub auth_provider: AuthProvider,
}

impl SessionData {
    /// Structural and temporal validation.
    ///
    /// Deserialization success does not imply validity; callers must run
    /// this before trusting a loaded snapshot. Never panics.
    pub fn is_valid(&self) -> bool {
        if self.user_id.trim().is_empty() || self.user_id.len() > MAX_USER_ID_LEN {
            return false;
        }

        if self.last_refresh > self.token_expiry {
            return false;
        }

        let now = Utc::now();
        let drift = Duration::days(MAX_TIMESTAMP_DRIFT_DAYS);
        if (now - self.last_refresh).abs() > drift || (now - self.token_expiry).abs() > drift {
            return false;
        }

        if let Some(email) = &self.email {
            if !looks_like_email(email) {
                return false;
            }
        }

        true
    }

    /// Whether the credential has reached its expiry instant
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.token_expiry
    }

    /// Whether the credential expires within the standard margin
    pub fn will_expire_soon(&self) -> bool {
        self.expires_within(expiry_margin())
    }

    /// Whether the credential expires within the given margin
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.token_expiry - Utc::now() <= margin
    }

    /// Produce the successor snapshot after a token refresh.
    ///
    /// The original instance is untouched.
    pub fn with_refreshed_token(&self, new_expiry: DateTime<Utc>) -> SessionData {
        SessionData {
            token_expiry: new_expiry,
            last_refresh: Utc::now(),
            ..self.clone()
        }
    }

    /// Serialize to JSON. Returns `None` if serialization fails, which
    /// should not happen for a valid snapshot.
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!("failed to serialize session data: {}", e);
                None
            }
        }
    }

    /// Deserialize from JSON. Returns `None` on malformed input, including
    /// unknown provider tags. Never panics.
    pub fn from_json(json: &str) -> Option<SessionData> {
        serde_json::from_str(json).ok()
    }
}

/// Minimal structural email check: one `@`, non-empty local part, and a
/// domain containing a dot with non-empty labels around it.
fn looks_like_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}
