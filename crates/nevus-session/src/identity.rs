//! Identity provider abstraction
//!
//! The remote service that authenticates users and issues short-lived
//! bearer tokens. Implementations wrap the vendor SDK; this crate only
//! depends on the seam below.
//!
//! Token lifetime is not signaled by the provider. The session manager
//! computes the absolute expiry client-side from its configured lifetime.

use crate::data::AuthProvider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nevus_core::error::NevusResult;

/// The authenticated user as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityUser {
    /// Stable platform identifier
    pub uid: String,
    /// Account email, if exposed
    pub email: Option<String>,
    /// Display name, if exposed
    pub display_name: Option<String>,
    /// Provider that authenticated this user
    pub provider: AuthProvider,
}

/// A freshly issued bearer token
#[derive(Clone)]
pub struct IdToken {
    /// Opaque credential proving authentication to backend calls
    pub token: String,
    /// When the provider issued it
    pub issued_at: DateTime<Utc>,
}

impl std::fmt::Debug for IdToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Token material must not reach logs
        f.debug_struct("IdToken")
            .field("token", &"[redacted]")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Remote identity provider seam.
///
/// Implementations report transport failures as
/// [`NevusError::Network`](nevus_core::NevusError::Network) with an explicit
/// kind, and provider rejection as [`NevusError::Auth`](nevus_core::NevusError::Auth).
/// Retry classification keys on those variants.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The currently signed-in user, or `None` when signed out
    async fn current_user(&self) -> NevusResult<Option<IdentityUser>>;

    /// Obtain a bearer token for the current user.
    ///
    /// `force_refresh` bypasses any provider-side token cache.
    async fn id_token(&self, force_refresh: bool) -> NevusResult<IdToken>;
}
