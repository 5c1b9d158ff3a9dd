//! Session manager
//!
//! Answers "is the current session usable" with minimum latency and
//! maximum resilience to network and storage failures, while keeping the
//! credential fresh.
//!
//! Lookup order: in-memory snapshot → persisted record through
//! [`SecureTokenStorage`] → remote verification with retries. Remote
//! failures degrade to offline access as long as the locally stored
//! credential has not expired.
//!
//! The manager is an explicitly constructed, dependency-injected service:
//! the composition root builds one and hands out clones (all internal state
//! is shared behind `Arc`). Concurrent checks from different callers may
//! each attempt a remote refresh; the operations are idempotent and no
//! single-flight deduplication is performed.

use crate::config::SessionConfig;
use crate::data::SessionData;
use crate::identity::IdentityProvider;
use crate::redact;
use crate::secure_store::SecureTokenStorage;
use chrono::Utc;
use nevus_core::error::{NevusError, NevusResult};
use nevus_core::recovery::{classify_error, ErrorClass, RetryPolicy, RetryResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Storage key for the combined credential record
const CREDENTIAL_KEY: &str = "session.credential";

/// The bearer token and the session snapshot persist as one record, so a
/// partial write cannot leave them disagreeing.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialRecord {
    id_token: String,
    session: SessionData,
}

/// Outcome of one session check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No persisted session exists
    NoSession,
    /// A recent verdict answered the check without any I/O
    CachedValid,
    /// The stored credential expired and could not be renewed
    LocallyExpired,
    /// The provider confirmed the session
    RemoteVerified,
    /// Verification could not complete but the local credential is unexpired
    OfflineValid,
    /// The provider rejected the session
    Denied,
    /// The persisted record was corrupt; cleanup has been scheduled
    Corrupted,
}

/// Outcome of a forced refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshOutcome {
    /// A new token was obtained and persisted
    Refreshed,
    /// The provider was unreachable; the unexpired session is kept
    OfflineKept,
    /// Could not renew; the session is left as it was
    Failed,
    /// The provider rejected the refresh; the session was cleared
    Rejected,
}

/// What a storage read produced
enum StoredState {
    Missing,
    Corrupted,
    Valid(SessionData),
}

#[derive(Default)]
struct ManagerState {
    /// Last loaded session and when it was loaded
    snapshot: Option<(SessionData, Instant)>,
    /// Last verification verdict and when it was produced
    verdict: Option<(bool, Instant)>,
    /// A corruption cleanup task is already pending
    cleanup_scheduled: bool,
}

/// Orchestrates session persistence, verification, and refresh
#[derive(Clone)]
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    storage: Arc<SecureTokenStorage>,
    config: SessionConfig,
    state: Arc<Mutex<ManagerState>>,
}

impl SessionManager {
    /// Create a manager over the given provider and credential storage
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        storage: SecureTokenStorage,
        config: SessionConfig,
    ) -> Self {
        Self {
            provider,
            storage: Arc::new(storage),
            config,
            state: Arc::new(Mutex::new(ManagerState::default())),
        }
    }

    /// Obtain a fresh credential for the signed-in user and persist it.
    ///
    /// Returns false if any step fails; nothing is partially committed
    /// because token and session metadata are a single record.
    pub async fn save_session(&self) -> bool {
        let user = match self.provider.current_user().await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!("save_session called with no signed-in user");
                return false;
            }
            Err(e) => {
                warn!("cannot read current user: {}", e);
                return false;
            }
        };

        let token = match self.fetch_token().await {
            RetryResult::Success(token) => token,
            RetryResult::Failed { error, attempts, .. } => {
                warn!(attempts, "token fetch failed: {}", error);
                return false;
            }
            RetryResult::Cancelled => return false,
        };

        let now = Utc::now();
        let session = SessionData {
            user_id: user.uid,
            email: user.email,
            display_name: user.display_name,
            token_expiry: now + self.token_lifetime(),
            last_refresh: now,
            auth_provider: user.provider,
        };

        if !session.is_valid() {
            warn!(
                user = %redact::tail4(&session.user_id),
                "refusing to persist a session that fails validation"
            );
            return false;
        }

        if !self.persist(&token.token, &session).await {
            return false;
        }

        info!(user = %redact::tail4(&session.user_id), "session saved");
        let mut state = self.state.lock().await;
        state.snapshot = Some((session, Instant::now()));
        state.verdict = Some((true, Instant::now()));
        true
    }

    /// The persisted session snapshot, if one exists and is well-formed.
    ///
    /// With `use_cache` the in-memory snapshot answers reads younger than
    /// the configured TTL. Corrupt records return `None` and schedule a
    /// debounced cleanup of the persisted state.
    pub async fn get_stored_session(&self, use_cache: bool) -> Option<SessionData> {
        match self.load_stored(use_cache).await {
            StoredState::Valid(session) => Some(session),
            _ => None,
        }
    }

    /// The raw bearer token for backend calls, if the stored session is
    /// well-formed and unexpired
    pub async fn stored_token(&self) -> Option<String> {
        let raw = self.storage.retrieve_token(CREDENTIAL_KEY).await?;
        let record: CredentialRecord = serde_json::from_str(&raw).ok()?;
        if record.session.is_valid() && !record.session.is_expired() {
            Some(record.id_token)
        } else {
            None
        }
    }

    /// Whether the current session is usable
    pub async fn is_session_valid(&self, fast_mode: bool) -> bool {
        matches!(
            self.session_status(fast_mode).await,
            SessionStatus::CachedValid | SessionStatus::RemoteVerified | SessionStatus::OfflineValid
        )
    }

    /// Run one session check and report which state it landed in.
    ///
    /// Fast mode prefers the cached verdict and the shorter deadline,
    /// trading strict freshness for responsiveness.
    pub async fn session_status(&self, fast_mode: bool) -> SessionStatus {
        if fast_mode {
            let state = self.state.lock().await;
            if let Some((ok, at)) = state.verdict {
                if at.elapsed() < self.config.snapshot_ttl {
                    debug!(ok, "answering session check from cached verdict");
                    return if ok {
                        SessionStatus::CachedValid
                    } else {
                        SessionStatus::Denied
                    };
                }
            }
        }

        let deadline = if fast_mode {
            self.config.verify_timeout_fast
        } else {
            self.config.verify_timeout
        };

        let stored = match timeout(deadline, self.load_stored(true)).await {
            Ok(stored) => stored,
            Err(_) => {
                warn!("stored-session load timed out");
                self.set_verdict(false).await;
                return SessionStatus::NoSession;
            }
        };

        let session = match stored {
            StoredState::Missing => {
                self.set_verdict(false).await;
                return SessionStatus::NoSession;
            }
            StoredState::Corrupted => {
                self.set_verdict(false).await;
                return SessionStatus::Corrupted;
            }
            StoredState::Valid(session) => session,
        };

        // Expired or about to expire: renew before answering
        let margin = chrono::Duration::from_std(self.config.refresh_margin)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        if session.is_expired() || session.expires_within(margin) {
            let status = match self.refresh_outcome().await {
                RefreshOutcome::Refreshed => SessionStatus::RemoteVerified,
                RefreshOutcome::OfflineKept => SessionStatus::OfflineValid,
                RefreshOutcome::Failed => SessionStatus::LocallyExpired,
                RefreshOutcome::Rejected => SessionStatus::Denied,
            };
            self.set_verdict(matches!(
                status,
                SessionStatus::RemoteVerified | SessionStatus::OfflineValid
            ))
            .await;
            return status;
        }

        let status = match timeout(deadline, self.verify_remote(&session)).await {
            Ok(Ok(true)) => SessionStatus::RemoteVerified,
            Ok(Ok(false)) => {
                warn!(
                    user = %redact::tail4(&session.user_id),
                    "provider no longer recognizes the stored user"
                );
                self.clear_session().await;
                SessionStatus::Denied
            }
            Ok(Err(error)) => {
                if classify_error(&error) == ErrorClass::Transient {
                    if session.is_expired() {
                        SessionStatus::LocallyExpired
                    } else {
                        debug!("provider unreachable, granting offline access: {}", error);
                        SessionStatus::OfflineValid
                    }
                } else {
                    warn!("session verification failed: {}", error);
                    self.clear_session().await;
                    SessionStatus::Denied
                }
            }
            Err(_) => {
                if session.is_expired() {
                    SessionStatus::Denied
                } else {
                    debug!("verification timed out, granting offline access");
                    SessionStatus::OfflineValid
                }
            }
        };

        self.set_verdict(matches!(
            status,
            SessionStatus::RemoteVerified | SessionStatus::OfflineValid
        ))
        .await;
        status
    }

    /// Force a new token from the provider and re-persist the session.
    ///
    /// When the provider is unreachable and the local credential has not
    /// expired, the session is kept and the refresh counts as a success.
    /// Provider rejection clears the session.
    pub async fn refresh_session(&self) -> bool {
        matches!(
            self.refresh_outcome().await,
            RefreshOutcome::Refreshed | RefreshOutcome::OfflineKept
        )
    }

    /// Delete the persisted record and reset all in-memory caches
    pub async fn clear_session(&self) -> bool {
        let deleted = self.storage.delete_token(CREDENTIAL_KEY).await;
        let mut state = self.state.lock().await;
        state.snapshot = None;
        state.verdict = None;
        state.cleanup_scheduled = false;
        debug!("session cleared");
        deleted
    }

    /// Warm the snapshot cache, bounded by the preload deadline.
    /// Best-effort: errors and timeouts are swallowed.
    pub async fn preload(&self) {
        match timeout(self.config.preload_timeout, self.load_stored(false)).await {
            Ok(StoredState::Valid(_)) => debug!("session snapshot warmed"),
            Ok(_) => debug!("no session to preload"),
            Err(_) => debug!("session preload timed out"),
        }
    }

    async fn fetch_token(&self) -> RetryResult<crate::identity::IdToken> {
        let policy = RetryPolicy::with_config(self.config.retry.clone());
        let provider = self.provider.clone();
        policy
            .execute(
                move || {
                    let provider = provider.clone();
                    async move { provider.id_token(true).await }
                },
                None,
            )
            .await
    }

    /// Ask the provider whether it still recognizes the stored user.
    /// Transient failures are retried; everything else surfaces directly.
    async fn verify_remote(&self, session: &SessionData) -> NevusResult<bool> {
        let policy = RetryPolicy::with_config(self.config.retry.clone());
        let provider = self.provider.clone();
        let result = policy
            .execute(
                move || {
                    let provider = provider.clone();
                    async move { provider.current_user().await }
                },
                None,
            )
            .await;

        match result {
            RetryResult::Success(Some(user)) => Ok(user.uid == session.user_id),
            RetryResult::Success(None) => Ok(false),
            RetryResult::Failed { error, .. } => Err(error),
            RetryResult::Cancelled => Err(NevusError::Cancelled),
        }
    }

    async fn refresh_outcome(&self) -> RefreshOutcome {
        let existing = match self.load_stored(false).await {
            StoredState::Valid(session) => Some(session),
            _ => None,
        };

        let result = self.fetch_token().await;

        match result {
            RetryResult::Success(token) => {
                let now = Utc::now();
                let new_expiry = now + self.token_lifetime();
                let session = match existing {
                    Some(previous) => previous.with_refreshed_token(new_expiry),
                    None => match self.provider.current_user().await {
                        Ok(Some(user)) => SessionData {
                            user_id: user.uid,
                            email: user.email,
                            display_name: user.display_name,
                            token_expiry: new_expiry,
                            last_refresh: now,
                            auth_provider: user.provider,
                        },
                        _ => {
                            warn!("token issued but no user to attach it to");
                            return RefreshOutcome::Failed;
                        }
                    },
                };

                if !session.is_valid() {
                    warn!("refreshed session fails validation, clearing");
                    self.clear_session().await;
                    return RefreshOutcome::Rejected;
                }

                if !self.persist(&token.token, &session).await {
                    return RefreshOutcome::Failed;
                }

                info!(user = %redact::tail4(&session.user_id), "session refreshed");
                let mut state = self.state.lock().await;
                state.snapshot = Some((session, Instant::now()));
                state.verdict = Some((true, Instant::now()));
                RefreshOutcome::Refreshed
            }
            RetryResult::Failed { error, attempts, .. } => {
                if classify_error(&error) == ErrorClass::Transient {
                    if existing.as_ref().is_some_and(|s| !s.is_expired()) {
                        debug!(
                            attempts,
                            "provider unreachable, keeping unexpired session: {}", error
                        );
                        RefreshOutcome::OfflineKept
                    } else {
                        warn!(attempts, "refresh failed over the network: {}", error);
                        RefreshOutcome::Failed
                    }
                } else {
                    warn!("refresh rejected by provider, clearing session: {}", error);
                    self.clear_session().await;
                    RefreshOutcome::Rejected
                }
            }
            RetryResult::Cancelled => RefreshOutcome::Failed,
        }
    }

    async fn load_stored(&self, use_cache: bool) -> StoredState {
        if use_cache {
            let state = self.state.lock().await;
            if let Some((session, at)) = &state.snapshot {
                if at.elapsed() < self.config.snapshot_ttl {
                    return StoredState::Valid(session.clone());
                }
            }
        }

        let raw = match self.storage.retrieve_token(CREDENTIAL_KEY).await {
            Some(raw) => raw,
            None => {
                // Undecryptable records also come back as None; an existing
                // key with no readable value is corruption, not absence.
                if self.storage.token_exists(CREDENTIAL_KEY).await {
                    self.schedule_corruption_cleanup().await;
                    return StoredState::Corrupted;
                }
                return StoredState::Missing;
            }
        };

        let record: CredentialRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!("persisted session is malformed: {}", e);
                self.schedule_corruption_cleanup().await;
                return StoredState::Corrupted;
            }
        };

        let session = record.session;
        if !session.is_valid() || self.timestamps_implausible(&session) {
            warn!(
                user = %redact::tail4(&session.user_id),
                "persisted session fails validation"
            );
            self.schedule_corruption_cleanup().await;
            return StoredState::Corrupted;
        }

        let mut state = self.state.lock().await;
        state.snapshot = Some((session.clone(), Instant::now()));
        StoredState::Valid(session)
    }

    /// Temporal-consistency checks beyond structural validation: a refresh
    /// instant in the future past clock-skew tolerance, or an expiry far
    /// beyond what the provider ever issues, marks the record corrupt.
    fn timestamps_implausible(&self, session: &SessionData) -> bool {
        let now = Utc::now();
        let skew = chrono::Duration::from_std(self.config.clock_skew_tolerance)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        if session.last_refresh > now + skew {
            return true;
        }
        session.token_expiry > now + self.token_lifetime() * 2
    }

    fn token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.token_lifetime)
            .unwrap_or_else(|_| chrono::Duration::hours(1))
    }

    async fn persist(&self, token: &str, session: &SessionData) -> bool {
        let record = CredentialRecord {
            id_token: token.to_string(),
            session: session.clone(),
        };
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                warn!("cannot serialize credential record: {}", e);
                return false;
            }
        };
        self.storage.store_token(CREDENTIAL_KEY, &json).await
    }

    async fn set_verdict(&self, ok: bool) {
        let mut state = self.state.lock().await;
        state.verdict = Some((ok, Instant::now()));
    }

    /// Debounced cleanup: repeated failed reads schedule one deletion, not
    /// one per read.
    async fn schedule_corruption_cleanup(&self) {
        {
            let mut state = self.state.lock().await;
            if state.cleanup_scheduled {
                return;
            }
            state.cleanup_scheduled = true;
        }

        warn!("persisted session is corrupt, scheduling cleanup");
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(manager.config.cleanup_delay).await;
            manager.storage.delete_token(CREDENTIAL_KEY).await;
            let mut state = manager.state.lock().await;
            state.snapshot = None;
            state.verdict = None;
            state.cleanup_scheduled = false;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AuthProvider;
    use crate::fallback::ObfuscatedFallbackStore;
    use crate::identity::{IdToken, IdentityUser};
    use crate::keystore::{Keystore, SoftwareKeystore};
    use async_trait::async_trait;
    use nevus_core::error::NetworkErrorKind;
    use nevus_core::recovery::RetryConfig;
    use nevus_core::storage::{KeyValueStore, MemoryKeyValueStore};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct FakeProvider {
        user: StdMutex<NevusResult<Option<IdentityUser>>>,
        token: StdMutex<NevusResult<IdToken>>,
        user_calls: AtomicU32,
        token_calls: AtomicU32,
    }

    impl FakeProvider {
        fn signed_in(uid: &str) -> Self {
            Self {
                user: StdMutex::new(Ok(Some(IdentityUser {
                    uid: uid.to_string(),
                    email: Some("a@b.co".to_string()),
                    display_name: Some("Pat".to_string()),
                    provider: AuthProvider::Password,
                }))),
                token: StdMutex::new(Ok(IdToken {
                    token: "tok-1".to_string(),
                    issued_at: Utc::now(),
                })),
                user_calls: AtomicU32::new(0),
                token_calls: AtomicU32::new(0),
            }
        }

        fn set_user(&self, result: NevusResult<Option<IdentityUser>>) {
            *self.user.lock().unwrap() = result;
        }

        fn set_token(&self, result: NevusResult<IdToken>) {
            *self.token.lock().unwrap() = result;
        }

        fn user_calls(&self) -> u32 {
            self.user_calls.load(Ordering::SeqCst)
        }

        fn token_calls(&self) -> u32 {
            self.token_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn current_user(&self) -> NevusResult<Option<IdentityUser>> {
            self.user_calls.fetch_add(1, Ordering::SeqCst);
            self.user.lock().unwrap().clone()
        }

        async fn id_token(&self, _force_refresh: bool) -> NevusResult<IdToken> {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            self.token.lock().unwrap().clone()
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig::default()
            .with_cleanup_delay(Duration::from_millis(20))
            .with_retry(
                RetryConfig::for_identity_provider().with_base_delay(Duration::from_millis(1)),
            )
    }

    struct Harness {
        manager: SessionManager,
        provider: Arc<FakeProvider>,
        kv: Arc<MemoryKeyValueStore>,
        keystore: Arc<SoftwareKeystore>,
    }

    impl Harness {
        fn new(provider: FakeProvider, config: SessionConfig) -> Self {
            let provider = Arc::new(provider);
            let kv: Arc<MemoryKeyValueStore> = Arc::new(MemoryKeyValueStore::new());
            let keystore = Arc::new(SoftwareKeystore::ephemeral());
            let storage = SecureTokenStorage::new(
                kv.clone(),
                keystore.clone() as Arc<dyn Keystore>,
                ObfuscatedFallbackStore::new([3u8; 16]),
            );
            let manager = SessionManager::new(provider.clone(), storage, config);
            Self {
                manager,
                provider,
                kv,
                keystore,
            }
        }

        /// A second storage handle over the same backends, for planting
        /// records behind the manager's back
        fn side_storage(&self) -> SecureTokenStorage {
            SecureTokenStorage::new(
                self.kv.clone(),
                self.keystore.clone() as Arc<dyn Keystore>,
                ObfuscatedFallbackStore::new([3u8; 16]),
            )
        }

        async fn plant_record(&self, record_json: &str) {
            assert!(
                self.side_storage()
                    .store_token(CREDENTIAL_KEY, record_json)
                    .await
            );
        }

        async fn plant_session(&self, session: &SessionData) {
            let record = CredentialRecord {
                id_token: "planted-token".to_string(),
                session: session.clone(),
            };
            self.plant_record(&serde_json::to_string(&record).unwrap())
                .await;
        }
    }

    fn session_expiring_in(minutes: i64) -> SessionData {
        let now = Utc::now();
        SessionData {
            user_id: "abc1234567890".to_string(),
            email: Some("a@b.co".to_string()),
            display_name: None,
            token_expiry: now + chrono::Duration::minutes(minutes),
            last_refresh: now - chrono::Duration::minutes(30),
            auth_provider: AuthProvider::Password,
        }
    }

    fn network_err() -> NevusError {
        NevusError::network(NetworkErrorKind::ResponseTimeout, "provider unreachable")
    }

    #[tokio::test]
    async fn save_then_validate() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());

        assert!(h.manager.save_session().await);
        assert!(h.manager.is_session_valid(false).await);

        let session = h.manager.get_stored_session(false).await.unwrap();
        assert_eq!(session.user_id, "abc1234567890");
        assert_eq!(session.auth_provider, AuthProvider::Password);
        assert!(!session.is_expired());

        assert_eq!(h.manager.stored_token().await.as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn no_session_is_invalid() {
        let h = Harness::new(FakeProvider::signed_in("u1"), test_config());
        assert_eq!(
            h.manager.session_status(false).await,
            SessionStatus::NoSession
        );
        assert!(!h.manager.is_session_valid(false).await);
    }

    #[tokio::test]
    async fn save_fails_when_signed_out() {
        let h = Harness::new(FakeProvider::signed_in("u1"), test_config());
        h.provider.set_user(Ok(None));
        assert!(!h.manager.save_session().await);
    }

    #[tokio::test]
    async fn offline_tolerance_with_unexpired_token() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        h.plant_session(&session_expiring_in(10)).await;

        // Every verification call times out at the transport level
        h.provider.set_user(Err(network_err()));

        assert_eq!(
            h.manager.session_status(false).await,
            SessionStatus::OfflineValid
        );
        assert!(h.manager.is_session_valid(false).await);
    }

    #[tokio::test]
    async fn network_verification_failure_is_retried() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        h.plant_session(&session_expiring_in(30)).await;
        h.provider.set_user(Err(network_err()));

        let before = h.provider.user_calls();
        let _ = h.manager.session_status(false).await;
        assert_eq!(h.provider.user_calls() - before, 3);
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried_and_deny() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        h.plant_session(&session_expiring_in(30)).await;
        h.provider.set_user(Err(NevusError::auth("account disabled")));

        let before = h.provider.user_calls();
        assert_eq!(h.manager.session_status(false).await, SessionStatus::Denied);
        assert_eq!(h.provider.user_calls() - before, 1);

        // Non-network failure invalidates the persisted session
        assert!(!h.manager.storage.token_exists(CREDENTIAL_KEY).await);
    }

    #[tokio::test]
    async fn provider_forgetting_user_clears_session() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        h.plant_session(&session_expiring_in(30)).await;
        h.provider.set_user(Ok(None));

        assert_eq!(h.manager.session_status(false).await, SessionStatus::Denied);
        assert!(!h.manager.storage.token_exists(CREDENTIAL_KEY).await);
        assert_eq!(
            h.manager.session_status(false).await,
            SessionStatus::NoSession
        );
    }

    #[tokio::test]
    async fn mismatched_user_id_denies() {
        let h = Harness::new(FakeProvider::signed_in("different-user"), test_config());
        h.plant_session(&session_expiring_in(30)).await;

        assert_eq!(h.manager.session_status(false).await, SessionStatus::Denied);
    }

    #[tokio::test]
    async fn refresh_retries_exactly_three_times_then_fails() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        h.plant_session(&session_expiring_in(-5)).await;
        h.provider.set_token(Err(network_err()));

        assert!(!h.manager.refresh_session().await);
        assert_eq!(h.provider.token_calls(), 3);
        // Network failure does not destroy the stored record
        assert!(h.manager.storage.token_exists(CREDENTIAL_KEY).await);
    }

    #[tokio::test]
    async fn refresh_keeps_unexpired_session_when_offline() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        h.plant_session(&session_expiring_in(10)).await;
        h.provider.set_token(Err(network_err()));

        assert!(h.manager.refresh_session().await);
    }

    #[tokio::test]
    async fn refresh_rejection_clears_session() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        h.plant_session(&session_expiring_in(10)).await;
        h.provider.set_token(Err(NevusError::auth("revoked")));

        assert!(!h.manager.refresh_session().await);
        assert!(!h.manager.storage.token_exists(CREDENTIAL_KEY).await);
    }

    #[tokio::test]
    async fn refresh_extends_expiry_and_preserves_identity() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        let planted = session_expiring_in(2);
        h.plant_session(&planted).await;

        assert!(h.manager.refresh_session().await);
        let refreshed = h.manager.get_stored_session(false).await.unwrap();
        assert!(refreshed.token_expiry > planted.token_expiry);
        assert!(refreshed.last_refresh >= planted.last_refresh);
        assert_eq!(refreshed.user_id, planted.user_id);
    }

    #[tokio::test]
    async fn expiring_session_triggers_proactive_refresh() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        // Inside the 5 minute refresh margin
        h.plant_session(&session_expiring_in(2)).await;

        assert_eq!(
            h.manager.session_status(false).await,
            SessionStatus::RemoteVerified
        );
        assert!(h.provider.token_calls() >= 1);
    }

    #[tokio::test]
    async fn corrupt_record_is_cleaned_up_after_delay() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());

        // Valid JSON, but the session is missing its provider tag
        let now = Utc::now();
        let bad = format!(
            r#"{{"id_token":"tok","session":{{"user_id":"abc","token_expiry":"{}","last_refresh":"{}"}}}}"#,
            (now + chrono::Duration::hours(1)).to_rfc3339(),
            now.to_rfc3339(),
        );
        h.plant_record(&bad).await;

        assert_eq!(h.manager.get_stored_session(false).await, None);
        assert!(h.manager.storage.token_exists(CREDENTIAL_KEY).await);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!h.manager.storage.token_exists(CREDENTIAL_KEY).await);
    }

    #[tokio::test]
    async fn undecryptable_record_counts_as_corruption() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        h.kv
            .put(CREDENTIAL_KEY, r#"{"mode":"sealed","data":"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"}"#)
            .await
            .unwrap();

        assert_eq!(h.manager.get_stored_session(false).await, None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!h.manager.storage.token_exists(CREDENTIAL_KEY).await);
    }

    #[tokio::test]
    async fn future_last_refresh_is_corruption() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        let now = Utc::now();
        let mut session = session_expiring_in(30);
        session.last_refresh = now + chrono::Duration::minutes(10);
        session.token_expiry = now + chrono::Duration::minutes(20);
        h.plant_session(&session).await;

        assert_eq!(h.manager.get_stored_session(false).await, None);
    }

    #[tokio::test]
    async fn absurd_expiry_is_corruption() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        let mut session = session_expiring_in(30);
        session.token_expiry = Utc::now() + chrono::Duration::days(30);
        h.plant_session(&session).await;

        assert_eq!(h.manager.get_stored_session(false).await, None);
    }

    #[tokio::test]
    async fn snapshot_cache_answers_within_ttl() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        h.plant_session(&session_expiring_in(30)).await;

        // Populate the snapshot cache
        let first = h.manager.get_stored_session(false).await.unwrap();
        assert_eq!(first.user_id, "abc1234567890");

        // Change the record behind the manager's back
        let mut other = session_expiring_in(30);
        other.user_id = "zzz9876543210".to_string();
        h.plant_session(&other).await;

        // Cached read still sees the old snapshot; bypassing sees the new
        let cached = h.manager.get_stored_session(true).await.unwrap();
        assert_eq!(cached.user_id, "abc1234567890");
        let fresh = h.manager.get_stored_session(false).await.unwrap();
        assert_eq!(fresh.user_id, "zzz9876543210");
    }

    #[tokio::test]
    async fn fast_mode_reuses_cached_verdict() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        h.plant_session(&session_expiring_in(30)).await;

        assert!(h.manager.is_session_valid(false).await);
        let before = h.provider.user_calls();

        // The provider now rejects, but the cached verdict answers fast mode
        h.provider.set_user(Err(NevusError::auth("revoked")));
        assert!(h.manager.is_session_valid(true).await);
        assert_eq!(h.provider.user_calls(), before);
    }

    #[tokio::test]
    async fn clear_session_resets_everything() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        assert!(h.manager.save_session().await);
        assert!(h.manager.clear_session().await);

        assert!(!h.manager.storage.token_exists(CREDENTIAL_KEY).await);
        assert_eq!(h.manager.get_stored_session(true).await, None);
        assert!(!h.manager.is_session_valid(false).await);
        assert_eq!(h.manager.stored_token().await, None);
    }

    #[tokio::test]
    async fn preload_warms_the_snapshot() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        h.plant_session(&session_expiring_in(30)).await;

        h.manager.preload().await;

        let state = h.manager.state.lock().await;
        assert!(state.snapshot.is_some());
    }

    #[tokio::test]
    async fn expired_token_is_not_served() {
        let h = Harness::new(FakeProvider::signed_in("abc1234567890"), test_config());
        h.plant_session(&session_expiring_in(-5)).await;
        assert_eq!(h.manager.stored_token().await, None);
    }
}
