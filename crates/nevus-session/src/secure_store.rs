//! Secure token storage
//!
//! Durable, confidentiality-protected key-to-string storage with a degraded
//! fallback path. The keystore is probed once at construction; if its
//! self-test fails, writes go through [`ObfuscatedFallbackStore`] instead
//! and are tagged so retrieval knows how to reverse them.
//!
//! Failure never propagates to callers as an error: stores report `false`,
//! retrievals report `None`, and details go to the logs without the stored
//! value.

use crate::fallback::ObfuscatedFallbackStore;
use crate::keystore::Keystore;
use crate::redact;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use nevus_core::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Persisted envelope. The tag records which path wrote the value so
/// retrieval picks the matching reversal.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
enum StoredBlob {
    /// AEAD-sealed by the keystore: base64(nonce ‖ ciphertext+tag)
    Sealed { data: String },
    /// Obfuscated by the fallback path. Low-assurance.
    Obfuscated { data: String },
}

/// Key-to-string storage for credential material
pub struct SecureTokenStorage {
    store: Arc<dyn KeyValueStore>,
    keystore: Arc<dyn Keystore>,
    fallback: ObfuscatedFallbackStore,
    keystore_ok: bool,
}

impl SecureTokenStorage {
    /// Create storage over the given backends.
    ///
    /// Runs the keystore self-test once; a failure switches every
    /// subsequent write to the fallback path.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        keystore: Arc<dyn Keystore>,
        fallback: ObfuscatedFallbackStore,
    ) -> Self {
        let keystore_ok = keystore.self_test();
        if !keystore_ok {
            warn!("keystore self-test failed, falling back to obfuscated storage");
        }
        Self {
            store,
            keystore,
            fallback,
            keystore_ok,
        }
    }

    /// Whether writes are currently going through the degraded path
    pub fn is_fallback(&self) -> bool {
        !self.keystore_ok
    }

    /// Store a token under `key`. Returns false on any failure.
    ///
    /// The sealed path hands the write to the OS without waiting for a
    /// sync; the fallback path commits synchronously so a failing medium is
    /// detected immediately.
    pub async fn store_token(&self, key: &str, token: &str) -> bool {
        let blob = if self.keystore_ok {
            match self.keystore.seal(token.as_bytes()) {
                Ok(sealed) => StoredBlob::Sealed {
                    data: BASE64.encode(sealed),
                },
                Err(e) => {
                    warn!(key = %redact::tail4(key), "seal failed: {}", e);
                    return false;
                }
            }
        } else {
            StoredBlob::Obfuscated {
                data: self.fallback.obfuscate(token),
            }
        };

        let json = match serde_json::to_string(&blob) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %redact::tail4(key), "envelope serialization failed: {}", e);
                return false;
            }
        };

        let write = if self.keystore_ok {
            self.store.put_nosync(key, &json).await
        } else {
            self.store.put(key, &json).await
        };

        match write {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %redact::tail4(key), "token write failed: {}", e);
                false
            }
        }
    }

    /// Retrieve the token stored under `key`.
    ///
    /// Absent, undecodable, or tampered records all return `None`.
    pub async fn retrieve_token(&self, key: &str) -> Option<String> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %redact::tail4(key), "token read failed: {}", e);
                return None;
            }
        };

        let blob: StoredBlob = match serde_json::from_str(&raw) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(key = %redact::tail4(key), "unrecognized token envelope: {}", e);
                return None;
            }
        };

        match blob {
            StoredBlob::Sealed { data } => {
                let sealed = BASE64.decode(&data).ok()?;
                match self.keystore.open(&sealed) {
                    Ok(plaintext) => String::from_utf8(plaintext).ok(),
                    Err(e) => {
                        warn!(key = %redact::tail4(key), "unseal failed: {}", e);
                        None
                    }
                }
            }
            StoredBlob::Obfuscated { data } => {
                debug!(key = %redact::tail4(key), "reading low-assurance fallback record");
                self.fallback.deobfuscate(&data)
            }
        }
    }

    /// Delete the token stored under `key`. Idempotent; returns false only
    /// when the backend reports a failure.
    pub async fn delete_token(&self, key: &str) -> bool {
        match self.store.remove(key).await {
            Ok(_) => true,
            Err(e) => {
                warn!(key = %redact::tail4(key), "token delete failed: {}", e);
                false
            }
        }
    }

    /// Whether a record exists under `key`
    pub async fn token_exists(&self, key: &str) -> bool {
        self.store.contains(key).await.unwrap_or(false)
    }
}
