//! Device keystore
//!
//! Authenticated encryption for small credential blobs. The keystore is an
//! opaque capability that may be unavailable or broken on a given device,
//! so callers probe it with [`Keystore::self_test`] rather than trusting
//! static capability flags.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use nevus_core::error::{NevusError, NevusResult};
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::Path;
use tracing::warn;

/// 256-bit key
pub const KEY_LEN: usize = 32;
/// 96-bit nonce, fresh per seal
pub const NONCE_LEN: usize = 12;
/// 128-bit authentication tag appended by the cipher
pub const TAG_LEN: usize = 16;

const PROBE: &[u8] = b"nevus-keystore-probe";
const KEY_FILE: &str = "keystore.key";

/// Device-protected authenticated encryption for credential blobs.
///
/// `seal` output is `nonce ‖ ciphertext+tag`; `open` reverses it and fails
/// on any tampering. Error messages never contain plaintext.
pub trait Keystore: Send + Sync {
    /// Encrypt a plaintext blob
    fn seal(&self, plaintext: &[u8]) -> NevusResult<Vec<u8>>;

    /// Decrypt a sealed blob
    fn open(&self, blob: &[u8]) -> NevusResult<Vec<u8>>;

    /// Round-trip a probe value to verify the keystore actually works
    fn self_test(&self) -> bool {
        match self.seal(PROBE) {
            Ok(sealed) => match self.open(&sealed) {
                Ok(opened) => opened == PROBE,
                Err(_) => false,
            },
            Err(_) => false,
        }
    }
}

/// ChaCha20-Poly1305 keystore with a device-local key file.
///
/// Stands in for a hardware-backed key service: the key is generated once
/// and persisted with owner-only permissions next to the credential store.
pub struct SoftwareKeystore {
    cipher: ChaCha20Poly1305,
}

impl SoftwareKeystore {
    /// Create a keystore from raw key material
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        }
    }

    /// Create a keystore with a fresh random key (not persisted)
    pub fn ephemeral() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// Load the key file under `dir`, generating it on first use
    pub fn load_or_generate(dir: &Path) -> NevusResult<Self> {
        let path = dir.join(KEY_FILE);

        match std::fs::read(&path) {
            Ok(bytes) if bytes.len() == KEY_LEN => {
                let mut key = [0u8; KEY_LEN];
                key.copy_from_slice(&bytes);
                Ok(Self::new(key))
            }
            Ok(_) => {
                warn!("keystore key file has unexpected length, regenerating");
                Self::generate_at(&path)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::generate_at(&path),
            Err(e) => Err(NevusError::keystore(format!(
                "cannot read key file: {}",
                e
            ))),
        }
    }

    fn generate_at(path: &Path) -> NevusResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| NevusError::keystore(format!("cannot create key dir: {}", e)))?;
        }

        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);

        std::fs::write(path, key)
            .map_err(|e| NevusError::keystore(format!("cannot persist key: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path, perms) {
                warn!("failed to restrict key file permissions: {}", e);
            }
        }

        Ok(Self::new(key))
    }
}

impl Keystore for SoftwareKeystore {
    fn seal(&self, plaintext: &[u8]) -> NevusResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| NevusError::crypto("encryption failed"))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn open(&self, blob: &[u8]) -> NevusResult<Vec<u8>> {
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(NevusError::crypto("sealed blob too short"));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| NevusError::crypto("decryption failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn seal_open_round_trip() {
        let keystore = SoftwareKeystore::ephemeral();
        for plaintext in [
            &b""[..],
            b"token-value",
            b"\x00\xff\x7f\x80high entropy\x01\x02",
        ] {
            let sealed = keystore.seal(plaintext).unwrap();
            assert_eq!(keystore.open(&sealed).unwrap(), plaintext);
        }
    }

    #[test]
    fn nonces_are_fresh_per_seal() {
        let keystore = SoftwareKeystore::ephemeral();
        let a = keystore.seal(b"same input").unwrap();
        let b = keystore.seal(b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_blob_fails_to_open() {
        let keystore = SoftwareKeystore::ephemeral();
        let mut sealed = keystore.seal(b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(keystore.open(&sealed).is_err());
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let sealed = SoftwareKeystore::ephemeral().seal(b"secret").unwrap();
        let other = SoftwareKeystore::ephemeral();
        assert!(other.open(&sealed).is_err());
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let keystore = SoftwareKeystore::ephemeral();
        assert!(keystore.open(b"short").is_err());
    }

    #[test]
    fn self_test_passes_for_working_keystore() {
        assert!(SoftwareKeystore::ephemeral().self_test());
    }

    #[test]
    fn key_persists_across_loads() {
        let dir = TempDir::new().unwrap();
        let first = SoftwareKeystore::load_or_generate(dir.path()).unwrap();
        let sealed = first.seal(b"persisted").unwrap();

        let second = SoftwareKeystore::load_or_generate(dir.path()).unwrap();
        assert_eq!(second.open(&sealed).unwrap(), b"persisted");
    }
}
