//! Obfuscated fallback storage
//!
//! Used when the device keystore fails its self-test. This is reversible
//! XOR obfuscation, NOT encryption: anyone with the salt (stored next to
//! the data) can recover the plaintext. It only keeps tokens from being
//! casually readable in a file listing. Callers must treat anything stored
//! through this path as low-assurance.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::warn;

const SALT_LEN: usize = 16;
const SALT_FILE: &str = "fallback.salt";

/// Reversible obfuscation for the degraded storage path.
///
/// Provides no confidentiality guarantee.
pub struct ObfuscatedFallbackStore {
    salt: [u8; SALT_LEN],
}

impl ObfuscatedFallbackStore {
    /// Create a store with explicit salt material
    pub fn new(salt: [u8; SALT_LEN]) -> Self {
        Self { salt }
    }

    /// Load the device-local salt under `dir`, generating it on first use.
    /// Falls back to a process-local random salt if the directory is not
    /// writable (previously stored values become unreadable, which is the
    /// acceptable failure mode for a best-effort path).
    pub fn load_or_generate(dir: &Path) -> Self {
        let path = dir.join(SALT_FILE);

        if let Ok(bytes) = std::fs::read(&path) {
            if bytes.len() == SALT_LEN {
                let mut salt = [0u8; SALT_LEN];
                salt.copy_from_slice(&bytes);
                return Self::new(salt);
            }
        }

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        if let Err(e) = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, salt)) {
            warn!("cannot persist fallback salt, using process-local salt: {}", e);
        }
        Self::new(salt)
    }

    /// Obfuscate a token for storage
    pub fn obfuscate(&self, plaintext: &str) -> String {
        let masked = self.apply_keystream(plaintext.as_bytes());
        BASE64.encode(masked)
    }

    /// Reverse [`obfuscate`](Self::obfuscate). Returns `None` for undecodable
    /// input or a salt mismatch.
    pub fn deobfuscate(&self, encoded: &str) -> Option<String> {
        let masked = BASE64.decode(encoded).ok()?;
        let bytes = self.apply_keystream(&masked);
        String::from_utf8(bytes).ok()
    }

    /// XOR against SHA-256 keystream blocks derived from the salt.
    /// Symmetric: applying it twice restores the input.
    fn apply_keystream(&self, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(input.len());
        for (block_index, chunk) in input.chunks(32).enumerate() {
            let mut hasher = Sha256::new();
            hasher.update(self.salt);
            hasher.update((block_index as u64).to_le_bytes());
            let block = hasher.finalize();
            for (byte, mask) in chunk.iter().zip(block.iter()) {
                out.push(byte ^ mask);
            }
        }
        out
    }
}
