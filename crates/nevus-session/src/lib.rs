//! Session and credential management for the Nevus client
//!
//! This crate provides the client-side session subsystem:
//! - `SessionData`: validated, serializable session snapshots
//! - `SecureTokenStorage`: keystore-sealed credential storage with a
//!   clearly labeled non-secure fallback
//! - `IdentityProvider`: the seam to the remote identity service
//! - `SessionManager`: the orchestrator answering "is this session usable"
//!   with offline tolerance, retries, and corruption recovery

pub mod config;
pub mod data;
pub mod fallback;
pub mod identity;
pub mod keystore;
pub mod manager;
pub mod redact;
pub mod secure_store;

pub use config::{NevusConfig, SessionConfig};
pub use data::{AuthProvider, SessionData};
pub use fallback::ObfuscatedFallbackStore;
pub use identity::{IdToken, IdentityProvider, IdentityUser};
pub use keystore::{Keystore, SoftwareKeystore};
pub use manager::{SessionManager, SessionStatus};
pub use secure_store::SecureTokenStorage;
