//! rust-jwks: lifecycle management for JWT signing and encryption keys
//!
//! This crate generates algorithm-appropriate key material, decides which key
//! is current, persists full private parameters losslessly as JWK records and
//! serves the current credentials plus a public JSON Web Key Set.
//!
//! ```no_run
//! use rust_jwks::{service::KeySetService, storage::MemoryStore, KeyUse};
//!
//! # fn main() -> rust_jwks::Result<()> {
//! let service = KeySetService::new(MemoryStore::new());
//! let signing = service.current_signing_credentials(None)?;
//! let signature = signing.sign(b"header.payload")?;
//! assert!(signing.verify(b"header.payload", &signature)?);
//!
//! let jwks = service.last_public_keys(KeyUse::Signing, 2)?;
//! println!("{}", serde_json::to_string(&jwks).unwrap());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

pub mod algorithm;
pub mod audit;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod jwk;
pub mod key;
pub mod service;
pub mod storage;

pub use algorithm::{Algorithm, ContentEncryption, Curve, KeyType};
pub use config::KeySetOptions;
pub use credentials::{EncryptingCredential, SigningCredential};
pub use error::{Error, Result};
pub use jwk::{Jwk, JwkSet, KeyRecord};
pub use service::KeySetService;
pub use storage::KeyStore;

/// Number of random bytes behind a generated key id.
pub const KEY_ID_BYTES: usize = 16;

/// A unique, opaque identifier for a key (the JWK `kid`).
///
/// Ordering is plain lexicographic ordering of the encoded string, which is
/// what the stores use to break ties between records created at the same
/// instant.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Generates a new random KeyId from the system entropy source.
    pub fn generate() -> Result<Self> {
        use rand_chacha::ChaCha20Rng;
        use rand_core::SeedableRng;

        let mut rng = ChaCha20Rng::from_entropy();
        Self::generate_with(&mut rng)
    }

    /// Generates a new KeyId using the supplied secure RNG.
    pub fn generate_with<R: crypto::SecureRandom>(rng: &mut R) -> Result<Self> {
        let mut bytes = [0u8; KEY_ID_BYTES];
        rng.fill_secure_bytes(&mut bytes)?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Wrap an existing identifier, e.g. one read back from storage.
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Which logical key slot a key belongs to.
///
/// Signing and encryption slots rotate independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyUse {
    /// Keys used to sign tokens (JWK `use` = `sig`).
    #[serde(rename = "sig")]
    Signing,
    /// Keys used to encrypt tokens (JWK `use` = `enc`).
    #[serde(rename = "enc")]
    Encryption,
}

impl KeyUse {
    /// The JWK `use` parameter value.
    pub const fn as_jwk_use(&self) -> &'static str {
        match self {
            Self::Signing => "sig",
            Self::Encryption => "enc",
        }
    }
}

impl fmt::Display for KeyUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_jwk_use())
    }
}

/// Metadata about a stored key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    /// Unique identifier for the key
    pub id: KeyId,
    /// Algorithm this key was generated for
    pub algorithm: Algorithm,
    /// Signing or encryption slot
    pub key_use: KeyUse,
    /// When this key was created
    pub created_at: SystemTime,
    /// When this key stops being eligible as the current key
    pub expires_at: SystemTime,
}

impl KeyMetadata {
    /// Check if this key has expired at the given instant
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_key_id_is_url_safe_and_unique() {
        let a = KeyId::generate().unwrap();
        let b = KeyId::generate().unwrap();
        assert_ne!(a, b);
        // 16 bytes -> 22 base64url characters without padding
        assert_eq!(a.as_str().len(), 22);
        assert!(a
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_key_id_ordering_is_lexicographic() {
        assert!(KeyId::from("b") > KeyId::from("a"));
        assert!(KeyId::from("ab") > KeyId::from("a"));
    }

    #[test]
    fn test_metadata_expiry_boundary() {
        let created_at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let metadata = KeyMetadata {
            id: KeyId::from("kid"),
            algorithm: Algorithm::HS256,
            key_use: KeyUse::Signing,
            created_at,
            expires_at: created_at + Duration::from_secs(60),
        };
        assert!(!metadata.is_expired_at(created_at));
        assert!(metadata.is_expired_at(created_at + Duration::from_secs(60)));
    }

    #[test]
    fn test_key_use_serializes_as_jwk_use() {
        assert_eq!(serde_json::to_string(&KeyUse::Signing).unwrap(), "\"sig\"");
        assert_eq!(serde_json::to_string(&KeyUse::Encryption).unwrap(), "\"enc\"");
    }
}
