//! Key generation and storage encryption primitives.
//!
//! This module provides:
//! - [`SecureRandom`], the bound every generator places on its entropy source
//! - [`KeyMaterialFactory`], which turns a catalog [`Algorithm`] into fresh key
//!   material plus a unique key id
//! - [`RuntimeAead`] and [`StorageKey`], used by the file store to seal private
//!   key parameters at rest
//!
//! # Examples
//!
//! ```
//! use rust_jwks::crypto::KeyMaterialFactory;
//! use rust_jwks::Algorithm;
//!
//! # fn main() -> rust_jwks::Result<()> {
//! let factory = KeyMaterialFactory::default();
//! let generated = factory.generate(Algorithm::HS256)?;
//! assert_eq!(generated.algorithm, Algorithm::HS256);
//! # Ok(())
//! # }
//! ```
//!
//! # Key Generation
//!
//! All generation uses ChaCha20Rng seeded from system entropy unless the
//! caller supplies its own [`SecureRandom`]. A non-cryptographic RNG cannot be
//! passed in: the bound requires [`CryptoRng`].

use crate::algorithm::{Algorithm, Curve};
use crate::key::{KeyMaterial, SecretKey};
use crate::{Error, KeyId, Result};
use aead::{generic_array::GenericArray, Aead, KeyInit, Payload};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;
use rand_chacha::ChaCha20Rng;
use rand_core::{CryptoRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Trait for cryptographically secure random number generators.
///
/// # Examples
///
/// ```
/// use rust_jwks::crypto::SecureRandom;
/// use rand_chacha::ChaCha20Rng;
/// use rand_core::SeedableRng;
///
/// let mut rng = ChaCha20Rng::from_entropy();
/// let mut buffer = [0u8; 32];
/// rng.fill_secure_bytes(&mut buffer).unwrap();
/// assert_ne!(buffer, [0u8; 32]);
/// ```
pub trait SecureRandom: RngCore + CryptoRng {
    /// Fill a buffer with cryptographically secure random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientEntropy`] if the RNG cannot produce output.
    fn fill_secure_bytes(&mut self, dest: &mut [u8]) -> Result<()> {
        self.try_fill_bytes(dest).map_err(|_| Error::InsufficientEntropy {
            operation: "fill_secure_bytes".to_string(),
        })
    }
}

/// Blanket implementation for any crypto RNG
impl<T> SecureRandom for T where T: RngCore + CryptoRng {}

/// Parameters for key generation
#[derive(Debug, Clone, Copy)]
pub struct KeyGenParams {
    /// Algorithm to generate the key for
    pub algorithm: Algorithm,
    /// RSA modulus size override in bits
    pub key_size: Option<usize>,
}

impl From<Algorithm> for KeyGenParams {
    fn from(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            key_size: None,
        }
    }
}

/// Trait for cryptographic key generation.
pub trait KeyGenerator {
    /// The type of key this generator produces
    type Key;

    /// Generate a new key with specific parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid or key generation fails.
    fn generate_with_params<R: SecureRandom>(
        &self,
        rng: &mut R,
        params: KeyGenParams,
    ) -> Result<Self::Key>;
}

/// Freshly generated key material with its assigned id.
///
/// Nothing is persisted yet; storing it is the caller's job.
#[derive(Clone, Debug)]
pub struct GeneratedKey {
    /// Unique key id
    pub key_id: KeyId,
    /// Algorithm the key was generated for
    pub algorithm: Algorithm,
    /// The private key material
    pub material: KeyMaterial,
}

/// Generates algorithm-appropriate key material.
#[derive(Debug, Clone, Copy)]
pub struct KeyMaterialFactory {
    rsa_key_size: usize,
}

impl KeyMaterialFactory {
    /// Smallest RSA modulus the factory will produce
    pub const MIN_RSA_KEY_SIZE: usize = 2048;
    /// Largest RSA modulus accepted; the `rsa` crate reads no larger public key
    pub const MAX_RSA_KEY_SIZE: usize = 4096;
    /// RSA modulus size used when none is configured
    pub const DEFAULT_RSA_KEY_SIZE: usize = 2048;

    /// Create a factory producing RSA keys of `rsa_key_size` bits
    ///
    /// # Errors
    /// [`Error::WeakKeyRequested`] if the size is below 2048 bits,
    /// [`Error::ConfigurationError`] if it is above 4096 bits.
    pub fn new(rsa_key_size: usize) -> Result<Self> {
        check_rsa_size(rsa_key_size)?;
        Ok(Self { rsa_key_size })
    }

    /// Configured RSA modulus size in bits
    pub fn rsa_key_size(&self) -> usize {
        self.rsa_key_size
    }

    /// Generate key material for `algorithm` using system entropy
    pub fn generate(&self, algorithm: Algorithm) -> Result<GeneratedKey> {
        let mut rng = ChaCha20Rng::from_entropy();
        self.generate_with_params(&mut rng, algorithm.into())
    }

    /// Generate an ECDSA key for a JWK curve name such as `"P-256"`
    ///
    /// # Errors
    /// [`Error::UnsupportedCurve`] for any other curve name.
    pub fn generate_ecdsa<R: SecureRandom>(&self, rng: &mut R, crv: &str) -> Result<GeneratedKey> {
        let curve = Curve::from_crv(crv)?;
        self.generate_with_params(rng, Algorithm::Ecdsa(curve).into())
    }
}

impl Default for KeyMaterialFactory {
    fn default() -> Self {
        Self {
            rsa_key_size: Self::DEFAULT_RSA_KEY_SIZE,
        }
    }
}

impl KeyGenerator for KeyMaterialFactory {
    type Key = GeneratedKey;

    fn generate_with_params<R: SecureRandom>(
        &self,
        rng: &mut R,
        params: KeyGenParams,
    ) -> Result<GeneratedKey> {
        let algorithm = params.algorithm;
        let material = match algorithm {
            Algorithm::Rsa(..) => {
                let bits = params.key_size.unwrap_or(self.rsa_key_size);
                check_rsa_size(bits)?;
                let key = rsa::RsaPrivateKey::new(rng, bits)
                    .map_err(|e| Error::crypto("rsa_generate", e.to_string()))?;
                KeyMaterial::Rsa(key)
            }
            Algorithm::Ecdsa(Curve::P256) => KeyMaterial::EcP256(p256::SecretKey::random(rng)),
            Algorithm::Ecdsa(Curve::P384) => KeyMaterial::EcP384(p384::SecretKey::random(rng)),
            Algorithm::Ecdsa(Curve::P521) => KeyMaterial::EcP521(p521::SecretKey::random(rng)),
            Algorithm::Hmac(_) | Algorithm::AesKeyWrap(_) => {
                let len = algorithm.secret_len().ok_or_else(|| {
                    Error::unsupported_algorithm(algorithm.id(), "no secret size defined")
                })?;
                let mut buf = vec![0u8; len];
                rng.fill_secure_bytes(&mut buf)?;
                KeyMaterial::Symmetric(SecretKey::from_bytes(buf, algorithm)?)
            }
        };
        let key_id = KeyId::generate_with(rng)?;

        Ok(GeneratedKey {
            key_id,
            algorithm,
            material,
        })
    }
}

pub(crate) fn check_rsa_size(bits: usize) -> Result<()> {
    if bits < KeyMaterialFactory::MIN_RSA_KEY_SIZE {
        return Err(Error::WeakKeyRequested {
            requested: bits,
            minimum: KeyMaterialFactory::MIN_RSA_KEY_SIZE,
        });
    }
    if bits > KeyMaterialFactory::MAX_RSA_KEY_SIZE {
        return Err(Error::ConfigurationError {
            message: format!(
                "RSA key size {} exceeds the {}-bit maximum",
                bits,
                KeyMaterialFactory::MAX_RSA_KEY_SIZE
            ),
        });
    }
    Ok(())
}

/// AEAD cipher protecting private key parameters at rest
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageCipher {
    /// ChaCha20-Poly1305 with 12-byte nonces
    ChaCha20Poly1305,
    /// AES-256-GCM with 12-byte nonces
    Aes256Gcm,
}

impl StorageCipher {
    /// Nonce size in bytes
    pub const fn nonce_size(&self) -> usize {
        12
    }
}

impl Default for StorageCipher {
    fn default() -> Self {
        Self::ChaCha20Poly1305
    }
}

/// Argon2id cost parameters for password-derived storage keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Params {
    /// Memory size in KiB
    pub memory_kib: u32,
    /// Number of iterations
    pub time_cost: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 65536, // 64 MiB
            time_cost: 4,
            parallelism: 4,
        }
    }
}

/// 256-bit key encrypting private parameters at rest, zeroed on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StorageKey([u8; 32]);

impl StorageKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a random storage key
    pub fn generate() -> Result<Self> {
        let mut rng = ChaCha20Rng::from_entropy();
        let mut bytes = [0u8; 32];
        rng.fill_secure_bytes(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Derive a storage key from a password with Argon2id
    pub fn derive_from_password(
        password: &[u8],
        salt: &[u8],
        params: Argon2Params,
    ) -> Result<Self> {
        use argon2::{Algorithm as Argon2Algorithm, Argon2, Params, Version};

        let params = Params::new(params.memory_kib, params.time_cost, params.parallelism, Some(32))
            .map_err(|e| Error::crypto("derive_storage_key", format!("invalid Argon2 params: {}", e)))?;
        let argon2 = Argon2::new(Argon2Algorithm::Argon2id, Version::V0x13, params);
        let mut bytes = [0u8; 32];
        argon2
            .hash_password_into(password, salt, &mut bytes)
            .map_err(|e| Error::crypto("derive_storage_key", format!("Argon2 derivation failed: {}", e)))?;
        Ok(Self(bytes))
    }

    fn expose_secret(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StorageKey([REDACTED])")
    }
}

/// Runtime-polymorphic AEAD over the supported storage ciphers.
pub struct RuntimeAead;

impl RuntimeAead {
    /// Encrypt `plaintext`, authenticating `associated_data`.
    ///
    /// The nonce MUST be unique for every encryption under the same key.
    pub fn encrypt(
        &self,
        cipher: StorageCipher,
        key: &StorageKey,
        nonce: &[u8],
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        check_nonce(cipher, nonce)?;
        let payload = Payload {
            msg: plaintext,
            aad: associated_data,
        };
        let result = match cipher {
            StorageCipher::ChaCha20Poly1305 => {
                ChaCha20Poly1305::new(GenericArray::from_slice(key.expose_secret()))
                    .encrypt(GenericArray::from_slice(nonce), payload)
            }
            StorageCipher::Aes256Gcm => {
                Aes256Gcm::new(GenericArray::from_slice(key.expose_secret()))
                    .encrypt(GenericArray::from_slice(nonce), payload)
            }
        };
        result.map_err(|e| Error::crypto("encrypt", format!("{:?} encryption failed: {}", cipher, e)))
    }

    /// Decrypt and authenticate `ciphertext`.
    pub fn decrypt(
        &self,
        cipher: StorageCipher,
        key: &StorageKey,
        nonce: &[u8],
        ciphertext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        check_nonce(cipher, nonce)?;
        let payload = Payload {
            msg: ciphertext,
            aad: associated_data,
        };
        let result = match cipher {
            StorageCipher::ChaCha20Poly1305 => {
                ChaCha20Poly1305::new(GenericArray::from_slice(key.expose_secret()))
                    .decrypt(GenericArray::from_slice(nonce), payload)
            }
            StorageCipher::Aes256Gcm => {
                Aes256Gcm::new(GenericArray::from_slice(key.expose_secret()))
                    .decrypt(GenericArray::from_slice(nonce), payload)
            }
        };
        result.map_err(|e| Error::crypto("decrypt", format!("{:?} decryption failed: {}", cipher, e)))
    }
}

fn check_nonce(cipher: StorageCipher, nonce: &[u8]) -> Result<()> {
    if nonce.len() != cipher.nonce_size() {
        return Err(Error::crypto(
            "nonce_validation",
            format!("{:?} requires {}-byte nonce, got {}", cipher, cipher.nonce_size(), nonce.len()),
        ));
    }
    Ok(())
}

/// Generate a random nonce for `cipher`
pub fn random_nonce(cipher: StorageCipher) -> Result<Vec<u8>> {
    let mut rng = ChaCha20Rng::from_entropy();
    let mut nonce = vec![0u8; cipher.nonce_size()];
    rng.fill_secure_bytes(&mut nonce)?;
    Ok(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::KeyType;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn test_rejects_weak_rsa_sizes() {
        let err = KeyMaterialFactory::new(1024).unwrap_err();
        assert_eq!(err.code(), ErrorCode::WeakKeyRequested);

        let factory = KeyMaterialFactory::default();
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let params = KeyGenParams {
            algorithm: Algorithm::RS256,
            key_size: Some(1536),
        };
        let err = factory.generate_with_params(&mut rng, params).unwrap_err();
        assert_eq!(err.code(), ErrorCode::WeakKeyRequested);
    }

    #[test]
    fn test_rejects_oversized_rsa() {
        assert!(KeyMaterialFactory::new(4096).is_ok());
        let err = KeyMaterialFactory::new(4160).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);

        // checked before any prime search starts
        let factory = KeyMaterialFactory::default();
        let mut rng = ChaCha12Rng::seed_from_u64(2);
        let params = KeyGenParams {
            algorithm: Algorithm::PS256,
            key_size: Some(8192),
        };
        let err = factory.generate_with_params(&mut rng, params).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
    }

    #[test]
    fn test_symmetric_secret_sizes() {
        let factory = KeyMaterialFactory::default();
        for (alg, len) in [
            (Algorithm::HS256, 64),
            (Algorithm::HS384, 128),
            (Algorithm::HS512, 128),
            (Algorithm::A128KW, 16),
            (Algorithm::A256KW, 32),
        ] {
            let generated = factory.generate(alg).unwrap();
            match generated.material {
                KeyMaterial::Symmetric(ref secret) => assert_eq!(secret.len(), len, "{}", alg),
                ref other => panic!("unexpected material {:?}", other),
            }
        }
    }

    #[test]
    fn test_ecdsa_generation_by_curve_name() {
        let factory = KeyMaterialFactory::default();
        let mut rng = ChaCha12Rng::seed_from_u64(9);
        let generated = factory.generate_ecdsa(&mut rng, "P-521").unwrap();
        assert_eq!(generated.algorithm, Algorithm::ES512);
        assert_eq!(generated.material.key_type(), KeyType::Ecdsa);

        let err = factory.generate_ecdsa(&mut rng, "Ed25519").unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedCurve);
    }

    #[test]
    fn test_generated_key_ids_are_unique() {
        let factory = KeyMaterialFactory::default();
        let a = factory.generate(Algorithm::A128KW).unwrap();
        let b = factory.generate(Algorithm::A128KW).unwrap();
        assert_ne!(a.key_id, b.key_id);
    }

    #[test]
    fn test_storage_aead_round_trip() {
        let key = StorageKey::generate().unwrap();
        let aead = RuntimeAead;
        for cipher in [StorageCipher::ChaCha20Poly1305, StorageCipher::Aes256Gcm] {
            let nonce = random_nonce(cipher).unwrap();
            let ciphertext = aead.encrypt(cipher, &key, &nonce, b"private jwk", b"kid-1").unwrap();
            assert_ne!(ciphertext.as_slice(), b"private jwk");

            let plaintext = aead.decrypt(cipher, &key, &nonce, &ciphertext, b"kid-1").unwrap();
            assert_eq!(plaintext, b"private jwk");
            // bound to the associated data
            assert!(aead.decrypt(cipher, &key, &nonce, &ciphertext, b"kid-2").is_err());
        }
    }

    #[test]
    fn test_password_derivation_is_deterministic() {
        let params = Argon2Params {
            memory_kib: 64,
            time_cost: 1,
            parallelism: 1,
        };
        let a = StorageKey::derive_from_password(b"hunter2", b"0123456789abcdef", params).unwrap();
        let b = StorageKey::derive_from_password(b"hunter2", b"0123456789abcdef", params).unwrap();
        let c = StorageKey::derive_from_password(b"hunter3", b"0123456789abcdef", params).unwrap();
        assert_eq!(a.expose_secret(), b.expose_secret());
        assert_ne!(a.expose_secret(), c.expose_secret());
    }
}
