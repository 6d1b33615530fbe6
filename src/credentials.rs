//! Signing and encrypting credentials handed out by the key set service

use crate::algorithm::{Algorithm, ContentEncryption};
use crate::crypto::SecureRandom;
use crate::jwk::{Jwk, JwkConverter, KeyRecord};
use crate::key::KeyMaterial;
use crate::{KeyId, KeyUse, Result};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use zeroize::Zeroizing;

/// A key handle plus the algorithm it signs with
#[derive(Debug, Clone)]
pub struct SigningCredential {
    key_id: KeyId,
    algorithm: Algorithm,
    key: KeyMaterial,
    public_jwk: Option<Jwk>,
}

impl SigningCredential {
    /// Reconstruct the credential for a stored signing record
    pub fn from_record(record: &KeyRecord) -> Result<Self> {
        record.algorithm().ensure_use(KeyUse::Signing)?;
        let key = JwkConverter::from_record(record)?;
        Ok(Self {
            key_id: record.key_id().clone(),
            algorithm: record.algorithm(),
            key,
            public_jwk: record.public_jwk(),
        })
    }

    /// Key id to put in the token header
    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    /// Signing algorithm
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The underlying private key
    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    /// Sign `message`
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.key.sign(self.algorithm, message)
    }

    /// Verify a signature made by this credential
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool> {
        self.key.verify(self.algorithm, message, signature)
    }

    /// Publishable JWK; `None` for HMAC keys
    pub fn public_jwk(&self) -> Option<&Jwk> {
        self.public_jwk.as_ref()
    }
}

/// A key handle plus the key management algorithm and content encryption
/// it is used with
#[derive(Debug, Clone)]
pub struct EncryptingCredential {
    key_id: KeyId,
    algorithm: Algorithm,
    enc: ContentEncryption,
    key: KeyMaterial,
    public_jwk: Option<Jwk>,
}

impl EncryptingCredential {
    /// Reconstruct the credential for a stored encryption record
    pub fn from_record(record: &KeyRecord, enc: ContentEncryption) -> Result<Self> {
        record.algorithm().ensure_use(KeyUse::Encryption)?;
        let key = JwkConverter::from_record(record)?;
        Ok(Self {
            key_id: record.key_id().clone(),
            algorithm: record.algorithm(),
            enc,
            key,
            public_jwk: record.public_jwk(),
        })
    }

    /// Key id to put in the token header
    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    /// Key management algorithm (`alg`)
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Content encryption (`enc`)
    pub fn content_encryption(&self) -> ContentEncryption {
        self.enc
    }

    /// The underlying private key
    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    /// A fresh random content encryption key sized for `enc`
    pub fn new_content_key(&self) -> Result<Zeroizing<Vec<u8>>> {
        let mut rng = ChaCha20Rng::from_entropy();
        let mut cek = Zeroizing::new(vec![0u8; self.enc.cek_len()]);
        rng.fill_secure_bytes(&mut cek)?;
        Ok(cek)
    }

    /// Encrypt a content encryption key
    pub fn wrap_key(&self, cek: &[u8]) -> Result<Vec<u8>> {
        self.key.wrap_key(self.algorithm, cek)
    }

    /// Recover a content encryption key produced by [`Self::wrap_key`] or by a
    /// holder of the public JWK
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.key.unwrap_key(self.algorithm, wrapped).map(Zeroizing::new)
    }

    /// Publishable JWK; `None` for AES key-wrap keys
    pub fn public_jwk(&self) -> Option<&Jwk> {
        self.public_jwk.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyMaterialFactory;
    use crate::error::ErrorCode;
    use crate::key::PublicKey;
    use std::time::{Duration, SystemTime};

    fn record(algorithm: Algorithm) -> KeyRecord {
        let generated = KeyMaterialFactory::default().generate(algorithm).unwrap();
        JwkConverter::to_record(&generated, SystemTime::now(), Duration::from_secs(3600)).unwrap()
    }

    #[test]
    fn test_signing_credential_sign_and_verify() {
        let credential = SigningCredential::from_record(&record(Algorithm::ES384)).unwrap();
        let signature = credential.sign(b"header.payload").unwrap();
        assert!(credential.verify(b"header.payload", &signature).unwrap());
        assert!(!credential.verify(b"header.other", &signature).unwrap());

        let public = PublicKey::from_jwk(credential.public_jwk().unwrap()).unwrap();
        assert!(public.verify(Algorithm::ES384, b"header.payload", &signature).unwrap());
    }

    #[test]
    fn test_credential_rejects_wrong_slot() {
        let err = SigningCredential::from_record(&record(Algorithm::A128KW)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedAlgorithm);

        let err = EncryptingCredential::from_record(&record(Algorithm::HS256), ContentEncryption::default())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedAlgorithm);
    }

    #[test]
    fn test_aes_key_wrap_credential() {
        let credential =
            EncryptingCredential::from_record(&record(Algorithm::A256KW), ContentEncryption::A256Gcm).unwrap();
        assert!(credential.public_jwk().is_none());

        let cek = credential.new_content_key().unwrap();
        assert_eq!(cek.len(), 32);
        let wrapped = credential.wrap_key(&cek).unwrap();
        assert_eq!(wrapped.len(), cek.len() + 8);
        assert_eq!(*credential.unwrap_key(&wrapped).unwrap(), *cek);
    }

    #[test]
    fn test_rsa_oaep_credential_unwraps_what_the_public_key_wrapped() {
        let credential =
            EncryptingCredential::from_record(&record(Algorithm::RSA_OAEP_256), ContentEncryption::default())
                .unwrap();
        let cek = credential.new_content_key().unwrap();
        assert_eq!(cek.len(), 32);

        let public = PublicKey::from_jwk(credential.public_jwk().unwrap()).unwrap();
        let wrapped = public.wrap_key(Algorithm::RSA_OAEP_256, &cek).unwrap();
        assert_eq!(*credential.unwrap_key(&wrapped).unwrap(), *cek);
    }
}
