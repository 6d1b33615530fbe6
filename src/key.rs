//! Native key handles and the operations they support

use crate::algorithm::{AesKeySize, Algorithm, Curve, KeyType, RsaScheme, ShaLevel};
use crate::{Error, Result};
use hmac::{Hmac, Mac};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Signer, Verifier};
use rsa::{pkcs1v15, pss, Oaep, RsaPrivateKey, RsaPublicKey};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Run `$body` with `$d` bound to the SHA-2 type matching `$level`.
macro_rules! with_sha {
    ($level:expr, $d:ident => $body:expr) => {
        match $level {
            ShaLevel::Sha256 => {
                type $d = sha2::Sha256;
                $body
            }
            ShaLevel::Sha384 => {
                type $d = sha2::Sha384;
                $body
            }
            ShaLevel::Sha512 => {
                type $d = sha2::Sha512;
                $body
            }
        }
    };
}

macro_rules! ecdsa_sign {
    ($curve:ident, $secret:expr, $msg:expr) => {{
        use $curve::ecdsa::{signature::Signer as _, Signature, SigningKey};
        let signing_key = SigningKey::from_bytes(&$secret.to_bytes())
            .map_err(|e| Error::crypto("ecdsa_sign", e.to_string()))?;
        let signature: Signature = signing_key
            .try_sign($msg)
            .map_err(|e| Error::crypto("ecdsa_sign", e.to_string()))?;
        signature.to_bytes().to_vec()
    }};
}

/// P-521 signing with an RFC 6979 nonce over SHA-512.
///
/// `p521::ecdsa::SigningKey` draws its nonce from the OS RNG, so the
/// deterministic path goes through the scalar directly.
#[allow(deprecated)]
fn p521_sign(secret: &p521::SecretKey, message: &[u8]) -> Result<Vec<u8>> {
    use ecdsa::hazmat::{bits2field, SignPrimitive};
    use sha2::{Digest, Sha512};

    let digest = Sha512::digest(message);
    let z = bits2field::<p521::NistP521>(&digest)
        .map_err(|e| Error::crypto("ecdsa_sign", e.to_string()))?;
    let scalar = secret.to_nonzero_scalar();
    let (signature, _) = scalar
        .as_ref()
        .try_sign_prehashed_rfc6979::<Sha512>(&z, &[])
        .map_err(|e| Error::crypto("ecdsa_sign", e.to_string()))?;
    Ok(signature.to_bytes().to_vec())
}

macro_rules! ecdsa_verify {
    ($curve:ident, $public:expr, $msg:expr, $sig:expr) => {{
        use $curve::ecdsa::{signature::Verifier as _, Signature, VerifyingKey};
        use $curve::elliptic_curve::sec1::ToEncodedPoint as _;
        let point = $public.to_encoded_point(false);
        let verifying_key = VerifyingKey::from_sec1_bytes(point.as_bytes())
            .map_err(|e| Error::crypto("ecdsa_verify", e.to_string()))?;
        match Signature::from_slice($sig) {
            Ok(signature) => verifying_key.verify($msg, &signature).is_ok(),
            Err(_) => false,
        }
    }};
}

/// A symmetric secret (HMAC or AES key-wrap), zeroed on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    /// The actual key material
    bytes: Vec<u8>,
    /// Algorithm this key is for
    #[zeroize(skip)]
    algorithm: Algorithm,
}

impl SecretKey {
    /// Create a new SecretKey from raw bytes
    ///
    /// # Errors
    /// Returns an error if the algorithm is not symmetric, or the length is
    /// wrong for it. AES key-wrap keys must match the KEK size exactly; HMAC
    /// keys must be at least as long as the hash output.
    pub fn from_bytes(bytes: Vec<u8>, algorithm: Algorithm) -> Result<Self> {
        let valid = match algorithm {
            Algorithm::AesKeyWrap(size) => bytes.len() == size.bytes(),
            Algorithm::Hmac(level) => bytes.len() >= hash_output_len(level),
            _ => {
                return Err(Error::unsupported_algorithm(
                    algorithm.id(),
                    "not a symmetric algorithm",
                ))
            }
        };
        if !valid {
            return Err(Error::crypto(
                "key_validation",
                format!("invalid {} key size: {} bytes", algorithm, bytes.len()),
            ));
        }

        Ok(Self { bytes, algorithm })
    }

    /// Get the algorithm for this key
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Length of the secret in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the secret is empty (never true for a validated key)
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Expose the raw key material
    ///
    /// The caller is responsible for ensuring it doesn't leak.
    pub fn expose_secret(&self) -> &[u8] {
        &self.bytes
    }

    /// Constant-time equality comparison
    pub fn ct_eq(&self, other: &Self) -> bool {
        if self.algorithm != other.algorithm {
            return false;
        }
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("algorithm", &self.algorithm)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

const fn hash_output_len(level: ShaLevel) -> usize {
    match level {
        ShaLevel::Sha256 => 32,
        ShaLevel::Sha384 => 48,
        ShaLevel::Sha512 => 64,
    }
}

/// Private key material for one key, in native form
#[derive(Clone)]
pub enum KeyMaterial {
    /// RSA private key with CRT values
    Rsa(RsaPrivateKey),
    /// P-256 private scalar
    EcP256(p256::SecretKey),
    /// P-384 private scalar
    EcP384(p384::SecretKey),
    /// P-521 private scalar
    EcP521(p521::SecretKey),
    /// HMAC or AES key-wrap secret
    Symmetric(SecretKey),
}

impl KeyMaterial {
    /// The family of this key
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Rsa(_) => KeyType::Rsa,
            Self::EcP256(_) | Self::EcP384(_) | Self::EcP521(_) => KeyType::Ecdsa,
            Self::Symmetric(secret) => secret.algorithm().key_type(),
        }
    }

    /// The named curve, for EC keys
    pub fn curve(&self) -> Option<Curve> {
        match self {
            Self::EcP256(_) => Some(Curve::P256),
            Self::EcP384(_) => Some(Curve::P384),
            Self::EcP521(_) => Some(Curve::P521),
            _ => None,
        }
    }

    /// Modulus size in bits, for RSA keys
    pub fn rsa_bits(&self) -> Option<usize> {
        use rsa::traits::PublicKeyParts;
        match self {
            Self::Rsa(key) => Some(key.n().bits()),
            _ => None,
        }
    }

    /// Check that this key can serve `algorithm`
    pub fn supports(&self, algorithm: Algorithm) -> bool {
        match (self, algorithm) {
            (Self::Rsa(_), Algorithm::Rsa(..)) => true,
            (Self::Symmetric(secret), alg) => secret.algorithm() == alg,
            (_, Algorithm::Ecdsa(curve)) => self.curve() == Some(curve),
            _ => false,
        }
    }

    fn ensure_supports(&self, algorithm: Algorithm, operation: &str) -> Result<()> {
        if !self.supports(algorithm) {
            return Err(Error::unsupported_algorithm(
                algorithm.id(),
                format!("{} key cannot be used for {}", self.key_type(), operation),
            ));
        }
        Ok(())
    }

    /// Public half of an asymmetric key; `None` for symmetric secrets
    pub fn public_key(&self) -> Option<PublicKey> {
        match self {
            Self::Rsa(key) => Some(PublicKey::Rsa(key.to_public_key())),
            Self::EcP256(secret) => Some(PublicKey::EcP256(secret.public_key())),
            Self::EcP384(secret) => Some(PublicKey::EcP384(secret.public_key())),
            Self::EcP521(secret) => Some(PublicKey::EcP521(secret.public_key())),
            Self::Symmetric(_) => None,
        }
    }

    /// Sign `message` with `algorithm`.
    ///
    /// RS*, ES* (RFC 6979 nonces) and HS* signatures are deterministic; PS*
    /// signatures are salted and differ on every call.
    pub fn sign(&self, algorithm: Algorithm, message: &[u8]) -> Result<Vec<u8>> {
        self.ensure_supports(algorithm, "signing")?;
        let signature = match (self, algorithm) {
            (Self::Rsa(key), Algorithm::Rsa(RsaScheme::Pkcs1v15, level)) => with_sha!(level, D => {
                pkcs1v15::SigningKey::<D>::new(key.clone())
                    .try_sign(message)
                    .map_err(|e| Error::crypto("rsa_sign", e.to_string()))?
                    .to_vec()
            }),
            (Self::Rsa(key), Algorithm::Rsa(RsaScheme::Pss, level)) => with_sha!(level, D => {
                let mut rng = ChaCha20Rng::from_entropy();
                pss::BlindedSigningKey::<D>::new(key.clone())
                    .try_sign_with_rng(&mut rng, message)
                    .map_err(|e| Error::crypto("rsa_pss_sign", e.to_string()))?
                    .to_vec()
            }),
            (Self::EcP256(secret), _) => ecdsa_sign!(p256, secret, message),
            (Self::EcP384(secret), _) => ecdsa_sign!(p384, secret, message),
            (Self::EcP521(secret), _) => p521_sign(secret, message)?,
            (Self::Symmetric(secret), Algorithm::Hmac(level)) => {
                hmac_tag(level, secret.expose_secret(), message)?
            }
            _ => {
                return Err(Error::unsupported_algorithm(
                    algorithm.id(),
                    "not a signing algorithm",
                ))
            }
        };
        Ok(signature)
    }

    /// Verify `signature` over `message`; `Ok(false)` on a bad signature
    pub fn verify(&self, algorithm: Algorithm, message: &[u8], signature: &[u8]) -> Result<bool> {
        self.ensure_supports(algorithm, "verification")?;
        match (self, algorithm) {
            (Self::Symmetric(secret), Algorithm::Hmac(level)) => with_sha!(level, D => {
                let mut mac = <Hmac<D> as Mac>::new_from_slice(secret.expose_secret())
                    .map_err(|e| Error::crypto("hmac_verify", e.to_string()))?;
                mac.update(message);
                Ok(mac.verify_slice(signature).is_ok())
            }),
            _ => match self.public_key() {
                Some(public) => public.verify(algorithm, message, signature),
                None => Err(Error::unsupported_algorithm(
                    algorithm.id(),
                    "not a signing algorithm",
                )),
            },
        }
    }

    /// Wrap a content encryption key
    pub fn wrap_key(&self, algorithm: Algorithm, cek: &[u8]) -> Result<Vec<u8>> {
        self.ensure_supports(algorithm, "key wrapping")?;
        match (self, algorithm) {
            (Self::Symmetric(secret), Algorithm::AesKeyWrap(size)) => {
                aes_wrap(size, secret.expose_secret(), cek)
            }
            (Self::Rsa(key), Algorithm::Rsa(RsaScheme::Oaep, _)) => {
                PublicKey::Rsa(key.to_public_key()).wrap_key(algorithm, cek)
            }
            _ => Err(Error::unsupported_algorithm(
                algorithm.id(),
                "not a key encryption algorithm",
            )),
        }
    }

    /// Unwrap a content encryption key produced by [`Self::wrap_key`]
    pub fn unwrap_key(&self, algorithm: Algorithm, wrapped: &[u8]) -> Result<Vec<u8>> {
        self.ensure_supports(algorithm, "key unwrapping")?;
        match (self, algorithm) {
            (Self::Symmetric(secret), Algorithm::AesKeyWrap(size)) => {
                aes_unwrap(size, secret.expose_secret(), wrapped)
            }
            (Self::Rsa(key), Algorithm::Rsa(RsaScheme::Oaep, level)) => with_sha!(level, D => {
                key.decrypt(Oaep::new::<D>(), wrapped)
                    .map_err(|e| Error::crypto("rsa_oaep_decrypt", e.to_string()))
            }),
            _ => Err(Error::unsupported_algorithm(
                algorithm.id(),
                "not a key encryption algorithm",
            )),
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa(_) => f
                .debug_struct("KeyMaterial::Rsa")
                .field("bits", &self.rsa_bits())
                .field("private", &"[REDACTED]")
                .finish(),
            Self::Symmetric(secret) => f.debug_tuple("KeyMaterial::Symmetric").field(secret).finish(),
            _ => f
                .debug_struct("KeyMaterial::Ec")
                .field("curve", &self.curve())
                .field("private", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Public half of an asymmetric key, as published in a JWKS
#[derive(Clone, Debug, PartialEq)]
pub enum PublicKey {
    /// RSA modulus and exponent
    Rsa(RsaPublicKey),
    /// P-256 point
    EcP256(p256::PublicKey),
    /// P-384 point
    EcP384(p384::PublicKey),
    /// P-521 point
    EcP521(p521::PublicKey),
}

impl PublicKey {
    /// Build a verifier from a published JWK
    pub fn from_jwk(jwk: &crate::Jwk) -> Result<Self> {
        crate::jwk::JwkConverter::public_key_from_jwk(jwk)
    }

    /// Verify `signature` over `message`; `Ok(false)` on a bad signature
    pub fn verify(&self, algorithm: Algorithm, message: &[u8], signature: &[u8]) -> Result<bool> {
        let valid = match (self, algorithm) {
            (Self::Rsa(key), Algorithm::Rsa(RsaScheme::Pkcs1v15, level)) => with_sha!(level, D => {
                match pkcs1v15::Signature::try_from(signature) {
                    Ok(sig) => pkcs1v15::VerifyingKey::<D>::new(key.clone())
                        .verify(message, &sig)
                        .is_ok(),
                    Err(_) => false,
                }
            }),
            (Self::Rsa(key), Algorithm::Rsa(RsaScheme::Pss, level)) => with_sha!(level, D => {
                match pss::Signature::try_from(signature) {
                    Ok(sig) => pss::VerifyingKey::<D>::new(key.clone()).verify(message, &sig).is_ok(),
                    Err(_) => false,
                }
            }),
            (Self::EcP256(public), Algorithm::Ecdsa(Curve::P256)) => {
                ecdsa_verify!(p256, public, message, signature)
            }
            (Self::EcP384(public), Algorithm::Ecdsa(Curve::P384)) => {
                ecdsa_verify!(p384, public, message, signature)
            }
            (Self::EcP521(public), Algorithm::Ecdsa(Curve::P521)) => {
                ecdsa_verify!(p521, public, message, signature)
            }
            _ => {
                return Err(Error::unsupported_algorithm(
                    algorithm.id(),
                    "public key cannot verify with this algorithm",
                ))
            }
        };
        Ok(valid)
    }

    /// Encrypt a content encryption key to this public key (RSA-OAEP only)
    pub fn wrap_key(&self, algorithm: Algorithm, cek: &[u8]) -> Result<Vec<u8>> {
        match (self, algorithm) {
            (Self::Rsa(key), Algorithm::Rsa(RsaScheme::Oaep, level)) => with_sha!(level, D => {
                let mut rng = ChaCha20Rng::from_entropy();
                key.encrypt(&mut rng, Oaep::new::<D>(), cek)
                    .map_err(|e| Error::crypto("rsa_oaep_encrypt", e.to_string()))
            }),
            _ => Err(Error::unsupported_algorithm(
                algorithm.id(),
                "public key cannot wrap with this algorithm",
            )),
        }
    }
}

fn hmac_tag(level: ShaLevel, secret: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    with_sha!(level, D => {
        let mut mac = <Hmac<D> as Mac>::new_from_slice(secret)
            .map_err(|e| Error::crypto("hmac_sign", e.to_string()))?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    })
}

fn aes_wrap(size: AesKeySize, kek: &[u8], cek: &[u8]) -> Result<Vec<u8>> {
    let mut out = vec![0u8; cek.len() + 8];
    let wrapped = match size {
        AesKeySize::Aes128 => aes_kw::KekAes128::from(kek_bytes::<16>(kek)?).wrap(cek, &mut out),
        AesKeySize::Aes256 => aes_kw::KekAes256::from(kek_bytes::<32>(kek)?).wrap(cek, &mut out),
    };
    wrapped.map_err(|e| Error::crypto("aes_key_wrap", e.to_string()))?;
    Ok(out)
}

fn aes_unwrap(size: AesKeySize, kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>> {
    if wrapped.len() < 24 || wrapped.len() % 8 != 0 {
        return Err(Error::crypto(
            "aes_key_unwrap",
            format!("wrapped key has invalid length {}", wrapped.len()),
        ));
    }
    let mut out = vec![0u8; wrapped.len() - 8];
    let unwrapped = match size {
        AesKeySize::Aes128 => aes_kw::KekAes128::from(kek_bytes::<16>(kek)?).unwrap(wrapped, &mut out),
        AesKeySize::Aes256 => aes_kw::KekAes256::from(kek_bytes::<32>(kek)?).unwrap(wrapped, &mut out),
    };
    unwrapped.map_err(|e| Error::crypto("aes_key_unwrap", e.to_string()))?;
    Ok(out)
}

fn kek_bytes<const N: usize>(kek: &[u8]) -> Result<[u8; N]> {
    kek.try_into()
        .map_err(|_| Error::crypto("aes_key_wrap", format!("KEK must be {} bytes", N)))
}
