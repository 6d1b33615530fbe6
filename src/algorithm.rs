//! Algorithm catalog
//!
//! Every JOSE algorithm identifier the crate understands is resolved once, at
//! this boundary, into a closed [`Algorithm`] value. Everything downstream
//! matches on the enum instead of re-testing identifier strings.

use crate::{Error, KeyUse, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Key family of an algorithm
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// RSA key pair
    #[serde(rename = "RSA")]
    Rsa,
    /// Elliptic curve key pair
    #[serde(rename = "ECDSA")]
    Ecdsa,
    /// Shared HMAC secret
    #[serde(rename = "HMAC")]
    Hmac,
    /// Shared AES key-wrapping secret
    #[serde(rename = "AES")]
    Aes,
}

impl KeyType {
    /// The JWK `kty` value for this family
    pub const fn jwk_kty(&self) -> &'static str {
        match self {
            Self::Rsa => "RSA",
            Self::Ecdsa => "EC",
            Self::Hmac | Self::Aes => "oct",
        }
    }

    /// Whether keys of this family have a publishable public half
    pub const fn is_asymmetric(&self) -> bool {
        matches!(self, Self::Rsa | Self::Ecdsa)
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rsa => "RSA",
            Self::Ecdsa => "ECDSA",
            Self::Hmac => "HMAC",
            Self::Aes => "AES",
        };
        f.write_str(name)
    }
}

/// SHA-2 strength used by an algorithm
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaLevel {
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

/// RSA padding scheme
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RsaScheme {
    /// RSASSA-PKCS1-v1_5 signatures (RS*)
    Pkcs1v15,
    /// RSASSA-PSS signatures (PS*)
    Pss,
    /// RSAES-OAEP key encryption (RSA-OAEP-*)
    Oaep,
}

/// NIST named curve
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Curve {
    /// secp256r1
    #[serde(rename = "P-256")]
    P256,
    /// secp384r1
    #[serde(rename = "P-384")]
    P384,
    /// secp521r1
    #[serde(rename = "P-521")]
    P521,
}

impl Curve {
    /// The JWK `crv` value
    pub const fn crv(&self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    /// Resolve a JWK `crv` value
    pub fn from_crv(crv: &str) -> Result<Self> {
        match crv {
            "P-256" => Ok(Self::P256),
            "P-384" => Ok(Self::P384),
            "P-521" => Ok(Self::P521),
            other => Err(Error::UnsupportedCurve {
                curve: other.to_string(),
            }),
        }
    }

    /// Size in bytes of one field element (x, y or d) on this curve
    pub const fn field_len(&self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }
}

/// AES key-wrap key size
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AesKeySize {
    /// 128-bit KEK
    Aes128,
    /// 256-bit KEK
    Aes256,
}

impl AesKeySize {
    /// Key length in bytes
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes256 => 32,
        }
    }
}

/// A supported signing or key-encryption algorithm.
///
/// Serialized as its JOSE identifier (`"PS256"`, `"A128KW"`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum Algorithm {
    /// RSA family with a padding scheme and hash
    Rsa(RsaScheme, ShaLevel),
    /// ECDSA over a named curve, hash fixed by the curve
    Ecdsa(Curve),
    /// HMAC with a SHA-2 hash
    Hmac(ShaLevel),
    /// AES key wrap (RFC 3394)
    AesKeyWrap(AesKeySize),
}

impl Algorithm {
    /// RSASSA-PKCS1-v1_5 using SHA-256
    pub const RS256: Self = Self::Rsa(RsaScheme::Pkcs1v15, ShaLevel::Sha256);
    /// RSASSA-PKCS1-v1_5 using SHA-384
    pub const RS384: Self = Self::Rsa(RsaScheme::Pkcs1v15, ShaLevel::Sha384);
    /// RSASSA-PKCS1-v1_5 using SHA-512
    pub const RS512: Self = Self::Rsa(RsaScheme::Pkcs1v15, ShaLevel::Sha512);
    /// RSASSA-PSS using SHA-256
    pub const PS256: Self = Self::Rsa(RsaScheme::Pss, ShaLevel::Sha256);
    /// RSASSA-PSS using SHA-384
    pub const PS384: Self = Self::Rsa(RsaScheme::Pss, ShaLevel::Sha384);
    /// RSASSA-PSS using SHA-512
    pub const PS512: Self = Self::Rsa(RsaScheme::Pss, ShaLevel::Sha512);
    /// RSAES-OAEP using SHA-256
    pub const RSA_OAEP_256: Self = Self::Rsa(RsaScheme::Oaep, ShaLevel::Sha256);
    /// RSAES-OAEP using SHA-384
    pub const RSA_OAEP_384: Self = Self::Rsa(RsaScheme::Oaep, ShaLevel::Sha384);
    /// RSAES-OAEP using SHA-512
    pub const RSA_OAEP_512: Self = Self::Rsa(RsaScheme::Oaep, ShaLevel::Sha512);
    /// ECDSA using P-256 and SHA-256
    pub const ES256: Self = Self::Ecdsa(Curve::P256);
    /// ECDSA using P-384 and SHA-384
    pub const ES384: Self = Self::Ecdsa(Curve::P384);
    /// ECDSA using P-521 and SHA-512
    pub const ES512: Self = Self::Ecdsa(Curve::P521);
    /// HMAC using SHA-256
    pub const HS256: Self = Self::Hmac(ShaLevel::Sha256);
    /// HMAC using SHA-384
    pub const HS384: Self = Self::Hmac(ShaLevel::Sha384);
    /// HMAC using SHA-512
    pub const HS512: Self = Self::Hmac(ShaLevel::Sha512);
    /// AES key wrap with a 128-bit key
    pub const A128KW: Self = Self::AesKeyWrap(AesKeySize::Aes128);
    /// AES key wrap with a 256-bit key
    pub const A256KW: Self = Self::AesKeyWrap(AesKeySize::Aes256);

    /// Every algorithm in the catalog
    pub const ALL: [Self; 17] = [
        Self::RS256,
        Self::RS384,
        Self::RS512,
        Self::PS256,
        Self::PS384,
        Self::PS512,
        Self::RSA_OAEP_256,
        Self::RSA_OAEP_384,
        Self::RSA_OAEP_512,
        Self::ES256,
        Self::ES384,
        Self::ES512,
        Self::HS256,
        Self::HS384,
        Self::HS512,
        Self::A128KW,
        Self::A256KW,
    ];

    /// The JOSE `alg` identifier
    pub const fn id(&self) -> &'static str {
        match self {
            Self::Rsa(RsaScheme::Pkcs1v15, ShaLevel::Sha256) => "RS256",
            Self::Rsa(RsaScheme::Pkcs1v15, ShaLevel::Sha384) => "RS384",
            Self::Rsa(RsaScheme::Pkcs1v15, ShaLevel::Sha512) => "RS512",
            Self::Rsa(RsaScheme::Pss, ShaLevel::Sha256) => "PS256",
            Self::Rsa(RsaScheme::Pss, ShaLevel::Sha384) => "PS384",
            Self::Rsa(RsaScheme::Pss, ShaLevel::Sha512) => "PS512",
            Self::Rsa(RsaScheme::Oaep, ShaLevel::Sha256) => "RSA-OAEP-256",
            Self::Rsa(RsaScheme::Oaep, ShaLevel::Sha384) => "RSA-OAEP-384",
            Self::Rsa(RsaScheme::Oaep, ShaLevel::Sha512) => "RSA-OAEP-512",
            Self::Ecdsa(Curve::P256) => "ES256",
            Self::Ecdsa(Curve::P384) => "ES384",
            Self::Ecdsa(Curve::P521) => "ES512",
            Self::Hmac(ShaLevel::Sha256) => "HS256",
            Self::Hmac(ShaLevel::Sha384) => "HS384",
            Self::Hmac(ShaLevel::Sha512) => "HS512",
            Self::AesKeyWrap(AesKeySize::Aes128) => "A128KW",
            Self::AesKeyWrap(AesKeySize::Aes256) => "A256KW",
        }
    }

    /// The key family this algorithm requires
    pub const fn key_type(&self) -> KeyType {
        match self {
            Self::Rsa(..) => KeyType::Rsa,
            Self::Ecdsa(_) => KeyType::Ecdsa,
            Self::Hmac(_) => KeyType::Hmac,
            Self::AesKeyWrap(_) => KeyType::Aes,
        }
    }

    /// Which slot keys for this algorithm belong to
    pub const fn key_use(&self) -> KeyUse {
        match self {
            Self::Rsa(RsaScheme::Oaep, _) | Self::AesKeyWrap(_) => KeyUse::Encryption,
            _ => KeyUse::Signing,
        }
    }

    /// Whether this is a signing algorithm
    pub const fn is_signing(&self) -> bool {
        matches!(self.key_use(), KeyUse::Signing)
    }

    /// The named curve, for ECDSA algorithms
    pub const fn curve(&self) -> Option<Curve> {
        match self {
            Self::Ecdsa(curve) => Some(*curve),
            _ => None,
        }
    }

    /// Length in bytes of a freshly generated symmetric secret.
    ///
    /// HMAC secrets are sized after NIST SP 800-107r1 §5.3.4: at least the
    /// hash block size, so 64 bytes for SHA-256 and 128 bytes for SHA-384/512.
    pub const fn secret_len(&self) -> Option<usize> {
        match self {
            Self::Hmac(ShaLevel::Sha256) => Some(64),
            Self::Hmac(ShaLevel::Sha384 | ShaLevel::Sha512) => Some(128),
            Self::AesKeyWrap(size) => Some(size.bytes()),
            _ => None,
        }
    }

    /// Resolve an identifier for an explicitly requested key type.
    ///
    /// Fails with [`Error::UnsupportedAlgorithm`] when the identifier is
    /// unknown or names an algorithm of a different family.
    pub fn resolve(id: &str, key_type: KeyType) -> Result<Self> {
        let algorithm = Self::from_str(id)?;
        if algorithm.key_type() != key_type {
            return Err(Error::unsupported_algorithm(
                id,
                format!("algorithm belongs to {}, not {}", algorithm.key_type(), key_type),
            ));
        }
        Ok(algorithm)
    }

    /// Check that this algorithm serves the given key use
    pub fn ensure_use(&self, key_use: KeyUse) -> Result<()> {
        if self.key_use() != key_use {
            return Err(Error::unsupported_algorithm(
                self.id(),
                format!("not usable for '{}' keys", key_use),
            ));
        }
        Ok(())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(id: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|alg| alg.id() == id)
            .ok_or_else(|| Error::unsupported_algorithm(id, "unknown identifier"))
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl From<Algorithm> for &'static str {
    fn from(alg: Algorithm) -> Self {
        alg.id()
    }
}

impl TryFrom<String> for Algorithm {
    type Error = Error;

    fn try_from(id: String) -> Result<Self> {
        Self::from_str(&id)
    }
}

/// JWE content encryption (`enc`) carried by an encrypting credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentEncryption {
    /// AES-128-CBC with HMAC-SHA-256
    #[serde(rename = "A128CBC-HS256")]
    A128CbcHs256,
    /// AES-192-CBC with HMAC-SHA-384
    #[serde(rename = "A192CBC-HS384")]
    A192CbcHs384,
    /// AES-256-CBC with HMAC-SHA-512
    #[serde(rename = "A256CBC-HS512")]
    A256CbcHs512,
    /// AES-128-GCM
    #[serde(rename = "A128GCM")]
    A128Gcm,
    /// AES-192-GCM
    #[serde(rename = "A192GCM")]
    A192Gcm,
    /// AES-256-GCM
    #[serde(rename = "A256GCM")]
    A256Gcm,
}

impl ContentEncryption {
    /// The JOSE `enc` identifier
    pub const fn id(&self) -> &'static str {
        match self {
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A192CbcHs384 => "A192CBC-HS384",
            Self::A256CbcHs512 => "A256CBC-HS512",
            Self::A128Gcm => "A128GCM",
            Self::A192Gcm => "A192GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    /// Size in bytes of the content encryption key this method expects
    pub const fn cek_len(&self) -> usize {
        match self {
            Self::A128CbcHs256 => 32,
            Self::A192CbcHs384 => 48,
            Self::A256CbcHs512 => 64,
            Self::A128Gcm => 16,
            Self::A192Gcm => 24,
            Self::A256Gcm => 32,
        }
    }
}

impl Default for ContentEncryption {
    fn default() -> Self {
        Self::A128CbcHs256
    }
}

impl fmt::Display for ContentEncryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
