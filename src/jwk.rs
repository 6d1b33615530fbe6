//! JSON Web Key representation and the lossless native <-> JWK converter
//!
//! A [`KeyRecord`] stores the full private JWK of one generated key. The
//! converter writes every private member (RSA CRT values included) and, on the
//! way back, refuses to produce a key if any member is missing or inconsistent
//! instead of silently degrading to a public-only key.

use crate::algorithm::{Algorithm, Curve, KeyType};
use crate::crypto::GeneratedKey;
use crate::key::{KeyMaterial, PublicKey, SecretKey};
use crate::{Error, KeyId, KeyMetadata, KeyUse, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{Duration, SystemTime};

/// A JSON Web Key (RFC 7517), with RFC 7518 members for RSA, EC and `oct`
///
/// Binary members hold base64url strings without padding.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type: `RSA`, `EC` or `oct`
    pub kty: String,
    /// Key id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Algorithm the key is meant for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Intended use
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<KeyUse>,
    /// RSA modulus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA public exponent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// RSA private exponent, or EC private scalar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    /// RSA first prime factor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    /// RSA second prime factor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    /// RSA first factor CRT exponent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    /// RSA second factor CRT exponent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    /// RSA first CRT coefficient
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
    /// EC curve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// EC x coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// Symmetric key value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
}

impl Jwk {
    /// Whether any private member is present
    pub fn has_private_parameters(&self) -> bool {
        self.d.is_some()
            || self.p.is_some()
            || self.q.is_some()
            || self.dp.is_some()
            || self.dq.is_some()
            || self.qi.is_some()
            || self.k.is_some()
    }

    /// Public projection of this key.
    ///
    /// Returns `None` for symmetric (`oct`) keys, which have no public half and
    /// are never published.
    pub fn to_public(&self) -> Option<Jwk> {
        if self.kty == KeyType::Hmac.jwk_kty() {
            return None;
        }
        Some(Jwk {
            kty: self.kty.clone(),
            kid: self.kid.clone(),
            alg: self.alg.clone(),
            key_use: self.key_use,
            n: self.n.clone(),
            e: self.e.clone(),
            crv: self.crv.clone(),
            x: self.x.clone(),
            y: self.y.clone(),
            ..Jwk::default()
        })
    }
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .field("use", &self.key_use)
            .field("private", &self.has_private_parameters())
            .finish_non_exhaustive()
    }
}

/// A JSON Web Key Set document: `{ "keys": [...] }`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// Published keys, newest first
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Find a key by id
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| {
                Error::serialization("jwks_to_json", format!("JSON serialization failed: {}", e))
            })
    }
}

/// The persisted state of one generated key.
///
/// Records are immutable: rotation creates a new record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    metadata: KeyMetadata,
    jwk: Jwk,
}

impl KeyRecord {
    /// Assemble a record from parts read back from storage.
    ///
    /// The JWK must carry the record's key id and algorithm.
    pub fn from_parts(metadata: KeyMetadata, jwk: Jwk) -> Result<Self> {
        if jwk.kid.as_deref() != Some(metadata.id.as_str()) {
            return Err(Error::reconstruction(
                metadata.id.as_str(),
                "JWK 'kid' does not match record",
            ));
        }
        if jwk.alg.as_deref() != Some(metadata.algorithm.id()) {
            return Err(Error::reconstruction(
                metadata.id.as_str(),
                "JWK 'alg' does not match record",
            ));
        }
        Ok(Self { metadata, jwk })
    }

    /// Record metadata
    pub fn metadata(&self) -> &KeyMetadata {
        &self.metadata
    }

    /// Key id
    pub fn key_id(&self) -> &KeyId {
        &self.metadata.id
    }

    /// Algorithm
    pub fn algorithm(&self) -> Algorithm {
        self.metadata.algorithm
    }

    /// Signing or encryption slot
    pub fn key_use(&self) -> KeyUse {
        self.metadata.key_use
    }

    /// Creation time
    pub fn created_at(&self) -> SystemTime {
        self.metadata.created_at
    }

    /// Expiry time
    pub fn expires_at(&self) -> SystemTime {
        self.metadata.expires_at
    }

    /// Whether the record has expired at `now`
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.metadata.is_expired_at(now)
    }

    /// The full JWK, private members included
    pub fn private_jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// The publishable JWK; `None` for symmetric keys
    pub fn public_jwk(&self) -> Option<Jwk> {
        self.jwk.to_public()
    }

    /// Recency order: later `created_at` first is "greater"; equal timestamps
    /// fall back to the lexicographically greater key id.
    pub fn recency_cmp(&self, other: &Self) -> Ordering {
        self.created_at()
            .cmp(&other.created_at())
            .then_with(|| self.key_id().cmp(other.key_id()))
    }
}

/// Converts between native key material and JWK records.
pub struct JwkConverter;

impl JwkConverter {
    /// Build the record for freshly generated material.
    pub fn to_record(
        generated: &GeneratedKey,
        created_at: SystemTime,
        validity: Duration,
    ) -> Result<KeyRecord> {
        let jwk = Self::to_jwk(&generated.material, &generated.key_id, generated.algorithm)?;
        let metadata = KeyMetadata {
            id: generated.key_id.clone(),
            algorithm: generated.algorithm,
            key_use: generated.algorithm.key_use(),
            created_at,
            expires_at: created_at + validity,
        };
        Ok(KeyRecord { metadata, jwk })
    }

    /// Reconstruct the private key held by a record.
    ///
    /// # Errors
    /// [`Error::KeyReconstructionFailure`] if any private member is missing,
    /// malformed or inconsistent with the public members.
    pub fn from_record(record: &KeyRecord) -> Result<KeyMaterial> {
        let kid = record.key_id().as_str();
        let jwk = record.private_jwk();
        let algorithm = record.algorithm();
        if jwk.kty != algorithm.key_type().jwk_kty() {
            return Err(Error::reconstruction(
                kid,
                format!("'kty' {} does not fit {}", jwk.kty, algorithm),
            ));
        }

        match algorithm {
            Algorithm::Rsa(..) => rsa_from_jwk(kid, jwk).map(KeyMaterial::Rsa),
            Algorithm::Ecdsa(curve) => ec_from_jwk(kid, jwk, curve),
            Algorithm::Hmac(_) | Algorithm::AesKeyWrap(_) => {
                let k = decode_member(kid, jwk, "k", &jwk.k)?;
                // generated secrets have one fixed length; anything else was altered
                if Some(k.len()) != algorithm.secret_len() {
                    return Err(Error::reconstruction(
                        kid,
                        format!("'k' is {} bytes, not a {} secret", k.len(), algorithm),
                    ));
                }
                SecretKey::from_bytes(k, algorithm)
                    .map(KeyMaterial::Symmetric)
                    .map_err(|e| Error::reconstruction(kid, e.to_string()))
            }
        }
    }

    /// Encode native key material as a full private JWK
    pub fn to_jwk(material: &KeyMaterial, kid: &KeyId, algorithm: Algorithm) -> Result<Jwk> {
        if !material.supports(algorithm) {
            return Err(Error::unsupported_algorithm(
                algorithm.id(),
                format!("cannot describe a {} key", material.key_type()),
            ));
        }
        let mut jwk = Jwk {
            kty: algorithm.key_type().jwk_kty().to_string(),
            kid: Some(kid.to_string()),
            alg: Some(algorithm.id().to_string()),
            key_use: Some(algorithm.key_use()),
            ..Jwk::default()
        };

        match material {
            KeyMaterial::Rsa(key) => {
                let primes = key.primes();
                if primes.len() != 2 {
                    return Err(Error::crypto_with_key(
                        "to_jwk",
                        format!("multi-prime RSA keys ({} primes) are not supported", primes.len()),
                        kid.as_str(),
                    ));
                }
                let missing_crt = || {
                    Error::crypto_with_key("to_jwk", "RSA CRT values not precomputed", kid.as_str())
                };
                let dp = key.dp().ok_or_else(missing_crt)?;
                let dq = key.dq().ok_or_else(missing_crt)?;
                let qi = key.crt_coefficient().ok_or_else(missing_crt)?;

                jwk.n = Some(encode_uint(key.n()));
                jwk.e = Some(encode_uint(key.e()));
                jwk.d = Some(encode_uint(key.d()));
                jwk.p = Some(encode_uint(&primes[0]));
                jwk.q = Some(encode_uint(&primes[1]));
                jwk.dp = Some(encode_uint(dp));
                jwk.dq = Some(encode_uint(dq));
                jwk.qi = Some(encode_uint(&qi));
            }
            KeyMaterial::EcP256(secret) => {
                let point = secret.public_key().to_encoded_point(false);
                set_ec_members(&mut jwk, Curve::P256, &secret.to_bytes(), point.as_bytes());
            }
            KeyMaterial::EcP384(secret) => {
                let point = secret.public_key().to_encoded_point(false);
                set_ec_members(&mut jwk, Curve::P384, &secret.to_bytes(), point.as_bytes());
            }
            KeyMaterial::EcP521(secret) => {
                let point = secret.public_key().to_encoded_point(false);
                set_ec_members(&mut jwk, Curve::P521, &secret.to_bytes(), point.as_bytes());
            }
            KeyMaterial::Symmetric(secret) => {
                jwk.k = Some(URL_SAFE_NO_PAD.encode(secret.expose_secret()));
            }
        }
        Ok(jwk)
    }

    /// Build a verifier / key-encryption key from a public JWK.
    pub fn public_key_from_jwk(jwk: &Jwk) -> Result<PublicKey> {
        let kid = jwk.kid.as_deref().unwrap_or("<no kid>");
        match jwk.kty.as_str() {
            "RSA" => {
                let n = decode_uint(kid, jwk, "n", &jwk.n)?;
                let e = decode_uint(kid, jwk, "e", &jwk.e)?;
                RsaPublicKey::new(n, e)
                    .map(PublicKey::Rsa)
                    .map_err(|err| {
                        Error::reconstruction(kid, format!("invalid RSA public key: {}", err))
                    })
            }
            "EC" => {
                let crv = jwk
                    .crv
                    .as_deref()
                    .ok_or_else(|| Error::reconstruction(kid, "missing EC member 'crv'"))?;
                let curve = Curve::from_crv(crv)?;
                let sec1 = sec1_from_jwk(kid, jwk, curve)?;
                let invalid = |e: p256::elliptic_curve::Error| {
                    Error::reconstruction(kid, format!("invalid {} point: {}", crv, e))
                };
                match curve {
                    Curve::P256 => p256::PublicKey::from_sec1_bytes(&sec1)
                        .map(PublicKey::EcP256)
                        .map_err(invalid),
                    Curve::P384 => p384::PublicKey::from_sec1_bytes(&sec1)
                        .map(PublicKey::EcP384)
                        .map_err(invalid),
                    Curve::P521 => p521::PublicKey::from_sec1_bytes(&sec1)
                        .map(PublicKey::EcP521)
                        .map_err(invalid),
                }
            }
            other => Err(Error::unsupported_algorithm(other, "key type has no public form")),
        }
    }
}

fn encode_uint(value: &BigUint) -> String {
    URL_SAFE_NO_PAD.encode(value.to_bytes_be())
}

fn decode_member(kid: &str, jwk: &Jwk, name: &str, member: &Option<String>) -> Result<Vec<u8>> {
    let value = member
        .as_deref()
        .ok_or_else(|| {
            Error::reconstruction(kid, format!("missing {} member '{}'", jwk.kty, name))
        })?;
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| {
            Error::reconstruction(kid, format!("member '{}' is not base64url: {}", name, e))
        })
}

fn decode_uint(kid: &str, jwk: &Jwk, name: &str, member: &Option<String>) -> Result<BigUint> {
    decode_member(kid, jwk, name, member).map(|bytes| BigUint::from_bytes_be(&bytes))
}

fn rsa_from_jwk(kid: &str, jwk: &Jwk) -> Result<RsaPrivateKey> {
    let n = decode_uint(kid, jwk, "n", &jwk.n)?;
    let e = decode_uint(kid, jwk, "e", &jwk.e)?;
    let d = decode_uint(kid, jwk, "d", &jwk.d)?;
    let p = decode_uint(kid, jwk, "p", &jwk.p)?;
    let q = decode_uint(kid, jwk, "q", &jwk.q)?;
    let dp = decode_uint(kid, jwk, "dp", &jwk.dp)?;
    let dq = decode_uint(kid, jwk, "dq", &jwk.dq)?;
    let qi = decode_uint(kid, jwk, "qi", &jwk.qi)?;

    let mut key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
        .map_err(|err| Error::reconstruction(kid, format!("invalid RSA components: {}", err)))?;
    key.validate()
        .map_err(|err| Error::reconstruction(kid, format!("RSA key failed validation: {}", err)))?;
    key.precompute()
        .map_err(|err| {
            Error::reconstruction(kid, format!("RSA CRT precomputation failed: {}", err))
        })?;

    let crt_matches =
        key.dp() == Some(&dp) && key.dq() == Some(&dq) && key.crt_coefficient() == Some(qi);
    if !crt_matches {
        return Err(Error::reconstruction(kid, "RSA CRT members do not match the primes"));
    }
    Ok(key)
}

fn ec_from_jwk(kid: &str, jwk: &Jwk, curve: Curve) -> Result<KeyMaterial> {
    let crv = jwk
        .crv
        .as_deref()
        .ok_or_else(|| Error::reconstruction(kid, "missing EC member 'crv'"))?;
    if Curve::from_crv(crv)? != curve {
        return Err(Error::reconstruction(kid, format!("curve {} does not fit the algorithm", crv)));
    }
    let d = decode_member(kid, jwk, "d", &jwk.d)?;
    if d.len() != curve.field_len() {
        return Err(Error::reconstruction(
            kid,
            format!("EC member 'd' must be {} bytes", curve.field_len()),
        ));
    }
    let expected_point = sec1_from_jwk(kid, jwk, curve)?;

    let invalid = |e: p256::elliptic_curve::Error| {
        Error::reconstruction(kid, format!("invalid EC scalar: {}", e))
    };
    let (material, point) = match curve {
        Curve::P256 => {
            let secret = p256::SecretKey::from_slice(&d).map_err(invalid)?;
            let point = secret.public_key().to_encoded_point(false).as_bytes().to_vec();
            (KeyMaterial::EcP256(secret), point)
        }
        Curve::P384 => {
            let secret = p384::SecretKey::from_slice(&d).map_err(invalid)?;
            let point = secret.public_key().to_encoded_point(false).as_bytes().to_vec();
            (KeyMaterial::EcP384(secret), point)
        }
        Curve::P521 => {
            let secret = p521::SecretKey::from_slice(&d).map_err(invalid)?;
            let point = secret.public_key().to_encoded_point(false).as_bytes().to_vec();
            (KeyMaterial::EcP521(secret), point)
        }
    };
    if point != expected_point {
        return Err(Error::reconstruction(kid, "EC public point does not match the private scalar"));
    }
    Ok(material)
}

fn sec1_from_jwk(kid: &str, jwk: &Jwk, curve: Curve) -> Result<Vec<u8>> {
    let x = decode_member(kid, jwk, "x", &jwk.x)?;
    let y = decode_member(kid, jwk, "y", &jwk.y)?;
    let len = curve.field_len();
    if x.len() != len || y.len() != len {
        return Err(Error::reconstruction(kid, format!("EC coordinates must be {} bytes", len)));
    }
    let mut sec1 = Vec::with_capacity(1 + 2 * len);
    sec1.push(0x04);
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);
    Ok(sec1)
}

fn set_ec_members(jwk: &mut Jwk, curve: Curve, d: &[u8], sec1: &[u8]) {
    let len = curve.field_len();
    jwk.crv = Some(curve.crv().to_string());
    jwk.x = Some(URL_SAFE_NO_PAD.encode(&sec1[1..1 + len]));
    jwk.y = Some(URL_SAFE_NO_PAD.encode(&sec1[1 + len..]));
    jwk.d = Some(URL_SAFE_NO_PAD.encode(d));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KeyGenerator, KeyMaterialFactory};
    use crate::error::ErrorCode;
    use base64::Engine as _;
    use rand_chacha::ChaCha12Rng;
    use rand_core::SeedableRng;

    fn record_for(algorithm: Algorithm, seed: u64) -> (GeneratedKey, KeyRecord) {
        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        let generated = KeyMaterialFactory::default()
            .generate_with_params(&mut rng, algorithm.into())
            .unwrap();
        let validity = Duration::from_secs(60);
        let record = JwkConverter::to_record(&generated, SystemTime::now(), validity).unwrap();
        (generated, record)
    }

    #[test]
    fn test_rsa_record_keeps_every_private_member() {
        let (generated, record) = record_for(Algorithm::RS256, 1);
        let jwk = record.private_jwk();
        for member in [&jwk.n, &jwk.e, &jwk.d, &jwk.p, &jwk.q, &jwk.dp, &jwk.dq, &jwk.qi] {
            assert!(member.is_some());
        }

        let restored = JwkConverter::from_record(&record).unwrap();
        match (&generated.material, &restored) {
            (KeyMaterial::Rsa(original), KeyMaterial::Rsa(restored)) => {
                assert_eq!(original.d(), restored.d());
                assert_eq!(original.primes(), restored.primes());
                assert_eq!(original.dp(), restored.dp());
                assert_eq!(original.crt_coefficient(), restored.crt_coefficient());
            }
            other => panic!("unexpected materials {:?}", other),
        }
    }

    #[test]
    fn test_missing_rsa_member_is_a_reconstruction_failure() {
        let (_, record) = record_for(Algorithm::PS256, 2);
        let mut jwk = record.private_jwk().clone();
        jwk.qi = None;
        let damaged = KeyRecord::from_parts(record.metadata().clone(), jwk).unwrap();

        let err = JwkConverter::from_record(&damaged).unwrap_err();
        assert_eq!(err.code(), ErrorCode::KeyReconstructionFailure);
        assert!(err.to_string().contains("qi"));
    }

    #[test]
    fn test_mismatched_crt_member_is_rejected() {
        let (_, record) = record_for(Algorithm::RS384, 3);
        let mut jwk = record.private_jwk().clone();
        jwk.dp = jwk.dq.clone();
        let damaged = KeyRecord::from_parts(record.metadata().clone(), jwk).unwrap();

        let err = JwkConverter::from_record(&damaged).unwrap_err();
        assert_eq!(err.code(), ErrorCode::KeyReconstructionFailure);
    }

    #[test]
    fn test_ec_round_trip_and_point_check() {
        for (alg, seed) in [(Algorithm::ES256, 4), (Algorithm::ES384, 5), (Algorithm::ES512, 6)] {
            let (generated, record) = record_for(alg, seed);
            let restored = JwkConverter::from_record(&record).unwrap();
            assert_eq!(
                JwkConverter::to_jwk(&restored, record.key_id(), alg).unwrap(),
                *record.private_jwk()
            );
            assert_eq!(
                generated.material.sign(alg, b"msg").unwrap(),
                restored.sign(alg, b"msg").unwrap()
            );
        }

        let (_, record) = record_for(Algorithm::ES256, 7);
        let (_, other) = record_for(Algorithm::ES256, 8);
        let mut jwk = record.private_jwk().clone();
        jwk.x = other.private_jwk().x.clone();
        let damaged = KeyRecord::from_parts(record.metadata().clone(), jwk).unwrap();
        let err = JwkConverter::from_record(&damaged).unwrap_err();
        assert_eq!(err.code(), ErrorCode::KeyReconstructionFailure);
    }

    #[test]
    fn test_ec_missing_scalar_never_degrades_to_public() {
        let (_, record) = record_for(Algorithm::ES256, 10);
        let mut jwk = record.private_jwk().clone();
        jwk.d = None;
        let damaged = KeyRecord::from_parts(record.metadata().clone(), jwk).unwrap();
        let err = JwkConverter::from_record(&damaged).unwrap_err();
        assert_eq!(err.code(), ErrorCode::KeyReconstructionFailure);
    }

    #[test]
    fn test_unknown_curve_in_record() {
        let (_, record) = record_for(Algorithm::ES256, 11);
        let mut jwk = record.private_jwk().clone();
        jwk.crv = Some("secp256k1".to_string());
        let damaged = KeyRecord::from_parts(record.metadata().clone(), jwk).unwrap();
        let err = JwkConverter::from_record(&damaged).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedCurve);
    }

    #[test]
    fn test_truncated_hmac_secret_is_rejected() {
        for (alg, seed, keep) in [(Algorithm::HS256, 13, 32), (Algorithm::HS512, 14, 64)] {
            let (_, record) = record_for(alg, seed);
            let secret = URL_SAFE_NO_PAD.decode(record.private_jwk().k.as_ref().unwrap()).unwrap();
            assert_eq!(Some(secret.len()), alg.secret_len());
            assert!(JwkConverter::from_record(&record).is_ok());

            // still as long as the hash output, but not what was generated
            let mut jwk = record.private_jwk().clone();
            jwk.k = Some(URL_SAFE_NO_PAD.encode(&secret[..keep]));
            let damaged = KeyRecord::from_parts(record.metadata().clone(), jwk).unwrap();
            let err = JwkConverter::from_record(&damaged).unwrap_err();
            assert_eq!(err.code(), ErrorCode::KeyReconstructionFailure, "{}", alg);
        }
    }

    #[test]
    fn test_public_projection_strips_private_members() {
        let (_, record) = record_for(Algorithm::RS512, 12);
        let public = record.public_jwk().unwrap();
        assert!(!public.has_private_parameters());
        assert_eq!(public.kid.as_deref(), Some(record.key_id().as_str()));
        assert_eq!(public.key_use, Some(KeyUse::Signing));

        let json = serde_json::to_string(&public).unwrap();
        for member in ["\"d\"", "\"p\"", "\"q\"", "\"dp\"", "\"dq\"", "\"qi\""] {
            assert!(!json.contains(member), "{} leaked into {}", member, json);
        }
        assert!(json.contains("\"use\":\"sig\""));

        let (_, symmetric) = record_for(Algorithm::HS256, 13);
        assert!(symmetric.public_jwk().is_none());
    }

    #[test]
    fn test_public_key_from_published_jwk_verifies() {
        let (generated, record) = record_for(Algorithm::ES256, 14);
        let signature = generated.material.sign(Algorithm::ES256, b"token").unwrap();
        let public = PublicKey::from_jwk(&record.public_jwk().unwrap()).unwrap();
        assert!(public.verify(Algorithm::ES256, b"token", &signature).unwrap());
    }

    #[test]
    fn test_record_parts_must_agree() {
        let (_, record) = record_for(Algorithm::A256KW, 15);
        let mut jwk = record.private_jwk().clone();
        jwk.alg = Some("A128KW".to_string());
        let err = KeyRecord::from_parts(record.metadata().clone(), jwk).unwrap_err();
        assert_eq!(err.code(), ErrorCode::KeyReconstructionFailure);
    }

    #[test]
    fn test_recency_tie_break_uses_key_id() {
        let (_, a) = record_for(Algorithm::HS256, 16);
        let mut metadata = a.metadata().clone();
        metadata.id = KeyId::from("zzzz");
        let mut jwk = a.private_jwk().clone();
        jwk.kid = Some("zzzz".to_string());
        let b = KeyRecord::from_parts(metadata, jwk).unwrap();

        assert_eq!(a.created_at(), b.created_at());
        assert_eq!(b.recency_cmp(&a), Ordering::Greater);
    }
}
