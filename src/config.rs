//! Key set options
//!
//! One [`KeySetOptions`] value is built at startup and handed to the service;
//! individual calls may pass a different snapshot without touching the default.

use crate::algorithm::{Algorithm, ContentEncryption};
use crate::crypto::{self, KeyMaterialFactory};
use crate::{Error, KeyUse, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Algorithm choice and rotation window for generated keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySetOptions {
    /// Signing algorithm for new signing keys
    pub jws: Algorithm,
    /// Key management algorithm for new encryption keys
    pub jwe: Algorithm,
    /// Content encryption advertised with encrypting credentials
    pub enc: ContentEncryption,
    /// Validity window of a new key, in days
    pub days_until_expire: u64,
    /// RSA modulus size in bits
    pub rsa_key_size: usize,
}

impl Default for KeySetOptions {
    fn default() -> Self {
        Self {
            jws: Algorithm::PS256,
            jwe: Algorithm::RSA_OAEP_256,
            enc: ContentEncryption::default(),
            days_until_expire: 90,
            rsa_key_size: KeyMaterialFactory::DEFAULT_RSA_KEY_SIZE,
        }
    }
}

/// Options as written on disk, before algorithm names are resolved
#[derive(Deserialize)]
struct RawKeySetOptions {
    #[serde(default)]
    jws: Option<String>,
    #[serde(default)]
    jwe: Option<String>,
    #[serde(default)]
    enc: Option<ContentEncryption>,
    #[serde(default)]
    days_until_expire: Option<u64>,
    #[serde(default)]
    rsa_key_size: Option<usize>,
}

impl KeySetOptions {
    /// Check the options before any key is generated.
    ///
    /// # Errors
    /// - [`Error::UnsupportedAlgorithm`] if `jws` is not a signing algorithm or
    ///   `jwe` is not a key encryption algorithm
    /// - [`Error::WeakKeyRequested`] if `rsa_key_size` is below 2048
    /// - [`Error::ConfigurationError`] if `rsa_key_size` is above 4096 or
    ///   `days_until_expire` is zero
    pub fn validate(&self) -> Result<()> {
        self.jws.ensure_use(KeyUse::Signing)?;
        self.jwe.ensure_use(KeyUse::Encryption)?;
        crypto::check_rsa_size(self.rsa_key_size)?;
        if self.days_until_expire == 0 {
            return Err(Error::ConfigurationError {
                message: "days_until_expire must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Validity window as a duration
    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.days_until_expire.saturating_mul(SECONDS_PER_DAY))
    }

    /// Algorithm configured for a key slot
    pub fn algorithm_for(&self, key_use: KeyUse) -> Algorithm {
        match key_use {
            KeyUse::Signing => self.jws,
            KeyUse::Encryption => self.jwe,
        }
    }

    /// Parse and validate options from JSON; missing fields take defaults.
    ///
    /// Algorithm names go through the catalog, so an unknown `jws` or `jwe`
    /// is an [`Error::UnsupportedAlgorithm`] rather than a parse failure.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawKeySetOptions = serde_json::from_str(json).map_err(|e| {
            Error::serialization("options_from_json", format!("invalid key set options: {}", e))
        })?;
        let defaults = Self::default();
        let options = Self {
            jws: raw.jws.as_deref().map_or(Ok(defaults.jws), str::parse::<Algorithm>)?,
            jwe: raw.jwe.as_deref().map_or(Ok(defaults.jwe), str::parse::<Algorithm>)?,
            enc: raw.enc.unwrap_or(defaults.enc),
            days_until_expire: raw.days_until_expire.unwrap_or(defaults.days_until_expire),
            rsa_key_size: raw.rsa_key_size.unwrap_or(defaults.rsa_key_size),
        };
        options.validate()?;
        Ok(options)
    }

    /// Read options from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::io("read_options", e))?;
        Self::from_json(&json)
    }
}
