//! Storage backend traits and implementations
//!
//! A [`KeyStore`] is the single source of truth for key records. It decides
//! which record is current, so every backend shares the selection helpers in
//! this module: the current key of a slot is the most recently created
//! non-expired record, and records created at the same instant are ordered by
//! key id.

use crate::clock::{Clock, SystemClock};
use crate::crypto::{random_nonce, Argon2Params, RuntimeAead, SecureRandom, StorageCipher, StorageKey};
use crate::jwk::{Jwk, KeyRecord};
use crate::{Error, KeyId, KeyMetadata, KeyUse, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Trait for key storage backends
///
/// Methods take `&self`; implementations serialize writers internally so a
/// store can be shared between threads behind an `Arc`.
pub trait KeyStore: Send + Sync {
    /// True if the slot has no current key
    fn needs_update(&self, key_use: KeyUse) -> Result<bool>;

    /// The current record of the slot
    ///
    /// # Errors
    /// [`Error::NoCurrentKey`] if every record is expired or none exists.
    fn get_current_key(&self, key_use: KeyUse) -> Result<KeyRecord>;

    /// Persist a new record. Existing records are never overwritten.
    fn save(&self, record: KeyRecord) -> Result<()>;

    /// The `n` most recent records of the slot, newest first, expired ones
    /// included
    fn get_last(&self, key_use: KeyUse, n: usize) -> Result<Vec<KeyRecord>>;
}

impl<T: KeyStore + ?Sized> KeyStore for Arc<T> {
    fn needs_update(&self, key_use: KeyUse) -> Result<bool> {
        (**self).needs_update(key_use)
    }

    fn get_current_key(&self, key_use: KeyUse) -> Result<KeyRecord> {
        (**self).get_current_key(key_use)
    }

    fn save(&self, record: KeyRecord) -> Result<()> {
        (**self).save(record)
    }

    fn get_last(&self, key_use: KeyUse, n: usize) -> Result<Vec<KeyRecord>> {
        (**self).get_last(key_use, n)
    }
}

/// Trait for stores backed by durable storage
pub trait PersistentStorage: KeyStore {
    /// Re-read every record from the backing storage, returning how many
    /// loaded
    fn load(&self) -> Result<usize>;

    /// Get the storage location/path
    fn location(&self) -> &str;
}

/// Configuration shared by the built-in stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for [`FileStore::from_config`]
    pub path: Option<PathBuf>,
    /// Seal private key members at rest
    pub encrypted: bool,
    /// AEAD used when `encrypted` is set
    pub cipher: StorageCipher,
    /// Keep only this many records per key use; `None` keeps everything
    pub retain: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            encrypted: false,
            cipher: StorageCipher::default(),
            retain: None,
        }
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        if self.retain == Some(0) {
            return Err(Error::ConfigurationError {
                message: "retain must keep at least one record".to_string(),
            });
        }
        Ok(())
    }
}

/// The current record among `records` for `key_use` at `now`.
pub fn select_current<'a, I>(
    records: I,
    key_use: KeyUse,
    now: std::time::SystemTime,
) -> Option<&'a KeyRecord>
where
    I: IntoIterator<Item = &'a KeyRecord>,
{
    records
        .into_iter()
        .filter(|r| r.key_use() == key_use && !r.is_expired_at(now))
        .max_by(|a, b| a.recency_cmp(b))
}

/// The `n` most recent records for `key_use`, newest first.
pub fn newest_first<'a, I>(records: I, key_use: KeyUse, n: usize) -> Vec<KeyRecord>
where
    I: IntoIterator<Item = &'a KeyRecord>,
{
    let mut matching: Vec<&KeyRecord> = records.into_iter().filter(|r| r.key_use() == key_use).collect();
    matching.sort_by(|a, b| b.recency_cmp(a));
    matching.into_iter().take(n).cloned().collect()
}

/// Drop all but the newest `retain` records of `key_use`, returning the
/// evicted ones.
fn evict_beyond(
    records: &mut Vec<KeyRecord>,
    key_use: KeyUse,
    retain: Option<usize>,
) -> Vec<KeyRecord> {
    let Some(retain) = retain else {
        return Vec::new();
    };
    let keep: Vec<KeyId> = newest_first(records.iter(), key_use, retain)
        .into_iter()
        .map(|r| r.key_id().clone())
        .collect();
    let (evicted, kept): (Vec<_>, Vec<_>) = records
        .drain(..)
        .partition(|r| r.key_use() == key_use && !keep.contains(r.key_id()));
    *records = kept;
    evicted
}

fn poisoned(operation: &str) -> Error {
    Error::storage(operation, "lock poisoned")
}

fn duplicate(id: &KeyId) -> Error {
    Error::storage("save", format!("record {} already exists", id))
}

/// In-memory key store
///
/// Records live for the lifetime of the process. Useful for tests and for
/// single-instance deployments that accept a fresh key set on restart.
pub struct MemoryStore {
    records: RwLock<Vec<KeyRecord>>,
    clock: Arc<dyn Clock>,
    config: StorageConfig,
}

impl MemoryStore {
    /// Create an empty store on the system clock
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            clock: Arc::new(SystemClock),
            config: StorageConfig::default(),
        }
    }

    /// Use `clock` for expiry decisions
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Apply a storage configuration; only `retain` is meaningful here
    pub fn with_config(mut self, config: StorageConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Number of records held, all slots together
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for MemoryStore {
    fn needs_update(&self, key_use: KeyUse) -> Result<bool> {
        let records = self.records.read().map_err(|_| poisoned("needs_update"))?;
        Ok(select_current(records.iter(), key_use, self.clock.now()).is_none())
    }

    fn get_current_key(&self, key_use: KeyUse) -> Result<KeyRecord> {
        let records = self.records.read().map_err(|_| poisoned("get_current_key"))?;
        select_current(records.iter(), key_use, self.clock.now())
            .cloned()
            .ok_or_else(|| Error::NoCurrentKey {
                key_use: key_use.to_string(),
            })
    }

    fn save(&self, record: KeyRecord) -> Result<()> {
        let mut records = self.records.write().map_err(|_| poisoned("save"))?;
        if records.iter().any(|r| r.key_id() == record.key_id()) {
            return Err(duplicate(record.key_id()));
        }
        let key_use = record.key_use();
        records.push(record);

        let evicted = evict_beyond(&mut records, key_use, self.config.retain);
        if !evicted.is_empty() {
            debug!(key_use = %key_use, evicted = evicted.len(), "retention dropped old records");
        }
        Ok(())
    }

    fn get_last(&self, key_use: KeyUse, n: usize) -> Result<Vec<KeyRecord>> {
        let records = self.records.read().map_err(|_| poisoned("get_last"))?;
        Ok(newest_first(records.iter(), key_use, n))
    }
}

const SALT_FILE: &str = "keyring.salt";
const CHECK_FILE: &str = "keyring.check";
const SALT_LEN: usize = 16;
const CHECK_PLAINTEXT: &[u8] = b"rust-jwks storage key check";

/// On-disk form of one record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedRecord {
    metadata: KeyMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jwk: Option<Jwk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sealed: Option<SealedBlob>,
}

/// AEAD-sealed bytes, base64url encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedBlob {
    cipher: StorageCipher,
    nonce: String,
    ciphertext: String,
}

/// File-based key store with optional encryption at rest
///
/// Each record is one `<kid>.json` file in a directory. Every record is loaded
/// when the store opens; afterwards reads are served from memory and `save`
/// writes through to disk before the record becomes visible.
pub struct FileStore {
    /// Directory path for key storage
    path: PathBuf,
    location: String,
    records: RwLock<Vec<KeyRecord>>,
    config: StorageConfig,
    /// Master key for encryption, set if `config.encrypted`
    storage_key: Option<StorageKey>,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    /// Open a plaintext store at `path`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(path: P, config: StorageConfig) -> Result<Self> {
        if config.encrypted {
            return Err(Error::ConfigurationError {
                message: "encrypted file store needs a storage key".to_string(),
            });
        }
        Self::open(path.as_ref(), config, None)
    }

    /// Open a plaintext store at `config.path`
    pub fn from_config(config: StorageConfig) -> Result<Self> {
        let path = config.path.clone().ok_or_else(|| Error::ConfigurationError {
            message: "file store needs a path".to_string(),
        })?;
        Self::new(path, config)
    }

    /// Open a store whose private members are sealed under `key`
    pub fn open_encrypted<P: AsRef<Path>>(
        path: P,
        mut config: StorageConfig,
        key: StorageKey,
    ) -> Result<Self> {
        config.encrypted = true;
        Self::open(path.as_ref(), config, Some(key))
    }

    /// Open an encrypted store with a key derived from `password`.
    ///
    /// The Argon2id salt lives next to the records and is created on first
    /// use.
    pub fn open_with_password<P: AsRef<Path>>(
        path: P,
        config: StorageConfig,
        password: &[u8],
        params: Argon2Params,
    ) -> Result<Self> {
        let path = path.as_ref();
        create_dir(path)?;
        let salt = load_or_create_salt(&path.join(SALT_FILE))?;
        let key = StorageKey::derive_from_password(password, &salt, params)?;
        Self::open_encrypted(path, config, key)
    }

    fn open(path: &Path, config: StorageConfig, storage_key: Option<StorageKey>) -> Result<Self> {
        config.validate()?;
        create_dir(path)?;

        let store = Self {
            path: path.to_path_buf(),
            location: path.display().to_string(),
            records: RwLock::new(Vec::new()),
            config,
            storage_key,
            clock: Arc::new(SystemClock),
        };
        if let Some(key) = &store.storage_key {
            store.check_storage_key(key)?;
        }
        let loaded = store.load()?;
        info!(
            path = %store.location,
            records = loaded,
            encrypted = store.config.encrypted,
            "opened file key store"
        );
        Ok(store)
    }

    /// Use `clock` for expiry decisions
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Get the file path for a key ID
    fn key_path(&self, id: &KeyId) -> Result<PathBuf> {
        let safe = !id.as_str().is_empty()
            && id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(Error::storage("key_path", format!("key id {:?} is not file-safe", id.as_str())));
        }
        Ok(self.path.join(format!("{}.json", id)))
    }

    /// A new store must be opened with the key the directory was sealed with.
    fn check_storage_key(&self, key: &StorageKey) -> Result<()> {
        let path = self.path.join(CHECK_FILE);
        if path.exists() {
            let data = fs::read(&path).map_err(|e| Error::io("read_key_check", e))?;
            let blob: SealedBlob = serde_json::from_slice(&data)
                .map_err(|e| Error::serialization("read_key_check", e.to_string()))?;
            let plaintext = unseal(key, &blob, CHECK_FILE.as_bytes()).map_err(|_| {
                Error::crypto("open_store", "storage key does not match this directory")
            })?;
            if plaintext != CHECK_PLAINTEXT {
                return Err(Error::crypto("open_store", "storage key check is corrupted"));
            }
            return Ok(());
        }

        let blob = seal(key, self.config.cipher, CHECK_PLAINTEXT, CHECK_FILE.as_bytes())?;
        let data = serde_json::to_vec(&blob)
            .map_err(|e| Error::serialization("write_key_check", e.to_string()))?;
        write_new_file(&path, &data)
    }

    /// Serialize and optionally encrypt a record
    fn serialize_record(&self, record: &KeyRecord) -> Result<Vec<u8>> {
        let persisted = match (&self.storage_key, self.config.encrypted) {
            (Some(key), true) => {
                let plaintext = zeroize::Zeroizing::new(
                    serde_json::to_vec(record.private_jwk())
                        .map_err(|e| Error::serialization("seal_record", e.to_string()))?,
                );
                let aad = record.key_id().as_str().as_bytes();
                PersistedRecord {
                    metadata: record.metadata().clone(),
                    jwk: None,
                    sealed: Some(seal(key, self.config.cipher, &plaintext, aad)?),
                }
            }
            (None, true) => return Err(Error::storage("save", "encryption enabled but no storage key set")),
            (_, false) => PersistedRecord {
                metadata: record.metadata().clone(),
                jwk: Some(record.private_jwk().clone()),
                sealed: None,
            },
        };
        serde_json::to_vec_pretty(&persisted).map_err(|e| Error::serialization("save", e.to_string()))
    }

    /// Deserialize and optionally decrypt a record
    fn deserialize_record(&self, data: &[u8]) -> Result<KeyRecord> {
        let persisted: PersistedRecord =
            serde_json::from_slice(data).map_err(|e| Error::serialization("load_record", e.to_string()))?;
        let kid = persisted.metadata.id.clone();

        let jwk = match (persisted.jwk, persisted.sealed) {
            (Some(jwk), None) => jwk,
            (None, Some(blob)) => {
                let key = self
                    .storage_key
                    .as_ref()
                    .ok_or_else(|| {
                        Error::storage("load_record", "sealed record but no storage key available")
                    })?;
                let plaintext = zeroize::Zeroizing::new(unseal(key, &blob, kid.as_str().as_bytes())?);
                serde_json::from_slice(&plaintext)
                    .map_err(|e| Error::serialization("load_record", e.to_string()))?
            }
            _ => {
                return Err(Error::reconstruction(
                    kid.as_str(),
                    "record must hold exactly one of 'jwk' or 'sealed'",
                ))
            }
        };
        KeyRecord::from_parts(persisted.metadata, jwk)
    }

    fn remove_files(&self, evicted: &[KeyRecord]) {
        for record in evicted {
            let removed = self.key_path(record.key_id()).and_then(|path| {
                fs::remove_file(&path).map_err(|e| Error::io("evict_record", e))
            });
            match removed {
                Ok(()) => debug!(kid = %record.key_id(), "retention removed record file"),
                Err(e) => warn!(kid = %record.key_id(), error = %e, "failed to remove evicted record"),
            }
        }
    }
}

impl KeyStore for FileStore {
    fn needs_update(&self, key_use: KeyUse) -> Result<bool> {
        let records = self.records.read().map_err(|_| poisoned("needs_update"))?;
        Ok(select_current(records.iter(), key_use, self.clock.now()).is_none())
    }

    fn get_current_key(&self, key_use: KeyUse) -> Result<KeyRecord> {
        let records = self.records.read().map_err(|_| poisoned("get_current_key"))?;
        select_current(records.iter(), key_use, self.clock.now())
            .cloned()
            .ok_or_else(|| Error::NoCurrentKey {
                key_use: key_use.to_string(),
            })
    }

    fn save(&self, record: KeyRecord) -> Result<()> {
        let key_path = self.key_path(record.key_id())?;
        let data = self.serialize_record(&record)?;

        let mut records = self.records.write().map_err(|_| poisoned("save"))?;
        if records.iter().any(|r| r.key_id() == record.key_id()) {
            return Err(duplicate(record.key_id()));
        }
        write_new_file(&key_path, &data)?;
        debug!(kid = %record.key_id(), path = %key_path.display(), "record written");

        let key_use = record.key_use();
        records.push(record);
        let evicted = evict_beyond(&mut records, key_use, self.config.retain);
        drop(records);
        self.remove_files(&evicted);
        Ok(())
    }

    fn get_last(&self, key_use: KeyUse, n: usize) -> Result<Vec<KeyRecord>> {
        let records = self.records.read().map_err(|_| poisoned("get_last"))?;
        Ok(newest_first(records.iter(), key_use, n))
    }
}

impl PersistentStorage for FileStore {
    fn load(&self) -> Result<usize> {
        let mut loaded = Vec::new();

        // Read all .json files in that directory
        let entries = fs::read_dir(&self.path).map_err(|e| Error::io("load", e))?;
        for entry in entries {
            let path = entry.map_err(|e| Error::io("load", e))?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let record = fs::read(&path)
                .map_err(|e| Error::io("load", e))
                .and_then(|data| self.deserialize_record(&data));
            match record {
                Ok(record) => loaded.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable key record"),
            }
        }

        let count = loaded.len();
        let mut records = self.records.write().map_err(|_| poisoned("load"))?;
        *records = loaded;
        Ok(count)
    }

    fn location(&self) -> &str {
        &self.location
    }
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| Error::StorageError {
        operation: "create_dir".to_string(),
        message: e.to_string(),
        path: Some(path.display().to_string()),
    })
}

/// Write `data` to a fresh file. Fails if `path` exists, so a record is never
/// overwritten.
fn write_new_file(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let written = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp)
        .and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()
        });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(Error::storage_with_path("write_record", e.to_string(), tmp.display().to_string()));
    }

    // hard_link refuses to replace an existing target
    let linked = fs::hard_link(&tmp, path);
    let _ = fs::remove_file(&tmp);
    linked.map_err(|e| Error::storage_with_path("write_record", e.to_string(), path.display().to_string()))
}

fn load_or_create_salt(path: &Path) -> Result<Vec<u8>> {
    if path.exists() {
        let encoded = fs::read_to_string(path).map_err(|e| Error::io("read_salt", e))?;
        return URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|e| Error::storage_with_path("read_salt", e.to_string(), path.display().to_string()));
    }

    let mut rng = <rand_chacha::ChaCha20Rng as rand_core::SeedableRng>::from_entropy();
    let mut salt = vec![0u8; SALT_LEN];
    rng.fill_secure_bytes(&mut salt)?;
    write_new_file(path, URL_SAFE_NO_PAD.encode(&salt).as_bytes())?;
    Ok(salt)
}

fn seal(
    key: &StorageKey,
    cipher: StorageCipher,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<SealedBlob> {
    let nonce = random_nonce(cipher)?;
    let ciphertext = RuntimeAead.encrypt(cipher, key, &nonce, plaintext, aad)?;
    Ok(SealedBlob {
        cipher,
        nonce: URL_SAFE_NO_PAD.encode(nonce),
        ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
    })
}

fn unseal(key: &StorageKey, blob: &SealedBlob, aad: &[u8]) -> Result<Vec<u8>> {
    let decode = |value: &str| {
        URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|e| Error::serialization("unseal", e.to_string()))
    };
    let nonce = decode(&blob.nonce)?;
    let ciphertext = decode(&blob.ciphertext)?;
    RuntimeAead.decrypt(blob.cipher, key, &nonce, &ciphertext, aad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::crypto::KeyMaterialFactory;
    use crate::error::ErrorCode;
    use crate::jwk::JwkConverter;
    use crate::Algorithm;
    use std::time::{Duration, SystemTime};

    fn record_at(algorithm: Algorithm, created_at: SystemTime, validity: Duration) -> KeyRecord {
        let generated = KeyMaterialFactory::default().generate(algorithm).unwrap();
        JwkConverter::to_record(&generated, created_at, validity).unwrap()
    }

    fn with_kid(record: &KeyRecord, kid: &str) -> KeyRecord {
        let mut metadata = record.metadata().clone();
        metadata.id = KeyId::from(kid);
        let mut jwk = record.private_jwk().clone();
        jwk.kid = Some(kid.to_string());
        KeyRecord::from_parts(metadata, jwk).unwrap()
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert!(!config.encrypted);
        assert_eq!(config.cipher, StorageCipher::ChaCha20Poly1305);
        assert_eq!(config.retain, None);
    }

    #[test]
    fn test_empty_store_needs_update() {
        let store = MemoryStore::new();
        assert!(store.needs_update(KeyUse::Signing).unwrap());
        let err = store.get_current_key(KeyUse::Signing).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoCurrentKey);
        assert!(store.get_last(KeyUse::Signing, 5).unwrap().is_empty());
    }

    #[test]
    fn test_current_key_is_most_recent_non_expired() {
        let clock = ManualClock::default();
        let store = MemoryStore::new().with_clock(clock.clone());
        let now = clock.now();

        let old = record_at(Algorithm::HS256, now - Duration::from_secs(20), Duration::from_secs(100));
        let new = record_at(Algorithm::HS256, now - Duration::from_secs(10), Duration::from_secs(100));
        store.save(old.clone()).unwrap();
        store.save(new.clone()).unwrap();

        assert!(!store.needs_update(KeyUse::Signing).unwrap());
        assert_eq!(store.get_current_key(KeyUse::Signing).unwrap().key_id(), new.key_id());

        // the signing slot does not leak into the encryption slot
        assert!(store.needs_update(KeyUse::Encryption).unwrap());

        clock.advance(Duration::from_secs(90));
        assert!(store.needs_update(KeyUse::Signing).unwrap());
        assert_eq!(store.get_last(KeyUse::Signing, 10).unwrap().len(), 2);
    }

    #[test]
    fn test_equal_timestamps_prefer_greater_key_id() {
        let clock = ManualClock::default();
        let store = MemoryStore::new().with_clock(clock.clone());
        let base = record_at(Algorithm::HS256, clock.now(), Duration::from_secs(60));

        store.save(with_kid(&base, "BBBB")).unwrap();
        store.save(with_kid(&base, "bbbb")).unwrap();
        store.save(with_kid(&base, "AAAA")).unwrap();

        for _ in 0..3 {
            assert_eq!(store.get_current_key(KeyUse::Signing).unwrap().key_id().as_str(), "bbbb");
        }
        let last: Vec<String> = store
            .get_last(KeyUse::Signing, 3)
            .unwrap()
            .iter()
            .map(|r| r.key_id().to_string())
            .collect();
        assert_eq!(last, ["bbbb", "BBBB", "AAAA"]);
    }

    #[test]
    fn test_save_never_overwrites() {
        let store = MemoryStore::new();
        let record = record_at(Algorithm::A128KW, SystemTime::now(), Duration::from_secs(60));
        store.save(record.clone()).unwrap();
        let err = store.save(record).unwrap_err();
        assert_eq!(err.code(), ErrorCode::StorageFailure);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_retention_keeps_newest_per_use() {
        let clock = ManualClock::default();
        let config = StorageConfig {
            retain: Some(2),
            ..StorageConfig::default()
        };
        let store = MemoryStore::new().with_clock(clock.clone()).with_config(config).unwrap();
        let validity = Duration::from_secs(3600);

        let enc = record_at(Algorithm::A128KW, clock.now(), validity);
        store.save(enc.clone()).unwrap();
        let mut signing = Vec::new();
        for i in 0..4 {
            let record = record_at(Algorithm::HS256, clock.now() + Duration::from_secs(i), validity);
            store.save(record.clone()).unwrap();
            signing.push(record);
        }

        let last = store.get_last(KeyUse::Signing, 10).unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].key_id(), signing[3].key_id());
        assert_eq!(last[1].key_id(), signing[2].key_id());
        assert_eq!(store.get_last(KeyUse::Encryption, 10).unwrap().len(), 1);

        let config = StorageConfig {
            retain: Some(0),
            ..StorageConfig::default()
        };
        assert!(MemoryStore::new().with_config(config).is_err());
    }

    #[test]
    fn test_file_store_reloads_records() {
        let dir = tempfile::tempdir().unwrap();
        let record = record_at(Algorithm::ES256, SystemTime::now(), Duration::from_secs(3600));
        {
            let store = FileStore::new(dir.path(), StorageConfig::default()).unwrap();
            store.save(record.clone()).unwrap();
            assert!(store.save(record.clone()).is_err());
        }

        let store = FileStore::new(dir.path(), StorageConfig::default()).unwrap();
        let current = store.get_current_key(KeyUse::Signing).unwrap();
        assert_eq!(current, record);
        assert_eq!(store.location(), dir.path().display().to_string());
    }

    #[test]
    fn test_file_store_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("garbage.json"), b"{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let store = FileStore::new(dir.path(), StorageConfig::default()).unwrap();
        assert_eq!(store.load().unwrap(), 0);
        assert!(store.needs_update(KeyUse::Signing).unwrap());
    }

    #[test]
    fn test_encrypted_file_store_hides_private_members() {
        let dir = tempfile::tempdir().unwrap();
        let key = StorageKey::generate().unwrap();
        let record = record_at(Algorithm::HS384, SystemTime::now(), Duration::from_secs(3600));
        let secret = record.private_jwk().k.clone().unwrap();

        let store = FileStore::open_encrypted(dir.path(), StorageConfig::default(), key.clone()).unwrap();
        store.save(record.clone()).unwrap();

        let on_disk = fs::read_to_string(dir.path().join(format!("{}.json", record.key_id()))).unwrap();
        assert!(on_disk.contains("sealed"));
        assert!(!on_disk.contains(&secret));

        let reopened = FileStore::open_encrypted(dir.path(), StorageConfig::default(), key).unwrap();
        assert_eq!(reopened.get_current_key(KeyUse::Signing).unwrap(), record);

        let err = FileStore::open_encrypted(dir.path(), StorageConfig::default(), StorageKey::generate().unwrap())
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::CryptoFailure);
    }

    #[test]
    fn test_encrypted_config_requires_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            encrypted: true,
            ..StorageConfig::default()
        };
        let err = FileStore::new(dir.path(), config).err().unwrap();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
        assert_eq!(
            FileStore::from_config(StorageConfig::default()).err().unwrap().code(),
            ErrorCode::ConfigurationError
        );
    }
}
