//! The key set service: rotation policy and credential resolution
//!
//! Each key slot (signing, encryption) moves independently through
//! `NoKey -> Current -> Expired -> Current`. The service keeps no state of its
//! own between calls; every decision is read from the [`KeyStore`].

use crate::audit::{AuditEvent, AuditLogEntry, AuditLogger};
use crate::clock::{Clock, SystemClock};
use crate::config::KeySetOptions;
use crate::credentials::{EncryptingCredential, SigningCredential};
use crate::crypto::KeyMaterialFactory;
use crate::jwk::{Jwk, JwkConverter, JwkSet, KeyRecord};
use crate::storage::KeyStore;
use crate::{Error, KeyUse, Result};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Hands out current credentials and publishes public keys
pub struct KeySetService<S: KeyStore> {
    store: S,
    options: KeySetOptions,
    clock: Arc<dyn Clock>,
    audit: Option<Mutex<Box<dyn AuditLogger>>>,
}

impl<S: KeyStore> KeySetService<S> {
    /// Service over `store` with default options and the system clock
    pub fn new(store: S) -> Self {
        Self {
            store,
            options: KeySetOptions::default(),
            clock: Arc::new(SystemClock),
            audit: None,
        }
    }

    /// Replace the default options used when a call passes none
    pub fn with_options(mut self, options: KeySetOptions) -> Result<Self> {
        options.validate()?;
        self.options = options;
        Ok(self)
    }

    /// Clock used to stamp `created_at` on new records
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Send lifecycle events to `logger`
    pub fn with_audit_logger<L: AuditLogger + 'static>(mut self, logger: L) -> Self {
        self.audit = Some(Mutex::new(Box::new(logger)));
        self
    }

    /// Default options
    pub fn options(&self) -> &KeySetOptions {
        &self.options
    }

    /// The backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Generate a new signing key, save it and return its credential.
    ///
    /// The new key becomes current regardless of the state of the slot.
    pub fn generate_signing_credentials(
        &self,
        options: Option<&KeySetOptions>,
    ) -> Result<SigningCredential> {
        self.audited("generate_signing_credentials", || {
            let record = self.generate_record(KeyUse::Signing, self.resolve(options), false)?;
            SigningCredential::from_record(&record)
        })
    }

    /// The current signing credential, generating one if the slot has no
    /// current key
    pub fn current_signing_credentials(
        &self,
        options: Option<&KeySetOptions>,
    ) -> Result<SigningCredential> {
        self.audited("current_signing_credentials", || {
            let record = self.current_record(KeyUse::Signing, self.resolve(options))?;
            SigningCredential::from_record(&record)
        })
    }

    /// Generate a new encryption key, save it and return its credential.
    pub fn generate_encrypting_credentials(
        &self,
        options: Option<&KeySetOptions>,
    ) -> Result<EncryptingCredential> {
        self.audited("generate_encrypting_credentials", || {
            let options = self.resolve(options);
            let record = self.generate_record(KeyUse::Encryption, options, false)?;
            EncryptingCredential::from_record(&record, options.enc)
        })
    }

    /// The current encrypting credential, generating one if the slot has no
    /// current key
    pub fn current_encrypting_credentials(
        &self,
        options: Option<&KeySetOptions>,
    ) -> Result<EncryptingCredential> {
        self.audited("current_encrypting_credentials", || {
            let options = self.resolve(options);
            let record = self.current_record(KeyUse::Encryption, options)?;
            EncryptingCredential::from_record(&record, options.enc)
        })
    }

    /// Public JWKs of the `qty` most recent keys of a slot, newest first.
    ///
    /// Symmetric keys have no public form and are left out, so the result may
    /// be shorter than `qty`. Expired keys are included so tokens signed just
    /// before a rotation still verify.
    pub fn last_public_keys(&self, key_use: KeyUse, qty: usize) -> Result<Vec<Jwk>> {
        self.audited("last_public_keys", || {
            let keys = self.public_keys(key_use, qty)?;
            self.emit(AuditEvent::PublicKeysPublished {
                key_use: Some(key_use),
                count: keys.len(),
            });
            Ok(keys)
        })
    }

    /// A JWKS document with the last `qty` public keys of both slots
    pub fn jwks(&self, qty: usize) -> Result<JwkSet> {
        self.audited("jwks", || {
            let mut keys = self.public_keys(KeyUse::Signing, qty)?;
            keys.extend(self.public_keys(KeyUse::Encryption, qty)?);
            self.emit(AuditEvent::PublicKeysPublished {
                key_use: None,
                count: keys.len(),
            });
            Ok(JwkSet { keys })
        })
    }

    fn resolve<'a>(&'a self, options: Option<&'a KeySetOptions>) -> &'a KeySetOptions {
        options.unwrap_or(&self.options)
    }

    fn public_keys(&self, key_use: KeyUse, qty: usize) -> Result<Vec<Jwk>> {
        Ok(self
            .store
            .get_last(key_use, qty)?
            .iter()
            .filter_map(KeyRecord::public_jwk)
            .collect())
    }

    fn current_record(&self, key_use: KeyUse, options: &KeySetOptions) -> Result<KeyRecord> {
        if !self.store.needs_update(key_use)? {
            match self.store.get_current_key(key_use) {
                Ok(record) => {
                    debug!(kid = %record.key_id(), key_use = %key_use, "using stored current key");
                    self.emit(AuditEvent::CurrentKeyResolved {
                        key_id: record.key_id().to_string(),
                        key_use,
                    });
                    return Ok(record);
                }
                // expired between the two reads
                Err(Error::NoCurrentKey { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let generated = self.generate_record(key_use, options, true)?;
        // A concurrent caller may have saved a newer key; the store decides.
        match self.store.get_current_key(key_use) {
            Ok(current) => {
                if current.key_id() != generated.key_id() {
                    debug!(
                        generated = %generated.key_id(),
                        current = %current.key_id(),
                        "concurrent rotation, deferring to the store's current key"
                    );
                }
                Ok(current)
            }
            Err(Error::NoCurrentKey { .. }) => Ok(generated),
            Err(e) => Err(e),
        }
    }

    fn generate_record(
        &self,
        key_use: KeyUse,
        options: &KeySetOptions,
        rotation: bool,
    ) -> Result<KeyRecord> {
        options.validate()?;
        let algorithm = options.algorithm_for(key_use);
        let factory = KeyMaterialFactory::new(options.rsa_key_size)?;

        let generated = factory.generate(algorithm)?;
        let record = JwkConverter::to_record(&generated, self.clock.now(), options.validity())?;
        self.store.save(record.clone())?;

        info!(
            kid = %record.key_id(),
            alg = %algorithm,
            key_use = %key_use,
            rotation,
            "generated new key"
        );
        self.emit(AuditEvent::KeyGenerated {
            key_id: record.key_id().to_string(),
            algorithm,
            key_use,
            rotation,
        });
        Ok(record)
    }

    fn audited<T>(&self, operation: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let result = f();
        if let Err(e) = &result {
            debug!(operation, error = %e, code = %e.code(), "key set operation failed");
            self.emit(AuditEvent::ErrorOccurred {
                operation: operation.to_string(),
                error_type: e.code().to_string(),
                message: e.to_string(),
            });
        }
        result
    }

    fn emit(&self, event: AuditEvent) {
        let Some(audit) = &self.audit else {
            return;
        };
        let logged = audit
            .lock()
            .map_err(|_| Error::storage("audit_log", "lock poisoned"))
            .and_then(|mut logger| logger.log(AuditLogEntry::new(event)));
        if let Err(e) = logged {
            warn!(error = %e, "failed to write audit entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLogger;
    use crate::clock::ManualClock;
    use crate::error::ErrorCode;
    use crate::storage::MemoryStore;
    use crate::Algorithm;
    use std::time::Duration;

    fn hmac_options() -> KeySetOptions {
        KeySetOptions {
            jws: Algorithm::HS256,
            jwe: Algorithm::A128KW,
            days_until_expire: 1,
            ..KeySetOptions::default()
        }
    }

    fn service(clock: &ManualClock) -> KeySetService<MemoryStore> {
        KeySetService::new(MemoryStore::new().with_clock(clock.clone()))
            .with_clock(clock.clone())
            .with_options(hmac_options())
            .unwrap()
    }

    #[test]
    fn test_current_key_is_stable_until_expiry() {
        let clock = ManualClock::default();
        let service = service(&clock);

        let first = service.current_signing_credentials(None).unwrap();
        let again = service.current_signing_credentials(None).unwrap();
        assert_eq!(first.key_id(), again.key_id());
        assert_eq!(service.store().len(), 1);

        clock.advance(Duration::from_secs(24 * 60 * 60));
        let rotated = service.current_signing_credentials(None).unwrap();
        assert_ne!(rotated.key_id(), first.key_id());
        assert_eq!(service.store().len(), 2);
    }

    #[test]
    fn test_generate_always_creates_new_current_key() {
        let clock = ManualClock::default();
        let service = service(&clock);

        let current = service.current_encrypting_credentials(None).unwrap();
        clock.advance(Duration::from_secs(1));
        let generated = service.generate_encrypting_credentials(None).unwrap();
        assert_ne!(current.key_id(), generated.key_id());
        assert_eq!(
            service.current_encrypting_credentials(None).unwrap().key_id(),
            generated.key_id()
        );
    }

    #[test]
    fn test_slots_rotate_independently() {
        let clock = ManualClock::default();
        let service = service(&clock);

        service.current_signing_credentials(None).unwrap();
        assert!(service.store().needs_update(KeyUse::Encryption).unwrap());
        let enc = service.current_encrypting_credentials(None).unwrap();
        assert_eq!(enc.algorithm(), Algorithm::A128KW);
        assert_eq!(service.store().len(), 2);
    }

    #[test]
    fn test_per_call_options_override_defaults() {
        let clock = ManualClock::default();
        let service = service(&clock);
        let options = KeySetOptions {
            jws: Algorithm::ES256,
            ..hmac_options()
        };

        let credential = service.generate_signing_credentials(Some(&options)).unwrap();
        assert_eq!(credential.algorithm(), Algorithm::ES256);
        assert_eq!(service.options().jws, Algorithm::HS256);

        // a stored current key is returned even if the options now ask for
        // a different algorithm
        let current = service.current_signing_credentials(None).unwrap();
        assert_eq!(current.key_id(), credential.key_id());
        assert_eq!(current.algorithm(), Algorithm::ES256);
    }

    #[test]
    fn test_rejected_options_touch_nothing() {
        let clock = ManualClock::default();
        let service = service(&clock);
        let options = KeySetOptions {
            jws: Algorithm::A256KW,
            ..hmac_options()
        };

        let err = service.generate_signing_credentials(Some(&options)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedAlgorithm);
        assert!(service.store().is_empty());

        let err = KeySetService::new(MemoryStore::new())
            .with_options(KeySetOptions {
                rsa_key_size: 1024,
                ..KeySetOptions::default()
            })
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::WeakKeyRequested);
    }

    #[test]
    fn test_symmetric_keys_are_never_published() {
        let clock = ManualClock::default();
        let service = service(&clock);
        service.current_signing_credentials(None).unwrap();
        service.current_encrypting_credentials(None).unwrap();

        assert!(service.last_public_keys(KeyUse::Signing, 5).unwrap().is_empty());
        assert!(service.jwks(5).unwrap().keys.is_empty());
    }

    #[test]
    fn test_audit_trail() {
        let clock = ManualClock::default();
        let logger = MemoryAuditLogger::new();
        let service = service(&clock).with_audit_logger(logger.clone());

        service.current_signing_credentials(None).unwrap();
        service.current_signing_credentials(None).unwrap();
        service.last_public_keys(KeyUse::Signing, 3).unwrap();
        let bad = KeySetOptions {
            days_until_expire: 0,
            ..hmac_options()
        };
        assert!(service.generate_signing_credentials(Some(&bad)).is_err());

        let events: Vec<AuditEvent> = logger.entries().into_iter().map(|e| e.event).collect();
        assert_eq!(events.len(), 4);
        assert!(matches!(
            &events[0],
            AuditEvent::KeyGenerated { rotation: true, key_use: KeyUse::Signing, .. }
        ));
        assert!(matches!(&events[1], AuditEvent::CurrentKeyResolved { .. }));
        assert!(matches!(&events[2], AuditEvent::PublicKeysPublished { count: 0, .. }));
        assert!(matches!(
            &events[3],
            AuditEvent::ErrorOccurred { error_type, .. } if error_type == "CONFIGURATION_ERROR"
        ));
    }
}
