// Rotating a signing key and publishing the key set

use rust_jwks::audit::MemoryAuditLogger;
use rust_jwks::key::PublicKey;
use rust_jwks::service::KeySetService;
use rust_jwks::storage::{FileStore, StorageConfig};
use rust_jwks::*;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("rust-jwks basic usage example\n");

    let temp_dir = tempfile::tempdir()?;
    let config = StorageConfig {
        retain: Some(5),
        ..StorageConfig::default()
    };
    let store = FileStore::new(temp_dir.path(), config)?;

    let options = KeySetOptions {
        jws: Algorithm::ES256,
        jwe: Algorithm::RSA_OAEP_256,
        days_until_expire: 30,
        ..KeySetOptions::default()
    };
    let audit = MemoryAuditLogger::new();
    let service = KeySetService::new(store)
        .with_options(options)?
        .with_audit_logger(audit.clone());

    // 1. The first call on an empty store generates the current key
    let signing = service.current_signing_credentials(None)?;
    println!("1. Current signing key: {} ({})", signing.key_id(), signing.algorithm());

    let payload = b"eyJhbGciOiJFUzI1NiJ9.eyJzdWIiOiJkZW1vIn0";
    let signature = signing.sign(payload)?;
    println!("   Signed {} bytes -> {} byte signature", payload.len(), signature.len());

    // 2. Rotate: the new key becomes current, the old one stays published
    let rotated = service.generate_signing_credentials(None)?;
    println!("2. Rotated to: {}", rotated.key_id());

    // 3. A verifier only needs the published JWKS
    let jwks = service.jwks(2)?;
    println!("3. Published {} public keys", jwks.keys.len());
    let old_key = jwks
        .find(signing.key_id().as_str())
        .ok_or("rotated-out key missing from JWKS")?;
    let verified = PublicKey::from_jwk(old_key)?.verify(Algorithm::ES256, payload, &signature)?;
    println!("   Token signed by the old key still verifies: {}", verified);

    // 4. Encryption keys rotate independently
    let encrypting = service.current_encrypting_credentials(None)?;
    let cek = encrypting.new_content_key()?;
    let wrapped = encrypting.wrap_key(&cek)?;
    let unwrapped = encrypting.unwrap_key(&wrapped)?;
    println!(
        "4. Wrapped a {} byte {} key with {}: round trip ok = {}",
        cek.len(),
        encrypting.content_encryption(),
        encrypting.algorithm(),
        *unwrapped == *cek
    );

    println!("\nJWKS document:\n{}", serde_json::to_string_pretty(&service.jwks(2)?)?);
    println!("\nAudit events recorded: {}", audit.entries().len());

    Ok(())
}
