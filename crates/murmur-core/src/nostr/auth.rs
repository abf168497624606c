use anyhow::Result;
use nostr_sdk::nips::nip49::EncryptedSecretKey;
use nostr_sdk::prelude::*;

use crate::store::LocalStore;

pub fn generate_keys() -> Keys {
    Keys::generate()
}

/// Parse an nsec, hex secret, or ncryptsec (requires `password`).
pub fn parse_secret(secret: &str, password: Option<&str>) -> Result<Keys> {
    let secret_key = if secret.starts_with("ncryptsec") {
        let password = password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Credentials are encrypted, password required"))?;
        EncryptedSecretKey::from_bech32(secret)?.decrypt(password)?
    } else {
        SecretKey::parse(secret)?
    };
    Ok(Keys::new(secret_key))
}

/// Import a key and remember it as the session identity. With a non-empty
/// password the stored copy is NIP-49 encrypted.
pub fn login_with_secret(
    secret: &str,
    password: Option<&str>,
    store: &dyn LocalStore,
) -> Result<Keys> {
    let keys = parse_secret(secret, password)?;

    match password.filter(|p| !p.is_empty()) {
        Some(pwd) => {
            let encrypted = keys.secret_key().encrypt(pwd)?;
            store.put_identity(&encrypted.to_bech32()?)?;
        }
        None => store.put_identity(&keys.secret_key().to_bech32()?)?,
    }

    Ok(keys)
}

pub fn has_stored_credentials(store: &dyn LocalStore) -> bool {
    matches!(store.get_identity(), Ok(Some(_)))
}

/// Check if stored credentials are encrypted (require a password to unlock)
pub fn credentials_need_password(store: &dyn LocalStore) -> bool {
    matches!(store.get_identity(), Ok(Some(secret)) if secret.starts_with("ncryptsec"))
}

/// Load the stored identity, decrypting with `password` when needed.
pub fn load_stored_keys(store: &dyn LocalStore, password: Option<&str>) -> Result<Keys> {
    let secret = store
        .get_identity()?
        .ok_or_else(|| anyhow::anyhow!("No stored credentials"))?;
    parse_secret(&secret, password)
}

pub fn get_current_pubkey(keys: &Keys) -> String {
    keys.public_key().to_hex()
}
