use async_trait::async_trait;
use nostr_sdk::nips::nip04;
use nostr_sdk::prelude::{Event, EventBuilder, Keys, Kind, PublicKey, Tag, Timestamp};

use crate::models::Draft;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("failed to sign: {0}")]
    Sign(String),
    #[error("invalid public key {key}: {message}")]
    InvalidKey { key: String, message: String },
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// Signing identity for a session.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Hex public key of the identity.
    fn identity(&self) -> String;

    async fn sign(&self, draft: &Draft, created_at: u64) -> Result<Event, SignerError>;

    /// NIP-04 encrypt for `peer_id`.
    async fn encrypt(&self, peer_id: &str, plaintext: &str) -> Result<String, SignerError>;

    /// NIP-04 decrypt a message exchanged with `peer_id`.
    async fn decrypt(&self, peer_id: &str, ciphertext: &str) -> Result<String, SignerError>;
}

/// Local keypair signer.
pub struct KeysSigner {
    keys: Keys,
}

impl KeysSigner {
    pub fn new(keys: Keys) -> Self {
        Self { keys }
    }
}

fn parse_peer(peer_id: &str) -> Result<PublicKey, SignerError> {
    PublicKey::parse(peer_id).map_err(|e| SignerError::InvalidKey {
        key: peer_id.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl Signer for KeysSigner {
    fn identity(&self) -> String {
        self.keys.public_key().to_hex()
    }

    async fn sign(&self, draft: &Draft, created_at: u64) -> Result<Event, SignerError> {
        let tags = draft
            .tags
            .iter()
            .map(|tag| Tag::parse(tag.as_slice()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SignerError::Sign(e.to_string()))?;

        EventBuilder::new(Kind::from(draft.kind), &draft.content)
            .tags(tags)
            .custom_created_at(Timestamp::from(created_at))
            .sign_with_keys(&self.keys)
            .map_err(|e| SignerError::Sign(e.to_string()))
    }

    async fn encrypt(&self, peer_id: &str, plaintext: &str) -> Result<String, SignerError> {
        let peer = parse_peer(peer_id)?;
        nip04::encrypt(self.keys.secret_key(), &peer, plaintext)
            .map_err(|e| SignerError::Encrypt(e.to_string()))
    }

    async fn decrypt(&self, peer_id: &str, ciphertext: &str) -> Result<String, SignerError> {
        let peer = parse_peer(peer_id)?;
        nip04::decrypt(self.keys.secret_key(), &peer, ciphertext)
            .map_err(|e| SignerError::Decrypt(e.to_string()))
    }
}
