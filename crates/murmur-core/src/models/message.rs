use serde::{Deserialize, Serialize};

use super::Entity;
use crate::constants::kinds;

/// A NIP-04 direct message as seen from `me`'s side of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub created_at: u64,
    /// Sent by the session identity
    pub outgoing: bool,
    pub ciphertext: String,
    /// None until decrypted, or when decryption failed
    pub plaintext: Option<String>,
}

impl DirectMessage {
    pub fn from_entity(entity: &Entity, me: &str) -> Option<Self> {
        if entity.kind != kinds::ENCRYPTED_DIRECT_MESSAGE {
            return None;
        }

        let recipient_id = entity.first_tag_value("p")?.to_string();

        Some(Self {
            id: entity.id.clone(),
            sender_id: entity.author_id.clone(),
            recipient_id,
            created_at: entity.created_at,
            outgoing: entity.author_id == me,
            ciphertext: entity.content.clone(),
            plaintext: None,
        })
    }

    /// The other party in the conversation.
    pub fn peer_id(&self) -> &str {
        if self.outgoing {
            &self.recipient_id
        } else {
            &self.sender_id
        }
    }
}
