use nostr_sdk::Event;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::tag_utils::{extract_all_tag_values, extract_tag_str};

/// A signed, immutable, content-addressed protocol record.
///
/// Serializes with the protocol field names (`pubkey`, `sig`) so a repost's
/// embedded JSON can be read back as an `Entity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "pubkey")]
    pub author_id: String,
    pub kind: u16,
    pub created_at: u64,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    #[serde(rename = "sig")]
    pub signature: String,
}

impl Entity {
    /// Lowercase hex SHA-256 of `[0, author, created_at, kind, tags, content]`.
    pub fn compute_id(
        author_id: &str,
        created_at: u64,
        kind: u16,
        tags: &[Vec<String>],
        content: &str,
    ) -> String {
        let canonical = serde_json::json!([0, author_id, created_at, kind, tags, content]);
        hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
    }

    /// Whether `id` matches the content this entity carries.
    pub fn has_valid_id(&self) -> bool {
        self.id
            == Self::compute_id(
                &self.author_id,
                self.created_at,
                self.kind,
                &self.tags,
                &self.content,
            )
    }

    pub fn first_tag_value(&self, tag_name: &str) -> Option<&str> {
        extract_tag_str(&self.tags, tag_name)
    }

    pub fn tag_values(&self, tag_name: &str) -> Vec<String> {
        extract_all_tag_values(&self.tags, tag_name)
    }

    /// True if any tag named `tag_name` has `value` at position 1.
    pub fn has_tag_value(&self, tag_name: &str, value: &str) -> bool {
        self.tags.iter().any(|tag| {
            tag.first().map(String::as_str) == Some(tag_name)
                && tag.get(1).map(String::as_str) == Some(value)
        })
    }
}

impl From<&Event> for Entity {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.to_hex(),
            author_id: event.pubkey.to_hex(),
            kind: event.kind.as_u16(),
            created_at: event.created_at.as_u64(),
            tags: event.tags.iter().map(|tag| tag.as_slice().to_vec()).collect(),
            content: event.content.clone(),
            signature: event.sig.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::signed;
    use nostr_sdk::prelude::*;

    #[test]
    fn test_id_matches_sdk_computation() {
        let keys = Keys::generate();
        let entity = signed(
            &keys,
            1,
            "hello \"world\"\nwith ünïcode",
            1_700_000_000,
            &[&["t", "rust"], &["e", "abcd", "", "root"]],
        );
        assert!(entity.has_valid_id(), "local id rule must agree with the SDK");
    }

    #[test]
    fn test_tampered_content_fails_id_check() {
        let keys = Keys::generate();
        let mut entity = signed(&keys, 1, "original", 100, &[]);
        entity.content = "edited".to_string();
        assert!(!entity.has_valid_id());
    }

    #[test]
    fn test_protocol_json_field_names() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hi")
            .sign_with_keys(&keys)
            .unwrap();
        let entity = Entity::from(&event);
        let parsed: Entity = serde_json::from_str(&event.as_json()).unwrap();
        assert_eq!(parsed, entity);
        assert_eq!(entity.author_id, keys.public_key().to_hex());
    }

    #[test]
    fn test_has_tag_value() {
        let keys = Keys::generate();
        let entity = signed(&keys, 7, "+", 100, &[&["e", "target"], &["p", "someone"]]);
        assert!(entity.has_tag_value("e", "target"));
        assert!(!entity.has_tag_value("e", "someone"));
        assert_eq!(entity.first_tag_value("p"), Some("someone"));
    }
}
