use serde::{Deserialize, Serialize};

use super::Entity;
use crate::constants::kinds;

/// Derived projection of an author's newest kind:0 metadata entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub author_id: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub picture: Option<String>,
    pub nip05: Option<String>,
    pub lud16: Option<String>,
    /// `created_at` of the metadata entity this was built from
    pub created_at: u64,
    /// When this copy was last confirmed against the network
    pub last_updated: u64,
}

/// kind:0 content JSON. Unknown fields are ignored.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, alias = "displayName", skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nip05: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lud16: Option<String>,
}

impl Profile {
    /// Parse a kind:0 entity. Returns None for other kinds or malformed JSON.
    pub fn from_entity(entity: &Entity, now: u64) -> Option<Self> {
        if entity.kind != kinds::METADATA {
            return None;
        }

        let content: ProfileContent = serde_json::from_str(&entity.content).ok()?;

        Some(Self {
            author_id: entity.author_id.clone(),
            name: non_empty(content.name),
            display_name: non_empty(content.display_name),
            about: non_empty(content.about),
            picture: non_empty(content.picture),
            nip05: non_empty(content.nip05),
            lud16: non_empty(content.lud16),
            created_at: entity.created_at,
            last_updated: now,
        })
    }

    /// Pick the profile from the newest metadata entity in `entities`.
    pub fn newest(entities: &[Entity], now: u64) -> Option<Self> {
        entities
            .iter()
            .filter(|e| e.kind == kinds::METADATA)
            .max_by_key(|e| e.created_at)
            .and_then(|e| Self::from_entity(e, now))
    }

    pub fn is_stale(&self, now: u64, max_age_secs: u64) -> bool {
        now.saturating_sub(self.last_updated) > max_age_secs
    }

    /// Best name to show: display_name, then name, then a short id prefix.
    pub fn best_name(&self) -> String {
        self.display_name
            .as_deref()
            .or(self.name.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}...", &self.author_id[..8.min(self.author_id.len())]))
    }

    /// kind:0 content for publishing this profile.
    pub fn to_content(&self) -> String {
        let content = ProfileContent {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            about: self.about.clone(),
            picture: self.picture.clone(),
            nip05: self.nip05.clone(),
            lud16: self.lud16.clone(),
        };
        serde_json::to_string(&content).unwrap_or_else(|_| "{}".to_string())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::signed;
    use nostr_sdk::Keys;

    #[test]
    fn test_parse_metadata() {
        let keys = Keys::generate();
        let entity = signed(
            &keys,
            0,
            r#"{"name":"alice","displayName":"Alice","about":"","picture":"https://x/a.png","extra":1}"#,
            500,
            &[],
        );
        let profile = Profile::from_entity(&entity, 900).unwrap();
        assert_eq!(profile.name.as_deref(), Some("alice"));
        assert_eq!(profile.display_name.as_deref(), Some("Alice"));
        assert_eq!(profile.about, None, "empty strings are dropped");
        assert_eq!(profile.created_at, 500);
        assert_eq!(profile.last_updated, 900);
        assert_eq!(profile.best_name(), "Alice");
    }

    #[test]
    fn test_malformed_or_wrong_kind_is_none() {
        let keys = Keys::generate();
        assert!(Profile::from_entity(&signed(&keys, 0, "not json", 1, &[]), 1).is_none());
        assert!(Profile::from_entity(&signed(&keys, 1, "{}", 1, &[]), 1).is_none());
    }

    #[test]
    fn test_newest_wins() {
        let keys = Keys::generate();
        let old = signed(&keys, 0, r#"{"name":"old"}"#, 100, &[]);
        let new = signed(&keys, 0, r#"{"name":"new"}"#, 200, &[]);
        let profile = Profile::newest(&[new, old], 300).unwrap();
        assert_eq!(profile.name.as_deref(), Some("new"));
    }

    #[test]
    fn test_staleness_and_fallback_name() {
        let profile = Profile {
            author_id: "0123456789abcdef".to_string(),
            last_updated: 1_000,
            ..Default::default()
        };
        assert!(!profile.is_stale(1_500, 3_600));
        assert!(profile.is_stale(5_000, 3_600));
        assert_eq!(profile.best_name(), "01234567...");
    }

    #[test]
    fn test_content_round_trips_through_parser() {
        let keys = Keys::generate();
        let profile = Profile {
            author_id: keys.public_key().to_hex(),
            name: Some("bob".to_string()),
            about: Some("hi".to_string()),
            ..Default::default()
        };
        let entity = signed(&keys, 0, &profile.to_content(), 10, &[]);
        let parsed = Profile::from_entity(&entity, 10).unwrap();
        assert_eq!(parsed.name, profile.name);
        assert_eq!(parsed.about, profile.about);
    }
}
