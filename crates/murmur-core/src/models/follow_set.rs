use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::Entity;
use crate::constants::kinds;

/// Ordered, de-duplicated set of authors followed by `author_id`,
/// derived from their newest kind:3 contact list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FollowSet {
    pub author_id: String,
    pub follows: Vec<String>,
    /// `created_at` of the contact list; 0 when no list was found
    pub created_at: u64,
}

impl FollowSet {
    pub fn empty(author_id: &str) -> Self {
        Self {
            author_id: author_id.to_string(),
            ..Default::default()
        }
    }

    pub fn from_entity(entity: &Entity) -> Option<Self> {
        if entity.kind != kinds::CONTACT_LIST {
            return None;
        }

        let mut seen = HashSet::new();
        let follows = entity
            .tag_values("p")
            .into_iter()
            .filter(|pubkey| !pubkey.is_empty() && seen.insert(pubkey.clone()))
            .collect();

        Some(Self {
            author_id: entity.author_id.clone(),
            follows,
            created_at: entity.created_at,
        })
    }

    /// Follow set from the newest contact list authored by `author_id`.
    pub fn newest_for(author_id: &str, entities: &[Entity]) -> Option<Self> {
        entities
            .iter()
            .filter(|e| e.kind == kinds::CONTACT_LIST && e.author_id == author_id)
            .max_by_key(|e| e.created_at)
            .and_then(Self::from_entity)
    }

    pub fn is_empty(&self) -> bool {
        self.follows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.follows.len()
    }

    pub fn contains(&self, author_id: &str) -> bool {
        self.follows.iter().any(|f| f == author_id)
    }

    /// Copy with `author_id` appended; unchanged if already followed.
    pub fn with_follow(&self, author_id: &str) -> Self {
        let mut next = self.clone();
        if !next.contains(author_id) {
            next.follows.push(author_id.to_string());
        }
        next
    }

    pub fn without_follow(&self, author_id: &str) -> Self {
        let mut next = self.clone();
        next.follows.retain(|f| f != author_id);
        next
    }

    /// `p` tags for a kind:3 entity, preserving order.
    pub fn to_tags(&self) -> Vec<Vec<String>> {
        self.follows
            .iter()
            .map(|f| vec!["p".to_string(), f.clone()])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::signed;
    use nostr_sdk::Keys;

    #[test]
    fn test_from_contact_list_preserves_order_and_dedupes() {
        let keys = Keys::generate();
        let entity = signed(&keys, 3, "", 10, &[&["p", "b"], &["p", "a"], &["p", "b"], &["t", "x"]]);
        let set = FollowSet::from_entity(&entity).unwrap();
        assert_eq!(set.follows, vec!["b", "a"]);
        assert_eq!(set.author_id, keys.public_key().to_hex());
    }

    #[test]
    fn test_newest_for_ignores_other_authors() {
        let alice = Keys::generate();
        let bob = Keys::generate();
        let alice_hex = alice.public_key().to_hex();
        let lists = vec![
            signed(&alice, 3, "", 10, &[&["p", "old"]]),
            signed(&alice, 3, "", 20, &[&["p", "new"]]),
            signed(&bob, 3, "", 30, &[&["p", "bob-follow"]]),
        ];
        let set = FollowSet::newest_for(&alice_hex, &lists).unwrap();
        assert_eq!(set.follows, vec!["new"]);
    }

    #[test]
    fn test_follow_and_unfollow() {
        let set = FollowSet {
            author_id: "me".to_string(),
            follows: vec!["a".to_string()],
            created_at: 1,
        };
        let added = set.with_follow("b").with_follow("a");
        assert_eq!(added.follows, vec!["a", "b"]);
        let removed = added.without_follow("a");
        assert_eq!(removed.follows, vec!["b"]);
        assert_eq!(removed.to_tags(), vec![vec!["p".to_string(), "b".to_string()]]);
    }
}
