use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use super::{sort_newest_first, ClearScope, LocalStore, StoreError};
use crate::filter::Filter;
use crate::models::{Entity, Profile};

#[derive(Default)]
struct Inner {
    entities: HashMap<String, Entity>,
    by_author: HashMap<String, HashSet<String>>,
    by_kind: HashMap<u16, HashSet<String>>,
    profiles: HashMap<String, Profile>,
    identity: Option<String>,
}

impl Inner {
    /// Ids worth checking against `filter`, narrowed through an index.
    fn candidates(&self, filter: &Filter) -> HashSet<&String> {
        if let Some(authors) = &filter.authors {
            return authors
                .iter()
                .filter_map(|a| self.by_author.get(a))
                .flatten()
                .collect();
        }
        if !filter.kinds.is_empty() {
            return filter
                .kinds
                .iter()
                .filter_map(|k| self.by_kind.get(k))
                .flatten()
                .collect();
        }
        self.entities.keys().collect()
    }
}

/// In-memory store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalStore for MemoryStore {
    fn put(&self, entity: &Entity) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.entities.contains_key(&entity.id) {
            return Ok(());
        }
        inner
            .by_author
            .entry(entity.author_id.clone())
            .or_default()
            .insert(entity.id.clone());
        inner
            .by_kind
            .entry(entity.kind)
            .or_default()
            .insert(entity.id.clone());
        inner.entities.insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        Ok(self.inner.read().entities.get(id).cloned())
    }

    fn query(&self, filter: &Filter) -> Result<Vec<Entity>, StoreError> {
        if filter.is_unsatisfiable() {
            return Ok(Vec::new());
        }

        let inner = self.inner.read();
        let mut results: Vec<Entity> = inner
            .candidates(filter)
            .into_iter()
            .filter_map(|id| inner.entities.get(id))
            .filter(|entity| filter.matches(entity))
            .cloned()
            .collect();

        sort_newest_first(&mut results);
        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    fn put_profile(&self, author_id: &str, profile: &Profile) -> Result<(), StoreError> {
        self.inner
            .write()
            .profiles
            .insert(author_id.to_string(), profile.clone());
        Ok(())
    }

    fn get_profile(&self, author_id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.inner.read().profiles.get(author_id).cloned())
    }

    fn put_profile_if_newer(&self, profile: &Profile) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.profiles.get(&profile.author_id) {
            if existing.created_at > profile.created_at {
                return Ok(false);
            }
        }
        inner
            .profiles
            .insert(profile.author_id.clone(), profile.clone());
        Ok(true)
    }

    fn put_identity(&self, secret: &str) -> Result<(), StoreError> {
        self.inner.write().identity = Some(secret.to_string());
        Ok(())
    }

    fn get_identity(&self) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().identity.clone())
    }

    fn clear(&self, scope: ClearScope) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if scope.clears_entities() {
            inner.entities.clear();
            inner.by_author.clear();
            inner.by_kind.clear();
        }
        if scope.clears_profiles() {
            inner.profiles.clear();
        }
        if scope.clears_identity() {
            inner.identity = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::signed;
    use nostr_sdk::Keys;

    #[test]
    fn test_put_is_idempotent() {
        let store = MemoryStore::new();
        let keys = Keys::generate();
        let entity = signed(&keys, 1, "hello", 100, &[]);

        store.put(&entity).unwrap();
        store.put(&entity).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.query_by_kind(1, 10).unwrap(), vec![entity.clone()]);
        assert_eq!(store.get_by_id(&entity.id).unwrap(), Some(entity));
    }

    #[test]
    fn test_queries_are_newest_first_and_limited() {
        let store = MemoryStore::new();
        let alice = Keys::generate();
        let bob = Keys::generate();
        for (keys, t) in [(&alice, 100), (&bob, 300), (&alice, 200), (&alice, 50)] {
            store.put(&signed(keys, 1, &format!("at {t}"), t, &[])).unwrap();
        }
        store.put(&signed(&alice, 7, "+", 400, &[])).unwrap();

        let posts = store.query_by_kind(1, 3).unwrap();
        let times: Vec<u64> = posts.iter().map(|e| e.created_at).collect();
        assert_eq!(times, vec![300, 200, 100]);

        let by_alice = store.query_by_author(&alice.public_key().to_hex(), 10).unwrap();
        let times: Vec<u64> = by_alice.iter().map(|e| e.created_at).collect();
        assert_eq!(times, vec![400, 200, 100, 50], "all kinds by author");
    }

    #[test]
    fn test_older_profile_never_replaces_newer() {
        let store = MemoryStore::new();
        let profile = |name: &str, created_at| Profile {
            author_id: "abc".to_string(),
            name: Some(name.to_string()),
            created_at,
            ..Default::default()
        };

        assert!(store.put_profile_if_newer(&profile("new", 200)).unwrap());
        assert!(!store.put_profile_if_newer(&profile("old", 100)).unwrap());
        assert!(store.put_profile_if_newer(&profile("same age", 200)).unwrap());

        let cached = store.get_profile("abc").unwrap().unwrap();
        assert_eq!(cached.name.as_deref(), Some("same age"));
    }

    #[test]
    fn test_clear_scopes() {
        let store = MemoryStore::new();
        let keys = Keys::generate();
        let author = keys.public_key().to_hex();
        store.put(&signed(&keys, 1, "x", 1, &[])).unwrap();
        store
            .put_profile(&author, &Profile { author_id: author.clone(), ..Default::default() })
            .unwrap();
        store.put_identity("nsec1secret").unwrap();

        store.clear(ClearScope::Cache).unwrap();
        assert!(store.is_empty());
        assert!(store.get_profile(&author).unwrap().is_none());
        assert_eq!(store.get_identity().unwrap().as_deref(), Some("nsec1secret"));

        store.clear(ClearScope::Everything).unwrap();
        assert!(store.get_identity().unwrap().is_none());
    }
}
