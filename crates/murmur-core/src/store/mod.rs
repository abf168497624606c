pub mod db;
pub mod memory;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::constants::kinds;
use crate::filter::Filter;
use crate::models::{Entity, Profile};

pub use db::SqliteStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("invalid entity: {0}")]
    InvalidEntity(String),
}

/// What `clear` erases. Only `Everything` touches the stored identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    Entities,
    Profiles,
    /// Entities and profiles
    Cache,
    /// Cache plus the stored identity (log out)
    Everything,
}

impl ClearScope {
    pub fn clears_entities(self) -> bool {
        matches!(self, Self::Entities | Self::Cache | Self::Everything)
    }

    pub fn clears_profiles(self) -> bool {
        matches!(self, Self::Profiles | Self::Cache | Self::Everything)
    }

    pub fn clears_identity(self) -> bool {
        self == Self::Everything
    }
}

/// Durable, queryable cache of entities and derived projections.
///
/// `put` is an idempotent upsert keyed by id: entities are immutable, so
/// concurrent writers need no coordination beyond the store's own lock.
/// Queries return newest-first (`created_at` descending, then id).
pub trait LocalStore: Send + Sync {
    fn put(&self, entity: &Entity) -> Result<(), StoreError>;

    fn get_by_id(&self, id: &str) -> Result<Option<Entity>, StoreError>;

    fn query(&self, filter: &Filter) -> Result<Vec<Entity>, StoreError>;

    fn query_by_kind(&self, kind: u16, limit: usize) -> Result<Vec<Entity>, StoreError> {
        self.query(&Filter::kind(kind).limit(limit))
    }

    fn query_by_author(&self, author_id: &str, limit: usize) -> Result<Vec<Entity>, StoreError> {
        self.query(&Filter::new().author(author_id).limit(limit))
    }

    fn put_profile(&self, author_id: &str, profile: &Profile) -> Result<(), StoreError>;

    fn get_profile(&self, author_id: &str) -> Result<Option<Profile>, StoreError>;

    /// Store `profile` unless the cached one for the same author was built
    /// from newer metadata. The comparison and the write happen under one
    /// lock or transaction. Returns whether it was written.
    fn put_profile_if_newer(&self, profile: &Profile) -> Result<bool, StoreError>;

    /// Stored secret key (nsec or ncryptsec) for the active session.
    fn put_identity(&self, secret: &str) -> Result<(), StoreError>;

    fn get_identity(&self) -> Result<Option<String>, StoreError>;

    fn clear(&self, scope: ClearScope) -> Result<(), StoreError>;
}

/// Sort newest-first with id as the tie-breaker.
pub(crate) fn sort_newest_first(entities: &mut [Entity]) {
    entities.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Error-swallowing view over a [`LocalStore`].
///
/// Storage failures are logged and treated as cache misses; the network path
/// is always a valid fallback.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<dyn LocalStore>,
}

impl Cache {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { inner: store }
    }

    pub fn snapshot(&self, filter: &Filter) -> Vec<Entity> {
        match self.inner.query(filter) {
            Ok(entities) => entities,
            Err(e) => {
                warn!(error = %e, "local store query failed, treating as cache miss");
                Vec::new()
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Entity> {
        match self.inner.get_by_id(id) {
            Ok(entity) => entity,
            Err(e) => {
                warn!(error = %e, id, "local store lookup failed");
                None
            }
        }
    }

    /// Write an entity through and refresh any projection derived from it.
    pub fn persist(&self, entity: &Entity, now: u64) {
        if let Err(e) = self.inner.put(entity) {
            warn!(error = %e, id = %entity.id, "failed to persist entity");
            return;
        }

        if entity.kind == kinds::METADATA {
            if let Some(profile) = Profile::from_entity(entity, now) {
                self.store_profile(&profile);
            }
        }
    }

    pub fn profile(&self, author_id: &str) -> Option<Profile> {
        match self.inner.get_profile(author_id) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, author_id, "failed to read cached profile");
                None
            }
        }
    }

    /// Store `profile` unless a newer one is already cached.
    pub fn store_profile(&self, profile: &Profile) {
        match self.inner.put_profile_if_newer(profile) {
            Ok(true) => {}
            Ok(false) => debug!(author_id = %profile.author_id, "ignoring older profile metadata"),
            Err(e) => warn!(error = %e, author_id = %profile.author_id, "failed to store profile"),
        }
    }

    pub fn clear(&self, scope: ClearScope) {
        if let Err(e) = self.inner.clear(scope) {
            warn!(error = %e, ?scope, "failed to clear local store");
        }
    }
}
