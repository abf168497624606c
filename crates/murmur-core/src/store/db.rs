use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::info;

use super::{ClearScope, LocalStore, StoreError};
use crate::filter::Filter;
use crate::models::{Entity, Profile};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    author_id TEXT NOT NULL,
    kind INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    tags TEXT NOT NULL,
    content TEXT NOT NULL,
    signature TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entities_author ON entities(author_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(kind, created_at DESC);
CREATE TABLE IF NOT EXISTS entity_tags (
    entity_id TEXT NOT NULL,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (entity_id, name, value)
);
CREATE INDEX IF NOT EXISTS idx_entity_tags_ref ON entity_tags(name, value);
CREATE TABLE IF NOT EXISTS profiles (
    author_id TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS identity (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    secret TEXT NOT NULL
);
"#;

const ENTITY_COLUMNS: &str = "id, author_id, kind, created_at, tags, content, signature";

/// SQLite-backed store. Single-letter tags are indexed for tag-reference
/// queries (`#e`, `#p`).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;
        migrate_profiles(&conn)?;

        info!("Local store opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
        let tags_json: String = row.get(4)?;
        let tags = serde_json::from_str(&tags_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
        Ok(Entity {
            id: row.get(0)?,
            author_id: row.get(1)?,
            kind: row.get::<_, i64>(2)? as u16,
            created_at: row.get::<_, i64>(3)? as u64,
            tags,
            content: row.get(5)?,
            signature: row.get(6)?,
        })
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// SQLite integers are signed; timestamps past `i64::MAX` saturate.
fn clamp_timestamp(timestamp: u64) -> i64 {
    i64::try_from(timestamp).unwrap_or(i64::MAX)
}

/// Databases written before profiles carried `created_at` get the column
/// added with a zero default, so any fetched metadata replaces them.
fn migrate_profiles(conn: &Connection) -> Result<(), StoreError> {
    let has_created_at: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('profiles') WHERE name = 'created_at'",
        [],
        |row| row.get(0),
    )?;
    if !has_created_at {
        info!("Adding created_at to cached profiles");
        conn.execute_batch(
            "ALTER TABLE profiles ADD COLUMN created_at INTEGER NOT NULL DEFAULT 0;",
        )?;
    }
    Ok(())
}

impl LocalStore for SqliteStore {
    fn put(&self, entity: &Entity) -> Result<(), StoreError> {
        let created_at = i64::try_from(entity.created_at).map_err(|_| {
            StoreError::InvalidEntity(format!(
                "{} has created_at {} beyond the storable range",
                entity.id, entity.created_at
            ))
        })?;
        let tags_json = serde_json::to_string(&entity.tags)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO entities (id, author_id, kind, created_at, tags, content, signature)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entity.id,
                entity.author_id,
                entity.kind as i64,
                created_at,
                tags_json,
                entity.content,
                entity.signature,
            ],
        )?;

        if inserted > 0 {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO entity_tags (entity_id, name, value) VALUES (?1, ?2, ?3)",
            )?;
            for tag in &entity.tags {
                if let [name, value, ..] = tag.as_slice() {
                    if name.chars().count() == 1 {
                        stmt.execute(params![entity.id, name, value])?;
                    }
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        let conn = self.conn.lock();
        let entity = conn
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1"),
                params![id],
                Self::row_to_entity,
            )
            .optional()?;
        Ok(entity)
    }

    fn query(&self, filter: &Filter) -> Result<Vec<Entity>, StoreError> {
        if filter.is_unsatisfiable() {
            return Ok(Vec::new());
        }

        let mut sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE 1 = 1");
        let mut values: Vec<Value> = Vec::new();

        if !filter.kinds.is_empty() {
            sql.push_str(&format!(" AND kind IN ({})", placeholders(filter.kinds.len())));
            values.extend(filter.kinds.iter().map(|k| Value::Integer(*k as i64)));
        }
        if let Some(authors) = &filter.authors {
            sql.push_str(&format!(" AND author_id IN ({})", placeholders(authors.len())));
            values.extend(authors.iter().cloned().map(Value::Text));
        }
        if let Some(tag_ref) = &filter.tag_refs {
            sql.push_str(&format!(
                " AND id IN (SELECT entity_id FROM entity_tags WHERE name = ? AND value IN ({}))",
                placeholders(tag_ref.values.len())
            ));
            values.push(Value::Text(tag_ref.tag.clone()));
            values.extend(tag_ref.values.iter().cloned().map(Value::Text));
        }
        if let Some(since) = filter.since {
            sql.push_str(" AND created_at >= ?");
            values.push(Value::Integer(clamp_timestamp(since)));
        }
        sql.push_str(" ORDER BY created_at DESC, id ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), Self::row_to_entity)?;
        let entities = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entities)
    }

    fn put_profile(&self, author_id: &str, profile: &Profile) -> Result<(), StoreError> {
        let data = serde_json::to_string(profile)?;
        self.conn.lock().execute(
            "INSERT INTO profiles (author_id, created_at, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(author_id) DO UPDATE SET
                created_at = excluded.created_at, data = excluded.data",
            params![author_id, clamp_timestamp(profile.created_at), data],
        )?;
        Ok(())
    }

    fn put_profile_if_newer(&self, profile: &Profile) -> Result<bool, StoreError> {
        let data = serde_json::to_string(profile)?;
        let changed = self.conn.lock().execute(
            "INSERT INTO profiles (author_id, created_at, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(author_id) DO UPDATE SET
                created_at = excluded.created_at, data = excluded.data
             WHERE excluded.created_at >= profiles.created_at",
            params![profile.author_id, clamp_timestamp(profile.created_at), data],
        )?;
        Ok(changed > 0)
    }

    fn get_profile(&self, author_id: &str) -> Result<Option<Profile>, StoreError> {
        let data: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT data FROM profiles WHERE author_id = ?1",
                params![author_id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn put_identity(&self, secret: &str) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO identity (id, secret) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET secret = excluded.secret",
            params![secret],
        )?;
        Ok(())
    }

    fn get_identity(&self) -> Result<Option<String>, StoreError> {
        let secret = self
            .conn
            .lock()
            .query_row("SELECT secret FROM identity WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        Ok(secret)
    }

    fn clear(&self, scope: ClearScope) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        if scope.clears_entities() {
            tx.execute_batch("DELETE FROM entity_tags; DELETE FROM entities;")?;
        }
        if scope.clears_profiles() {
            tx.execute("DELETE FROM profiles", [])?;
        }
        if scope.clears_identity() {
            tx.execute("DELETE FROM identity", [])?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::signed;
    use nostr_sdk::Keys;
    use tempfile::tempdir;

    fn open_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("nested").join("murmur.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_twice_leaves_one_row() {
        let (_dir, store) = open_store();
        let keys = Keys::generate();
        let entity = signed(&keys, 1, "hello", 100, &[&["e", "parent"], &["t", "x"]]);

        store.put(&entity).unwrap();
        store.put(&entity).unwrap();

        assert_eq!(store.query_by_kind(1, 10).unwrap(), vec![entity.clone()]);
        let by_tag = store.query(&Filter::kind(1).tag_ref("e", ["parent"])).unwrap();
        assert_eq!(by_tag, vec![entity.clone()]);
        assert_eq!(store.get_by_id(&entity.id).unwrap(), Some(entity));
    }

    #[test]
    fn test_query_filters() {
        let (_dir, store) = open_store();
        let alice = Keys::generate();
        let bob = Keys::generate();
        let alice_hex = alice.public_key().to_hex();

        let a1 = signed(&alice, 1, "a1", 100, &[]);
        let a2 = signed(&alice, 1, "a2", 200, &[]);
        let b1 = signed(&bob, 1, "b1", 150, &[]);
        let like = signed(&bob, 7, "+", 160, &[&["e", a1.id.as_str()]]);
        for e in [&a1, &a2, &b1, &like] {
            store.put(e).unwrap();
        }

        let newest = store.query_by_kind(1, 2).unwrap();
        assert_eq!(newest, vec![a2.clone(), b1.clone()]);

        let by_alice = store.query(&Filter::kind(1).author(&alice_hex)).unwrap();
        assert_eq!(by_alice, vec![a2.clone(), a1.clone()]);

        let reactions = store
            .query(&Filter::kind(7).tag_ref("e", [a1.id.clone(), "unknown".to_string()]))
            .unwrap();
        assert_eq!(reactions, vec![like]);

        let recent = store.query(&Filter::kind(1).since(150)).unwrap();
        assert_eq!(recent, vec![a2, b1]);

        let none = store.query(&Filter::kind(1).authors(Vec::<String>::new())).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_profiles_identity_and_clear() {
        let (_dir, store) = open_store();
        let profile = Profile {
            author_id: "abc".to_string(),
            name: Some("alice".to_string()),
            created_at: 10,
            last_updated: 20,
            ..Default::default()
        };
        store.put_profile("abc", &profile).unwrap();
        assert_eq!(store.get_profile("abc").unwrap(), Some(profile.clone()));

        store.put_identity("nsec1first").unwrap();
        store.put_identity("nsec1second").unwrap();
        assert_eq!(store.get_identity().unwrap().as_deref(), Some("nsec1second"));

        let older = Profile {
            name: Some("stale".to_string()),
            created_at: 5,
            ..profile.clone()
        };
        assert!(!store.put_profile_if_newer(&older).unwrap());
        assert_eq!(store.get_profile("abc").unwrap(), Some(profile.clone()));

        let newer = Profile {
            name: Some("alice2".to_string()),
            created_at: 11,
            ..profile
        };
        assert!(store.put_profile_if_newer(&newer).unwrap());
        assert_eq!(store.get_profile("abc").unwrap(), Some(newer));

        store.clear(ClearScope::Cache).unwrap();
        assert!(store.get_profile("abc").unwrap().is_none());
        assert!(store.get_identity().unwrap().is_some());

        store.clear(ClearScope::Everything).unwrap();
        assert!(store.get_identity().unwrap().is_none());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("murmur.db");
        let keys = Keys::generate();
        let entity = signed(&keys, 1, "durable", 1, &[]);
        {
            let store = SqliteStore::open(&path).unwrap();
            store.put(&entity).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_by_id(&entity.id).unwrap(), Some(entity));
    }

    #[test]
    fn test_timestamp_beyond_i64_is_rejected() {
        let (_dir, store) = open_store();
        let mut entity = signed(&Keys::generate(), 1, "far future", 1, &[]);
        entity.created_at = i64::MAX as u64 + 1;

        let err = store.put(&entity).unwrap_err();
        assert!(matches!(err, StoreError::InvalidEntity(_)));
        assert!(store.get_by_id(&entity.id).unwrap().is_none());

        let since_max = store.query(&Filter::kind(1).since(u64::MAX)).unwrap();
        assert!(since_max.is_empty());
    }

    #[test]
    fn test_profiles_table_gains_created_at_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("murmur.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE profiles (author_id TEXT PRIMARY KEY, data TEXT NOT NULL);",
            )
            .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let profile = Profile {
            author_id: "abc".to_string(),
            created_at: 1,
            ..Default::default()
        };
        assert!(store.put_profile_if_newer(&profile).unwrap());
        assert_eq!(store.get_profile("abc").unwrap(), Some(profile));
    }
}
