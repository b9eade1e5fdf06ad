use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::preferences::migrations::BASE_MIGRATION;

/// Durable key/value storage for opaque preference blobs.
pub trait PreferenceStore: Send {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, blob: &str) -> Result<()>;
}

impl<S: PreferenceStore + ?Sized> PreferenceStore for Box<S> {
    fn load(&self, key: &str) -> Result<Option<String>> {
        (**self).load(key)
    }

    fn save(&self, key: &str, blob: &str) -> Result<()> {
        (**self).save(key, blob)
    }
}

pub struct SqlitePreferenceStore {
    conn: Connection,
}

impl SqlitePreferenceStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(BASE_MIGRATION)?;
        Ok(())
    }
}

impl PreferenceStore for SqlitePreferenceStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn save(&self, key: &str, blob: &str) -> Result<()> {
        self.conn.execute(
            r#"
INSERT INTO preferences(key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
"#,
            params![key, blob, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

/// Process-local store; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferenceStore {
    blobs: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let guard = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(key).cloned())
    }

    fn save(&self, key: &str, blob: &str) -> Result<()> {
        let mut guard = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryPreferenceStore, PreferenceStore, SqlitePreferenceStore};

    #[test]
    fn sqlite_store_upserts_by_key() {
        let store = SqlitePreferenceStore::open_in_memory().expect("open store");
        assert_eq!(store.load("k").expect("load"), None);
        store.save("k", "{\"a\":1}").expect("first save");
        store.save("k", "{\"a\":2}").expect("second save");
        assert_eq!(store.load("k").expect("load"), Some("{\"a\":2}".to_string()));
    }

    #[test]
    fn sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("prefs.db");
        {
            let store = SqlitePreferenceStore::open(&path).expect("open store");
            store.save("k", "v").expect("save");
        }
        let reopened = SqlitePreferenceStore::open(&path).expect("reopen store");
        assert_eq!(reopened.load("k").expect("load"), Some("v".to_string()));
    }

    #[test]
    fn memory_store_clones_share_state() {
        let store = MemoryPreferenceStore::new();
        let view = store.clone();
        store.save("k", "v").expect("save");
        assert_eq!(view.load("k").expect("load"), Some("v".to_string()));
    }
}
