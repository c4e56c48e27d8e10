//! SQLite persistence for relayed spawns.

use anyhow::{Context, Result, anyhow};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::pipeline::{SpawnStore, StoredSpawn};

pub type SharedDb = Arc<Mutex<sqlite::Connection>>;

/// Lock a shared connection, turning a poisoned mutex into an error.
pub fn lock(db: &SharedDb) -> Result<std::sync::MutexGuard<'_, sqlite::Connection>> {
    db.lock().map_err(|_| anyhow!("database mutex poisoned"))
}

#[derive(Clone)]
pub struct SqliteStore {
    db: SharedDb,
}

impl SqliteStore {
    /// Open (or create) the spawn database and ensure the schema exists.
    pub fn open(path: &str) -> Result<Self> {
        let conn =
            sqlite::open(path).with_context(|| format!("failed to open spawn db {path}"))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS spawns (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                name         TEXT    NOT NULL,
                lat          TEXT    NOT NULL,
                lon          TEXT    NOT NULL,
                iv           INTEGER,
                channel      TEXT    NOT NULL,
                author_id    TEXT    NOT NULL,
                origin_group TEXT    NOT NULL,
                seen_at      TEXT    NOT NULL
             );",
        )?;
        info!("Spawn DB opened at {path}");
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn count(&self) -> Result<i64> {
        let db = lock(&self.db)?;
        let mut stmt = db.prepare("SELECT COUNT(*) FROM spawns")?;
        stmt.next()?;
        Ok(stmt.read::<i64, _>(0)?)
    }
}

impl SpawnStore for SqliteStore {
    fn insert(&self, spawn: &StoredSpawn) -> Result<()> {
        let db = lock(&self.db)?;
        let mut stmt = db.prepare(
            "INSERT INTO spawns (name, lat, lon, iv, channel, author_id, origin_group, seen_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        stmt.bind((1, spawn.name.as_str()))?;
        stmt.bind((2, spawn.lat.as_str()))?;
        stmt.bind((3, spawn.lon.as_str()))?;
        stmt.bind((4, spawn.iv.map(i64::from)))?;
        stmt.bind((5, spawn.channel.as_str()))?;
        stmt.bind((6, spawn.author_id.as_str()))?;
        stmt.bind((7, spawn.origin_group.as_str()))?;
        stmt.bind((8, spawn.seen_at.as_str()))?;
        stmt.next().context("insert into spawns failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(name: &str, iv: Option<u8>) -> StoredSpawn {
        StoredSpawn {
            name: name.into(),
            lat: "40.7128".into(),
            lon: "-74.0060".into(),
            iv,
            channel: "nyc".into(),
            author_id: "42".into(),
            origin_group: "Spawn Hunters".into(),
            seen_at: "2024-01-01T00:00:00+00:00".into(),
        }
    }

    #[test]
    fn inserts_rows_with_and_without_iv() {
        let store = SqliteStore::open(":memory:").unwrap();
        store.insert(&stored("Pidgey", Some(95))).unwrap();
        store.insert(&stored("Rattata", None)).unwrap();
        assert_eq!(store.count().unwrap(), 2);

        let db = lock(&store.db).unwrap();
        let mut stmt = db
            .prepare("SELECT name, lon FROM spawns WHERE iv IS NULL")
            .unwrap();
        assert!(matches!(stmt.next().unwrap(), sqlite::State::Row));
        assert_eq!(stmt.read::<String, _>(0).unwrap(), "Rattata");
        assert_eq!(stmt.read::<String, _>(1).unwrap(), "-74.0060");
    }

    #[test]
    fn coordinates_keep_their_text() {
        let store = SqliteStore::open(":memory:").unwrap();
        store.insert(&stored("Mew", Some(100))).unwrap();

        let db = lock(&store.db).unwrap();
        let mut stmt = db.prepare("SELECT lat, iv FROM spawns").unwrap();
        stmt.next().unwrap();
        assert_eq!(stmt.read::<String, _>(0).unwrap(), "40.7128");
        assert_eq!(stmt.read::<i64, _>(1).unwrap(), 100);
    }
}
