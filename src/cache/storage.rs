//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::request::{RequestKey, Response};

/// A single stored response.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  /// The stored response snapshot
  pub response: Response,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// Implementations must tolerate concurrent callers; no transactional
/// guarantee is required across separate calls.
pub trait CacheStorage: Send + Sync {
  /// Create the generation if it does not exist yet.
  fn open_generation(&self, name: &str) -> Result<()>;

  /// Names of every stored generation, oldest first.
  fn generation_names(&self) -> Result<Vec<String>>;

  /// Delete a generation and all of its entries. Returns false if it did not exist.
  fn delete_generation(&self, name: &str) -> Result<bool>;

  /// Look up a single entry.
  fn get_entry(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

  /// Store a single entry, creating the generation if needed.
  fn store_entry(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Store several entries at once. Either all of them are written or none.
  fn store_entries(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Number of entries held by a generation.
  fn entry_count(&self, generation: &str) -> Result<usize>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) a cache database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open the cache database at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open a throwaway database held in memory.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("hikecache").join("cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots (serialized JSON), owned by exactly one generation
CREATE TABLE IF NOT EXISTS entries (
    generation TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_entries_generation ON entries(generation);
"#;

const INSERT_GENERATION: &str = "INSERT OR IGNORE INTO generations (name) VALUES (?)";

const UPSERT_ENTRY: &str =
  "INSERT OR REPLACE INTO entries (generation, key_hash, method, url, data, cached_at)
   VALUES (?, ?, ?, ?, ?, datetime('now'))";

impl CacheStorage for SqliteStorage {
  fn open_generation(&self, name: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(INSERT_GENERATION, params![name])
      .map_err(|e| eyre!("Failed to create generation {}: {}", name, e))?;
    Ok(())
  }

  fn generation_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM generations ORDER BY created_at, rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list generations: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read generation name: {}", e))?;

    Ok(names)
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE generation = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;

    let removed = tx
      .execute("DELETE FROM generations WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete generation {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn get_entry(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    let conn = self.lock()?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM entries WHERE generation = ? AND key_hash = ?",
        params![generation, key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key, e))?;

    match row {
      Some((data, cached_at_str)) => {
        let response: Response = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize entry {}: {}", key, e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CachedEntry {
          response,
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn store_entry(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()> {
    self.store_entries(generation, &[(key.clone(), response.clone())])
  }

  fn store_entries(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(INSERT_GENERATION, params![generation])
      .map_err(|e| eyre!("Failed to create generation {}: {}", generation, e))?;

    for (key, response) in entries {
      let data =
        serde_json::to_vec(response).map_err(|e| eyre!("Failed to serialize entry: {}", e))?;

      tx.execute(
        UPSERT_ENTRY,
        params![generation, key.cache_hash(), key.method, key.url, data],
      )
      .map_err(|e| eyre!("Failed to store {}: {}", key, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn entry_count(&self, generation: &str) -> Result<usize> {
    let conn = self.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM entries WHERE generation = ?",
        params![generation],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", generation, e))?;

    Ok(count as usize)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;
  use url::Url;

  fn key(path: &str) -> RequestKey {
    let url = Url::parse("http://localhost:8196").unwrap().join(path).unwrap();
    RequestKey::new(&Method::GET, &url)
  }

  #[test]
  fn test_generations_are_listed_in_creation_order() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.open_generation("v1").unwrap();
    storage.open_generation("v2").unwrap();
    storage.open_generation("v1").unwrap();

    assert_eq!(storage.generation_names().unwrap(), vec!["v1", "v2"]);
  }

  #[test]
  fn test_entries_are_scoped_to_their_generation() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let response = Response::new(200, "<html>v1</html>");

    storage
      .store_entry("v1", &key("/index.html"), &response)
      .unwrap();

    let hit = storage.get_entry("v1", &key("/index.html")).unwrap();
    assert_eq!(hit.map(|e| e.response), Some(response));
    assert!(storage.get_entry("v2", &key("/index.html")).unwrap().is_none());
    assert!(storage.get_entry("v1", &key("/other")).unwrap().is_none());
  }

  #[test]
  fn test_store_entry_creates_generation() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .store_entry("v3", &key("/api/hike"), &Response::new(200, "[]"))
      .unwrap();

    assert_eq!(storage.generation_names().unwrap(), vec!["v3"]);
    assert_eq!(storage.entry_count("v3").unwrap(), 1);
  }

  #[test]
  fn test_store_entries_replaces_existing() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let entries = vec![
      (key("/index.html"), Response::new(200, "old")),
      (key("/favicon.ico"), Response::new(200, "icon")),
    ];
    storage.store_entries("v1", &entries).unwrap();
    storage
      .store_entries("v1", &[(key("/index.html"), Response::new(200, "new"))])
      .unwrap();

    assert_eq!(storage.entry_count("v1").unwrap(), 2);
    let entry = storage.get_entry("v1", &key("/index.html")).unwrap().unwrap();
    assert_eq!(entry.response.body_text(), "new");
  }

  #[test]
  fn test_delete_generation_removes_entries() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .store_entry("v1", &key("/index.html"), &Response::new(200, "a"))
      .unwrap();
    storage
      .store_entry("v2", &key("/index.html"), &Response::new(200, "b"))
      .unwrap();

    assert!(storage.delete_generation("v1").unwrap());
    assert!(!storage.delete_generation("v1").unwrap());

    assert_eq!(storage.generation_names().unwrap(), vec!["v2"]);
    assert_eq!(storage.entry_count("v1").unwrap(), 0);
    assert_eq!(storage.entry_count("v2").unwrap(), 1);
  }

  #[test]
  fn test_open_on_disk_persists() {
    let dir = std::env::temp_dir().join(format!("hikecache-test-{}", std::process::id()));
    let path = dir.join("cache.db");

    {
      let storage = SqliteStorage::open(&path).unwrap();
      storage
        .store_entry("v1", &key("/waiver.txt"), &Response::new(200, "waiver"))
        .unwrap();
    }

    let storage = SqliteStorage::open(&path).unwrap();
    let entry = storage.get_entry("v1", &key("/waiver.txt")).unwrap().unwrap();
    assert_eq!(entry.response.body_text(), "waiver");

    std::fs::remove_dir_all(&dir).unwrap();
  }
}
