//! SQLite implementation of the cache store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::traits::{CacheStore, CachedResponse, RequestIdentity};
use crate::net::Response;

/// SQLite-based cache storage.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the cache database at `path`.
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

  /// Open a throwaway database that lives only as long as the store.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("swguard").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Named generations; rowid preserves creation order
CREATE TABLE IF NOT EXISTS generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per (generation, request identity)
CREATE TABLE IF NOT EXISTS entries (
    generation TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_hash)
);

CREATE INDEX IF NOT EXISTS idx_entries_generation ON entries(generation);
"#;

impl CacheStore for SqliteStore {
  fn open(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO generations (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open generation {}: {}", name, e))?;

    Ok(())
  }

  fn get(&self, generation: &str, identity: &RequestIdentity) -> Result<Option<CachedResponse>> {
    if !identity.is_cacheable() {
      return Ok(None);
    }

    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(u16, String, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, status_text, headers, body, cached_at FROM entries
         WHERE generation = ? AND request_hash = ?",
        params![generation, identity.cache_hash()],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {} in {}: {}", identity, generation, e))?;

    let Some((status, status_text, headers, body, cached_at)) = row else {
      return Ok(None);
    };

    let headers: Vec<(String, Vec<u8>)> = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", identity, e))?;

    Ok(Some(CachedResponse {
      response: Response {
        status,
        status_text,
        headers,
        body,
        source: Default::default(),
      },
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn put(&self, generation: &str, identity: &RequestIdentity, response: &Response) -> Result<()> {
    identity.ensure_cacheable()?;

    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    let tx = conn
      .unchecked_transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO generations (name) VALUES (?)",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to open generation {}: {}", generation, e))?;

    tx.execute(
      "INSERT OR REPLACE INTO entries
         (generation, request_hash, method, url, status, status_text, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        generation,
        identity.cache_hash(),
        identity.method().as_str(),
        identity.url().as_str(),
        response.status,
        response.status_text,
        headers,
        response.body,
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", identity, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .unchecked_transaction()
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

  fn list_names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM generations ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list generations: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read generation name: {}", e))?;

    Ok(names)
  }

  fn entry_count(&self, name: &str) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM entries WHERE generation = ?",
        params![name],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", name, e))?;

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

  fn identity(path: &str) -> RequestIdentity {
    let url = Url::parse("https://shop.example/").unwrap().join(path).unwrap();
    RequestIdentity::new(Method::GET, &url)
  }

  #[test]
  fn test_put_then_get_round_trips_payload() {
    let store = SqliteStore::open_in_memory().unwrap();
    let response = Response::new(200, vec![0u8, 159, 146, 150, 255])
      .with_header("Content-Type", "application/octet-stream")
      .with_header("Set-Cookie", "a=1")
      .with_header("Set-Cookie", "b=2")
      .with_header("Content-Disposition", b"attachment; filename=\"caf\xe9.pdf\"".to_vec());

    store.put("dyn-v1", &identity("/blob"), &response).unwrap();
    let cached = store.get("dyn-v1", &identity("/blob")).unwrap().unwrap();

    assert_eq!(cached.response, response);
  }

  #[test]
  fn test_get_is_scoped_to_generation() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
      .put("a-v1", &identity("/x"), &Response::new(200, "x"))
      .unwrap();

    assert!(store.get("b-v1", &identity("/x")).unwrap().is_none());
    assert!(store.get("a-v1", &identity("/y")).unwrap().is_none());
  }

  #[test]
  fn test_put_overwrites_whole_entry() {
    let store = SqliteStore::open_in_memory().unwrap();
    let id = identity("/data.json");
    store
      .put("d", &id, &Response::new(200, "old").with_header("etag", "1"))
      .unwrap();
    store.put("d", &id, &Response::new(201, "new")).unwrap();

    let cached = store.get("d", &id).unwrap().unwrap().response;
    assert_eq!(cached.status, 201);
    assert_eq!(cached.body, b"new");
    assert!(cached.headers.is_empty());
    assert_eq!(store.entry_count("d").unwrap(), 1);
  }

  #[test]
  fn test_put_rejects_non_get() {
    let store = SqliteStore::open_in_memory().unwrap();
    let url = Url::parse("https://shop.example/api/order").unwrap();
    let post = RequestIdentity::new(Method::POST, &url);

    assert!(store.put("d", &post, &Response::new(200, "")).is_err());
    assert!(store.get("d", &post).unwrap().is_none());
    assert!(store.list_names().unwrap().is_empty());
  }

  #[test]
  fn test_names_listed_in_creation_order() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.open("static-v1").unwrap();
    store
      .put("dynamic-v1", &identity("/a"), &Response::new(200, "a"))
      .unwrap();
    store.open("bundle-v1").unwrap();
    store.open("static-v1").unwrap();

    assert_eq!(
      store.list_names().unwrap(),
      vec!["static-v1", "dynamic-v1", "bundle-v1"]
    );
  }

  #[test]
  fn test_delete_removes_generation_and_entries() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
      .put("old-v0", &identity("/a"), &Response::new(200, "a"))
      .unwrap();
    store.open("new-v1").unwrap();

    assert!(store.delete("old-v0").unwrap());
    assert!(!store.delete("old-v0").unwrap());
    assert_eq!(store.list_names().unwrap(), vec!["new-v1"]);
    assert_eq!(store.entry_count("old-v0").unwrap(), 0);
    assert!(store.get("old-v0", &identity("/a")).unwrap().is_none());
  }

  #[test]
  fn test_entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    {
      let store = SqliteStore::open(&path).unwrap();
      store
        .put("static-v1", &identity("/index.html"), &Response::new(200, "<html>"))
        .unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.list_names().unwrap(), vec!["static-v1"]);
    let cached = store
      .get("static-v1", &identity("/index.html"))
      .unwrap()
      .unwrap();
    assert_eq!(cached.response.body, b"<html>");
  }

  #[test]
  fn test_match_in_searches_generations_in_order() {
    let store = SqliteStore::open_in_memory().unwrap();
    let id = identity("/logo.png");
    store.put("second", &id, &Response::new(200, "2")).unwrap();
    store.put("first", &id, &Response::new(200, "1")).unwrap();

    let hit = store.match_in(&["first", "second"], &id).unwrap().unwrap();
    assert_eq!(hit.response.body, b"1");
    assert!(store.match_in(&["third"], &id).unwrap().is_none());
  }
}
