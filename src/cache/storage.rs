//! SQLite and no-op cache store implementations.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, trace};

use super::directive::Freshness;
use super::key::CacheKey;
use super::traits::{is_servable, is_storable, CacheStore};
use crate::tunnel::Response;

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStore for NoopStorage {
  fn lookup(&self, _key: &CacheKey) -> Result<Option<Response>> {
    Ok(None) // Always miss
  }

  fn put(&self, _key: &CacheKey, _response: &Response) -> Result<()> {
    Ok(()) // Discard
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Create a new SQLite storage at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Create a new SQLite storage at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Storage that lives only as long as the process.
  pub fn in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    storage.purge_expired()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    Ok(crate::config::data_dir()?.join("cache.db"))
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

  /// Delete every row that can no longer be served. Returns how many went.
  pub fn purge_expired(&self) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let now = Utc::now();
    let mut stmt = conn
      .prepare("SELECT key_hash, headers, stored_at FROM response_cache")
      .map_err(|e| eyre!("Failed to scan cache: {}", e))?;
    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, i64>(2)?,
        ))
      })
      .map_err(|e| eyre!("Failed to scan cache: {}", e))?;

    let mut expired = Vec::new();
    for row in rows {
      let (key_hash, headers_json, stored_at) =
        row.map_err(|e| eyre!("Failed to read cache row: {}", e))?;
      let freshness = Freshness::from_headers(&decode_headers(&headers_json)?);
      let servable = DateTime::<Utc>::from_timestamp_millis(stored_at)
        .is_some_and(|stored_at| freshness.servable(now - stored_at));
      if !servable {
        expired.push(key_hash);
      }
    }
    drop(stmt);

    for key_hash in &expired {
      conn
        .execute(
          "DELETE FROM response_cache WHERE key_hash = ?",
          params![key_hash],
        )
        .map_err(|e| eyre!("Failed to delete expired response: {}", e))?;
    }

    if !expired.is_empty() {
      debug!(count = expired.len(), "purged expired cache rows");
    }
    Ok(expired.len())
  }

  #[cfg(test)]
  fn row_count(&self) -> i64 {
    self
      .conn
      .lock()
      .unwrap()
      .query_row("SELECT COUNT(*) FROM response_cache", [], |row| row.get(0))
      .unwrap()
  }

  /// Pretend every row was stored `by` earlier than it was.
  #[cfg(test)]
  fn backdate(&self, by: chrono::Duration) {
    self
      .conn
      .lock()
      .unwrap()
      .execute(
        "UPDATE response_cache SET stored_at = stored_at - ?",
        params![by.num_milliseconds()],
      )
      .unwrap();
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One stored response per key (keyed by SHA256 of the key fingerprint)
CREATE TABLE IF NOT EXISTS response_cache (
    key_hash TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at INTEGER NOT NULL
);
"#;

impl CacheStore for SqliteStorage {
  fn lookup(&self, key: &CacheKey) -> Result<Option<Response>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, i64)> = conn
      .query_row(
        "SELECT status, headers, body, stored_at FROM response_cache WHERE key_hash = ?",
        params![key.digest()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cached response: {}", e))?;

    let Some((status, headers_json, body, stored_at)) = row else {
      return Ok(None);
    };

    let status = StatusCode::from_u16(status)
      .map_err(|e| eyre!("Invalid cached status {}: {}", status, e))?;
    let headers = decode_headers(&headers_json)?;
    let stored_at = DateTime::<Utc>::from_timestamp_millis(stored_at)
      .ok_or_else(|| eyre!("Invalid cached timestamp {}", stored_at))?;

    let response = Response::new(status, headers, body);
    if !is_servable(&response, stored_at, Utc::now()) {
      trace!(url = %key.url(), "sqlite entry expired");
      conn
        .execute(
          "DELETE FROM response_cache WHERE key_hash = ?",
          params![key.digest()],
        )
        .map_err(|e| eyre!("Failed to delete expired response: {}", e))?;
      return Ok(None);
    }

    Ok(Some(response))
  }

  fn put(&self, key: &CacheKey, response: &Response) -> Result<()> {
    if !is_storable(response) {
      return Ok(());
    }

    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (key_hash, url, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
          key.digest(),
          key.url().as_str(),
          response.status().as_u16(),
          encode_headers(response.headers())?,
          response.body(),
          Utc::now().timestamp_millis(),
        ],
      )
      .map_err(|e| eyre!("Failed to store response: {}", e))?;

    Ok(())
  }
}

/// Serialize headers as a JSON list of `[name, value]` pairs.
/// Values that aren't valid UTF-8 are dropped.
fn encode_headers(headers: &HeaderMap) -> Result<String> {
  let pairs: Vec<(&str, &str)> = headers
    .iter()
    .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
    .collect();

  serde_json::to_string(&pairs).map_err(|e| eyre!("Failed to serialize headers: {}", e))
}

fn decode_headers(json: &str) -> Result<HeaderMap> {
  let pairs: Vec<(String, String)> =
    serde_json::from_str(json).map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;

  let mut headers = HeaderMap::new();
  for (name, value) in pairs {
    if let (Ok(name), Ok(value)) = (
      HeaderName::from_bytes(name.as_bytes()),
      HeaderValue::from_str(&value),
    ) {
      headers.append(name, value);
    }
  }

  Ok(headers)
}
