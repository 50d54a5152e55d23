//! In-process cache store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::trace;

use super::key::CacheKey;
use super::traits::{is_servable, is_storable, CacheStore};
use crate::tunnel::Response;

#[derive(Debug, Clone)]
struct MemoryEntry {
  response: Response,
  stored_at: DateTime<Utc>,
}

/// Cache store that keeps responses in a map for the life of the process.
///
/// An expired entry is dropped the first time a lookup finds it.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<CacheKey, MemoryEntry>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.lock().map(|e| e.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Pretend every entry was stored `by` earlier than it was.
  #[cfg(test)]
  pub fn backdate(&self, by: chrono::Duration) {
    for entry in self.entries.lock().unwrap().values_mut() {
      entry.stored_at -= by;
    }
  }
}

impl CacheStore for MemoryStorage {
  fn lookup(&self, key: &CacheKey) -> Result<Option<Response>> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let Some(entry) = entries.get(key) else {
      return Ok(None);
    };

    if is_servable(&entry.response, entry.stored_at, Utc::now()) {
      return Ok(Some(entry.response.clone()));
    }

    trace!(url = %key.url(), "memory entry expired");
    entries.remove(key);
    Ok(None)
  }

  fn put(&self, key: &CacheKey, response: &Response) -> Result<()> {
    if !is_storable(response) {
      return Ok(());
    }

    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    entries.insert(
      key.clone(),
      MemoryEntry {
        response: response.clone(),
        stored_at: Utc::now(),
      },
    );

    Ok(())
  }
}
