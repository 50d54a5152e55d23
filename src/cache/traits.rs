//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use super::directive::Freshness;
use super::key::CacheKey;
use crate::tunnel::Response;

/// Trait for cache storage backends.
///
/// A store is handed responses that already carry their `Cache-Control`
/// directive and is responsible for honoring it: refusing `no-store`
/// responses and only returning entries still inside their serving window.
/// Eviction is entirely the store's business.
pub trait CacheStore: Send + Sync {
  /// Find a servable response for `key`.
  fn lookup(&self, key: &CacheKey) -> Result<Option<Response>>;

  /// Store `response` under `key`, replacing any previous entry.
  fn put(&self, key: &CacheKey, response: &Response) -> Result<()>;
}

/// Whether an entry stored at `stored_at` may still be served at `now`.
pub(crate) fn is_servable(
  response: &Response,
  stored_at: DateTime<Utc>,
  now: DateTime<Utc>,
) -> bool {
  Freshness::from_headers(response.headers()).servable(now - stored_at)
}

/// Whether a response may be written at all.
pub(crate) fn is_storable(response: &Response) -> bool {
  Freshness::from_headers(response.headers()).storable()
}
