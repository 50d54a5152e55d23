//! Response caching in front of the tunnel origin.
//!
//! This module provides:
//! - Cache key derivation, with POST bodies folded in as a SHA256 path segment
//! - `Cache-Control` directives carrying a freshness and a stale window
//! - A fetch layer that serves hits from the store and fills it on misses
//! - SQLite, in-memory and no-op stores

mod directive;
mod key;
mod layer;
mod memory;
mod storage;
mod traits;

pub use directive::{CacheDirective, Freshness};
pub use key::{body_digest, CacheKey};
pub use layer::{
  is_gateway_redirect, merge_headers, CachingFetchLayer, FetchOptions, GATEWAY_DOMAIN,
  GATEWAY_REDIRECT_MESSAGE,
};
pub use memory::MemoryStorage;
pub use storage::{NoopStorage, SqliteStorage};
pub use traits::CacheStore;
