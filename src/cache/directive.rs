//! `Cache-Control` directives written onto cached responses, and the reading
//! side stores use to decide whether an entry may still be served.

use chrono::Duration;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL};
use std::fmt;

/// Freshness and stale windows for one call, in seconds.
///
/// A negative value switches that window off. When both are negative the
/// response must not be stored at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheDirective {
  pub cache_ttl: i64,
  pub stale_ttl: i64,
}

impl CacheDirective {
  pub fn new(cache_ttl: i64, stale_ttl: i64) -> Self {
    Self {
      cache_ttl,
      stale_ttl,
    }
  }

  /// No caching of any kind for this call.
  pub fn is_disabled(&self) -> bool {
    self.cache_ttl < 0 && self.stale_ttl < 0
  }

  pub fn header_value(&self) -> HeaderValue {
    // Only ASCII digits and fixed tokens, always a valid header value
    HeaderValue::from_str(&self.to_string()).unwrap_or(HeaderValue::from_static("no-store"))
  }
}

impl fmt::Display for CacheDirective {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_disabled() {
      return f.write_str("private, no-store, no-cache");
    }

    f.write_str("public")?;
    if self.cache_ttl >= 0 {
      write!(f, ", max-age={}", self.cache_ttl)?;
    }
    if self.stale_ttl >= 0 {
      write!(f, ", stale-while-revalidate={}", self.stale_ttl)?;
    }
    Ok(())
  }
}

/// Parsed view of a stored response's `Cache-Control` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Freshness {
  pub no_store: bool,
  pub max_age: Option<u64>,
  pub stale_while_revalidate: Option<u64>,
}

impl Freshness {
  pub fn parse(value: &str) -> Self {
    let mut freshness = Self::default();

    for token in value.split(',').map(str::trim) {
      let (name, arg) = match token.split_once('=') {
        Some((name, arg)) => (name.trim(), Some(arg.trim().trim_matches('"'))),
        None => (token, None),
      };

      match name.to_ascii_lowercase().as_str() {
        "no-store" => freshness.no_store = true,
        "max-age" => freshness.max_age = arg.and_then(|a| a.parse().ok()),
        "stale-while-revalidate" => {
          freshness.stale_while_revalidate = arg.and_then(|a| a.parse().ok())
        }
        _ => {}
      }
    }

    freshness
  }

  /// Read from a header map. A missing header means "nothing servable".
  pub fn from_headers(headers: &HeaderMap) -> Self {
    headers
      .get(CACHE_CONTROL)
      .and_then(|v| v.to_str().ok())
      .map(Self::parse)
      .unwrap_or_default()
  }

  /// Total seconds an entry may be served: fresh window plus stale window.
  /// A missing `max-age` counts as zero.
  pub fn lifetime_secs(&self) -> u64 {
    self
      .max_age
      .unwrap_or(0)
      .saturating_add(self.stale_while_revalidate.unwrap_or(0))
  }

  pub fn storable(&self) -> bool {
    !self.no_store && self.lifetime_secs() > 0
  }

  pub fn servable(&self, age: Duration) -> bool {
    if self.no_store {
      return false;
    }
    within(age, self.lifetime_secs())
  }
}

/// `age < secs`, treating windows too large for a `Duration` as unbounded.
fn within(age: Duration, secs: u64) -> bool {
  i64::try_from(secs)
    .ok()
    .and_then(Duration::try_seconds)
    .map_or(true, |limit| age < limit)
}
