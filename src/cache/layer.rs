//! Cache layer that orchestrates caching logic with origin fetching.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL};
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::directive::CacheDirective;
use super::key::CacheKey;
use super::traits::CacheStore;
use crate::tunnel::{Origin, RequestDescriptor, Response};

/// Host suffix of the authentication gateway that fronts the tunnel.
pub const GATEWAY_DOMAIN: &str = "cloudflareaccess.com";

pub const GATEWAY_REDIRECT_MESSAGE: &str = "The request was redirected to the authentication \
  gateway's login page instead of reaching the database. Check the client id and client secret.";

/// Per-call request options.
#[derive(Debug, Clone)]
pub struct FetchOptions {
  pub method: Method,
  pub headers: HeaderMap,
  pub body: Option<Vec<u8>>,
  /// Freshness window in seconds, negative for none
  pub cache_ttl: i64,
  /// Stale window in seconds, negative for none
  pub stale_ttl: i64,
}

impl Default for FetchOptions {
  fn default() -> Self {
    Self {
      method: Method::GET,
      headers: HeaderMap::new(),
      body: None,
      cache_ttl: -1,
      stale_ttl: -1,
    }
  }
}

impl FetchOptions {
  pub fn get() -> Self {
    Self::default()
  }

  pub fn post(body: Vec<u8>) -> Self {
    Self {
      method: Method::POST,
      body: Some(body),
      ..Self::default()
    }
  }

  pub fn cache(mut self, cache_ttl: i64, stale_ttl: i64) -> Self {
    self.cache_ttl = cache_ttl;
    self.stale_ttl = stale_ttl;
    self
  }

  pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
    self.headers.insert(name, value);
    self
  }
}

/// Fetch layer that puts a cache store in front of the origin.
///
/// Concurrent misses on the same key are not coalesced: each one reaches
/// the origin and the last `put` wins.
pub struct CachingFetchLayer<S: CacheStore + ?Sized, O: Origin> {
  base_url: Url,
  base_headers: HeaderMap,
  store: Arc<S>,
  origin: Arc<O>,
}

impl<S: CacheStore + ?Sized, O: Origin> CachingFetchLayer<S, O> {
  pub fn new(base_url: Url, base_headers: HeaderMap, store: Arc<S>, origin: Arc<O>) -> Self {
    Self {
      base_url,
      base_headers,
      store,
      origin,
    }
  }

  /// Fetch `path` relative to the base URL.
  ///
  /// 1. Both windows negative: straight to the origin, cache untouched
  /// 2. Otherwise look the derived key up in the store and return a hit as-is
  /// 3. On a miss call the origin, tag the response with its directive and
  ///    store a copy when it is ok
  pub async fn fetch(&self, path: &str, options: FetchOptions) -> Response {
    let url = match self.base_url.join(path) {
      Ok(url) => url,
      Err(e) => {
        return Response::failure(
          StatusCode::BAD_REQUEST,
          format!("Invalid request path '{}': {}", path, e),
        )
      }
    };

    let directive = CacheDirective::new(options.cache_ttl, options.stale_ttl);
    let request = RequestDescriptor {
      url,
      method: options.method,
      headers: merge_headers(&self.base_headers, options.headers),
      body: options.body,
    };

    if directive.is_disabled() {
      debug!(url = %request.url, "caching disabled");
      return self.call_origin(&request).await;
    }

    let key = CacheKey::for_request(&request);
    match self.store.lookup(&key) {
      Ok(Some(cached)) => {
        debug!(url = %key.url(), "cache hit");
        return cached;
      }
      Ok(None) => debug!(url = %key.url(), "cache miss"),
      Err(e) => warn!(url = %key.url(), error = %e, "cache lookup failed, treating as miss"),
    }

    let mut response = self.call_origin(&request).await;
    response
      .headers_mut()
      .insert(CACHE_CONTROL, directive.header_value());

    if response.ok() {
      match self.store.put(&key, &response) {
        Ok(()) => debug!(url = %key.url(), %directive, "cached response"),
        Err(e) => warn!(url = %key.url(), error = %e, "failed to cache response"),
      }
    }

    response
  }

  async fn call_origin(&self, request: &RequestDescriptor) -> Response {
    match self.origin.send(request).await {
      Ok(response) if is_gateway_redirect(&response) => {
        warn!(
          url = %request.url,
          final_url = ?response.url().map(Url::as_str),
          "request intercepted by authentication gateway"
        );
        Response::failure(StatusCode::UNAUTHORIZED, GATEWAY_REDIRECT_MESSAGE)
      }
      Ok(response) => response,
      Err(e) => {
        warn!(url = %request.url, error = %e, "origin request failed");
        Response::failure(StatusCode::BAD_GATEWAY, e.to_string())
      }
    }
  }
}

impl<S: CacheStore + ?Sized, O: Origin> Clone for CachingFetchLayer<S, O> {
  fn clone(&self) -> Self {
    Self {
      base_url: self.base_url.clone(),
      base_headers: self.base_headers.clone(),
      store: Arc::clone(&self.store),
      origin: Arc::clone(&self.origin),
    }
  }
}

/// True when the transport followed a redirect onto the gateway's domain.
pub fn is_gateway_redirect(response: &Response) -> bool {
  if !response.redirected() {
    return false;
  }

  response
    .url()
    .and_then(Url::host_str)
    .is_some_and(|host| {
      let host = host.trim_end_matches('.').to_ascii_lowercase();
      host == GATEWAY_DOMAIN || host.ends_with(&format!(".{}", GATEWAY_DOMAIN))
    })
}

/// Per-call headers overlaid with the connection's base headers.
/// Base headers win on collision.
pub fn merge_headers(base: &HeaderMap, mut call: HeaderMap) -> HeaderMap {
  for name in base.keys() {
    call.remove(name);
  }
  for (name, value) in base {
    call.append(name.clone(), value.clone());
  }
  call
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::tunnel::transport::stub::StubOrigin;
  use color_eyre::eyre::eyre;
  use reqwest::header::CONTENT_TYPE;

  /// Store whose backend is broken for every call.
  struct FailingStore;

  impl CacheStore for FailingStore {
    fn lookup(&self, _key: &CacheKey) -> color_eyre::Result<Option<Response>> {
      Err(eyre!("disk I/O error"))
    }

    fn put(&self, _key: &CacheKey, _response: &Response) -> color_eyre::Result<()> {
      Err(eyre!("database is locked"))
    }
  }

  type TestLayer = CachingFetchLayer<MemoryStorage, StubOrigin>;

  fn layer(origin: StubOrigin) -> (TestLayer, Arc<MemoryStorage>, Arc<StubOrigin>) {
    let store = Arc::new(MemoryStorage::new());
    let origin = Arc::new(origin);
    let layer = CachingFetchLayer::new(
      Url::parse("https://db.example.com").unwrap(),
      HeaderMap::new(),
      Arc::clone(&store),
      Arc::clone(&origin),
    );
    (layer, store, origin)
  }

  fn gateway_response(status: StatusCode) -> Response {
    Response::new(status, HeaderMap::new(), b"<html>Sign in</html>".to_vec()).with_url(
      Url::parse("https://team.cloudflareaccess.com/cdn-cgi/access/login").unwrap(),
      true,
    )
  }

  #[tokio::test]
  async fn test_disabled_bypasses_store() {
    let (layer, store, origin) = layer(StubOrigin::json("[]"));

    let first = layer.fetch("/submit", FetchOptions::post(b"{}".to_vec())).await;
    let second = layer.fetch("/submit", FetchOptions::post(b"{}".to_vec())).await;

    assert!(first.ok() && second.ok());
    assert_eq!(origin.calls(), 2);
    assert!(store.is_empty());
    assert!(first.cache_control().is_none());
  }

  #[tokio::test]
  async fn test_miss_then_hit() {
    let (layer, store, origin) = layer(StubOrigin::json(r#"[{"n":1}]"#));
    let options = || FetchOptions::post(b"{\"q\":1}".to_vec()).cache(60, -1);

    let first = layer.fetch("/submit", options()).await;
    assert_eq!(first.cache_control(), Some("public, max-age=60"));
    assert_eq!(store.len(), 1);

    let second = layer.fetch("/submit", options()).await;
    assert_eq!(origin.calls(), 1);
    assert_eq!(second.body(), first.body());
  }

  #[tokio::test]
  async fn test_store_errors_fall_through_to_origin() {
    let origin = Arc::new(StubOrigin::json(r#"[{"n":1}]"#));
    let layer = CachingFetchLayer::new(
      Url::parse("https://db.example.com").unwrap(),
      HeaderMap::new(),
      Arc::new(FailingStore),
      Arc::clone(&origin),
    );
    let options = || FetchOptions::post(b"{\"q\":1}".to_vec()).cache(60, -1);

    let first = layer.fetch("/submit", options()).await;
    assert!(first.ok());
    assert_eq!(first.body(), br#"[{"n":1}]"#);
    assert_eq!(first.cache_control(), Some("public, max-age=60"));

    let second = layer.fetch("/submit", options()).await;
    assert!(second.ok());
    assert_eq!(origin.calls(), 2);
  }

  #[tokio::test]
  async fn test_different_bodies_both_reach_origin() {
    let (layer, store, origin) = layer(StubOrigin::json("[]"));

    layer
      .fetch("/submit", FetchOptions::post(b"{\"q\":1}".to_vec()).cache(60, 60))
      .await;
    layer
      .fetch("/submit", FetchOptions::post(b"{\"q\":2}".to_vec()).cache(60, 60))
      .await;

    assert_eq!(origin.calls(), 2);
    assert_eq!(store.len(), 2);
  }

  #[tokio::test]
  async fn test_failures_not_cached() {
    let (layer, store, origin) = layer(StubOrigin::replying(Response::failure(
      StatusCode::INTERNAL_SERVER_ERROR,
      "syntax error",
    )));

    let response = layer.fetch("/submit", FetchOptions::post(vec![]).cache(60, 60)).await;
    assert!(!response.ok());
    assert_eq!(response.error_text().as_deref(), Some("syntax error"));
    assert!(store.is_empty());

    layer.fetch("/submit", FetchOptions::post(vec![]).cache(60, 60)).await;
    assert_eq!(origin.calls(), 2);
  }

  #[tokio::test]
  async fn test_unreachable_origin_is_not_ok() {
    let (layer, _, _) = layer(StubOrigin::unreachable());

    let response = layer.fetch("/ping", FetchOptions::get().cache(0, 3)).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(response.error_text().unwrap().contains("connection refused"));
  }

  #[tokio::test]
  async fn test_gateway_redirect_converted() {
    for status in [StatusCode::OK, StatusCode::FOUND, StatusCode::FORBIDDEN] {
      let (layer, store, _) = layer(StubOrigin::replying(gateway_response(status)));

      let response = layer.fetch("/submit", FetchOptions::post(vec![]).cache(60, 60)).await;
      assert!(!response.ok());
      assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
      assert_eq!(response.text(), GATEWAY_REDIRECT_MESSAGE);
      assert!(store.is_empty());
    }
  }

  #[tokio::test]
  async fn test_gateway_redirect_converted_without_cache() {
    let (layer, _, _) = layer(StubOrigin::replying(gateway_response(StatusCode::OK)));
    let response = layer.fetch("/submit", FetchOptions::post(vec![])).await;
    assert!(!response.ok());
  }

  #[test]
  fn test_gateway_detection_requires_redirect() {
    let not_redirected = Response::new(StatusCode::OK, HeaderMap::new(), vec![]).with_url(
      Url::parse("https://team.cloudflareaccess.com/").unwrap(),
      false,
    );
    assert!(!is_gateway_redirect(&not_redirected));

    let elsewhere = Response::new(StatusCode::OK, HeaderMap::new(), vec![])
      .with_url(Url::parse("https://db.example.com/other").unwrap(), true);
    assert!(!is_gateway_redirect(&elsewhere));

    let lookalike = Response::new(StatusCode::OK, HeaderMap::new(), vec![])
      .with_url(Url::parse("https://notcloudflareaccess.com/").unwrap(), true);
    assert!(!is_gateway_redirect(&lookalike));

    assert!(is_gateway_redirect(&gateway_response(StatusCode::OK)));
  }

  #[tokio::test]
  async fn test_request_resolved_against_base() {
    let (layer, _, origin) = layer(StubOrigin::json("[]"));
    layer
      .fetch(
        "/submit",
        FetchOptions::post(vec![])
          .header(CONTENT_TYPE, HeaderValue::from_static("application/json")),
      )
      .await;

    let request = origin.last_request().unwrap();
    assert_eq!(request.url.as_str(), "https://db.example.com/submit");
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.headers[CONTENT_TYPE], "application/json");
  }

  #[test]
  fn test_base_headers_win() {
    let mut base = HeaderMap::new();
    base.insert("x-shared", HeaderValue::from_static("base"));
    base.insert("x-base", HeaderValue::from_static("1"));

    let mut call = HeaderMap::new();
    call.insert("x-shared", HeaderValue::from_static("call"));
    call.insert("x-call", HeaderValue::from_static("2"));

    let merged = merge_headers(&base, call);
    assert_eq!(merged["x-shared"], "base");
    assert_eq!(merged["x-base"], "1");
    assert_eq!(merged["x-call"], "2");
    assert_eq!(merged.get_all("x-shared").iter().count(), 1);
  }
}
