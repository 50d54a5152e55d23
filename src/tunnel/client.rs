//! Tunnel client with transparent per-command caching.

use color_eyre::Result;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use std::sync::Arc;

use crate::cache::{CacheStore, CachingFetchLayer, FetchOptions};
use crate::command::IntoCommand;
use crate::error::ConfigError;

use super::connection::ConnectionConfig;
use super::credentials::credential_headers;
use super::response::Response;
use super::transport::{HttpOrigin, Origin};

pub const PING_PATH: &str = "/ping";
pub const SUBMIT_PATH: &str = "/submit";

/// Ping results are reused for a few seconds to damp health-check traffic.
const PING_CACHE_TTL: i64 = 0;
const PING_STALE_TTL: i64 = 3;

/// Client for one tunnel endpoint.
///
/// The cache store is shared, not owned: several clients may point at the
/// same store.
pub struct TunnelClient<S: CacheStore + ?Sized = dyn CacheStore, O: Origin = HttpOrigin> {
  fetcher: CachingFetchLayer<S, O>,
}

impl<S: CacheStore + ?Sized> TunnelClient<S, HttpOrigin> {
  /// Create a client that talks HTTP to the configured host.
  pub fn new(config: &ConnectionConfig, store: Arc<S>) -> Result<Self> {
    let origin = HttpOrigin::new()?;
    Ok(Self::with_origin(config, store, origin)?)
  }
}

impl<S: CacheStore + ?Sized, O: Origin> TunnelClient<S, O> {
  /// Create a client over an arbitrary origin transport.
  pub fn with_origin(
    config: &ConnectionConfig,
    store: Arc<S>,
    origin: O,
  ) -> Result<Self, ConfigError> {
    let headers = credential_headers(config)?;
    let fetcher = CachingFetchLayer::new(config.host().clone(), headers, store, Arc::new(origin));

    Ok(Self { fetcher })
  }

  /// Health check against the tunnel.
  pub async fn ping(&self) -> Response {
    self
      .fetcher
      .fetch(
        PING_PATH,
        FetchOptions::get().cache(PING_CACHE_TTL, PING_STALE_TTL),
      )
      .await
  }

  /// Run a command on the upstream database.
  ///
  /// Fails only when the command itself is invalid; everything that goes
  /// wrong on the wire comes back as a non-ok [`Response`].
  pub async fn submit(&self, command: impl IntoCommand) -> Result<Response, ConfigError> {
    let command = command.into_command()?;

    let body = match command.to_body() {
      Ok(body) => body,
      Err(e) => {
        return Ok(Response::failure(
          StatusCode::BAD_REQUEST,
          format!("Failed to serialize command: {}", e),
        ))
      }
    };

    let options = FetchOptions::post(body)
      .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
      .cache(command.cache_ttl(), command.stale_ttl());

    Ok(self.fetcher.fetch(SUBMIT_PATH, options).await)
  }
}

impl<S: CacheStore + ?Sized, O: Origin> Clone for TunnelClient<S, O> {
  fn clone(&self) -> Self {
    Self {
      fetcher: self.fetcher.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{MemoryStorage, SqliteStorage};
  use crate::command::{Command, CommandParams, Mode};
  use crate::tunnel::credentials::{CLIENT_ID_HEADER, CLIENT_SECRET_HEADER};
  use crate::tunnel::transport::stub::StubOrigin;
  use reqwest::header::CACHE_CONTROL;
  use reqwest::Method;

  fn config() -> ConnectionConfig {
    ConnectionConfig::new("db.example.com", None, None).unwrap()
  }

  fn client(
    origin: StubOrigin,
  ) -> (
    TunnelClient<MemoryStorage, Arc<StubOrigin>>,
    Arc<MemoryStorage>,
    Arc<StubOrigin>,
  ) {
    let store = Arc::new(MemoryStorage::new());
    let origin = Arc::new(origin);
    let client = TunnelClient::with_origin(&config(), Arc::clone(&store), Arc::clone(&origin))
      .unwrap();
    (client, store, origin)
  }

  #[tokio::test]
  async fn test_ping_served_from_cache_within_stale_window() {
    let (client, store, origin) = client(StubOrigin::json(""));

    let first = client.ping().await;
    assert!(first.ok());
    assert_eq!(
      first.cache_control(),
      Some("public, max-age=0, stale-while-revalidate=3")
    );
    assert_eq!(origin.calls(), 1);

    store.backdate(chrono::Duration::seconds(2));
    assert!(client.ping().await.ok());
    assert_eq!(origin.calls(), 1);

    store.backdate(chrono::Duration::seconds(2));
    assert!(client.ping().await.ok());
    assert_eq!(origin.calls(), 2);
  }

  #[tokio::test]
  async fn test_ping_request_shape() {
    let (client, _, origin) = client(StubOrigin::json(""));
    client.ping().await;

    let request = origin.last_request().unwrap();
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.url.as_str(), "https://db.example.com/ping");
    assert!(request.body.is_none());
  }

  #[tokio::test]
  async fn test_submit_posts_json_command() {
    let (client, store, origin) = client(StubOrigin::json(r#"[{"id":1}]"#));

    let response = client.submit("SELECT id FROM t").await.unwrap();
    assert_eq!(response.rows().unwrap()[0]["id"], 1);

    let request = origin.last_request().unwrap();
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.url.as_str(), "https://db.example.com/submit");
    assert_eq!(request.headers[CONTENT_TYPE], "application/json");

    let body: serde_json::Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
    assert_eq!(body["statement"], "SELECT id FROM t");
    assert_eq!(body["mode"], "query");
    assert_eq!(body["cacheTtl"], -1);

    // Default command is uncacheable
    assert!(store.is_empty());
    assert!(response.headers().get(CACHE_CONTROL).is_none());
  }

  #[tokio::test]
  async fn test_submit_uses_command_ttls() {
    let (client, store, origin) = client(StubOrigin::json("[]"));
    let command = Command::from_params(CommandParams {
      cache_ttl: Some(60),
      stale_ttl: Some(10),
      ..CommandParams::new("SELECT 1")
    })
    .unwrap();

    let first = client.submit(&command).await.unwrap();
    assert_eq!(
      first.cache_control(),
      Some("public, max-age=60, stale-while-revalidate=10")
    );
    client.submit(command).await.unwrap();

    assert_eq!(origin.calls(), 1);
    assert_eq!(store.len(), 1);
  }

  #[tokio::test]
  async fn test_submit_rejects_missing_statement() {
    let (client, _, origin) = client(StubOrigin::json("[]"));

    let err = client
      .submit(CommandParams {
        mode: Some(Mode::Exec),
        ..CommandParams::default()
      })
      .await
      .unwrap_err();

    assert_eq!(err, ConfigError::MissingStatement);
    assert_eq!(origin.calls(), 0);
  }

  #[tokio::test]
  async fn test_credentials_sent() {
    let config =
      ConnectionConfig::new("db.example.com", Some("id".into()), Some("secret".into())).unwrap();
    let origin = Arc::new(StubOrigin::json(""));
    let store = Arc::new(MemoryStorage::new());
    let client = TunnelClient::with_origin(&config, store, Arc::clone(&origin)).unwrap();

    client.ping().await;

    let request = origin.last_request().unwrap();
    assert_eq!(request.headers[&CLIENT_ID_HEADER], "id");
    assert_eq!(request.headers[&CLIENT_SECRET_HEADER], "secret");
  }

  #[tokio::test]
  async fn test_concurrent_misses_both_reach_origin() {
    let (client, store, origin) = client(StubOrigin::json("[]"));
    let params = || CommandParams {
      cache_ttl: Some(30),
      ..CommandParams::new("SELECT 1")
    };

    let (a, b) = futures::join!(client.submit(params()), client.submit(params()));
    assert!(a.unwrap().ok() && b.unwrap().ok());
    assert_eq!(origin.calls(), 2);
    assert_eq!(store.len(), 1);
  }

  #[tokio::test]
  async fn test_shared_dyn_store() {
    let store: Arc<dyn CacheStore> = Arc::new(SqliteStorage::in_memory().unwrap());
    let origin = Arc::new(StubOrigin::json("[]"));
    let a = TunnelClient::with_origin(&config(), Arc::clone(&store), Arc::clone(&origin)).unwrap();
    let b = TunnelClient::with_origin(&config(), store, Arc::clone(&origin)).unwrap();

    a.ping().await;
    b.ping().await;
    assert_eq!(origin.calls(), 1);
  }
}
