//! Response object returned by every tunnel operation.

use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::Url;

/// A single result row.
pub type Row = Map<String, Value>;

/// HTTP-shaped result of a tunnel call.
///
/// Operational failures (unreachable origin, error statuses, gateway
/// interception) are values of this type with `ok() == false`, never errors.
#[derive(Debug, Clone)]
pub struct Response {
  status: StatusCode,
  headers: HeaderMap,
  body: Vec<u8>,
  /// Final URL after redirects (None for synthesized responses)
  url: Option<Url>,
  redirected: bool,
}

impl Response {
  pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
      url: None,
      redirected: false,
    }
  }

  /// Synthesized failure carrying a plain-text diagnostic.
  pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
    let mut headers = HeaderMap::new();
    headers.insert(
      CONTENT_TYPE,
      HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    Self::new(status, headers, message.into().into_bytes())
  }

  /// Record where the transport ended up.
  pub fn with_url(mut self, url: Url, redirected: bool) -> Self {
    self.url = Some(url);
    self.redirected = redirected;
    self
  }

  pub fn ok(&self) -> bool {
    self.status.is_success()
  }

  pub fn status(&self) -> StatusCode {
    self.status
  }

  pub fn headers(&self) -> &HeaderMap {
    &self.headers
  }

  pub fn headers_mut(&mut self) -> &mut HeaderMap {
    &mut self.headers
  }

  pub fn body(&self) -> &[u8] {
    &self.body
  }

  pub fn url(&self) -> Option<&Url> {
    self.url.as_ref()
  }

  pub fn redirected(&self) -> bool {
    self.redirected
  }

  pub fn cache_control(&self) -> Option<&str> {
    self.headers.get(CACHE_CONTROL).and_then(|v| v.to_str().ok())
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  /// Body text when the response is not ok.
  pub fn error_text(&self) -> Option<String> {
    (!self.ok()).then(|| self.text())
  }

  pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
    serde_json::from_slice(&self.body)
  }

  /// Decode the submit endpoint's row array.
  pub fn rows(&self) -> serde_json::Result<Vec<Row>> {
    self.json()
  }
}
