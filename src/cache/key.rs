//! Cache key derivation.

use reqwest::Method;
use sha2::{Digest, Sha256};
use url::Url;

use crate::tunnel::RequestDescriptor;

/// Opaque lookup key for a request.
///
/// The key is GET-shaped: a URL plus the outgoing header set. The method is
/// never part of it, so stores match method-insensitively. POST bodies are
/// folded into the URL as a trailing SHA-256 segment.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  url: Url,
  headers: Vec<(String, String)>,
}

impl CacheKey {
  pub fn for_request(request: &RequestDescriptor) -> Self {
    let url = if request.method == Method::POST {
      let body = request.body.as_deref().unwrap_or_default();
      append_segment(&request.url, &body_digest(body))
    } else {
      request.url.clone()
    };

    let mut headers: Vec<(String, String)> = request
      .headers
      .iter()
      .map(|(name, value)| {
        (
          name.as_str().to_string(),
          String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )
      })
      .collect();
    headers.sort();

    Self { url, headers }
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  /// Canonical text form: the URL followed by one `name: value` line per header.
  pub fn fingerprint(&self) -> String {
    let mut out = self.url.to_string();
    for (name, value) in &self.headers {
      out.push('\n');
      out.push_str(name);
      out.push_str(": ");
      out.push_str(value);
    }
    out
  }

  /// SHA256 of the fingerprint, for stores that persist keys.
  pub fn digest(&self) -> String {
    hex::encode(Sha256::digest(self.fingerprint().as_bytes()))
  }
}

impl std::fmt::Debug for CacheKey {
  // header values may carry credentials
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CacheKey")
      .field("url", &self.url.as_str())
      .field(
        "headers",
        &self.headers.iter().map(|(n, _)| n).collect::<Vec<_>>(),
      )
      .finish()
  }
}

/// Lowercase hex SHA-256 of a request body.
pub fn body_digest(body: &[u8]) -> String {
  hex::encode(Sha256::digest(body))
}

fn append_segment(url: &Url, segment: &str) -> Url {
  let mut url = url.clone();
  if let Ok(mut segments) = url.path_segments_mut() {
    segments.pop_if_empty().push(segment);
  }
  url
}
