//! Origin transport: sends a request to the tunnel endpoint over HTTP.

use color_eyre::{eyre::eyre, Result};
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::future::Future;
use std::sync::Arc;
use url::Url;

use super::response::Response;

/// One outgoing request, fully resolved.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
  pub url: Url,
  pub method: Method,
  pub headers: HeaderMap,
  pub body: Option<Vec<u8>>,
}

/// Something that can carry a request to the origin.
///
/// An `Err` means the request never produced an HTTP response at all.
pub trait Origin: Send + Sync {
  fn send(&self, request: &RequestDescriptor) -> impl Future<Output = Result<Response>> + Send;
}

impl<O: Origin> Origin for Arc<O> {
  fn send(&self, request: &RequestDescriptor) -> impl Future<Output = Result<Response>> + Send {
    (**self).send(request)
  }
}

/// Origin backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpOrigin {
  client: reqwest::Client,
}

impl HttpOrigin {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Origin for HttpOrigin {
  async fn send(&self, request: &RequestDescriptor) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone())
      .headers(request.headers.clone());

    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach {}: {}", request.url, e))?;

    let status = response.status();
    let headers = response.headers().clone();
    let final_url = response.url().clone();
    let redirected = final_url != request.url;

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response from {}: {}", request.url, e))?;

    Ok(Response::new(status, headers, body.to_vec()).with_url(final_url, redirected))
  }
}
