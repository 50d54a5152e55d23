use url::Url;

use crate::error::ConfigError;

/// Validated connection settings for one tunnel endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
  host: Url,
  credentials: Option<Credentials>,
}

/// Service token pair presented to the authentication gateway.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
  pub client_id: String,
  pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Credentials")
      .field("client_id", &self.client_id)
      .field("client_secret", &"<redacted>")
      .finish()
  }
}

impl ConnectionConfig {
  /// Validate `host` and the optional credential pair.
  ///
  /// Bare hostnames get an `https://` prefix. Supplying only one of
  /// `client_id` / `client_secret` is an error.
  pub fn new(
    host: &str,
    client_id: Option<String>,
    client_secret: Option<String>,
  ) -> Result<Self, ConfigError> {
    let host = normalize_host(host)?;

    let credentials = match (client_id, client_secret) {
      (Some(client_id), Some(client_secret)) => Some(Credentials {
        client_id,
        client_secret,
      }),
      (None, None) => None,
      _ => return Err(ConfigError::UnpairedCredentials),
    };

    Ok(Self { host, credentials })
  }

  pub fn host(&self) -> &Url {
    &self.host
  }

  pub fn credentials(&self) -> Option<&Credentials> {
    self.credentials.as_ref()
  }
}

fn normalize_host(host: &str) -> Result<Url, ConfigError> {
  let host = host.trim();
  if host.is_empty() {
    return Err(ConfigError::MissingHost);
  }

  let with_scheme = if host.contains("://") {
    host.to_string()
  } else {
    format!("https://{}", host)
  };

  let url = Url::parse(&with_scheme).map_err(|e| ConfigError::InvalidHost {
    host: host.to_string(),
    reason: e.to_string(),
  })?;

  if url.host_str().is_none() {
    return Err(ConfigError::InvalidHost {
      host: host.to_string(),
      reason: "no hostname".to_string(),
    });
  }

  Ok(url)
}
