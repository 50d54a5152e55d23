use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::ConfigError;

use super::connection::ConnectionConfig;

pub const CLIENT_ID_HEADER: HeaderName = HeaderName::from_static("cf-access-client-id");
pub const CLIENT_SECRET_HEADER: HeaderName = HeaderName::from_static("cf-access-client-secret");

/// Headers that authenticate requests for `config`.
///
/// Empty when no credentials are configured. Values are passed through
/// verbatim; only bytes that can't appear in a header at all are rejected.
pub fn credential_headers(config: &ConnectionConfig) -> Result<HeaderMap, ConfigError> {
  let mut headers = HeaderMap::new();

  if let Some(credentials) = config.credentials() {
    insert(&mut headers, CLIENT_ID_HEADER, &credentials.client_id)?;
    insert(&mut headers, CLIENT_SECRET_HEADER, &credentials.client_secret)?;
  }

  Ok(headers)
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<(), ConfigError> {
  let mut value = HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
    name: name.to_string(),
    reason: e.to_string(),
  })?;
  value.set_sensitive(true);
  headers.insert(name, value);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_no_credentials_no_headers() {
    let config = ConnectionConfig::new("db.example.com", None, None).unwrap();
    assert!(credential_headers(&config).unwrap().is_empty());
  }

  #[test]
  fn test_credentials_passed_verbatim() {
    let config = ConnectionConfig::new(
      "db.example.com",
      Some("abc.access".into()),
      Some("s3cr3t/+=".into()),
    )
    .unwrap();

    let headers = credential_headers(&config).unwrap();
    assert_eq!(headers.len(), 2);
    assert_eq!(headers[&CLIENT_ID_HEADER], "abc.access");
    assert_eq!(headers[&CLIENT_SECRET_HEADER], "s3cr3t/+=");
  }

  #[test]
  fn test_newline_in_secret_rejected() {
    let config =
      ConnectionConfig::new("db.example.com", Some("id".into()), Some("a\nb".into())).unwrap();
    assert!(matches!(
      credential_headers(&config),
      Err(ConfigError::InvalidHeader { .. })
    ));
  }
}
