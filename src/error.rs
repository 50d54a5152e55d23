//! Configuration errors raised while building connections and commands.
//!
//! These are always raised before any network activity. Failures that happen
//! while talking to the tunnel are reported through a non-ok
//! [`Response`](crate::tunnel::Response) instead.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
  #[error("connection host is required")]
  MissingHost,

  #[error("invalid host '{host}': {reason}")]
  InvalidHost { host: String, reason: String },

  #[error("client id and client secret must be provided together")]
  UnpairedCredentials,

  #[error("command statement is required")]
  MissingStatement,

  #[error("timeout must be a non-negative number of seconds, got {0}")]
  InvalidTimeout(f64),

  #[error("invalid header '{name}': {reason}")]
  InvalidHeader { name: String, reason: String },
}
