//! Database commands sent to the tunnel's submit endpoint.
//!
//! [`CommandParams`] is the loosely typed record callers (or JSON files) hand
//! us. [`Command`] is the normalized form where every field has a value.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// How the upstream should run the statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
  /// Returns rows
  #[default]
  Query,
  /// Runs for side effects
  Exec,
}

/// Transaction isolation label passed through to the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Isolation {
  #[default]
  None,
  ReadUncommitted,
  ReadCommitted,
  RepeatableRead,
  Snapshot,
  Serializable,
}

/// Statement arguments, either positional or named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arguments {
  Positional(Vec<Value>),
  Named(Map<String, Value>),
}

impl Default for Arguments {
  fn default() -> Self {
    Arguments::Positional(Vec::new())
  }
}

/// Command description as supplied by the caller. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandParams {
  pub statement: Option<String>,
  pub arguments: Option<Arguments>,
  pub mode: Option<Mode>,
  pub isolation: Option<Isolation>,
  /// Seconds; 0 means no limit
  pub timeout: Option<f64>,
  /// Seconds; negative disables caching
  pub cache_ttl: Option<i64>,
  /// Seconds; falls back to `cache_ttl`
  pub stale_ttl: Option<i64>,
}

impl CommandParams {
  pub fn new(statement: impl Into<String>) -> Self {
    Self {
      statement: Some(statement.into()),
      ..Self::default()
    }
  }
}

/// A fully normalized command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
  statement: String,
  arguments: Arguments,
  mode: Mode,
  isolation: Isolation,
  timeout: f64,
  cache_ttl: i64,
  stale_ttl: i64,
}

impl Command {
  /// Build a command with all defaults applied.
  pub fn new(statement: impl Into<String>) -> Result<Self, ConfigError> {
    Self::from_params(CommandParams::new(statement))
  }

  /// Validate `params` and fill in every missing field.
  pub fn from_params(params: CommandParams) -> Result<Self, ConfigError> {
    let statement = params
      .statement
      .filter(|s| !s.trim().is_empty())
      .ok_or(ConfigError::MissingStatement)?;

    let timeout = params.timeout.unwrap_or(0.0);
    if !timeout.is_finite() || timeout < 0.0 {
      return Err(ConfigError::InvalidTimeout(timeout));
    }

    let cache_ttl = params.cache_ttl.unwrap_or(-1);

    Ok(Self {
      statement,
      arguments: params.arguments.unwrap_or_default(),
      mode: params.mode.unwrap_or_default(),
      isolation: params.isolation.unwrap_or_default(),
      timeout,
      cache_ttl,
      stale_ttl: params.stale_ttl.unwrap_or(cache_ttl),
    })
  }

  pub fn statement(&self) -> &str {
    &self.statement
  }

  pub fn arguments(&self) -> &Arguments {
    &self.arguments
  }

  pub fn mode(&self) -> Mode {
    self.mode
  }

  pub fn isolation(&self) -> Isolation {
    self.isolation
  }

  pub fn timeout(&self) -> f64 {
    self.timeout
  }

  pub fn cache_ttl(&self) -> i64 {
    self.cache_ttl
  }

  pub fn stale_ttl(&self) -> i64 {
    self.stale_ttl
  }

  /// Canonical JSON body for the submit endpoint.
  pub fn to_body(&self) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(self)
  }
}

/// Anything that can be turned into a normalized [`Command`].
pub trait IntoCommand {
  fn into_command(self) -> Result<Command, ConfigError>;
}

impl IntoCommand for Command {
  fn into_command(self) -> Result<Command, ConfigError> {
    Ok(self)
  }
}

impl IntoCommand for &Command {
  fn into_command(self) -> Result<Command, ConfigError> {
    Ok(self.clone())
  }
}

impl IntoCommand for CommandParams {
  fn into_command(self) -> Result<Command, ConfigError> {
    Command::from_params(self)
  }
}

impl IntoCommand for &str {
  fn into_command(self) -> Result<Command, ConfigError> {
    Command::new(self)
  }
}
