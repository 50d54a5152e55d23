use clap::ValueEnum;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{CacheStore, MemoryStorage, NoopStorage, SqliteStorage};
use crate::error::ConfigError;
use crate::tunnel::ConnectionConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Tunnel host, with or without scheme
  pub host: Option<String>,
  /// Service token id; the secret only ever comes from the environment
  pub client_id: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  #[serde(default)]
  pub backend: CacheBackend,
  /// SQLite file (defaults to the data directory)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  /// Persistent cache in a SQLite file
  #[default]
  Sqlite,
  /// Cache for the life of the process
  Memory,
  /// Never cache
  None,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./dbtunnel.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/dbtunnel/config.yaml
  ///
  /// No file at all is fine; the host can come from the command line.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("dbtunnel.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("dbtunnel").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Validated connection settings, with credentials from the environment.
  ///
  /// `DBTUNNEL_CLIENT_ID` overrides the file's `client_id`;
  /// `DBTUNNEL_CLIENT_SECRET` supplies the secret.
  pub fn connection(&self) -> Result<ConnectionConfig, ConfigError> {
    self.connection_with(
      std::env::var("DBTUNNEL_CLIENT_ID").ok(),
      std::env::var("DBTUNNEL_CLIENT_SECRET").ok(),
    )
  }

  fn connection_with(
    &self,
    env_client_id: Option<String>,
    env_client_secret: Option<String>,
  ) -> Result<ConnectionConfig, ConfigError> {
    let host = self.host.as_deref().ok_or(ConfigError::MissingHost)?;
    let client_id = env_client_id.or_else(|| self.client_id.clone());

    ConnectionConfig::new(host, client_id, env_client_secret)
  }

  /// Open the configured cache store.
  pub fn open_store(&self) -> Result<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match self.cache.backend {
      CacheBackend::Sqlite => match &self.cache.path {
        Some(path) => Arc::new(SqliteStorage::open_at(path)?),
        None => Arc::new(SqliteStorage::open()?),
      },
      CacheBackend::Memory => Arc::new(MemoryStorage::new()),
      CacheBackend::None => Arc::new(NoopStorage),
    };

    Ok(store)
  }
}

/// Directory for the cache database and log file.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("dbtunnel"))
}
