//! Caching client for database commands sent through an HTTP tunnel.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dbtunnel::cache::MemoryStorage;
//! use dbtunnel::{CommandParams, ConnectionConfig, TunnelClient};
//!
//! # async fn run() -> color_eyre::Result<()> {
//! let config = ConnectionConfig::new("db.example.com", None, None)?;
//! let client = TunnelClient::new(&config, Arc::new(MemoryStorage::new()))?;
//!
//! let response = client
//!   .submit(CommandParams {
//!     cache_ttl: Some(60),
//!     ..CommandParams::new("SELECT id, name FROM users")
//!   })
//!   .await?;
//!
//! if response.ok() {
//!   println!("{:?}", response.rows()?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod tunnel;

pub use command::{Arguments, Command, CommandParams, IntoCommand, Isolation, Mode};
pub use error::ConfigError;
pub use tunnel::{ConnectionConfig, Response, TunnelClient};
