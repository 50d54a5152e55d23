use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use dbtunnel::config::{CacheBackend, CacheConfig, Config};
use dbtunnel::{logging, Arguments, CommandParams, Isolation, Mode, Response, TunnelClient};

#[derive(Parser, Debug)]
#[command(name = "dbtunnel")]
#[command(about = "Run database commands through an HTTP tunnel, with response caching")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/dbtunnel/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Tunnel host to use
  #[arg(long)]
  host: Option<String>,

  /// Cache backend to use
  #[arg(long, value_enum)]
  cache: Option<CacheBackend>,

  #[command(subcommand)]
  command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Check that the tunnel answers
  Ping,
  /// Run a statement and print the resulting rows
  Submit(SubmitArgs),
}

#[derive(clap::Args, Debug)]
struct SubmitArgs {
  /// Statement to run
  #[arg(required_unless_present = "file", conflicts_with = "file")]
  statement: Option<String>,

  /// Read the whole command from a JSON file instead
  #[arg(long)]
  file: Option<PathBuf>,

  /// Positional argument, as JSON (bare text is taken as a string)
  #[arg(long = "arg", value_name = "JSON", conflicts_with = "named")]
  args: Vec<String>,

  /// Named arguments, as a JSON object
  #[arg(long, value_name = "JSON_OBJECT")]
  named: Option<String>,

  #[arg(long, value_enum)]
  mode: Option<Mode>,

  #[arg(long, value_enum)]
  isolation: Option<Isolation>,

  /// Seconds the upstream may spend on the statement (0 = no limit)
  #[arg(long)]
  timeout: Option<f64>,

  /// Seconds a result stays fresh (-1 = don't cache)
  #[arg(long, allow_negative_numbers = true)]
  cache_ttl: Option<i64>,

  /// Seconds a result may be served stale (defaults to --cache-ttl)
  #[arg(long, allow_negative_numbers = true)]
  stale_ttl: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init()?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override host and cache backend if specified on command line
  let config = Config {
    host: args.host.or(config.host),
    cache: CacheConfig {
      backend: args.cache.unwrap_or(config.cache.backend),
      ..config.cache
    },
    ..config
  };

  let connection = config.connection()?;
  let store = config.open_store()?;
  let client = TunnelClient::new(&connection, store)?;

  match args.command {
    Cmd::Ping => {
      let response = client.ping().await;
      check(&response)?;
      println!("ok");
    }
    Cmd::Submit(submit) => {
      let params = submit.into_params()?;
      let response = client.submit(params).await?;
      check(&response)?;
      print_rows(&response)?;
    }
  }

  Ok(())
}

impl SubmitArgs {
  fn into_params(self) -> Result<CommandParams> {
    let base = match &self.file {
      Some(path) => read_params(path)?,
      None => CommandParams::default(),
    };

    let arguments = if let Some(named) = &self.named {
      let map: Map<String, Value> = serde_json::from_str(named)
        .map_err(|e| eyre!("--named must be a JSON object: {}", e))?;
      Some(Arguments::Named(map))
    } else if !self.args.is_empty() {
      Some(Arguments::Positional(
        self.args.iter().map(|a| parse_argument(a)).collect(),
      ))
    } else {
      base.arguments
    };

    Ok(CommandParams {
      statement: self.statement.or(base.statement),
      arguments,
      mode: self.mode.or(base.mode),
      isolation: self.isolation.or(base.isolation),
      timeout: self.timeout.or(base.timeout),
      cache_ttl: self.cache_ttl.or(base.cache_ttl),
      stale_ttl: self.stale_ttl.or(base.stale_ttl),
    })
  }
}

fn read_params(path: &Path) -> Result<CommandParams> {
  let contents = std::fs::read_to_string(path)
    .map_err(|e| eyre!("Failed to read command file {}: {}", path.display(), e))?;

  serde_json::from_str(&contents)
    .map_err(|e| eyre!("Failed to parse command file {}: {}", path.display(), e))
}

fn parse_argument(raw: &str) -> Value {
  serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn check(response: &Response) -> Result<()> {
  match response.error_text() {
    Some(text) => Err(eyre!("{}: {}", response.status(), text.trim())),
    None => Ok(()),
  }
}

fn print_rows(response: &Response) -> Result<()> {
  match response.json::<Value>() {
    Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
    Err(_) => println!("{}", response.text()),
  }
  Ok(())
}
