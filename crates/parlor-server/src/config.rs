//! Server configuration: `config.toml` layered under `PARLOR_*` environment
//! variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use parlor_store_sqlite::StoreOptions;
use serde::Deserialize;

/// Runtime server configuration. Every field has a default, so an empty or
/// missing file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:            String,
  pub port:            u16,
  /// `~/` is expanded against `$HOME`.
  pub database_path:   PathBuf,
  pub op_timeout_ms:   u64,
  pub busy_timeout_ms: u64,
  /// Emit logs as JSON lines instead of the human-readable format.
  pub log_json:        bool,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:            "127.0.0.1".to_string(),
      port:            8080,
      database_path:   PathBuf::from("parlor.db"),
      op_timeout_ms:   30_000,
      busy_timeout_ms: 5_000,
      log_json:        false,
    }
  }
}

impl ServerConfig {
  /// Read `path` (if it exists), then apply `PARLOR_*` overrides.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    ::config::Config::builder()
      .add_source(::config::File::from(path).required(false))
      .add_source(::config::Environment::with_prefix("PARLOR"))
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn store_options(&self) -> StoreOptions {
    StoreOptions {
      op_timeout:   Duration::from_millis(self.op_timeout_ms),
      busy_timeout: Duration::from_millis(self.busy_timeout_ms),
    }
  }

  /// The database path with a leading `~` expanded.
  pub fn database_path(&self) -> PathBuf { expand_tilde(&self.database_path) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
