//! Error type for `parlor-store-sqlite`.

use parlor_core::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A not-found domain error; the transaction was rolled back.
  #[error(transparent)]
  Core(#[from] parlor_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("decode error: {0}")]
  Decode(String),

  #[error(
    "database schema version {db_version} is newer than the latest supported \
     version {latest_supported}"
  )]
  UnsupportedSchemaVersion { db_version: u32, latest_supported: u32 },

  /// The operation ran past its deadline and was rolled back.
  #[error("operation exceeded its deadline")]
  DeadlineExceeded,

  /// The caller went away before the operation committed; it was rolled back.
  #[error("operation cancelled")]
  Cancelled,
}

impl DomainError for Error {
  fn domain(&self) -> Option<&parlor_core::Error> {
    match self {
      Self::Core(e) => Some(e),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
