//! Error type for `folio-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown save reason: {0:?}")]
  UnknownReason(String),

  #[error("scene not found: {0}")]
  SceneNotFound(uuid::Uuid),

  /// A guarded batch found a different latest version than it expected.
  #[error("latest version of scene {0} changed since it was read")]
  StaleWrite(uuid::Uuid),

  #[error("version {0} does not belong to scene {1}")]
  ForeignVersion(uuid::Uuid, uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
