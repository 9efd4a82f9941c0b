//! Error types for `folio-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// Stored or incoming content is not a serialized document.
  #[error("document parse error: {0}")]
  Parse(String),

  #[error("scene not found: {0}")]
  SceneNotFound(Uuid),

  #[error("version {version_id} not found for scene {scene_id}")]
  VersionNotFound { scene_id: Uuid, version_id: Uuid },

  /// The revert target is already the most recent version.
  #[error("version {0} is already current")]
  NoOp(Uuid),

  /// A content or version write failed. The session stays dirty and retries.
  #[error("persistence error: {0}")]
  Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// The atomic revert write failed; live content is unchanged.
  #[error("revert transaction failed: {0}")]
  Transaction(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("no scene is loaded in this session")]
  NoSceneLoaded,

  /// The session moved to another scene while the operation was in flight.
  #[error("session switched away from scene {0}")]
  Superseded(Uuid),
}

impl Error {
  pub(crate) fn persistence<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Persistence(Box::new(e))
  }

  pub(crate) fn transaction<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Transaction(Box::new(e))
  }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self { Self::Parse(e.to_string()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
