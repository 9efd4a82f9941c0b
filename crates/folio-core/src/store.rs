//! The `DocumentStore` trait and supporting write/query types.
//!
//! The trait is implemented by storage backends (e.g. `folio-store-sqlite`,
//! or [`crate::memory::MemoryStore`] in tests). The snapshot policy, the
//! revert orchestrator and the editor session are constructed with a store
//! instance and never reach for a global connection.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  document::SceneContent,
  scene::{DocumentVersion, NewScene, NewVersion, Scene},
};

// ─── Writes ──────────────────────────────────────────────────────────────────

/// One step of a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum WriteOp {
  /// Overwrite the scene's live content.
  PutContent(SceneContent),
  /// Append a version; the store assigns its number.
  InsertVersion(NewVersion),
  /// Delete a version of the batch's scene.
  EvictVersion(Uuid),
}

/// A set of writes against one scene, applied all together or not at all.
#[derive(Debug, Clone)]
pub struct WriteBatch {
  pub scene_id:        Uuid,
  /// If set, the batch is rejected unless the scene's latest version id is
  /// still this value (`Some(None)` expects no versions at all).
  pub expected_latest: Option<Option<Uuid>>,
  pub ops:             Vec<WriteOp>,
}

impl WriteBatch {
  pub fn new(scene_id: Uuid) -> Self {
    Self { scene_id, expected_latest: None, ops: Vec::new() }
  }

  pub fn expect_latest(mut self, latest: Option<Uuid>) -> Self {
    self.expected_latest = Some(latest);
    self
  }

  pub fn push(&mut self, op: WriteOp) { self.ops.push(op); }
}

/// What a successfully applied [`WriteBatch`] changed.
#[derive(Debug, Clone)]
pub struct WriteReceipt {
  /// The scene after the batch.
  pub scene:    Scene,
  pub inserted: Vec<DocumentVersion>,
  pub evicted:  Vec<Uuid>,
}

// ─── Search ──────────────────────────────────────────────────────────────────

/// Parameters for [`DocumentStore::search`].
#[derive(Debug, Clone, Default)]
pub struct SceneQuery {
  /// Case-insensitive substring matched against scene plain text.
  pub text:       String,
  pub chapter_id: Option<Uuid>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

impl SceneQuery {
  pub const DEFAULT_LIMIT: usize = 100;

  pub fn text(text: impl Into<String>) -> Self {
    Self { text: text.into(), ..Self::default() }
  }
}

/// A scene matching a [`SceneQuery`].
#[derive(Debug, Clone)]
pub struct SearchHit {
  pub scene_id:   Uuid,
  pub chapter_id: Uuid,
  pub position:   i64,
  pub snippet:    String,
  pub updated_at: DateTime<Utc>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Folio document store backend.
///
/// Two logical tables: `scenes` (one row per scene, latest content) and
/// `versions` (append-only snapshots, ordered per scene by
/// `(created_at, number)`). All multi-row writes are transactional.
///
/// All methods return `Send` futures so the trait can be used from spawned
/// tokio tasks (the autosave timer commits from one).
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Scenes ────────────────────────────────────────────────────────────

  /// Create and persist a new scene.
  fn create_scene(
    &self,
    input: NewScene,
  ) -> impl Future<Output = Result<Scene, Self::Error>> + Send + '_;

  /// Retrieve a scene by id. Returns `None` if not found.
  fn get_scene(
    &self,
    scene_id: Uuid,
  ) -> impl Future<Output = Result<Option<Scene>, Self::Error>> + Send + '_;

  /// All scenes of a chapter, ordered by position.
  fn list_scenes(
    &self,
    chapter_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Scene>, Self::Error>> + Send + '_;

  /// Delete a scene and all of its versions. Returns `false` if the scene
  /// did not exist.
  fn delete_scene(
    &self,
    scene_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Delete every scene of a chapter with their versions. Returns the number
  /// of scenes removed.
  fn delete_chapter(
    &self,
    chapter_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Versions ──────────────────────────────────────────────────────────

  /// Retrieve a version by id. Returns `None` if not found.
  fn get_version(
    &self,
    version_id: Uuid,
  ) -> impl Future<Output = Result<Option<DocumentVersion>, Self::Error>> + Send + '_;

  /// All versions of a scene, most recent first.
  fn list_versions(
    &self,
    scene_id: Uuid,
  ) -> impl Future<Output = Result<Vec<DocumentVersion>, Self::Error>> + Send + '_;

  /// The most recent version of a scene, if any.
  fn latest_version(
    &self,
    scene_id: Uuid,
  ) -> impl Future<Output = Result<Option<DocumentVersion>, Self::Error>> + Send + '_;

  fn count_versions(
    &self,
    scene_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Transactional writes ──────────────────────────────────────────────

  /// Apply `batch` atomically. Fails without writing anything if the scene
  /// does not exist or the `expected_latest` guard does not hold.
  fn apply(
    &self,
    batch: WriteBatch,
  ) -> impl Future<Output = Result<WriteReceipt, Self::Error>> + Send + '_;

  // ── Search ────────────────────────────────────────────────────────────

  /// Full-project plain-text search.
  fn search<'a>(
    &'a self,
    query: &'a SceneQuery,
  ) -> impl Future<Output = Result<Vec<SearchHit>, Self::Error>> + Send + 'a;
}
