//! Scenes and their historical versions.
//!
//! A scene exclusively owns its live content. Versions are immutable
//! snapshots owned by the version table; they reference their scene by id and
//! are never updated in place, only inserted and (on eviction or scene
//! deletion) deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::{Document, SceneContent};

// ─── Scene ───────────────────────────────────────────────────────────────────

/// The smallest addressable unit of prose, with its latest persisted content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
  pub scene_id:   Uuid,
  pub chapter_id: Uuid,
  /// Ordering within the chapter.
  pub position:   i64,
  pub content:    SceneContent,
  pub created_at: DateTime<Utc>,
  /// Set by the store on every content write.
  pub updated_at: DateTime<Utc>,
}

/// Input to [`crate::store::DocumentStore::create_scene`].
#[derive(Debug, Clone)]
pub struct NewScene {
  pub chapter_id: Uuid,
  pub position:   i64,
  /// Initial content; the empty document when `None`.
  pub content:    Option<Document>,
}

impl NewScene {
  pub fn new(chapter_id: Uuid, position: i64) -> Self {
    Self { chapter_id, position, content: None }
  }

  pub fn with_content(mut self, content: Document) -> Self {
    self.content = Some(content);
    self
  }
}

// ─── Versions ────────────────────────────────────────────────────────────────

/// Why a version was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaveReason {
  AutoSave,
  ManualSave,
  /// The live state captured just before a revert overwrote it.
  BeforeRevert,
}

impl SaveReason {
  /// Manual saves and revert backups snapshot regardless of spacing.
  pub fn always_snapshots(self) -> bool { !matches!(self, Self::AutoSave) }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::AutoSave => "auto-save",
      Self::ManualSave => "manual-save",
      Self::BeforeRevert => "before-revert",
    }
  }
}

impl std::fmt::Display for SaveReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An immutable point-in-time snapshot of a scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVersion {
  pub version_id: Uuid,
  pub scene_id:   Uuid,
  /// Per-scene sequence number assigned by the store; breaks `created_at`
  /// ties.
  pub number:     i64,
  pub content:    SceneContent,
  pub reason:     SaveReason,
  pub created_at: DateTime<Utc>,
}

/// A version as handed to the store; `number` is assigned on insert.
#[derive(Debug, Clone)]
pub struct NewVersion {
  pub version_id: Uuid,
  pub content:    SceneContent,
  pub reason:     SaveReason,
  pub created_at: DateTime<Utc>,
}

impl NewVersion {
  pub fn new(content: SceneContent, reason: SaveReason, created_at: DateTime<Utc>) -> Self {
    Self { version_id: Uuid::new_v4(), content, reason, created_at }
  }
}
