//! [`MemoryStore`] — an in-process [`DocumentStore`] for tests and demos.
//!
//! All state sits behind one mutex, so every [`WriteBatch`] is trivially
//! atomic: it is validated and staged against a copy, then swapped in.

use std::{
  collections::HashMap,
  sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::{
  document::{Document, SceneContent},
  scene::{DocumentVersion, NewScene, Scene},
  search,
  store::{DocumentStore, SceneQuery, SearchHit, WriteBatch, WriteOp, WriteReceipt},
};

#[derive(Debug, Error)]
pub enum MemoryStoreError {
  #[error("scene not found: {0}")]
  SceneNotFound(Uuid),

  #[error("version {0} does not belong to scene {1}")]
  ForeignVersion(Uuid, Uuid),

  #[error("latest version of scene {0} changed since it was read")]
  StaleWrite(Uuid),

  #[error("rejected by fault injection")]
  Injected,
}

#[derive(Default, Clone)]
struct Tables {
  scenes:   HashMap<Uuid, Scene>,
  versions: HashMap<Uuid, DocumentVersion>,
}

impl Tables {
  /// Versions of `scene_id`, most recent first.
  fn versions_of(&self, scene_id: Uuid) -> Vec<DocumentVersion> {
    let mut versions: Vec<DocumentVersion> = self
      .versions
      .values()
      .filter(|v| v.scene_id == scene_id)
      .cloned()
      .collect();
    versions.sort_by(|a, b| {
      (b.created_at, b.number).cmp(&(a.created_at, a.number))
    });
    versions
  }

  fn remove_scene(&mut self, scene_id: Uuid) -> bool {
    self.versions.retain(|_, v| v.scene_id != scene_id);
    self.scenes.remove(&scene_id).is_some()
  }
}

#[derive(Default)]
struct Inner {
  tables:      Tables,
  writes:      usize,
  fail_writes: bool,
}

/// A [`DocumentStore`] held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<Inner>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Number of successfully applied content/version writes (batches and
  /// deletions; scene creation is not counted).
  pub fn write_count(&self) -> usize { self.lock().writes }

  /// While set, every write fails with [`MemoryStoreError::Injected`].
  pub fn fail_writes(&self, fail: bool) { self.lock().fail_writes = fail; }
}

impl DocumentStore for MemoryStore {
  type Error = MemoryStoreError;

  async fn create_scene(&self, input: NewScene) -> Result<Scene, Self::Error> {
    let now = Utc::now();
    let doc = input.content.unwrap_or_else(Document::empty);
    let scene = Scene {
      scene_id:   Uuid::new_v4(),
      chapter_id: input.chapter_id,
      position:   input.position,
      content:    SceneContent::from_document(&doc),
      created_at: now,
      updated_at: now,
    };
    self.lock().tables.scenes.insert(scene.scene_id, scene.clone());
    Ok(scene)
  }

  async fn get_scene(&self, scene_id: Uuid) -> Result<Option<Scene>, Self::Error> {
    Ok(self.lock().tables.scenes.get(&scene_id).cloned())
  }

  async fn list_scenes(&self, chapter_id: Uuid) -> Result<Vec<Scene>, Self::Error> {
    let mut scenes: Vec<Scene> = self
      .lock()
      .tables
      .scenes
      .values()
      .filter(|s| s.chapter_id == chapter_id)
      .cloned()
      .collect();
    scenes.sort_by_key(|s| (s.position, s.created_at));
    Ok(scenes)
  }

  async fn delete_scene(&self, scene_id: Uuid) -> Result<bool, Self::Error> {
    let mut inner = self.lock();
    if inner.fail_writes {
      return Err(MemoryStoreError::Injected);
    }
    let removed = inner.tables.remove_scene(scene_id);
    inner.writes += 1;
    Ok(removed)
  }

  async fn delete_chapter(&self, chapter_id: Uuid) -> Result<usize, Self::Error> {
    let mut inner = self.lock();
    if inner.fail_writes {
      return Err(MemoryStoreError::Injected);
    }
    let ids: Vec<Uuid> = inner
      .tables
      .scenes
      .values()
      .filter(|s| s.chapter_id == chapter_id)
      .map(|s| s.scene_id)
      .collect();
    for id in &ids {
      inner.tables.remove_scene(*id);
    }
    inner.writes += 1;
    Ok(ids.len())
  }

  async fn get_version(
    &self,
    version_id: Uuid,
  ) -> Result<Option<DocumentVersion>, Self::Error> {
    Ok(self.lock().tables.versions.get(&version_id).cloned())
  }

  async fn list_versions(
    &self,
    scene_id: Uuid,
  ) -> Result<Vec<DocumentVersion>, Self::Error> {
    Ok(self.lock().tables.versions_of(scene_id))
  }

  async fn latest_version(
    &self,
    scene_id: Uuid,
  ) -> Result<Option<DocumentVersion>, Self::Error> {
    Ok(self.lock().tables.versions_of(scene_id).into_iter().next())
  }

  async fn count_versions(&self, scene_id: Uuid) -> Result<usize, Self::Error> {
    Ok(
      self
        .lock()
        .tables
        .versions
        .values()
        .filter(|v| v.scene_id == scene_id)
        .count(),
    )
  }

  async fn apply(&self, batch: WriteBatch) -> Result<WriteReceipt, Self::Error> {
    let mut inner = self.lock();
    if inner.fail_writes {
      return Err(MemoryStoreError::Injected);
    }

    let scene_id = batch.scene_id;
    let mut staged = inner.tables.clone();
    if !staged.scenes.contains_key(&scene_id) {
      return Err(MemoryStoreError::SceneNotFound(scene_id));
    }

    if let Some(expected) = batch.expected_latest {
      let latest = staged.versions_of(scene_id).first().map(|v| v.version_id);
      if latest != expected {
        return Err(MemoryStoreError::StaleWrite(scene_id));
      }
    }

    let mut inserted = Vec::new();
    let mut evicted = Vec::new();
    for op in batch.ops {
      match op {
        WriteOp::PutContent(content) => {
          if let Some(scene) = staged.scenes.get_mut(&scene_id) {
            scene.content = content;
            scene.updated_at = Utc::now();
          }
        }
        WriteOp::InsertVersion(new) => {
          let number = staged
            .versions
            .values()
            .filter(|v| v.scene_id == scene_id)
            .map(|v| v.number)
            .max()
            .unwrap_or(0)
            + 1;
          let version = DocumentVersion {
            version_id: new.version_id,
            scene_id,
            number,
            content: new.content,
            reason: new.reason,
            created_at: new.created_at,
          };
          staged.versions.insert(version.version_id, version.clone());
          inserted.push(version);
        }
        WriteOp::EvictVersion(version_id) => match staged.versions.get(&version_id) {
          Some(v) if v.scene_id == scene_id => {
            staged.versions.remove(&version_id);
            evicted.push(version_id);
          }
          Some(_) => {
            return Err(MemoryStoreError::ForeignVersion(version_id, scene_id));
          }
          None => {}
        },
      }
    }

    let scene = staged
      .scenes
      .get(&scene_id)
      .cloned()
      .ok_or(MemoryStoreError::SceneNotFound(scene_id))?;
    inner.tables = staged;
    inner.writes += 1;

    Ok(WriteReceipt { scene, inserted, evicted })
  }

  async fn search<'a>(
    &'a self,
    query: &'a SceneQuery,
  ) -> Result<Vec<SearchHit>, Self::Error> {
    let inner = self.lock();
    let mut scenes: Vec<&Scene> = inner
      .tables
      .scenes
      .values()
      .filter(|s| query.chapter_id.is_none_or(|c| c == s.chapter_id))
      .filter(|s| search::matches(&s.content.plain_text, &query.text))
      .collect();
    scenes.sort_by_key(|s| (s.chapter_id, s.position));

    Ok(
      scenes
        .into_iter()
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(SceneQuery::DEFAULT_LIMIT))
        .map(|s| SearchHit {
          scene_id:   s.scene_id,
          chapter_id: s.chapter_id,
          position:   s.position,
          snippet:    search::snippet(
            &s.content.plain_text,
            &query.text,
            search::SNIPPET_RADIUS,
          )
          .unwrap_or_default(),
          updated_at: s.updated_at,
        })
        .collect(),
    )
  }
}
