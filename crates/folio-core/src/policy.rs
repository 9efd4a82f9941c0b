//! Version snapshot policy: the persistence commit path.
//!
//! Every commit overwrites the scene's live content. A version is added when
//! the reason always snapshots (manual save, revert backup), when the scene
//! has no versions yet, or when the latest version is older than the
//! configured spacing. Whenever a version is added, the oldest versions are
//! evicted in the same batch so the per-scene count never exceeds the cap.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  EngineConfig, Error, Result,
  clock::Clock,
  document::{Document, SceneContent},
  scene::{DocumentVersion, NewVersion, SaveReason, Scene},
  store::{DocumentStore, WriteBatch, WriteOp},
};

/// Outcome of [`SnapshotPolicy::commit`].
#[derive(Debug, Clone)]
pub struct CommitReceipt {
  pub scene:   Scene,
  /// The version written by this commit, if the policy snapshotted.
  pub version: Option<DocumentVersion>,
  pub evicted: Vec<Uuid>,
}

/// Decides whether a commit snapshots and builds the eviction list.
pub struct SnapshotPolicy<S> {
  store:  Arc<S>,
  clock:  Arc<dyn Clock>,
  config: EngineConfig,
}

impl<S> Clone for SnapshotPolicy<S> {
  fn clone(&self) -> Self {
    Self {
      store:  self.store.clone(),
      clock:  self.clock.clone(),
      config: self.config.clone(),
    }
  }
}

impl<S: DocumentStore> SnapshotPolicy<S> {
  pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
    Self { store, clock, config }
  }

  pub fn config(&self) -> &EngineConfig { &self.config }

  /// Whether a commit for `reason` at `now` should write a version, given the
  /// scene's latest version.
  pub fn should_snapshot(
    &self,
    reason: SaveReason,
    latest: Option<&DocumentVersion>,
    now: DateTime<Utc>,
  ) -> bool {
    if reason.always_snapshots() {
      return true;
    }
    match latest {
      None => true,
      Some(v) => now - v.created_at > self.config.min_version_spacing(),
    }
  }

  /// Persist `doc` as the live content of `scene_id`, snapshotting per policy.
  pub async fn commit(
    &self,
    scene_id: Uuid,
    doc: &Document,
    reason: SaveReason,
  ) -> Result<CommitReceipt> {
    let content = SceneContent::from_document(doc);
    let now = self.clock.now();

    let versions = self
      .store
      .list_versions(scene_id)
      .await
      .map_err(Error::persistence)?;
    let latest = versions.first();
    let snapshot = self.should_snapshot(reason, latest, now);

    let mut batch =
      WriteBatch::new(scene_id).expect_latest(latest.map(|v| v.version_id));
    batch.push(WriteOp::PutContent(content.clone()));
    if snapshot {
      batch.push(WriteOp::InsertVersion(NewVersion::new(content, reason, now)));
      for id in eviction_list(&versions, self.config.version_cap()) {
        batch.push(WriteOp::EvictVersion(id));
      }
    }

    let receipt = self.store.apply(batch).await.map_err(Error::persistence)?;
    let version = receipt.inserted.into_iter().next();

    tracing::debug!(
      %scene_id,
      %reason,
      version = ?version.as_ref().map(|v| v.version_id),
      evicted = receipt.evicted.len(),
      chars = receipt.scene.content.stats.char_count,
      "committed scene content",
    );

    Ok(CommitReceipt { scene: receipt.scene, version, evicted: receipt.evicted })
  }
}

/// Ids of the oldest versions to drop so that, after one more insert, at most
/// `cap` remain. `versions` is most recent first.
pub(crate) fn eviction_list(versions: &[DocumentVersion], cap: usize) -> Vec<Uuid> {
  let overflow = (versions.len() + 1).saturating_sub(cap);
  versions
    .iter()
    .rev()
    .take(overflow)
    .map(|v| v.version_id)
    .collect()
}
