//! Revert orchestrator: move a scene's live content back to a version.
//!
//! The backup of the discarded state, the content overwrite and any eviction
//! go to the store as a single guarded [`WriteBatch`], so either all of them
//! land or none do. Versions are only read here, never modified.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
  EngineConfig, Error, Result,
  clock::Clock,
  policy::eviction_list,
  scene::{DocumentVersion, NewVersion, SaveReason, Scene},
  store::{DocumentStore, WriteBatch, WriteOp},
};

/// Outcome of [`Reverter::revert`].
#[derive(Debug, Clone)]
pub struct RevertReceipt {
  /// The scene with its restored content.
  pub scene:   Scene,
  /// The `before-revert` snapshot of the content that was replaced.
  pub backup:  DocumentVersion,
  /// The version that was restored.
  pub target:  DocumentVersion,
  pub evicted: Vec<Uuid>,
}

pub struct Reverter<S> {
  store:  Arc<S>,
  clock:  Arc<dyn Clock>,
  config: EngineConfig,
}

impl<S> Clone for Reverter<S> {
  fn clone(&self) -> Self {
    Self {
      store:  self.store.clone(),
      clock:  self.clock.clone(),
      config: self.config.clone(),
    }
  }
}

impl<S: DocumentStore> Reverter<S> {
  pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
    Self { store, clock, config }
  }

  /// Look up `version_id` as a revert target for `scene_id`, returning it
  /// with the scene's full (most recent first) version list.
  async fn target(
    &self,
    scene_id: Uuid,
    version_id: Uuid,
  ) -> Result<(DocumentVersion, Vec<DocumentVersion>)> {
    let target = self
      .store
      .get_version(version_id)
      .await
      .map_err(Error::persistence)?
      .filter(|v| v.scene_id == scene_id)
      .ok_or(Error::VersionNotFound { scene_id, version_id })?;

    let versions = self
      .store
      .list_versions(scene_id)
      .await
      .map_err(Error::persistence)?;
    if versions.first().map(|v| v.version_id) == Some(version_id) {
      return Err(Error::NoOp(version_id));
    }

    Ok((target, versions))
  }

  /// Whether `version_id` is a version of `scene_id` other than the most
  /// recent one.
  pub async fn can_revert(&self, scene_id: Uuid, version_id: Uuid) -> Result<bool> {
    match self.target(scene_id, version_id).await {
      Ok(_) => Ok(true),
      Err(Error::VersionNotFound { .. } | Error::NoOp(_)) => Ok(false),
      Err(e) => Err(e),
    }
  }

  /// Back up the scene's live content as a `before-revert` version, then
  /// replace it with the content of `version_id`.
  pub async fn revert(&self, scene_id: Uuid, version_id: Uuid) -> Result<RevertReceipt> {
    let (target, versions) = self.target(scene_id, version_id).await?;

    let scene = self
      .store
      .get_scene(scene_id)
      .await
      .map_err(Error::persistence)?
      .ok_or(Error::SceneNotFound(scene_id))?;

    let backup =
      NewVersion::new(scene.content, SaveReason::BeforeRevert, self.clock.now());

    let mut batch = WriteBatch::new(scene_id)
      .expect_latest(versions.first().map(|v| v.version_id));
    batch.push(WriteOp::InsertVersion(backup));
    batch.push(WriteOp::PutContent(target.content.clone()));
    for id in eviction_list(&versions, self.config.version_cap()) {
      batch.push(WriteOp::EvictVersion(id));
    }

    let receipt = self.store.apply(batch).await.map_err(Error::transaction)?;
    let backup = receipt
      .inserted
      .into_iter()
      .next()
      .ok_or_else(|| Error::Transaction("store did not record the backup version".into()))?;

    tracing::info!(
      %scene_id,
      target = %target.version_id,
      backup = %backup.version_id,
      evicted = receipt.evicted.len(),
      "reverted scene",
    );

    Ok(RevertReceipt {
      scene: receipt.scene,
      backup,
      target,
      evicted: receipt.evicted,
    })
  }
}
