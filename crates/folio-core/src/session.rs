//! The editor session controller: "the scene currently being edited".
//!
//! A session mirrors the editing surface's document, debounces edits into
//! auto-save commits and exposes manual save, scene loading and revert to the
//! UI. Two state machines run side by side:
//!
//! - [`InputState`]: `Idle ⇄ Composing`. Content changes are dropped while an
//!   input method is composing.
//! - [`SaveState`]: `Clean → Dirty → Committing → Clean`. A failed commit
//!   falls back to `Dirty` and re-arms the autosave timer.
//!
//! Every asynchronous continuation (timer fire, commit completion, load) is
//! keyed by the session epoch captured when it started. Loading another scene
//! or tearing down bumps the epoch, so late results for a previous scene never
//! touch the current session state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  EngineConfig, Error, Result,
  clock::{Clock, SystemClock},
  document::{Document, content_digest},
  policy::{CommitReceipt, SnapshotPolicy},
  revert::{RevertReceipt, Reverter},
  scene::{DocumentVersion, SaveReason},
  store::DocumentStore,
  timer::{Scheduler, TimerHandle, TokioScheduler},
};

const EVENT_CAPACITY: usize = 64;

// ─── States & events ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
  Idle,
  /// Between composition-start and composition-end.
  Composing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
  Clean,
  Dirty,
  Committing,
}

/// Notifications for the surrounding UI. Failures are reported here and never
/// escape a timer-driven commit.
#[derive(Debug, Clone)]
pub enum SessionEvent {
  Loaded {
    scene_id: Uuid,
  },
  Saved {
    scene_id: Uuid,
    reason:   SaveReason,
    version:  Option<Uuid>,
  },
  SaveFailed {
    scene_id: Uuid,
    reason:   SaveReason,
    message:  String,
  },
  Reverted {
    scene_id: Uuid,
    target:   Uuid,
    backup:   Uuid,
  },
  VersionsUpdated {
    scene_id: Uuid,
    count:    usize,
  },
}

/// A point-in-time view of the session.
#[derive(Debug, Clone)]
pub struct SessionStatus {
  pub scene_id:         Option<Uuid>,
  pub input:            InputState,
  pub save:             SaveState,
  pub autosave_pending: bool,
  pub loading_versions: bool,
}

// ─── State ───────────────────────────────────────────────────────────────────

struct State {
  scene_id:         Option<Uuid>,
  document:         Document,
  /// Digest of the content last known to be persisted for `scene_id`.
  persisted_digest: Option<String>,
  input:            InputState,
  save:             SaveState,
  epoch:            u64,
  edit_seq:         u64,
  timer_seq:        u64,
  pending:          Option<TimerHandle>,
  versions:         Vec<DocumentVersion>,
  loading_versions: bool,
}

impl State {
  fn new() -> Self {
    Self {
      scene_id:         None,
      document:         Document::empty(),
      persisted_digest: None,
      input:            InputState::Idle,
      save:             SaveState::Clean,
      epoch:            0,
      edit_seq:         0,
      timer_seq:        0,
      pending:          None,
      versions:         Vec::new(),
      loading_versions: false,
    }
  }

  /// Cancel the armed autosave, if any. Bumping `timer_seq` also disarms a
  /// timer whose sleep has elapsed but which has not yet taken the lock.
  fn cancel_pending(&mut self) {
    if let Some(handle) = self.pending.take() {
      handle.cancel();
    }
    self.timer_seq += 1;
  }

  /// Drop everything tied to the current scene and start a new epoch.
  fn reset(&mut self) -> u64 {
    self.cancel_pending();
    self.epoch += 1;
    self.scene_id = None;
    self.document = Document::empty();
    self.persisted_digest = None;
    self.input = InputState::Idle;
    self.save = SaveState::Clean;
    self.versions.clear();
    self.loading_versions = false;
    self.epoch
  }

  fn is_current(&self, epoch: u64, scene_id: Uuid) -> bool {
    self.epoch == epoch && self.scene_id == Some(scene_id)
  }
}

struct Shared<S> {
  store:     Arc<S>,
  policy:    SnapshotPolicy<S>,
  reverter:  Reverter<S>,
  scheduler: Arc<dyn Scheduler>,
  config:    EngineConfig,
  state:     Mutex<State>,
  events:    broadcast::Sender<SessionEvent>,
}

impl<S: DocumentStore + 'static> Shared<S> {
  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn emit(&self, event: SessionEvent) {
    // No subscribers is fine.
    let _ = self.events.send(event);
  }

  /// (Re)start the quiet-period timer for the current epoch.
  fn arm_autosave(self: &Arc<Self>, state: &mut State) {
    state.cancel_pending();
    let epoch = state.epoch;
    let token = state.timer_seq;
    let shared = Arc::clone(self);
    let handle = self.scheduler.schedule(
      self.config.autosave_delay(),
      Box::pin(async move { shared.fire_autosave(epoch, token).await }),
    );
    state.pending = Some(handle);
  }

  async fn fire_autosave(self: Arc<Self>, epoch: u64, token: u64) {
    let (scene_id, doc, seq) = {
      let mut state = self.lock();
      if state.epoch != epoch || state.timer_seq != token {
        return;
      }
      // Fired; from here on the commit runs to completion.
      state.pending = None;
      let Some(scene_id) = state.scene_id else { return };
      if state.save != SaveState::Dirty {
        return;
      }
      let doc = state.document.clone();
      if state.persisted_digest.as_deref() == Some(content_digest(&doc.to_json_string()).as_str())
      {
        tracing::debug!(%scene_id, "content unchanged since last commit; skipping auto-save");
        state.save = SaveState::Clean;
        return;
      }
      state.save = SaveState::Committing;
      (scene_id, doc, state.edit_seq)
    };

    // Failures are reported through events and the Dirty state.
    let _ = self
      .run_commit(epoch, scene_id, doc, seq, SaveReason::AutoSave)
      .await;
  }

  async fn run_commit(
    self: &Arc<Self>,
    epoch: u64,
    scene_id: Uuid,
    doc: Document,
    seq: u64,
    reason: SaveReason,
  ) -> Result<CommitReceipt> {
    let result = self.policy.commit(scene_id, &doc, reason).await;

    let mut state = self.lock();
    let current = state.is_current(epoch, scene_id);
    match &result {
      Ok(receipt) => {
        if current {
          state.persisted_digest = Some(receipt.scene.content.digest.clone());
          if state.edit_seq == seq {
            state.save = SaveState::Clean;
          } else {
            state.save = SaveState::Dirty;
          }
          state.versions.retain(|v| !receipt.evicted.contains(&v.version_id));
          if let Some(version) = &receipt.version {
            state.versions.insert(0, version.clone());
          }
        }
        self.emit(SessionEvent::Saved {
          scene_id,
          reason,
          version: receipt.version.as_ref().map(|v| v.version_id),
        });
      }
      Err(e) => {
        tracing::warn!(%scene_id, %reason, error = %e, "commit failed; will retry");
        if current {
          state.save = SaveState::Dirty;
          if state.pending.is_none() {
            self.arm_autosave(&mut state);
          }
        }
        self.emit(SessionEvent::SaveFailed {
          scene_id,
          reason,
          message: e.to_string(),
        });
      }
    }
    result
  }

  async fn refresh_versions(&self, epoch: u64, scene_id: Uuid) -> Result<Vec<DocumentVersion>> {
    let result = self.store.list_versions(scene_id).await.map_err(Error::persistence);

    let mut state = self.lock();
    if !state.is_current(epoch, scene_id) {
      return Err(Error::Superseded(scene_id));
    }
    state.loading_versions = false;
    let versions = result?;
    state.versions = versions.clone();
    self.emit(SessionEvent::VersionsUpdated { scene_id, count: versions.len() });
    Ok(versions)
  }
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// The per-scene editing session. Dropping it tears it down.
pub struct EditorSession<S: DocumentStore + 'static> {
  shared: Arc<Shared<S>>,
}

impl<S: DocumentStore + 'static> EditorSession<S> {
  /// A session using tokio timers and the system clock.
  pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
    Self::with_runtime(store, config, Arc::new(TokioScheduler), Arc::new(SystemClock))
  }

  pub fn with_runtime(
    store: Arc<S>,
    config: EngineConfig,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let shared = Shared {
      policy: SnapshotPolicy::new(store.clone(), clock.clone(), config.clone()),
      reverter: Reverter::new(store.clone(), clock, config.clone()),
      store,
      scheduler,
      config,
      state: Mutex::new(State::new()),
      events,
    };
    Self { shared: Arc::new(shared) }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
    self.shared.events.subscribe()
  }

  pub fn status(&self) -> SessionStatus {
    let state = self.shared.lock();
    SessionStatus {
      scene_id:         state.scene_id,
      input:            state.input,
      save:             state.save,
      autosave_pending: state.pending.is_some(),
      loading_versions: state.loading_versions,
    }
  }

  pub fn scene_id(&self) -> Option<Uuid> { self.shared.lock().scene_id }

  /// The in-memory document, including unsaved edits.
  pub fn document(&self) -> Document { self.shared.lock().document.clone() }

  // ── Loading ───────────────────────────────────────────────────────────

  /// Make `scene_id` the session's scene and return its content.
  ///
  /// Any pending autosave for the previous scene is cancelled (or, with
  /// `flush_on_switch`, committed first). Content that is missing or fails
  /// to parse loads as the empty document.
  pub async fn load_scene(&self, scene_id: Uuid) -> Result<Document> {
    let (epoch, flush) = {
      let mut state = self.shared.lock();
      let flush = match state.scene_id {
        Some(previous) if self.shared.config.flush_on_switch && state.save != SaveState::Clean => {
          Some((previous, state.document.clone()))
        }
        _ => None,
      };
      let epoch = state.reset();
      state.loading_versions = true;
      (epoch, flush)
    };

    if let Some((previous, doc)) = flush
      && let Err(e) = self.shared.policy.commit(previous, &doc, SaveReason::AutoSave).await
    {
      tracing::warn!(scene_id = %previous, error = %e, "failed to flush edits on scene switch");
    }

    let fetched = self.shared.store.get_scene(scene_id).await.map_err(Error::persistence);

    let document = {
      let mut state = self.shared.lock();
      if state.epoch != epoch {
        return Err(Error::Superseded(scene_id));
      }
      let scene = match fetched {
        Ok(Some(scene)) => scene,
        Ok(None) => {
          state.loading_versions = false;
          return Err(Error::SceneNotFound(scene_id));
        }
        Err(e) => {
          state.loading_versions = false;
          return Err(e);
        }
      };
      let document = scene.content.document();
      state.scene_id = Some(scene_id);
      state.document = document.clone();
      state.persisted_digest = Some(scene.content.digest);
      document
    };

    tracing::info!(%scene_id, "loaded scene");
    self.shared.emit(SessionEvent::Loaded { scene_id });

    match self.shared.refresh_versions(epoch, scene_id).await {
      Ok(_) | Err(Error::Superseded(_)) => {}
      Err(e) => tracing::warn!(%scene_id, error = %e, "failed to load version history"),
    }

    Ok(document)
  }

  // ── Editing-surface callbacks ─────────────────────────────────────────

  /// Mirror a content mutation from the editing surface and (re)arm the
  /// autosave timer. Returns `Ok(false)` when the change was dropped because
  /// an input method is composing.
  pub fn on_content_change(&self, serialized: &str) -> Result<bool> {
    let mut state = self.shared.lock();
    if state.scene_id.is_none() {
      return Err(Error::NoSceneLoaded);
    }
    if state.input == InputState::Composing {
      tracing::trace!("dropping content change during composition");
      return Ok(false);
    }

    state.document = Document::parse(serialized)?;
    state.edit_seq += 1;
    state.save = SaveState::Dirty;
    self.shared.arm_autosave(&mut state);
    Ok(true)
  }

  pub fn composition_start(&self) { self.shared.lock().input = InputState::Composing; }

  /// Leave the composing state. If the editing surface reports the composed
  /// result, it is applied as a regular content change.
  pub fn composition_end(&self, committed: Option<&str>) -> Result<bool> {
    self.shared.lock().input = InputState::Idle;
    match committed {
      Some(serialized) => self.on_content_change(serialized),
      None => Ok(false),
    }
  }

  // ── UI entry points ───────────────────────────────────────────────────

  /// Commit the in-memory document now, always writing a `manual-save`
  /// version. A pending autosave is cancelled.
  pub async fn save_manually(&self) -> Result<CommitReceipt> {
    let (epoch, scene_id, doc, seq) = {
      let mut state = self.shared.lock();
      let scene_id = state.scene_id.ok_or(Error::NoSceneLoaded)?;
      state.cancel_pending();
      state.save = SaveState::Committing;
      (state.epoch, scene_id, state.document.clone(), state.edit_seq)
    };

    self
      .shared
      .run_commit(epoch, scene_id, doc, seq, SaveReason::ManualSave)
      .await
  }

  /// Revert the current scene to `version_id` and reload it.
  ///
  /// Unsaved edits are committed first so the `before-revert` backup holds
  /// them. Once the revert is stored the receipt is returned even if the
  /// reload fails.
  pub async fn revert_to_version(&self, version_id: Uuid) -> Result<RevertReceipt> {
    let (epoch, scene_id, flush) = {
      let mut state = self.shared.lock();
      let scene_id = state.scene_id.ok_or(Error::NoSceneLoaded)?;
      state.cancel_pending();
      let flush = (state.save == SaveState::Dirty)
        .then(|| (state.document.clone(), state.edit_seq));
      if flush.is_some() {
        state.save = SaveState::Committing;
      }
      (state.epoch, scene_id, flush)
    };

    if let Some((doc, seq)) = flush {
      self
        .shared
        .run_commit(epoch, scene_id, doc, seq, SaveReason::AutoSave)
        .await?;
    }

    let receipt = self.shared.reverter.revert(scene_id, version_id).await?;
    self.shared.emit(SessionEvent::Reverted {
      scene_id,
      target: receipt.target.version_id,
      backup: receipt.backup.version_id,
    });

    // The revert has landed; a failed reload leaves the session unloaded
    // but does not undo it.
    let still_current = self.shared.lock().epoch == epoch;
    if still_current
      && let Err(e) = self.load_scene(scene_id).await
    {
      tracing::warn!(%scene_id, error = %e, "reverted but failed to reload scene");
    }
    Ok(receipt)
  }

  /// Whether `version_id` is a legal revert target for the current scene.
  pub async fn can_revert(&self, version_id: Uuid) -> Result<bool> {
    let scene_id = self.scene_id().ok_or(Error::NoSceneLoaded)?;
    self.shared.reverter.can_revert(scene_id, version_id).await
  }

  // ── Version history ───────────────────────────────────────────────────

  /// The current scene's versions, most recent first.
  pub fn versions(&self) -> Vec<DocumentVersion> { self.shared.lock().versions.clone() }

  pub fn is_loading_versions(&self) -> bool { self.shared.lock().loading_versions }

  pub async fn refresh_versions(&self) -> Result<Vec<DocumentVersion>> {
    let (epoch, scene_id) = {
      let mut state = self.shared.lock();
      let scene_id = state.scene_id.ok_or(Error::NoSceneLoaded)?;
      state.loading_versions = true;
      (state.epoch, scene_id)
    };
    self.shared.refresh_versions(epoch, scene_id).await
  }

  // ── Teardown ──────────────────────────────────────────────────────────

  /// Leave the current scene. A pending autosave is cancelled before this
  /// returns and its content is discarded.
  pub fn teardown(&self) {
    let mut state = self.shared.lock();
    if let Some(scene_id) = state.scene_id
      && state.save != SaveState::Clean
    {
      tracing::debug!(%scene_id, "tearing down with unsaved edits");
    }
    state.reset();
  }
}

impl<S: DocumentStore + 'static> Drop for EditorSession<S> {
  fn drop(&mut self) { self.teardown(); }
}
