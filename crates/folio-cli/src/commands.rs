//! Subcommand handlers. Each one prints its result to stdout.

use std::{
  io::Read as _,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, Result, anyhow, bail};
use folio_core::{
  document::Document,
  policy::CommitReceipt,
  scene::{DocumentVersion, NewScene},
  session::{EditorSession, SessionEvent},
  store::{DocumentStore, SceneQuery},
};
use folio_store_sqlite::SqliteStore;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::{Command, settings::CliConfig};

/// Extra time allowed on top of the autosave delay for the commit itself.
const AUTOSAVE_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

pub async fn run(command: Command, store: SqliteStore, cfg: CliConfig) -> Result<()> {
  let store = Arc::new(store);

  match command {
    Command::NewScene { chapter, position, file } => {
      let chapter = chapter.unwrap_or_else(Uuid::new_v4);
      let mut input = NewScene::new(chapter, position);
      if let Some(path) = file {
        let text = read_text(Some(&path))?;
        let text = text.trim_end_matches(['\r', '\n']);
        input = input.with_content(Document::from_plain_text(text));
      }
      let scene = store.create_scene(input).await?;
      println!("{}", scene.scene_id);
      tracing::info!(scene_id = %scene.scene_id, %chapter, "created scene");
    }

    Command::Scenes { chapter } => {
      for scene in store.list_scenes(chapter).await? {
        println!(
          "{:>3}  {}  {:>6} chars  updated {}",
          scene.position,
          scene.scene_id,
          scene.content.stats.char_count,
          scene.updated_at.format("%Y-%m-%d %H:%M:%S"),
        );
      }
    }

    Command::Write { scene, file, save, json } => {
      write(store, cfg, scene, file, save, json).await?;
    }

    Command::Show { scene, json } => {
      let scene = store
        .get_scene(scene)
        .await?
        .ok_or_else(|| anyhow!("scene {scene} not found"))?;
      if json {
        println!("{}", scene.content.content);
      } else {
        println!("{}", scene.content.plain_text);
      }
    }

    Command::History { scene } => {
      let versions = store.list_versions(scene).await?;
      if versions.is_empty() {
        println!("no versions");
      }
      for v in &versions {
        print_version(v);
      }
    }

    Command::Revert { scene, version } => {
      let session = EditorSession::new(store, cfg.engine);
      session
        .load_scene(scene)
        .await
        .with_context(|| format!("failed to load scene {scene}"))?;
      let receipt = session.revert_to_version(version).await?;
      println!(
        "restored version {}; previous content kept as version {}",
        receipt.target.number, receipt.backup.number,
      );
      if !receipt.evicted.is_empty() {
        println!("evicted {} old version(s)", receipt.evicted.len());
      }
    }

    Command::Search { text, chapter, limit, offset } => {
      let query = SceneQuery { chapter_id: chapter, limit, offset, ..SceneQuery::text(text) };
      for hit in store.search(&query).await? {
        println!("{}  {}#{}  {}", hit.scene_id, hit.chapter_id, hit.position, hit.snippet);
      }
    }

    Command::DeleteScene { scene } => {
      if !store.delete_scene(scene).await? {
        bail!("scene {scene} not found");
      }
      println!("deleted {scene}");
    }

    Command::DeleteChapter { chapter } => {
      let removed = store.delete_chapter(chapter).await?;
      println!("deleted {removed} scene(s)");
    }
  }

  Ok(())
}

/// Push new content through an editor session, then either save manually or
/// wait for the autosave timer to commit it.
async fn write(
  store: Arc<SqliteStore>,
  cfg: CliConfig,
  scene_id: Uuid,
  file: Option<PathBuf>,
  save: bool,
  json: bool,
) -> Result<()> {
  let raw = read_text(file.as_deref())?;
  let serialized = if json {
    raw
  } else {
    Document::from_plain_text(raw.trim_end_matches(['\r', '\n'])).to_json_string()
  };

  let wait = cfg.engine.autosave_delay() + AUTOSAVE_GRACE;
  let session = EditorSession::new(store, cfg.engine);
  let loaded = session
    .load_scene(scene_id)
    .await
    .with_context(|| format!("failed to load scene {scene_id}"))?;

  let mut events = session.subscribe();
  session
    .on_content_change(&serialized)
    .context("input is not a valid document")?;

  if save {
    let receipt = session.save_manually().await?;
    print_commit(&receipt);
    return Ok(());
  }

  if session.document() == loaded {
    println!("unchanged");
    return Ok(());
  }

  let saved = tokio::time::timeout(wait, async {
    loop {
      match events.recv().await {
        Ok(SessionEvent::Saved { version, .. }) => return Ok(version),
        Ok(SessionEvent::SaveFailed { message, .. }) => return Err(anyhow!(message)),
        Ok(_) | Err(RecvError::Lagged(_)) => continue,
        Err(RecvError::Closed) => bail!("session closed before saving"),
      }
    }
  })
  .await
  .context("timed out waiting for autosave")??;

  match saved {
    Some(version) => println!("saved; new version {version}"),
    None => println!("saved"),
  }
  Ok(())
}

fn read_text(path: Option<&Path>) -> Result<String> {
  match path {
    Some(path) => std::fs::read_to_string(path)
      .with_context(|| format!("failed to read {}", path.display())),
    None => {
      let mut buf = String::new();
      std::io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read stdin")?;
      Ok(buf)
    }
  }
}

fn print_commit(receipt: &CommitReceipt) {
  match &receipt.version {
    Some(v) => println!("saved as version {} ({})", v.number, v.version_id),
    None => println!("saved"),
  }
  if !receipt.evicted.is_empty() {
    println!("evicted {} old version(s)", receipt.evicted.len());
  }
}

fn print_version(v: &DocumentVersion) {
  println!(
    "{:>4}  {}  {}  {:<13}  {:>6} chars",
    v.number,
    v.version_id,
    v.created_at.format("%Y-%m-%d %H:%M:%S"),
    v.reason.as_str(),
    v.content.stats.char_count,
  );
}
