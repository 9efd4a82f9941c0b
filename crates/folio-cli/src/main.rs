//! `folio` — command-line front end for the Folio scene store.
//!
//! # Usage
//!
//! ```
//! folio new-scene --chapter 6f1c…  draft.txt
//! folio write 0b9e… draft.txt            # waits for the autosave
//! folio write 0b9e… draft.txt --save     # manual save, always a version
//! folio history 0b9e…
//! folio revert 0b9e… 41d2…
//! folio search "night garden"
//! ```

mod commands;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use folio_store_sqlite::SqliteStore;
use settings::CliConfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "folio", version, about = "Versioned scene store for long-form writing")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "folio.toml", value_name = "FILE")]
  config: PathBuf,

  /// SQLite database path; overrides `store_path` from the config.
  #[arg(long, value_name = "FILE")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Create a scene, optionally seeded from a plain-text file.
  NewScene {
    /// Chapter to add the scene to; a new chapter id is minted if omitted.
    #[arg(long)]
    chapter:  Option<Uuid>,
    #[arg(long, default_value_t = 0)]
    position: i64,
    file:     Option<PathBuf>,
  },
  /// List the scenes of a chapter.
  Scenes { chapter: Uuid },
  /// Replace a scene's content from a file (or stdin) through an editor
  /// session.
  Write {
    scene: Uuid,
    file:  Option<PathBuf>,
    /// Commit immediately as a manual save instead of waiting for the
    /// autosave timer.
    #[arg(long)]
    save:  bool,
    /// Input is a serialized document rather than plain text.
    #[arg(long)]
    json:  bool,
  },
  /// Print a scene's current content.
  Show {
    scene: Uuid,
    /// Print the serialized document instead of plain text.
    #[arg(long)]
    json:  bool,
  },
  /// List a scene's versions, most recent first.
  History { scene: Uuid },
  /// Restore a scene to a previous version.
  Revert { scene: Uuid, version: Uuid },
  /// Case-insensitive plain-text search across all scenes.
  Search {
    text:    String,
    #[arg(long)]
    chapter: Option<Uuid>,
    #[arg(long)]
    limit:   Option<usize>,
    #[arg(long)]
    offset:  Option<usize>,
  },
  /// Delete a scene and its history.
  DeleteScene { scene: Uuid },
  /// Delete every scene of a chapter.
  DeleteChapter { chapter: Uuid },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr so command output stays pipeable.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = CliConfig::load(&cli.config, cli.store.as_deref())?;

  if let Some(parent) = cfg.store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
  tracing::debug!(store = ?cfg.store_path, engine = ?cfg.engine, "opened store");

  commands::run(cli.command, store, cfg).await
}
