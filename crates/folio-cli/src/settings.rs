//! Layered configuration for the `folio` binary.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use folio_core::EngineConfig;
use serde::Deserialize;

/// Runtime configuration, deserialised from `folio.toml` and `FOLIO_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub engine:     EngineConfig,
}

fn default_store_path() -> PathBuf { PathBuf::from("folio.db") }

impl CliConfig {
  /// Read `path` (if it exists), then the environment, then `store_override`.
  ///
  /// Nested keys use a double underscore: `FOLIO_ENGINE__VERSION_CAP=20`.
  pub fn load(path: &Path, store_override: Option<&Path>) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("FOLIO")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .set_override_option(
        "store_path",
        store_override.map(|p| p.to_string_lossy().into_owned()),
      )?
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise CliConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let cfg = CliConfig::load(Path::new("/nonexistent/folio.toml"), None).unwrap();
    assert_eq!(cfg.engine, EngineConfig::default());
  }

  #[test]
  fn store_override_wins() {
    let cfg = CliConfig::load(
      Path::new("/nonexistent/folio.toml"),
      Some(Path::new("/tmp/override.db")),
    )
    .unwrap();
    assert_eq!(cfg.store_path, PathBuf::from("/tmp/override.db"));
  }

  #[test]
  fn tilde_expands_against_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(
      expand_tilde(Path::new("~/notes/folio.db")),
      PathBuf::from(home).join("notes/folio.db"),
    );
    assert_eq!(expand_tilde(Path::new("/abs/folio.db")), PathBuf::from("/abs/folio.db"));
  }
}
