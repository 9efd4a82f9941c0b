//! Engine tunables.

use std::time::Duration;

use serde::Deserialize;

/// Settings for the autosave debouncer and version history.
///
/// Deserialised from the `[engine]` table of `folio.toml` (or `FOLIO_ENGINE__*`
/// environment variables); every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Quiet period after the last edit before an auto-save fires.
  pub autosave_delay_ms:        u64,
  /// Maximum number of versions retained per scene.
  pub version_cap:              usize,
  /// Minimum age of the latest version before an auto-save snapshots again.
  pub min_version_spacing_secs: u64,
  /// Commit pending edits of the previous scene when switching scenes,
  /// instead of discarding them.
  pub flush_on_switch:          bool,
}

impl EngineConfig {
  pub const DEFAULT_AUTOSAVE_DELAY_MS: u64 = 2_000;
  pub const DEFAULT_VERSION_CAP: usize = 50;
  pub const DEFAULT_MIN_VERSION_SPACING_SECS: u64 = 5 * 60;

  pub fn autosave_delay(&self) -> Duration {
    Duration::from_millis(self.autosave_delay_ms)
  }

  /// Saturates at [`chrono::Duration::MAX`] for spacings chrono cannot
  /// represent.
  pub fn min_version_spacing(&self) -> chrono::Duration {
    i64::try_from(self.min_version_spacing_secs)
      .ok()
      .and_then(chrono::Duration::try_seconds)
      .unwrap_or(chrono::Duration::MAX)
  }

  /// A cap of zero would evict every snapshot as it is written.
  pub fn version_cap(&self) -> usize { self.version_cap.max(1) }
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      autosave_delay_ms:        Self::DEFAULT_AUTOSAVE_DELAY_MS,
      version_cap:              Self::DEFAULT_VERSION_CAP,
      min_version_spacing_secs: Self::DEFAULT_MIN_VERSION_SPACING_SECS,
      flush_on_switch:          false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults() {
    let config = EngineConfig::default();
    assert_eq!(config.autosave_delay(), Duration::from_secs(2));
    assert_eq!(config.version_cap(), 50);
    assert_eq!(config.min_version_spacing(), chrono::Duration::minutes(5));
    assert!(!config.flush_on_switch);
  }

  #[test]
  fn partial_json_keeps_defaults() {
    let config: EngineConfig =
      serde_json::from_str(r#"{ "version_cap": 10 }"#).unwrap();
    assert_eq!(config.version_cap, 10);
    assert_eq!(config.autosave_delay_ms, 2_000);
  }

  #[test]
  fn huge_spacing_saturates() {
    for secs in [u64::MAX, 10_000_000_000_000_000, i64::MAX as u64] {
      let config = EngineConfig { min_version_spacing_secs: secs, ..EngineConfig::default() };
      assert_eq!(config.min_version_spacing(), chrono::Duration::MAX);
    }
    let config = EngineConfig { min_version_spacing_secs: 90, ..EngineConfig::default() };
    assert_eq!(config.min_version_spacing(), chrono::Duration::seconds(90));
  }

  #[test]
  fn zero_cap_is_clamped() {
    let config = EngineConfig { version_cap: 0, ..EngineConfig::default() };
    assert_eq!(config.version_cap(), 1);
  }
}
