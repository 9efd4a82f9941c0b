//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`),
//! so lexical order in SQL is chronological order. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use folio_core::{
  document::{SceneContent, TextStats},
  scene::{DocumentVersion, SaveReason, Scene},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── SaveReason ──────────────────────────────────────────────────────────────

pub fn encode_reason(r: SaveReason) -> &'static str { r.as_str() }

pub fn decode_reason(s: &str) -> Result<SaveReason> {
  match s {
    "auto-save" => Ok(SaveReason::AutoSave),
    "manual-save" => Ok(SaveReason::ManualSave),
    "before-revert" => Ok(SaveReason::BeforeRevert),
    other => Err(Error::UnknownReason(other.to_owned())),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const SCENE_COLUMNS: &str = "scene_id, chapter_id, position, content, plain_text, \
   char_count, char_count_with_spaces, digest, created_at, updated_at";

pub const VERSION_COLUMNS: &str = "version_id, scene_id, number, content, plain_text, \
   char_count, char_count_with_spaces, digest, reason, created_at";

fn content(
  content: String,
  plain_text: String,
  char_count: i64,
  char_count_with_spaces: i64,
  digest: String,
) -> SceneContent {
  SceneContent {
    content,
    plain_text,
    stats: TextStats {
      char_count:             u64::try_from(char_count).unwrap_or_default(),
      char_count_with_spaces: u64::try_from(char_count_with_spaces).unwrap_or_default(),
    },
    digest,
  }
}

/// Raw values read directly from a `scenes` row.
pub struct RawScene {
  pub scene_id:               String,
  pub chapter_id:             String,
  pub position:               i64,
  pub content:                String,
  pub plain_text:             String,
  pub char_count:             i64,
  pub char_count_with_spaces: i64,
  pub digest:                 String,
  pub created_at:             String,
  pub updated_at:             String,
}

impl RawScene {
  /// Map a row selected with [`SCENE_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      scene_id:               row.get(0)?,
      chapter_id:             row.get(1)?,
      position:               row.get(2)?,
      content:                row.get(3)?,
      plain_text:             row.get(4)?,
      char_count:             row.get(5)?,
      char_count_with_spaces: row.get(6)?,
      digest:                 row.get(7)?,
      created_at:             row.get(8)?,
      updated_at:             row.get(9)?,
    })
  }

  pub fn into_scene(self) -> Result<Scene> {
    Ok(Scene {
      scene_id:   decode_uuid(&self.scene_id)?,
      chapter_id: decode_uuid(&self.chapter_id)?,
      position:   self.position,
      content:    content(
        self.content,
        self.plain_text,
        self.char_count,
        self.char_count_with_spaces,
        self.digest,
      ),
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from a `versions` row.
pub struct RawVersion {
  pub version_id:             String,
  pub scene_id:               String,
  pub number:                 i64,
  pub content:                String,
  pub plain_text:             String,
  pub char_count:             i64,
  pub char_count_with_spaces: i64,
  pub digest:                 String,
  pub reason:                 String,
  pub created_at:             String,
}

impl RawVersion {
  /// Map a row selected with [`VERSION_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version_id:             row.get(0)?,
      scene_id:               row.get(1)?,
      number:                 row.get(2)?,
      content:                row.get(3)?,
      plain_text:             row.get(4)?,
      char_count:             row.get(5)?,
      char_count_with_spaces: row.get(6)?,
      digest:                 row.get(7)?,
      reason:                 row.get(8)?,
      created_at:             row.get(9)?,
    })
  }

  pub fn into_version(self) -> Result<DocumentVersion> {
    Ok(DocumentVersion {
      version_id: decode_uuid(&self.version_id)?,
      scene_id:   decode_uuid(&self.scene_id)?,
      number:     self.number,
      content:    content(
        self.content,
        self.plain_text,
        self.char_count,
        self.char_count_with_spaces,
        self.digest,
      ),
      reason:     decode_reason(&self.reason)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let b = a + chrono::Duration::milliseconds(500);
    let c = a + chrono::Duration::seconds(1);
    let (ea, eb, ec) = (encode_dt(a), encode_dt(b), encode_dt(c));
    assert!(ea < eb && eb < ec);
    assert_eq!(decode_dt(&eb).unwrap(), b);
  }

  #[test]
  fn reasons_round_trip() {
    for r in [SaveReason::AutoSave, SaveReason::ManualSave, SaveReason::BeforeRevert] {
      assert_eq!(decode_reason(encode_reason(r)).unwrap(), r);
    }
    assert!(decode_reason("autosave").is_err());
  }
}
