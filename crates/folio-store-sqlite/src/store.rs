//! [`SqliteStore`] — the SQLite implementation of [`DocumentStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use folio_core::{
  document::{Document, SceneContent},
  scene::{DocumentVersion, NewScene, Scene},
  search,
  store::{DocumentStore, SceneQuery, SearchHit, WriteBatch, WriteOp, WriteReceipt},
};

use crate::{
  encode::{
    RawScene, RawVersion, SCENE_COLUMNS, VERSION_COLUMNS, decode_dt, decode_uuid, encode_dt,
    encode_reason, encode_uuid,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Batch encoding ──────────────────────────────────────────────────────────

/// Column values shared by the `scenes` and `versions` content columns.
struct EncodedContent {
  content:                String,
  plain_text:             String,
  char_count:             i64,
  char_count_with_spaces: i64,
  digest:                 String,
}

impl EncodedContent {
  fn new(c: SceneContent) -> Self {
    Self {
      char_count:             i64::try_from(c.stats.char_count).unwrap_or(i64::MAX),
      char_count_with_spaces: i64::try_from(c.stats.char_count_with_spaces)
        .unwrap_or(i64::MAX),
      content:                c.content,
      plain_text:             c.plain_text,
      digest:                 c.digest,
    }
  }
}

enum EncodedOp {
  Put(EncodedContent),
  Insert {
    version_id: String,
    content:    EncodedContent,
    reason:     &'static str,
    created_at: String,
  },
  Evict(String),
}

/// Why a batch was rolled back without touching the database.
enum Rejection {
  SceneMissing,
  Stale,
  Foreign(String),
}

struct Applied {
  scene:    RawScene,
  inserted: Vec<RawVersion>,
  evicted:  Vec<String>,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Folio document store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_versions(&self, scene_id: Uuid, limit: Option<i64>) -> Result<Vec<DocumentVersion>> {
    let scene_id_str = encode_uuid(scene_id);
    let limit = limit.unwrap_or(-1);

    let raws: Vec<RawVersion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {VERSION_COLUMNS} FROM versions
           WHERE scene_id = ?1
           ORDER BY created_at DESC, number DESC
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![scene_id_str, limit], RawVersion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVersion::into_version).collect()
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteStore {
  type Error = Error;

  // ── Scenes ────────────────────────────────────────────────────────────────

  async fn create_scene(&self, input: NewScene) -> Result<Scene> {
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

    let id_str      = encode_uuid(scene.scene_id);
    let chapter_str = encode_uuid(scene.chapter_id);
    let position    = scene.position;
    let c           = EncodedContent::new(scene.content.clone());
    let at_str      = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO scenes (
             scene_id, chapter_id, position, content, plain_text,
             char_count, char_count_with_spaces, digest, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
          rusqlite::params![
            id_str,
            chapter_str,
            position,
            c.content,
            c.plain_text,
            c.char_count,
            c.char_count_with_spaces,
            c.digest,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(scene)
  }

  async fn get_scene(&self, scene_id: Uuid) -> Result<Option<Scene>> {
    let id_str = encode_uuid(scene_id);

    let raw: Option<RawScene> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {SCENE_COLUMNS} FROM scenes WHERE scene_id = ?1"),
              rusqlite::params![id_str],
              RawScene::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawScene::into_scene).transpose()
  }

  async fn list_scenes(&self, chapter_id: Uuid) -> Result<Vec<Scene>> {
    let chapter_str = encode_uuid(chapter_id);

    let raws: Vec<RawScene> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SCENE_COLUMNS} FROM scenes
           WHERE chapter_id = ?1
           ORDER BY position, created_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![chapter_str], RawScene::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawScene::into_scene).collect()
  }

  async fn delete_scene(&self, scene_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(scene_id);

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM versions WHERE scene_id = ?1", rusqlite::params![id_str])?;
        let removed =
          tx.execute("DELETE FROM scenes WHERE scene_id = ?1", rusqlite::params![id_str])?;
        tx.commit()?;
        Ok(removed > 0)
      })
      .await?;

    tracing::debug!(%scene_id, removed, "deleted scene");
    Ok(removed)
  }

  async fn delete_chapter(&self, chapter_id: Uuid) -> Result<usize> {
    let chapter_str = encode_uuid(chapter_id);

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM versions
           WHERE scene_id IN (SELECT scene_id FROM scenes WHERE chapter_id = ?1)",
          rusqlite::params![chapter_str],
        )?;
        let removed =
          tx.execute("DELETE FROM scenes WHERE chapter_id = ?1", rusqlite::params![chapter_str])?;
        tx.commit()?;
        Ok(removed)
      })
      .await?;

    tracing::debug!(%chapter_id, removed, "deleted chapter scenes");
    Ok(removed)
  }

  // ── Versions ──────────────────────────────────────────────────────────────

  async fn get_version(&self, version_id: Uuid) -> Result<Option<DocumentVersion>> {
    let id_str = encode_uuid(version_id);

    let raw: Option<RawVersion> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {VERSION_COLUMNS} FROM versions WHERE version_id = ?1"),
              rusqlite::params![id_str],
              RawVersion::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawVersion::into_version).transpose()
  }

  async fn list_versions(&self, scene_id: Uuid) -> Result<Vec<DocumentVersion>> {
    self.query_versions(scene_id, None).await
  }

  async fn latest_version(&self, scene_id: Uuid) -> Result<Option<DocumentVersion>> {
    Ok(self.query_versions(scene_id, Some(1)).await?.into_iter().next())
  }

  async fn count_versions(&self, scene_id: Uuid) -> Result<usize> {
    let id_str = encode_uuid(scene_id);

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM versions WHERE scene_id = ?1",
          rusqlite::params![id_str],
          |r| r.get(0),
        )?)
      })
      .await?;

    Ok(usize::try_from(count).unwrap_or_default())
  }

  // ── Transactional writes ──────────────────────────────────────────────────

  async fn apply(&self, batch: WriteBatch) -> Result<WriteReceipt> {
    let scene_id = batch.scene_id;
    let scene_str = encode_uuid(scene_id);
    let expected = batch.expected_latest.map(|latest| latest.map(encode_uuid));
    let now_str = encode_dt(Utc::now());
    let ops: Vec<EncodedOp> = batch
      .ops
      .into_iter()
      .map(|op| match op {
        WriteOp::PutContent(c) => EncodedOp::Put(EncodedContent::new(c)),
        WriteOp::InsertVersion(v) => EncodedOp::Insert {
          version_id: encode_uuid(v.version_id),
          content:    EncodedContent::new(v.content),
          reason:     encode_reason(v.reason),
          created_at: encode_dt(v.created_at),
        },
        WriteOp::EvictVersion(id) => EncodedOp::Evict(encode_uuid(id)),
      })
      .collect();

    let outcome = self
      .conn
      .call(move |conn| {
        // Every early return drops `tx`, which rolls the transaction back.
        let tx = conn.transaction()?;

        let exists = tx
          .query_row(
            "SELECT 1 FROM scenes WHERE scene_id = ?1",
            rusqlite::params![scene_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(Err(Rejection::SceneMissing));
        }

        if let Some(expected) = expected {
          let latest: Option<String> = tx
            .query_row(
              "SELECT version_id FROM versions
               WHERE scene_id = ?1
               ORDER BY created_at DESC, number DESC
               LIMIT 1",
              rusqlite::params![scene_str],
              |r| r.get(0),
            )
            .optional()?;
          if latest != expected {
            return Ok(Err(Rejection::Stale));
          }
        }

        let mut inserted_ids = Vec::new();
        let mut evicted = Vec::new();
        for op in ops {
          match op {
            EncodedOp::Put(c) => {
              tx.execute(
                "UPDATE scenes SET
                   content = ?2, plain_text = ?3, char_count = ?4,
                   char_count_with_spaces = ?5, digest = ?6, updated_at = ?7
                 WHERE scene_id = ?1",
                rusqlite::params![
                  scene_str,
                  c.content,
                  c.plain_text,
                  c.char_count,
                  c.char_count_with_spaces,
                  c.digest,
                  now_str,
                ],
              )?;
            }
            EncodedOp::Insert { version_id, content: c, reason, created_at } => {
              let number: i64 = tx.query_row(
                "SELECT COALESCE(MAX(number), 0) + 1 FROM versions WHERE scene_id = ?1",
                rusqlite::params![scene_str],
                |r| r.get(0),
              )?;
              tx.execute(
                "INSERT INTO versions (
                   version_id, scene_id, number, content, plain_text,
                   char_count, char_count_with_spaces, digest, reason, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                  version_id,
                  scene_str,
                  number,
                  c.content,
                  c.plain_text,
                  c.char_count,
                  c.char_count_with_spaces,
                  c.digest,
                  reason,
                  created_at,
                ],
              )?;
              inserted_ids.push(version_id);
            }
            EncodedOp::Evict(version_id) => {
              let owner: Option<String> = tx
                .query_row(
                  "SELECT scene_id FROM versions WHERE version_id = ?1",
                  rusqlite::params![version_id],
                  |r| r.get(0),
                )
                .optional()?;
              match owner {
                Some(owner) if owner == scene_str => {
                  tx.execute(
                    "DELETE FROM versions WHERE version_id = ?1",
                    rusqlite::params![version_id],
                  )?;
                  evicted.push(version_id);
                }
                Some(_) => return Ok(Err(Rejection::Foreign(version_id))),
                None => {}
              }
            }
          }
        }

        let scene = tx.query_row(
          &format!("SELECT {SCENE_COLUMNS} FROM scenes WHERE scene_id = ?1"),
          rusqlite::params![scene_str],
          RawScene::from_row,
        )?;
        let mut inserted = Vec::with_capacity(inserted_ids.len());
        for id in &inserted_ids {
          inserted.push(tx.query_row(
            &format!("SELECT {VERSION_COLUMNS} FROM versions WHERE version_id = ?1"),
            rusqlite::params![id],
            RawVersion::from_row,
          )?);
        }

        tx.commit()?;
        Ok(Ok(Applied { scene, inserted, evicted }))
      })
      .await?;

    let applied = match outcome {
      Ok(applied) => applied,
      Err(Rejection::SceneMissing) => return Err(Error::SceneNotFound(scene_id)),
      Err(Rejection::Stale) => return Err(Error::StaleWrite(scene_id)),
      Err(Rejection::Foreign(id)) => {
        return Err(Error::ForeignVersion(decode_uuid(&id)?, scene_id));
      }
    };

    Ok(WriteReceipt {
      scene:    applied.scene.into_scene()?,
      inserted: applied
        .inserted
        .into_iter()
        .map(RawVersion::into_version)
        .collect::<Result<_>>()?,
      evicted:  applied
        .evicted
        .iter()
        .map(|id| decode_uuid(id))
        .collect::<Result<_>>()?,
    })
  }

  // ── Search ────────────────────────────────────────────────────────────────

  async fn search<'a>(&'a self, query: &'a SceneQuery) -> Result<Vec<SearchHit>> {
    let chapter_str = query.chapter_id.map(encode_uuid);

    let rows: Vec<(String, String, i64, String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT scene_id, chapter_id, position, plain_text, updated_at
           FROM scenes
           WHERE ?1 IS NULL OR chapter_id = ?1
           ORDER BY chapter_id, position",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![chapter_str], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    // Case folding is done in Rust; SQLite's LIKE only folds ASCII.
    rows
      .into_iter()
      .filter(|(_, _, _, text, _)| search::matches(text, &query.text))
      .skip(query.offset.unwrap_or(0))
      .take(query.limit.unwrap_or(SceneQuery::DEFAULT_LIMIT))
      .map(|(scene_id, chapter_id, position, text, updated_at)| -> Result<SearchHit> {
        Ok(SearchHit {
          scene_id: decode_uuid(&scene_id)?,
          chapter_id: decode_uuid(&chapter_id)?,
          position,
          snippet: search::snippet(&text, &query.text, search::SNIPPET_RADIUS)
            .unwrap_or_default(),
          updated_at: decode_dt(&updated_at)?,
        })
      })
      .collect()
  }
}
