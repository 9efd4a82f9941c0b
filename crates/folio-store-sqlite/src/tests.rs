//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use folio_core::{
  EngineConfig,
  clock::ManualClock,
  document::{Document, SceneContent},
  policy::SnapshotPolicy,
  revert::Reverter,
  scene::{NewScene, NewVersion, SaveReason},
  store::{DocumentStore, SceneQuery, WriteBatch, WriteOp},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn content(text: &str) -> SceneContent {
  SceneContent::from_document(&Document::from_plain_text(text))
}

async fn scene(s: &SqliteStore, chapter_id: Uuid, position: i64, text: &str) -> Uuid {
  s.create_scene(
    NewScene::new(chapter_id, position).with_content(Document::from_plain_text(text)),
  )
  .await
  .unwrap()
  .scene_id
}

fn snapshot(text: &str, secs: i64) -> WriteOp {
  let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs);
  WriteOp::InsertVersion(NewVersion::new(content(text), SaveReason::ManualSave, at))
}

// ─── Scenes ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_scene() {
  let s = store().await;
  let chapter = Uuid::new_v4();

  let created = s
    .create_scene(
      NewScene::new(chapter, 3).with_content(Document::from_plain_text("Hello there")),
    )
    .await
    .unwrap();

  let fetched = s.get_scene(created.scene_id).await.unwrap().unwrap();
  assert_eq!(fetched.chapter_id, chapter);
  assert_eq!(fetched.position, 3);
  assert_eq!(fetched.content, created.content);
  assert_eq!(fetched.content.plain_text, "Hello there");
  assert_eq!(fetched.content.stats.char_count, 10);
  assert_eq!(fetched.content.stats.char_count_with_spaces, 11);
}

#[tokio::test]
async fn new_scene_without_content_is_empty() {
  let s = store().await;
  let created = s.create_scene(NewScene::new(Uuid::new_v4(), 0)).await.unwrap();
  let fetched = s.get_scene(created.scene_id).await.unwrap().unwrap();
  assert_eq!(fetched.content.plain_text, "");
  assert_eq!(fetched.content.stats.char_count, 0);
}

#[tokio::test]
async fn get_scene_missing_returns_none() {
  let s = store().await;
  assert!(s.get_scene(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn list_scenes_orders_by_position() {
  let s = store().await;
  let chapter = Uuid::new_v4();
  let c = scene(&s, chapter, 2, "c").await;
  let a = scene(&s, chapter, 0, "a").await;
  let b = scene(&s, chapter, 1, "b").await;
  scene(&s, Uuid::new_v4(), 0, "elsewhere").await;

  let ids: Vec<Uuid> = s
    .list_scenes(chapter)
    .await
    .unwrap()
    .into_iter()
    .map(|sc| sc.scene_id)
    .collect();
  assert_eq!(ids, vec![a, b, c]);
}

// ─── Batches ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn apply_numbers_versions_and_lists_newest_first() {
  let s = store().await;
  let id = scene(&s, Uuid::new_v4(), 0, "start").await;

  for (i, text) in ["one", "two", "three"].into_iter().enumerate() {
    let mut batch = WriteBatch::new(id);
    batch.push(WriteOp::PutContent(content(text)));
    batch.push(snapshot(text, i as i64));
    let receipt = s.apply(batch).await.unwrap();
    assert_eq!(receipt.inserted.len(), 1);
    assert_eq!(receipt.inserted[0].number, i as i64 + 1);
    assert_eq!(receipt.scene.content.plain_text, text);
  }

  let versions = s.list_versions(id).await.unwrap();
  let texts: Vec<&str> = versions.iter().map(|v| v.content.plain_text.as_str()).collect();
  assert_eq!(texts, vec!["three", "two", "one"]);
  assert_eq!(s.count_versions(id).await.unwrap(), 3);

  let latest = s.latest_version(id).await.unwrap().unwrap();
  assert_eq!(latest.version_id, versions[0].version_id);
  assert_eq!(latest.reason, SaveReason::ManualSave);
}

#[tokio::test]
async fn equal_timestamps_order_by_number() {
  let s = store().await;
  let id = scene(&s, Uuid::new_v4(), 0, "start").await;

  let mut batch = WriteBatch::new(id);
  batch.push(snapshot("first", 0));
  batch.push(snapshot("second", 0));
  s.apply(batch).await.unwrap();

  let latest = s.latest_version(id).await.unwrap().unwrap();
  assert_eq!(latest.content.plain_text, "second");
  assert_eq!(latest.number, 2);
}

#[tokio::test]
async fn apply_to_missing_scene_fails() {
  let s = store().await;
  let mut batch = WriteBatch::new(Uuid::new_v4());
  batch.push(snapshot("orphan", 0));

  let err = s.apply(batch).await.unwrap_err();
  assert!(matches!(err, Error::SceneNotFound(_)));
}

#[tokio::test]
async fn stale_guard_rolls_back_the_whole_batch() {
  let s = store().await;
  let id = scene(&s, Uuid::new_v4(), 0, "start").await;

  let mut first = WriteBatch::new(id);
  first.push(snapshot("one", 0));
  let first = s.apply(first).await.unwrap().inserted.remove(0);

  // Expect no versions while one exists.
  let mut batch = WriteBatch::new(id).expect_latest(None);
  batch.push(WriteOp::PutContent(content("clobbered")));
  batch.push(snapshot("two", 1));
  let err = s.apply(batch).await.unwrap_err();
  assert!(matches!(err, Error::StaleWrite(sid) if sid == id));

  let scene = s.get_scene(id).await.unwrap().unwrap();
  assert_eq!(scene.content.plain_text, "start");
  assert_eq!(s.count_versions(id).await.unwrap(), 1);

  // The correct guard succeeds.
  let mut batch = WriteBatch::new(id).expect_latest(Some(first.version_id));
  batch.push(snapshot("two", 1));
  s.apply(batch).await.unwrap();
  assert_eq!(s.count_versions(id).await.unwrap(), 2);
}

#[tokio::test]
async fn evicting_a_foreign_version_is_rejected() {
  let s = store().await;
  let a = scene(&s, Uuid::new_v4(), 0, "a").await;
  let b = scene(&s, Uuid::new_v4(), 0, "b").await;

  let mut batch = WriteBatch::new(b);
  batch.push(snapshot("b1", 0));
  let foreign = s.apply(batch).await.unwrap().inserted.remove(0).version_id;

  let mut batch = WriteBatch::new(a);
  batch.push(WriteOp::PutContent(content("changed")));
  batch.push(WriteOp::EvictVersion(foreign));
  let err = s.apply(batch).await.unwrap_err();
  assert!(matches!(err, Error::ForeignVersion(v, sid) if v == foreign && sid == a));

  assert_eq!(s.get_scene(a).await.unwrap().unwrap().content.plain_text, "a");
  assert!(s.get_version(foreign).await.unwrap().is_some());
}

#[tokio::test]
async fn eviction_removes_the_named_version() {
  let s = store().await;
  let id = scene(&s, Uuid::new_v4(), 0, "start").await;

  let mut batch = WriteBatch::new(id);
  batch.push(snapshot("old", 0));
  batch.push(snapshot("new", 1));
  let inserted = s.apply(batch).await.unwrap().inserted;

  let mut batch = WriteBatch::new(id);
  batch.push(snapshot("newest", 2));
  batch.push(WriteOp::EvictVersion(inserted[0].version_id));
  let receipt = s.apply(batch).await.unwrap();

  assert_eq!(receipt.evicted, vec![inserted[0].version_id]);
  assert_eq!(receipt.inserted[0].number, 3);
  assert!(s.get_version(inserted[0].version_id).await.unwrap().is_none());
  assert_eq!(s.count_versions(id).await.unwrap(), 2);
}

// ─── Deletion ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn deleting_a_scene_removes_its_versions() {
  let s = store().await;
  let id = scene(&s, Uuid::new_v4(), 0, "start").await;
  let mut batch = WriteBatch::new(id);
  batch.push(snapshot("one", 0));
  let version = s.apply(batch).await.unwrap().inserted.remove(0);

  assert!(s.delete_scene(id).await.unwrap());
  assert!(s.get_scene(id).await.unwrap().is_none());
  assert!(s.get_version(version.version_id).await.unwrap().is_none());
  assert_eq!(s.count_versions(id).await.unwrap(), 0);

  assert!(!s.delete_scene(id).await.unwrap());
}

#[tokio::test]
async fn deleting_a_chapter_leaves_other_chapters() {
  let s = store().await;
  let chapter = Uuid::new_v4();
  let a = scene(&s, chapter, 0, "a").await;
  scene(&s, chapter, 1, "b").await;
  let keep = scene(&s, Uuid::new_v4(), 0, "keep").await;

  let mut batch = WriteBatch::new(a);
  batch.push(snapshot("a1", 0));
  s.apply(batch).await.unwrap();

  assert_eq!(s.delete_chapter(chapter).await.unwrap(), 2);
  assert!(s.list_scenes(chapter).await.unwrap().is_empty());
  assert_eq!(s.count_versions(a).await.unwrap(), 0);
  assert!(s.get_scene(keep).await.unwrap().is_some());
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_is_case_insensitive_and_scoped() {
  let s = store().await;
  let chapter = Uuid::new_v4();
  let hit = scene(&s, chapter, 0, "The ÉTÉ garden slept under snow").await;
  scene(&s, chapter, 1, "Nothing to see").await;
  let other = scene(&s, Uuid::new_v4(), 0, "An été to remember").await;

  let hits = s.search(&SceneQuery::text("été")).await.unwrap();
  assert_eq!(hits.len(), 2);

  let scoped = SceneQuery { chapter_id: Some(chapter), ..SceneQuery::text("été") };
  let hits = s.search(&scoped).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].scene_id, hit);
  assert!(hits[0].snippet.contains("ÉTÉ"));

  let paged = SceneQuery { limit: Some(1), offset: Some(1), ..SceneQuery::text("été") };
  let hits = s.search(&paged).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert!(hits[0].scene_id == hit || hits[0].scene_id == other);

  assert!(s.search(&SceneQuery::text("winter")).await.unwrap().is_empty());
}

// ─── Policy and revert over SQLite ───────────────────────────────────────────

#[tokio::test]
async fn policy_and_revert_run_against_sqlite() {
  let store = Arc::new(store().await);
  let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()));
  let config = EngineConfig { version_cap: 3, ..EngineConfig::default() };
  let policy = SnapshotPolicy::new(store.clone(), clock.clone(), config.clone());
  let reverter = Reverter::new(store.clone(), clock.clone(), config);

  let id = scene(&store, Uuid::new_v4(), 0, "draft").await;
  let mut ids = Vec::new();
  for text in ["one", "two", "three"] {
    let receipt = policy
      .commit(id, &Document::from_plain_text(text), SaveReason::ManualSave)
      .await
      .unwrap();
    ids.push(receipt.version.unwrap().version_id);
    clock.advance(Duration::seconds(30));
  }

  // Within the spacing window an auto-save only updates content.
  let receipt = policy
    .commit(id, &Document::from_plain_text("three and a bit"), SaveReason::AutoSave)
    .await
    .unwrap();
  assert!(receipt.version.is_none());
  assert_eq!(store.count_versions(id).await.unwrap(), 3);

  let receipt = reverter.revert(id, ids[1]).await.unwrap();
  assert_eq!(receipt.backup.reason, SaveReason::BeforeRevert);
  assert_eq!(receipt.backup.content.plain_text, "three and a bit");
  assert_eq!(receipt.evicted, vec![ids[0]]);
  assert_eq!(receipt.scene.content.plain_text, "two");
  assert_eq!(store.count_versions(id).await.unwrap(), 3);

  let latest = store.latest_version(id).await.unwrap().unwrap();
  assert_eq!(latest.version_id, receipt.backup.version_id);
  assert!(!reverter.can_revert(id, latest.version_id).await.unwrap());
}
