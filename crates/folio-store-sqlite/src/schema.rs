//! SQL schema for the Folio SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per scene: the latest persisted content and its derived fields.
CREATE TABLE IF NOT EXISTS scenes (
    scene_id               TEXT PRIMARY KEY,
    chapter_id             TEXT NOT NULL,
    position               INTEGER NOT NULL,
    content                TEXT NOT NULL,   -- serialized document JSON
    plain_text             TEXT NOT NULL,
    char_count             INTEGER NOT NULL,
    char_count_with_spaces INTEGER NOT NULL,
    digest                 TEXT NOT NULL,   -- hex SHA-256 of content
    created_at             TEXT NOT NULL,   -- RFC 3339 UTC
    updated_at             TEXT NOT NULL
);

-- Versions are immutable: rows are inserted and deleted, never updated.
CREATE TABLE IF NOT EXISTS versions (
    version_id             TEXT PRIMARY KEY,
    scene_id               TEXT NOT NULL REFERENCES scenes(scene_id) ON DELETE CASCADE,
    number                 INTEGER NOT NULL, -- per-scene sequence; store-assigned
    content                TEXT NOT NULL,
    plain_text             TEXT NOT NULL,
    char_count             INTEGER NOT NULL,
    char_count_with_spaces INTEGER NOT NULL,
    digest                 TEXT NOT NULL,
    reason                 TEXT NOT NULL,    -- 'auto-save' | 'manual-save' | 'before-revert'
    created_at             TEXT NOT NULL,
    UNIQUE (scene_id, number)
);

CREATE INDEX IF NOT EXISTS scenes_chapter_idx  ON scenes(chapter_id, position);
CREATE INDEX IF NOT EXISTS versions_scene_idx  ON versions(scene_id, created_at, number);

PRAGMA user_version = 1;
";
