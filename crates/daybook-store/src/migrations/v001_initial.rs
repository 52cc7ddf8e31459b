//! v001 -- Initial schema creation.
//!
//! Creates the `entries` table: one row per calendar day.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Entries (one per day)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS entries (
    date_key   TEXT PRIMARY KEY NOT NULL,   -- YYYY-MM-DD (UTC)
    id         TEXT NOT NULL,               -- UUID v4 assigned on first save
    year       INTEGER NOT NULL,
    month      INTEGER NOT NULL,
    day        INTEGER NOT NULL,
    audio_url  TEXT,
    images     TEXT NOT NULL DEFAULT '[]',  -- JSON array, append order
    updated_at TEXT NOT NULL                -- RFC-3339
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_entries_id ON entries(id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
