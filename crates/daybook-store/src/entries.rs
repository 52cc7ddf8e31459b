//! CRUD operations for guest [`JournalEntry`] rows.
//!
//! Rows are keyed by date: saving an entry for a day that already has one
//! replaces it, keeping the id assigned on the first save.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use daybook_shared::{DateKey, JournalEntry};

use crate::database::Database;
use crate::error::Result;

const SELECT_COLUMNS: &str = "SELECT id, year, month, day, audio_url, images FROM entries";

impl Database {
    /// All stored entries, oldest day first.
    pub fn list_entries(&self) -> Result<Vec<JournalEntry>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY year, month, day"))?;

        let rows = stmt.query_map([], row_to_raw)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    /// The entry for `date`, if one was ever saved.
    pub fn get_entry(&self, date: DateKey) -> Result<Option<JournalEntry>> {
        let raw = self
            .conn()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE date_key = ?1"),
                params![date.to_string()],
                row_to_raw,
            )
            .optional()?;

        raw.map(RawEntry::into_entry).transpose()
    }

    /// Upsert keyed by date. Returns the entry as stored, id included.
    pub fn save_entry(&self, entry: &JournalEntry) -> Result<JournalEntry> {
        let existing_id: Option<String> = self
            .conn()
            .query_row(
                "SELECT id FROM entries WHERE date_key = ?1",
                params![entry.date.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let id = existing_id
            .or_else(|| entry.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let images = serde_json::to_string(&entry.images)?;

        self.conn().execute(
            "INSERT INTO entries (date_key, id, year, month, day, audio_url, images, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(date_key) DO UPDATE SET
                 audio_url  = excluded.audio_url,
                 images     = excluded.images,
                 updated_at = excluded.updated_at",
            params![
                entry.date.to_string(),
                id,
                entry.date.year,
                entry.date.month,
                entry.date.day,
                entry.audio_url,
                images,
                Utc::now().to_rfc3339(),
            ],
        )?;

        tracing::debug!(date = %entry.date, id = %id, images = entry.images.len(), "saved guest entry");

        let mut stored = entry.clone();
        stored.id = Some(id);
        stored.local_images.clear();
        Ok(stored)
    }

    pub fn delete_entry(&self, date: DateKey) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM entries WHERE date_key = ?1",
            params![date.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Remove every entry (used once a guest store has been migrated).
    pub fn clear_entries(&self) -> Result<usize> {
        Ok(self.conn().execute("DELETE FROM entries", [])?)
    }
}

struct RawEntry {
    id: String,
    date: DateKey,
    audio_url: Option<String>,
    images: String,
}

impl RawEntry {
    fn into_entry(self) -> Result<JournalEntry> {
        let images: Vec<String> = serde_json::from_str(&self.images)?;
        Ok(JournalEntry {
            id: Some(self.id),
            date: self.date,
            audio_url: self.audio_url,
            images,
            local_images: Vec::new(),
        })
    }
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        id: row.get(0)?,
        date: DateKey::new(row.get(1)?, row.get(2)?, row.get(3)?),
        audio_url: row.get(4)?,
        images: row.get(5)?,
    })
}
