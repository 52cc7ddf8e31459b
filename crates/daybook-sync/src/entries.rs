//! The canonical in-memory entry list and the feed merge algorithm.
//!
//! Invariants kept by every method:
//! - at most one entry per date;
//! - a pending image whose reference appears in `images` is dropped whenever
//!   a confirmed version of the day is merged in.
//!
//! Entries are replaced wholesale at their slot rather than edited through a
//! shared reference; callers only ever see clones.

use tracing::debug;
use uuid::Uuid;

use daybook_remote::{ChangeKind, FeedChange};
use daybook_shared::{DateKey, JournalEntry, JournalImage};

#[derive(Debug, Clone, Default)]
pub struct EntryList {
    entries: Vec<JournalEntry>,
}

impl EntryList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter()
    }

    pub fn get(&self, date: DateKey) -> Option<&JournalEntry> {
        self.entries.iter().find(|e| e.date == date)
    }

    pub fn snapshot(&self) -> Vec<JournalEntry> {
        self.entries.clone()
    }

    pub fn is_completed(&self, date: DateKey) -> bool {
        self.get(date).is_some_and(JournalEntry::is_completed)
    }

    /// Replace the whole list (guest bulk load). Later duplicates of a date
    /// win.
    pub fn replace_all(&mut self, entries: Vec<JournalEntry>) {
        self.entries.clear();
        for entry in entries {
            self.put(entry);
        }
    }

    /// Store `entry` in its day's slot, appending if the day is new.
    pub fn put(&mut self, entry: JournalEntry) {
        match self.position_by_date(entry.date) {
            Some(idx) => self.entries[idx] = entry,
            None => self.entries.push(entry),
        }
    }

    /// Apply `f` to a copy of the day's entry (created empty if missing) and
    /// store the copy back. Returns the new version.
    pub fn update(&mut self, date: DateKey, f: impl FnOnce(&mut JournalEntry)) -> JournalEntry {
        let idx = match self.position_by_date(date) {
            Some(idx) => idx,
            None => {
                self.entries.push(JournalEntry::new(date));
                self.entries.len() - 1
            }
        };
        let mut next = self.entries[idx].clone();
        f(&mut next);
        self.entries[idx] = next.clone();
        next
    }

    /// Like [`update`](Self::update) but never creates an entry.
    pub fn update_existing<R>(
        &mut self,
        date: DateKey,
        f: impl FnOnce(&mut JournalEntry) -> R,
    ) -> Option<R> {
        let idx = self.position_by_date(date)?;
        let mut next = self.entries[idx].clone();
        let out = f(&mut next);
        self.entries[idx] = next;
        Some(out)
    }

    // ------------------------------------------------------------------
    // Pending images
    // ------------------------------------------------------------------

    pub fn add_pending_image(&mut self, date: DateKey, image: JournalImage) {
        self.update(date, |entry| entry.local_images.push(image));
    }

    /// Record the uploaded reference of a pending image. If the confirmed
    /// list already has it the pending copy is dropped right away.
    pub fn mark_uploaded(&mut self, date: DateKey, image_id: Uuid, url: &str) -> bool {
        self.update_existing(date, |entry| {
            let Some(pending) = entry.local_images.iter_mut().find(|img| img.id == image_id)
            else {
                return false;
            };
            pending.url = Some(url.to_string());
            entry.prune_resolved_local_images();
            true
        })
        .unwrap_or(false)
    }

    /// Drop a pending image by id.
    pub fn resolve_pending(&mut self, date: DateKey, image_id: Uuid) -> bool {
        self.update_existing(date, |entry| {
            let before = entry.local_images.len();
            entry.local_images.retain(|img| img.id != image_id);
            before != entry.local_images.len()
        })
        .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Feed merge
    // ------------------------------------------------------------------

    /// Merge the first batch of a subscription, which lists every existing
    /// document. Each change is treated as an addition whatever its kind.
    pub fn apply_initial_batch(&mut self, batch: &[FeedChange]) -> usize {
        self.apply(batch, true)
    }

    /// Merge one feed batch. Returns how many changes altered the list.
    pub fn apply_batch(&mut self, batch: &[FeedChange]) -> usize {
        self.apply(batch, false)
    }

    fn apply(&mut self, batch: &[FeedChange], initial: bool) -> usize {
        let mut applied = 0;

        for change in batch {
            let incoming = change.entry();
            let kind = if initial {
                ChangeKind::Added
            } else {
                change.kind
            };

            let changed = match kind {
                ChangeKind::Added | ChangeKind::Modified => self.merge_confirmed(kind, incoming),
                ChangeKind::Removed => self.remove_confirmed(&incoming),
            };
            if changed {
                applied += 1;
            }
        }
        applied
    }

    // Identity match first; date only as a fallback for optimistic
    // placeholders that were created before the backend assigned an id.
    fn merge_confirmed(&mut self, kind: ChangeKind, incoming: JournalEntry) -> bool {
        let by_id = incoming.id.as_deref().and_then(|id| self.position_by_id(id));
        let slot = by_id.or_else(|| self.position_by_date(incoming.date));

        let Some(idx) = slot else {
            debug!(date = %incoming.date, id = ?incoming.id, ?kind, "appending confirmed entry");
            self.entries.push(incoming);
            return true;
        };

        debug!(
            date = %incoming.date,
            id = ?incoming.id,
            ?kind,
            matched_by = if by_id.is_some() { "id" } else { "date" },
            "replacing entry"
        );

        let merged = incoming.carry_local_images(&self.entries[idx]);
        let changed = self.entries[idx] != merged;
        self.entries[idx] = merged;

        // An id match may land on a day that also has a placeholder.
        let date = self.entries[idx].date;
        let kept_id = self.entries[idx].id.clone();
        if let Some(dup) = self
            .entries
            .iter()
            .enumerate()
            .position(|(i, e)| i != idx && e.date == date)
        {
            let placeholder = self.entries.remove(dup);
            let idx = if dup < idx { idx - 1 } else { idx };
            debug!(date = %date, id = ?kept_id, "folding duplicate day into confirmed entry");
            let merged = self.entries[idx].clone().carry_local_images(&placeholder);
            self.entries[idx] = merged;
            return true;
        }

        changed
    }

    fn remove_confirmed(&mut self, incoming: &JournalEntry) -> bool {
        let Some(idx) = incoming.id.as_deref().and_then(|id| self.position_by_id(id)) else {
            return false;
        };
        debug!(date = %incoming.date, id = ?incoming.id, "removing entry");
        self.entries.remove(idx);
        true
    }

    fn position_by_id(&self, id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.id.as_deref() == Some(id))
    }

    fn position_by_date(&self, date: DateKey) -> Option<usize> {
        self.entries.iter().position(|e| e.date == date)
    }
}
