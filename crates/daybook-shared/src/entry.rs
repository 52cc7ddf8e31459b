//! Journal entry and image value types.
//!
//! Entries are plain values: every update produces a new version that
//! replaces the old one in the owning list, and observers only ever hold
//! clones, so one day's update can never leak into another day's view.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::DateKey;

// ---------------------------------------------------------------------------
// JournalImage
// ---------------------------------------------------------------------------

/// A pending or resolved image.
///
/// Freshly captured images carry only `data`. Once the blob upload finishes
/// the reference is filled in as `url` while the bytes stay around for
/// display until the confirmed entry arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalImage {
    /// Stable per instance; used for diffing and removal targeting.
    pub id: Uuid,
    /// Confirmed (or uploaded) reference.
    pub url: Option<String>,
    /// Encoded image bytes held in memory.
    pub data: Option<Bytes>,
}

impl JournalImage {
    /// A not-yet-uploaded image.
    pub fn pending(data: Bytes) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: None,
            data: Some(data),
        }
    }

    /// A confirmed reference. The id is derived from the reference so the
    /// same image keeps the same id across snapshots.
    pub fn confirmed(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes()),
            url: Some(url),
            data: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.url.is_some()
    }
}

// ---------------------------------------------------------------------------
// JournalEntry
// ---------------------------------------------------------------------------

/// One calendar day of journal content for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Assigned by the backing store; `None` for an optimistic placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(flatten)]
    pub date: DateKey,

    #[serde(rename = "audioURL", default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    /// Confirmed references in the order they were added.
    #[serde(default)]
    pub images: Vec<String>,

    /// Pending images; never persisted.
    #[serde(skip)]
    pub local_images: Vec<JournalImage>,
}

impl JournalEntry {
    /// Empty entry for `date` with no store id yet.
    pub fn new(date: DateKey) -> Self {
        Self {
            id: None,
            date,
            audio_url: None,
            images: Vec::new(),
            local_images: Vec::new(),
        }
    }

    /// Confirmed images followed by pending ones.
    pub fn display_images(&self) -> Vec<JournalImage> {
        self.images
            .iter()
            .map(JournalImage::confirmed)
            .chain(self.local_images.iter().cloned())
            .collect()
    }

    pub fn has_content(&self) -> bool {
        !self.images.is_empty() || self.audio_url.is_some()
    }

    pub fn is_completed(&self) -> bool {
        !self.images.is_empty() && self.audio_url.is_some()
    }

    /// Drop pending images whose reference is already confirmed.
    pub fn prune_resolved_local_images(&mut self) {
        let images = &self.images;
        self.local_images.retain(|pending| match &pending.url {
            Some(url) => !images.contains(url),
            None => true,
        });
    }

    /// Take over the pending images of an older version of this day, minus
    /// the ones this version already confirms.
    pub fn carry_local_images(mut self, previous: &JournalEntry) -> Self {
        let mut carried = previous.local_images.clone();
        for own in &self.local_images {
            if !carried.iter().any(|img| img.id == own.id) {
                carried.push(own.clone());
            }
        }
        self.local_images = carried;
        self.prune_resolved_local_images();
        self
    }

    /// Remove `image` from both the confirmed and pending lists.
    ///
    /// Returns `true` when anything was removed.
    pub fn remove_image(&mut self, image: &JournalImage) -> bool {
        let before = self.images.len() + self.local_images.len();
        if let Some(url) = &image.url {
            self.images.retain(|existing| existing != url);
            self.local_images
                .retain(|pending| pending.id != image.id && pending.url.as_ref() != Some(url));
        } else {
            self.local_images.retain(|pending| pending.id != image.id);
        }
        before != self.images.len() + self.local_images.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> DateKey {
        DateKey::new(2024, 3, 1)
    }

    #[test]
    fn derived_flags() {
        let mut entry = JournalEntry::new(day());
        assert!(!entry.has_content());
        assert!(!entry.is_completed());

        entry.images.push("urlA".into());
        assert!(entry.has_content());
        assert!(!entry.is_completed());

        entry.audio_url = Some("audio".into());
        assert!(entry.is_completed());

        entry.images.clear();
        assert!(entry.has_content());
        assert!(!entry.is_completed());
    }

    #[test]
    fn display_images_puts_confirmed_first() {
        let mut entry = JournalEntry::new(day());
        entry.images = vec!["urlA".into(), "urlB".into()];
        let pending = JournalImage::pending(Bytes::from_static(b"raw"));
        entry.local_images.push(pending.clone());

        let shown = entry.display_images();
        assert_eq!(shown.len(), 3);
        assert_eq!(shown[0].url.as_deref(), Some("urlA"));
        assert_eq!(shown[1].url.as_deref(), Some("urlB"));
        assert_eq!(shown[2].id, pending.id);
    }

    #[test]
    fn confirmed_image_ids_are_stable() {
        assert_eq!(
            JournalImage::confirmed("urlA").id,
            JournalImage::confirmed("urlA").id
        );
        assert_ne!(
            JournalImage::confirmed("urlA").id,
            JournalImage::confirmed("urlB").id
        );
    }

    #[test]
    fn carry_drops_pending_images_already_confirmed() {
        let mut old = JournalEntry::new(day());
        let mut uploaded = JournalImage::pending(Bytes::from_static(b"a"));
        uploaded.url = Some("urlB".into());
        let in_flight = JournalImage::pending(Bytes::from_static(b"b"));
        old.local_images = vec![uploaded, in_flight.clone()];

        let mut incoming = JournalEntry::new(day());
        incoming.id = Some("doc".into());
        incoming.images = vec!["urlA".into(), "urlB".into()];

        let merged = incoming.carry_local_images(&old);
        assert_eq!(merged.local_images, vec![in_flight]);
        assert_eq!(merged.display_images().len(), 3);
    }

    #[test]
    fn remove_image_by_url_and_by_id() {
        let mut entry = JournalEntry::new(day());
        entry.images = vec!["urlA".into()];
        let pending = JournalImage::pending(Bytes::from_static(b"p"));
        entry.local_images.push(pending.clone());

        assert!(entry.remove_image(&JournalImage::confirmed("urlA")));
        assert!(entry.images.is_empty());

        assert!(entry.remove_image(&pending));
        assert!(entry.local_images.is_empty());

        assert!(!entry.remove_image(&pending));
    }

    #[test]
    fn serde_uses_document_field_names() {
        let mut entry = JournalEntry::new(day());
        entry.audio_url = Some("a.m4a".into());
        entry.images = vec!["urlA".into()];
        entry.local_images.push(JournalImage::pending(Bytes::from_static(b"x")));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["year"], 2024);
        assert_eq!(json["month"], 3);
        assert_eq!(json["day"], 1);
        assert_eq!(json["audioURL"], "a.m4a");
        assert!(json.get("local_images").is_none());

        let back: JournalEntry = serde_json::from_value(json).unwrap();
        assert!(back.local_images.is_empty());
        assert_eq!(back.images, entry.images);
    }
}
