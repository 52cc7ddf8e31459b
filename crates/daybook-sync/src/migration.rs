//! One-shot transfer of guest data to a signed-in account.
//!
//! Local blob paths are re-uploaded as bytes and replaced by the resulting
//! remote URL; references that already look remote are kept as they are.
//! Guest data is only cleared after every entry and the profile image made
//! it upstream.
//!
//! Upload keys are derived from the local path, so a retry after a partial
//! failure overwrites the blobs of the earlier attempt and the `images`
//! union sees the same URLs again.

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use daybook_remote::{date_update, FieldOp, RemoteStore};
use daybook_shared::constants::{
    audio_blob_path, image_blob_path, profile_blob_path, FIELD_AUDIO_URL, FIELD_IMAGES,
};
use daybook_shared::{JournalEntry, UserId};
use daybook_store::{BlobStore, GuestStore, StoreError};

use crate::error::Result;

/// What a successful migration moved.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub entries: usize,
    pub blobs_uploaded: usize,
    pub references_reused: usize,
    /// Local files that no longer existed and were left out.
    pub blobs_missing: usize,
    pub profile_image: bool,
}

enum Moved {
    Url(String),
    Missing,
}

/// Copy every guest entry and the guest profile image to `user`.
///
/// On success the guest store is emptied and guest mode deactivated. On any
/// error the guest store is left untouched so the migration can be retried.
pub async fn migrate_guest(
    guest: &mut GuestStore,
    remote: &dyn RemoteStore,
    user: &UserId,
) -> Result<MigrationReport> {
    let entries = guest.db.list_entries()?;
    let profile_image = guest.db.guest_profile_image()?;
    info!(user = %user, entries = entries.len(), "Migrating guest data");

    let mut report = MigrationReport::default();

    for entry in &entries {
        migrate_entry(&guest.blobs, remote, user, entry, &mut report).await?;
        report.entries += 1;
    }

    if let Some(path) = profile_image {
        let key = profile_blob_path(user);
        if let Moved::Url(url) = move_reference(&guest.blobs, remote, &path, &key, &mut report).await? {
            remote.set_profile_image(user, &url).await?;
            report.profile_image = true;
        }
    }

    guest.db.clear_entries()?;
    guest.db.set_guest_profile_image(None)?;
    guest.db.set_guest_active(false)?;
    if let Err(e) = guest.blobs.clear() {
        warn!(error = %e, "Failed to remove migrated guest blobs");
    }

    info!(user = %user, ?report, "Guest migration complete");
    Ok(report)
}

async fn migrate_entry(
    blobs: &BlobStore,
    remote: &dyn RemoteStore,
    user: &UserId,
    entry: &JournalEntry,
    report: &mut MigrationReport,
) -> Result<()> {
    let mut images = Vec::with_capacity(entry.images.len());
    for reference in &entry.images {
        let key = image_blob_path(user, &upload_id(reference));
        if let Moved::Url(url) = move_reference(blobs, remote, reference, &key, report).await? {
            images.push(Value::String(url));
        }
    }

    let mut audio = None;
    if let Some(reference) = &entry.audio_url {
        let key = audio_blob_path(user, &upload_id(reference));
        if let Moved::Url(url) = move_reference(blobs, remote, reference, &key, report).await? {
            audio = Some(url);
        }
    }

    let mut update = date_update(entry.date);
    if !images.is_empty() {
        update.push((FIELD_IMAGES.to_string(), FieldOp::ArrayUnion(images)));
    }
    if let Some(url) = audio {
        update.push((FIELD_AUDIO_URL.to_string(), FieldOp::Set(Value::String(url))));
    }

    remote.upsert_merge(user, entry.date, update).await?;
    Ok(())
}

fn upload_id(reference: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, reference.as_bytes())
}

async fn move_reference(
    blobs: &BlobStore,
    remote: &dyn RemoteStore,
    reference: &str,
    key: &str,
    report: &mut MigrationReport,
) -> Result<Moved> {
    if reference.contains("://") {
        report.references_reused += 1;
        return Ok(Moved::Url(reference.to_string()));
    }

    let data = match blobs.load(reference) {
        Ok(Some(data)) => data,
        Ok(None) | Err(StoreError::PathTraversal(_)) => {
            warn!(reference, "Guest blob missing, skipping");
            report.blobs_missing += 1;
            return Ok(Moved::Missing);
        }
        Err(e) => return Err(e.into()),
    };

    let url = remote.upload_blob(key, data.into()).await?;
    report.blobs_uploaded += 1;
    Ok(Moved::Url(url))
}
