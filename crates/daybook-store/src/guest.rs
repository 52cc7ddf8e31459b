//! The complete guest-mode persistence tier: entry database plus blob files.

use std::path::{Path, PathBuf};

use crate::blobs::BlobStore;
use crate::database::{Database, DATABASE_FILE};
use crate::error::Result;

/// Directory (under the data dir) holding guest blobs.
pub const BLOB_DIR: &str = "blobs";

pub struct GuestStore {
    pub db: Database,
    pub blobs: BlobStore,
}

impl GuestStore {
    /// Open (or create) the store rooted at `dir`.
    pub fn open_at(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let db = Database::open_at(&dir.join(DATABASE_FILE))?;
        let blobs = BlobStore::new(dir.join(BLOB_DIR))?;
        Ok(Self { db, blobs })
    }

    /// Database in memory, blobs under `blob_dir`.
    pub fn ephemeral(blob_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            db: Database::open_in_memory()?,
            blobs: BlobStore::new(blob_dir)?,
        })
    }
}
