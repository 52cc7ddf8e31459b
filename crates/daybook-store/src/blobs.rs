use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use daybook_shared::constants::{AUDIO_EXTENSION, IMAGE_EXTENSION};
use daybook_shared::DateKey;

use crate::error::{Result, StoreError};

const PROFILE_DIR: &str = "profile";

/// Image and audio files captured in guest mode.
///
/// Files are laid out as `<base>/<YYYY-MM-DD>/<uuid>.<ext>` and identified by
/// their absolute path, which is what guest entries store in `images` and
/// `audio_url`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    base_path: PathBuf,
}

impl BlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        let base_path = base_path.canonicalize()?;

        info!(path = %base_path.display(), "Blob store initialized");

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn save_image(&self, data: &[u8], date: DateKey) -> Result<String> {
        self.save(data, date, IMAGE_EXTENSION)
    }

    pub fn save_audio(&self, data: &[u8], date: DateKey) -> Result<String> {
        self.save(data, date, AUDIO_EXTENSION)
    }

    /// Guest avatar, kept apart from the per-day directories.
    pub fn save_profile_image(&self, data: &[u8]) -> Result<String> {
        self.write_in(PROFILE_DIR, data, IMAGE_EXTENSION)
    }

    /// Write `data` under the day's directory and return its stable path.
    pub fn save(&self, data: &[u8], date: DateKey, extension: &str) -> Result<String> {
        self.write_in(&date.to_string(), data, extension)
    }

    fn write_in(&self, dir_name: &str, data: &[u8], extension: &str) -> Result<String> {
        if data.is_empty() {
            return Err(StoreError::EmptyBlob);
        }

        let dir = self.base_path.join(dir_name);
        fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.{extension}", Uuid::new_v4()));
        fs::write(&path, data)?;

        debug!(path = %path.display(), size = data.len(), "Stored blob");
        Ok(path.to_string_lossy().into_owned())
    }

    /// Read a blob back. `Ok(None)` when the file is gone.
    pub fn load(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(path)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a blob. Returns `false` when it did not exist.
    pub fn delete(&self, path: &str) -> Result<bool> {
        let path = self.resolve(path)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted blob");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `path` names a file inside this store.
    pub fn owns(&self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    /// Remove every stored blob, keeping the base directory.
    pub fn clear(&self) -> Result<()> {
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        info!(path = %self.base_path.display(), "Blob store cleared");
        Ok(())
    }

    // Paths must sit strictly below the base directory with no `..` hops.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path)
            .strip_prefix(&self.base_path)
            .map_err(|_| StoreError::PathTraversal(path.to_string()))?;

        let mut resolved = self.base_path.clone();
        let mut depth = 0;
        for component in relative.components() {
            match component {
                Component::Normal(c) => {
                    resolved.push(c);
                    depth += 1;
                }
                Component::CurDir => {}
                _ => return Err(StoreError::PathTraversal(path.to_string())),
            }
        }
        if depth == 0 {
            return Err(StoreError::PathTraversal(path.to_string()));
        }
        Ok(resolved)
    }
}
