//! Guest profile settings stored as key/value rows.

use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

const KEY_GUEST_ACTIVE: &str = "guest_active";
const KEY_PROFILE_IMAGE: &str = "profile_image_path";

impl Database {
    /// Whether the device is currently running in guest mode.
    pub fn is_guest_active(&self) -> Result<bool> {
        Ok(self.get_setting(KEY_GUEST_ACTIVE)?.as_deref() == Some("1"))
    }

    pub fn set_guest_active(&self, active: bool) -> Result<()> {
        self.put_setting(KEY_GUEST_ACTIVE, if active { "1" } else { "0" })
    }

    /// Local path of the guest's profile picture, if one was picked.
    pub fn guest_profile_image(&self) -> Result<Option<String>> {
        self.get_setting(KEY_PROFILE_IMAGE)
    }

    pub fn set_guest_profile_image(&self, path: Option<&str>) -> Result<()> {
        match path {
            Some(path) => self.put_setting(KEY_PROFILE_IMAGE, path),
            None => {
                self.conn().execute(
                    "DELETE FROM guest_profile WHERE key = ?1",
                    params![KEY_PROFILE_IMAGE],
                )?;
                Ok(())
            }
        }
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT value FROM guest_profile WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO guest_profile (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}
