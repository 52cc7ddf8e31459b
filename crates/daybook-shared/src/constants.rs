/// Document field holding the confirmed image references.
pub const FIELD_IMAGES: &str = "images";

/// Document field holding the single audio reference.
pub const FIELD_AUDIO_URL: &str = "audioURL";

/// Date-key fields.
pub const FIELD_YEAR: &str = "year";
pub const FIELD_MONTH: &str = "month";
pub const FIELD_DAY: &str = "day";

/// Older documents carry a single combined date instead of year/month/day.
pub const LEGACY_FIELD_DATE: &str = "date";

/// Profile document field for the avatar URL.
pub const FIELD_PROFILE_IMAGE_URL: &str = "profileImageURL";

/// Extension used for every re-encoded image blob.
pub const IMAGE_EXTENSION: &str = "jpg";

/// Extension used for audio takes.
pub const AUDIO_EXTENSION: &str = "m4a";

/// Longest edge of an uploaded image after downscaling.
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 1024;

/// JPEG quality used when re-encoding uploads.
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

/// Attempts made against the blob store before falling back to a direct fetch.
pub const DEFAULT_IMAGE_LOAD_ATTEMPTS: u32 = 2;

/// Remote blob path for a freshly uploaded image.
pub fn image_blob_path(user: &crate::UserId, key: &uuid::Uuid) -> String {
    format!("users/{user}/images/{key}.{IMAGE_EXTENSION}")
}

/// Remote blob path for an audio take.
pub fn audio_blob_path(user: &crate::UserId, key: &uuid::Uuid) -> String {
    format!("users/{user}/audio/{key}.{AUDIO_EXTENSION}")
}

/// Remote blob path for a profile picture.
pub fn profile_blob_path(user: &crate::UserId) -> String {
    format!("users/{user}/profile.{IMAGE_EXTENSION}")
}
