//! Engine configuration loaded from environment variables.
//!
//! Every setting has a default, so an engine can be built with zero
//! configuration.

use std::str::FromStr;

use daybook_shared::constants::{
    DEFAULT_IMAGE_LOAD_ATTEMPTS, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_IMAGE_DIMENSION,
};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Longest edge of an uploaded image, in pixels.
    /// Env: `DAYBOOK_MAX_IMAGE_DIM`
    /// Default: `1024`
    pub max_image_dimension: u32,

    /// JPEG quality (1-100) used when re-encoding images.
    /// Env: `DAYBOOK_JPEG_QUALITY`
    /// Default: `70`
    pub jpeg_quality: u8,

    /// Capacity of the engine command channel.
    /// Env: `DAYBOOK_COMMAND_BUFFER`
    /// Default: `256`
    pub command_buffer: usize,

    /// Blob-store attempts per image load before the direct fetch fallback.
    /// Env: `DAYBOOK_IMAGE_LOAD_ATTEMPTS`
    /// Default: `2`
    pub image_load_attempts: u32,

    /// Number of loaded images kept in memory.
    /// Env: `DAYBOOK_IMAGE_CACHE`
    /// Default: `64`
    pub image_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            command_buffer: 256,
            image_load_attempts: DEFAULT_IMAGE_LOAD_ATTEMPTS,
            image_cache_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        read(&lookup, "DAYBOOK_MAX_IMAGE_DIM", &mut config.max_image_dimension);
        read(&lookup, "DAYBOOK_JPEG_QUALITY", &mut config.jpeg_quality);
        read(&lookup, "DAYBOOK_COMMAND_BUFFER", &mut config.command_buffer);
        read(&lookup, "DAYBOOK_IMAGE_LOAD_ATTEMPTS", &mut config.image_load_attempts);
        read(&lookup, "DAYBOOK_IMAGE_CACHE", &mut config.image_cache_capacity);

        config.max_image_dimension = config.max_image_dimension.max(1);
        config.jpeg_quality = config.jpeg_quality.clamp(1, 100);
        config.command_buffer = config.command_buffer.max(1);
        config.image_load_attempts = config.image_load_attempts.max(1);

        config
    }
}

fn read<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(value) = lookup(key) else {
        return;
    };
    match value.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!(key, value = %value, "Invalid value, using default"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> EngineConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_image_dimension, 1024);
        assert_eq!(config.jpeg_quality, 70);
        assert_eq!(config.image_load_attempts, 2);
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("DAYBOOK_MAX_IMAGE_DIM", "512"),
            ("DAYBOOK_JPEG_QUALITY", "90"),
            ("DAYBOOK_IMAGE_CACHE", "8"),
        ]);
        assert_eq!(config.max_image_dimension, 512);
        assert_eq!(config.jpeg_quality, 90);
        assert_eq!(config.image_cache_capacity, 8);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_map(&[
            ("DAYBOOK_MAX_IMAGE_DIM", "huge"),
            ("DAYBOOK_JPEG_QUALITY", "0"),
            ("DAYBOOK_COMMAND_BUFFER", "0"),
        ]);
        assert_eq!(config.max_image_dimension, 1024);
        assert_eq!(config.jpeg_quality, 1);
        assert_eq!(config.command_buffer, 1);
    }
}
