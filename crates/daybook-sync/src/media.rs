//! Image decoding and the downscale/re-encode step applied before storage.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Failed to decode image: {0}")]
    Decode(image::ImageError),

    #[error("Failed to encode image: {0}")]
    Encode(image::ImageError),

    #[error("Empty payload")]
    Empty,
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, MediaError> {
    if bytes.is_empty() {
        return Err(MediaError::Empty);
    }
    image::load_from_memory(bytes).map_err(MediaError::Decode)
}

/// Shrink `img` so its longest edge is at most `max_dimension` (aspect ratio
/// kept) and encode it as JPEG.
pub fn prepare_for_storage(
    img: &DynamicImage,
    max_dimension: u32,
    quality: u8,
) -> Result<Bytes, MediaError> {
    let (width, height) = img.dimensions();
    let resized;
    let source = if width > max_dimension || height > max_dimension {
        resized = img.thumbnail(max_dimension, max_dimension);
        &resized
    } else {
        img
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(source.to_rgb8());

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality);
    rgb.write_with_encoder(encoder).map_err(MediaError::Encode)?;
    Ok(Bytes::from(buf))
}
