//! Decoded artwork images.

use std::sync::Arc;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};

use super::ArtworkError;

/// A decoded image, cheap to clone.
#[derive(Debug, Clone)]
pub struct ArtworkImage {
    image: Arc<DynamicImage>,
}

impl ArtworkImage {
    /// Wraps an already decoded image.
    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    /// Decodes encoded image bytes (JPEG or PNG).
    ///
    /// # Errors
    ///
    /// Returns [`ArtworkError::Image`] if the bytes are not a supported image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtworkError> {
        Ok(Self::from_image(image::load_from_memory(bytes)?))
    }

    /// Decodes base64 image bytes, optionally wrapped in a `data:` URL.
    ///
    /// # Errors
    ///
    /// Returns [`ArtworkError::Base64`] or [`ArtworkError::Image`] when the
    /// payload does not decode.
    pub fn from_base64(data: &str) -> Result<Self, ArtworkError> {
        let base64_data = if data.starts_with("data:") {
            data.split_once(',').map(|(_, rest)| rest).unwrap_or(data)
        } else {
            data
        };
        let bytes = base64::engine::general_purpose::STANDARD.decode(base64_data.trim())?;
        Self::from_bytes(&bytes)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Decoded footprint in bytes (4 bytes per pixel), used as the memory-tier cost.
    pub fn cost(&self) -> usize {
        self.width() as usize * self.height() as usize * 4
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    /// Whether both handles share the same decoded image.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }

    /// Encodes as baseline JPEG at `quality` (1-100).
    ///
    /// # Errors
    ///
    /// Returns [`ArtworkError::Image`] if encoding fails.
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, ArtworkError> {
        let rgb = self.image.to_rgb8();
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality).write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ExtendedColorType::Rgb8,
        )?;
        Ok(out)
    }
}
