//! Output tile encoder.
//!
//! Synthesized tiles are RGB buffers; this module turns them into the bytes
//! a caller asked for: JPEG at a given quality, lossless PNG, or the raw
//! interleaved RGB samples.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::TileSourceError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Output Options
// =============================================================================

/// Output encoding of a tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileEncoding {
    #[default]
    Jpeg,
    Png,
    /// Interleaved 8-bit RGB samples, row-major
    Raw,
}

impl TileEncoding {
    pub const fn mime_type(self) -> &'static str {
        match self {
            TileEncoding::Jpeg => "image/jpeg",
            TileEncoding::Png => "image/png",
            TileEncoding::Raw => "application/octet-stream",
        }
    }

    /// Parse a request value such as `jpeg`, `jpg`, `png` or `raw`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(TileEncoding::Jpeg),
            "png" => Some(TileEncoding::Png),
            "raw" => Some(TileEncoding::Raw),
            _ => None,
        }
    }
}

/// Caller-chosen output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    pub encoding: TileEncoding,
    /// JPEG quality, ignored by other encodings
    pub quality: u8,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            encoding: TileEncoding::Jpeg,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl OutputOptions {
    pub fn png() -> Self {
        Self {
            encoding: TileEncoding::Png,
            ..Default::default()
        }
    }

    pub fn jpeg(quality: u8) -> Self {
        Self {
            encoding: TileEncoding::Jpeg,
            quality,
        }
    }
}

/// An encoded tile and its media type.
#[derive(Debug, Clone)]
pub struct EncodedTile {
    pub data: Bytes,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

// =============================================================================
// Encoder
// =============================================================================

/// Stateless tile encoder.
#[derive(Debug, Clone, Default)]
pub struct TileEncoder;

impl TileEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode an RGB tile.
    ///
    /// Quality is clamped to `[1, 100]`.
    ///
    /// # Errors
    /// Returns `Encode` if the codec rejects the buffer.
    pub fn encode(
        &self,
        image: &RgbImage,
        options: &OutputOptions,
    ) -> Result<EncodedTile, TileSourceError> {
        let (width, height) = image.dimensions();
        let encode_error = |e: image::ImageError| TileSourceError::Encode {
            message: e.to_string(),
        };

        let data = match options.encoding {
            TileEncoding::Jpeg => {
                let mut output = Vec::new();
                JpegEncoder::new_with_quality(&mut output, clamp_quality(options.quality))
                    .write_image(image.as_raw(), width, height, ExtendedColorType::Rgb8)
                    .map_err(encode_error)?;
                Bytes::from(output)
            }
            TileEncoding::Png => {
                let mut output = Cursor::new(Vec::new());
                PngEncoder::new(&mut output)
                    .write_image(image.as_raw(), width, height, ExtendedColorType::Rgb8)
                    .map_err(encode_error)?;
                Bytes::from(output.into_inner())
            }
            TileEncoding::Raw => Bytes::copy_from_slice(image.as_raw()),
        };

        Ok(EncodedTile {
            data,
            mime_type: options.encoding.mime_type(),
            width,
            height,
        })
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
