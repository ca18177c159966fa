//! Frame decoding to RGB.
//!
//! Frames arrive as encoded bytes in one of the supported transfer syntaxes
//! and leave as 8-bit RGB images. JPEG goes through the `image` crate, JPEG
//! 2000 through `jpeg2k` (OpenJPEG), and native pixels are reinterpreted in
//! place.

use std::sync::OnceLock;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use tracing::debug;

use super::syntax::TransferSyntax;
use crate::error::TileSourceError;

/// Pixel layout of a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub columns: u32,
    pub rows: u32,
    pub samples_per_pixel: u16,
    pub bits_allocated: u16,
}

/// Decode one encoded frame to RGB.
///
/// # Errors
/// Returns `Decode` if the codec rejects the data, the pixel layout is not
/// one we can convert, or the decoded size differs from the frame geometry.
pub fn decode_frame(
    data: &[u8],
    syntax: TransferSyntax,
    geometry: &FrameGeometry,
) -> Result<RgbImage, TileSourceError> {
    let image = match syntax {
        TransferSyntax::JpegBaseline8Bit | TransferSyntax::JpegExtended12Bit => {
            image::load_from_memory_with_format(data, ImageFormat::Jpeg)
                .map_err(|e| TileSourceError::decode(format!("JPEG frame: {}", e)))?
                .to_rgb8()
        }
        TransferSyntax::Jpeg2000 | TransferSyntax::Jpeg2000Lossless => decode_jpeg2000(data)?,
        TransferSyntax::ImplicitVrLittleEndian | TransferSyntax::ExplicitVrLittleEndian => {
            decode_native(data, geometry)?
        }
    };

    let expected = (geometry.columns, geometry.rows);
    if image.dimensions() != expected {
        return Err(TileSourceError::decode(format!(
            "frame decoded to {}x{}, expected {}x{}",
            image.width(),
            image.height(),
            expected.0,
            expected.1
        )));
    }
    Ok(image)
}

fn decode_jpeg2000(data: &[u8]) -> Result<RgbImage, TileSourceError> {
    let image = jpeg2k::Image::from_bytes(data)
        .map_err(|e| TileSourceError::decode(format!("JPEG 2000 frame: {}", e)))?;
    let components = image.components();
    let width = image.width();
    let height = image.height();
    let pixel_count = width as usize * height as usize;

    if components.is_empty() || components.iter().any(|c| c.data().len() < pixel_count) {
        return Err(TileSourceError::decode(
            "JPEG 2000 frame: missing or subsampled components",
        ));
    }

    // Grayscale replicates its single channel
    let channels: [usize; 3] = if components.len() >= 3 { [0, 1, 2] } else { [0, 0, 0] };

    let mut out = RgbImage::new(width, height);
    for (i, pixel) in out.pixels_mut().enumerate() {
        for (channel, &index) in channels.iter().enumerate() {
            let component = &components[index];
            pixel.0[channel] = to_u8(component.data()[i], component.precision());
        }
    }
    Ok(out)
}

/// Scale a decoded sample of the given precision to 8 bits.
fn to_u8(sample: i32, precision: u32) -> u8 {
    let sample = sample.max(0) as u32;
    let scaled = if precision > 8 {
        sample >> (precision - 8)
    } else {
        sample
    };
    scaled.min(255) as u8
}

fn decode_native(data: &[u8], geometry: &FrameGeometry) -> Result<RgbImage, TileSourceError> {
    if geometry.bits_allocated != 8 {
        return Err(TileSourceError::decode(format!(
            "native frames with {} bits allocated are not supported",
            geometry.bits_allocated
        )));
    }

    let (w, h) = (geometry.columns, geometry.rows);
    let pixels = w as usize * h as usize;
    let short = || TileSourceError::decode("native frame is shorter than its geometry");

    match geometry.samples_per_pixel {
        3 => {
            let bytes = data.get(..pixels * 3).ok_or_else(short)?;
            RgbImage::from_raw(w, h, bytes.to_vec()).ok_or_else(short)
        }
        1 => {
            let bytes = data.get(..pixels).ok_or_else(short)?;
            let gray = GrayImage::from_raw(w, h, bytes.to_vec()).ok_or_else(short)?;
            Ok(DynamicImage::ImageLuma8(gray).to_rgb8())
        }
        other => Err(TileSourceError::decode(format!(
            "native frames with {} samples per pixel are not supported",
            other
        ))),
    }
}

// =============================================================================
// Codec Initialization
// =============================================================================

static CODECS: OnceLock<Result<(), String>> = OnceLock::new();

/// A 1x1 8-bit grayscale lossless codestream holding a single empty packet.
#[rustfmt::skip]
const J2K_SELF_TEST: &[u8] = &[
    // SOC
    0xFF, 0x4F,
    // SIZ: 1x1 image and tile, one unsigned 8-bit component
    0xFF, 0x51, 0x00, 0x29, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x01, 0x07, 0x01, 0x01,
    // COD: LRCP, one layer, no transform, no decomposition, 64x64 code blocks, 5-3 wavelet
    0xFF, 0x52, 0x00, 0x0C, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x04, 0x04, 0x00, 0x01,
    // QCD: no quantization, one band
    0xFF, 0x5C, 0x00, 0x04, 0x40, 0x40,
    // SOT: tile 0, tile-part length 15, part 0 of 1
    0xFF, 0x90, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0F, 0x00, 0x01,
    // SOD, empty packet
    0xFF, 0x93, 0x00,
    // EOC
    0xFF, 0xD9,
];

/// Verify that the image codecs work, once per process.
///
/// Runs a JPEG encode/decode round trip and decodes a tiny JPEG 2000
/// codestream the first time it is called; later calls return the cached
/// outcome. Called at startup and before every open, so a broken codec
/// surfaces as an open failure rather than on the first tile request.
pub fn initialize_codecs() -> Result<(), TileSourceError> {
    CODECS
        .get_or_init(|| {
            let sample = RgbImage::from_pixel(8, 8, image::Rgb([128, 64, 32]));
            let mut encoded = Vec::new();
            JpegEncoder::new_with_quality(&mut encoded, 90)
                .encode_image(&sample)
                .map_err(|e| format!("JPEG encoder self-test failed: {}", e))?;
            let decoded = decode_frame(
                &encoded,
                TransferSyntax::JpegBaseline8Bit,
                &FrameGeometry {
                    columns: 8,
                    rows: 8,
                    samples_per_pixel: 3,
                    bits_allocated: 8,
                },
            )
            .map_err(|e| format!("JPEG decoder self-test failed: {}", e))?;
            if decoded.dimensions() != (8, 8) {
                return Err("JPEG decoder self-test returned the wrong size".to_string());
            }
            decode_frame(
                J2K_SELF_TEST,
                TransferSyntax::Jpeg2000Lossless,
                &FrameGeometry {
                    columns: 1,
                    rows: 1,
                    samples_per_pixel: 1,
                    bits_allocated: 8,
                },
            )
            .map_err(|e| format!("JPEG 2000 decoder self-test failed: {}", e))?;
            debug!("Image codecs initialized");
            Ok(())
        })
        .clone()
        .map_err(TileSourceError::open)
}
