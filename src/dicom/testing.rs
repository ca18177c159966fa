//! Synthetic Part 10 files for unit tests.

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use super::parser::{MAGIC, PREAMBLE_LENGTH};
use super::syntax::TransferSyntax;
use super::tags::{self, Tag, Vr};

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Element stream writer for either VR encoding.
pub(crate) struct Writer {
    explicit: bool,
    buf: Vec<u8>,
}

impl Writer {
    pub fn explicit() -> Self {
        Self {
            explicit: true,
            buf: Vec::new(),
        }
    }

    pub fn implicit() -> Self {
        Self {
            explicit: false,
            buf: Vec::new(),
        }
    }

    fn header(&mut self, tag: Tag, vr: Vr, length: u32) {
        self.buf.extend_from_slice(&tag.group.to_le_bytes());
        self.buf.extend_from_slice(&tag.element.to_le_bytes());
        if !self.explicit {
            self.buf.extend_from_slice(&length.to_le_bytes());
        } else if vr.has_long_length() {
            self.buf.extend_from_slice(&vr.0);
            self.buf.extend_from_slice(&[0, 0]);
            self.buf.extend_from_slice(&length.to_le_bytes());
        } else {
            self.buf.extend_from_slice(&vr.0);
            self.buf.extend_from_slice(&(length as u16).to_le_bytes());
        }
    }

    pub fn raw(mut self, tag: Tag, vr: Vr, value: &[u8]) -> Self {
        self.header(tag, vr, value.len() as u32);
        self.buf.extend_from_slice(value);
        self
    }

    pub fn str(self, tag: Tag, vr: Vr, value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        if bytes.len() % 2 == 1 {
            bytes.push(if vr == Vr::UI { 0 } else { b' ' });
        }
        self.raw(tag, vr, &bytes)
    }

    pub fn u16(self, tag: Tag, value: u16) -> Self {
        self.raw(tag, Vr::US, &value.to_le_bytes())
    }

    pub fn u32(self, tag: Tag, value: u32) -> Self {
        self.raw(tag, Vr::UL, &value.to_le_bytes())
    }

    /// Undefined-length sequence of undefined-length items.
    pub fn sequence(mut self, tag: Tag, items: Vec<Writer>) -> Self {
        self.header(tag, Vr::SQ, UNDEFINED_LENGTH);
        for item in items {
            push_delimiter(&mut self.buf, tags::ITEM, UNDEFINED_LENGTH);
            self.buf.extend(item.buf);
            push_delimiter(&mut self.buf, tags::ITEM_DELIMITATION, 0);
        }
        push_delimiter(&mut self.buf, tags::SEQUENCE_DELIMITATION, 0);
        self
    }

    /// Encapsulated pixel data, optionally with a basic offset table.
    pub fn encapsulated(mut self, fragments: &[Vec<u8>], with_offsets: bool) -> Self {
        self.header(tags::PIXEL_DATA, Vr::OB, UNDEFINED_LENGTH);
        if with_offsets {
            let mut offsets = Vec::new();
            let mut position = 0u32;
            for fragment in fragments {
                offsets.extend_from_slice(&position.to_le_bytes());
                position += 8 + fragment.len() as u32;
            }
            push_delimiter(&mut self.buf, tags::ITEM, offsets.len() as u32);
            self.buf.extend(offsets);
        } else {
            push_delimiter(&mut self.buf, tags::ITEM, 0);
        }
        for fragment in fragments {
            push_delimiter(&mut self.buf, tags::ITEM, fragment.len() as u32);
            self.buf.extend_from_slice(fragment);
        }
        push_delimiter(&mut self.buf, tags::SEQUENCE_DELIMITATION, 0);
        self
    }

    /// Wrap the stream into a Part 10 file.
    pub fn into_file(self, syntax: TransferSyntax) -> Vec<u8> {
        let meta = Writer::explicit().str(tags::TRANSFER_SYNTAX_UID, Vr::UI, syntax.uid());
        let mut out = vec![0u8; PREAMBLE_LENGTH];
        out.extend_from_slice(MAGIC);
        out.extend(meta.buf);
        out.extend(self.buf);
        out
    }
}

fn push_delimiter(buf: &mut Vec<u8>, tag: Tag, length: u32) {
    buf.extend_from_slice(&tag.group.to_le_bytes());
    buf.extend_from_slice(&tag.element.to_le_bytes());
    buf.extend_from_slice(&length.to_le_bytes());
}

/// Solid-color JPEG frame.
pub(crate) fn jpeg_frame(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(color));
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 95)
        .encode_image(&image)
        .unwrap();
    out
}

/// Description of a synthetic tiled WSI instance.
pub(crate) struct InstanceSpec<'a> {
    pub sop_instance_uid: &'a str,
    pub series_instance_uid: &'a str,
    pub image_type: &'a str,
    pub total_size: (u32, u32),
    pub tile_size: (u32, u32),
    pub spacing_mm: Option<f64>,
    pub color: [u8; 3],
}

impl Default for InstanceSpec<'_> {
    fn default() -> Self {
        Self {
            sop_instance_uid: "1.2.3.1",
            series_instance_uid: "1.2.3",
            image_type: "VOLUME",
            total_size: (512, 512),
            tile_size: (256, 256),
            spacing_mm: Some(0.00025),
            color: [200, 40, 40],
        }
    }
}

/// Build a TILED_FULL JPEG baseline instance with one fragment per frame.
pub(crate) fn tiled_instance(spec: &InstanceSpec<'_>) -> Vec<u8> {
    let (tw, th) = spec.tile_size;
    let tiles_x = spec.total_size.0.div_ceil(tw);
    let tiles_y = spec.total_size.1.div_ceil(th);
    let frames: Vec<Vec<u8>> = (0..tiles_x * tiles_y)
        .map(|_| jpeg_frame(tw, th, spec.color))
        .collect();

    let mut shared = Vec::new();
    if let Some(spacing) = spec.spacing_mm {
        let measures = Writer::explicit().str(
            tags::PIXEL_SPACING,
            Vr::DS,
            &format!("{}\\{}", spacing, spacing),
        );
        shared.push(Writer::explicit().sequence(tags::PIXEL_MEASURES_SEQUENCE, vec![measures]));
    }

    let mut writer = Writer::explicit()
        .str(
            tags::IMAGE_TYPE,
            Vr::CS,
            &format!("ORIGINAL\\PRIMARY\\{}\\NONE", spec.image_type),
        )
        .str(tags::SOP_INSTANCE_UID, Vr::UI, spec.sop_instance_uid)
        .str(tags::STUDY_INSTANCE_UID, Vr::UI, "1.2")
        .str(tags::SERIES_INSTANCE_UID, Vr::UI, spec.series_instance_uid)
        .str(tags::DIMENSION_ORGANIZATION_TYPE, Vr::CS, "TILED_FULL")
        .u16(tags::SAMPLES_PER_PIXEL, 3)
        .str(tags::PHOTOMETRIC_INTERPRETATION, Vr::CS, "YBR_FULL_422")
        .str(tags::NUMBER_OF_FRAMES, Vr::IS, &frames.len().to_string())
        .u16(tags::ROWS, th as u16)
        .u16(tags::COLUMNS, tw as u16)
        .u16(tags::BITS_ALLOCATED, 8)
        .u32(tags::TOTAL_PIXEL_MATRIX_COLUMNS, spec.total_size.0)
        .u32(tags::TOTAL_PIXEL_MATRIX_ROWS, spec.total_size.1);
    if !shared.is_empty() {
        writer = writer.sequence(tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE, shared);
    }
    writer
        .encapsulated(&frames, false)
        .into_file(TransferSyntax::JpegBaseline8Bit)
}
